//! Configuration validation

use crate::schema::{RawConfig, RawTemplate};
use dayrun_util::parse_duration;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Template '{template}': {message}")]
    TemplateError { template: String, message: String },

    #[error("Template name cannot be empty")]
    EmptyTemplateName,

    #[error("Invalid duration '{value}': {message}")]
    InvalidDuration { value: String, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(duration) = &config.defaults.duration {
        match parse_duration(duration) {
            Ok(d) if d.is_zero() => errors.push(ValidationError::GlobalError(
                "default duration must be greater than zero".into(),
            )),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidDuration {
                value: duration.clone(),
                message: e.reason.into(),
            }),
        }
    }

    for (name, template) in &config.templates {
        errors.extend(validate_template(name, template));
    }

    errors
}

/// Validate one template definition
pub fn validate_template(name: &str, template: &RawTemplate) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push(ValidationError::EmptyTemplateName);
    }

    let template_error = |message: String| ValidationError::TemplateError {
        template: name.to_string(),
        message,
    };

    if let Some(duration) = &template.duration {
        match parse_duration(duration) {
            Ok(d) if d.is_zero() => {
                errors.push(template_error("duration must be greater than zero".into()))
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidDuration {
                value: duration.clone(),
                message: e.reason.into(),
            }),
        }
    }

    if template.open.iter().any(|t| t.trim().is_empty()) {
        errors.push(template_error("open targets cannot be blank".into()));
    }

    if template.commands.iter().any(|c| c.trim().is_empty()) {
        errors.push(template_error("commands cannot be blank".into()));
    }

    if let Some(audio) = &template.audio
        && audio.trim().is_empty()
    {
        errors.push(template_error("audio cannot be blank".into()));
    }

    if let Some(multiplex) = &template.multiplex {
        if let Some(session_name) = &multiplex.session_name
            && session_name.trim().is_empty()
        {
            errors.push(template_error("multiplex session_name cannot be empty".into()));
        }
        for (i, pane) in multiplex.panes.iter().enumerate() {
            if pane.command.trim().is_empty() {
                errors.push(template_error(format!("pane {} has an empty command", i + 1)));
            }
        }
    }

    errors
}
