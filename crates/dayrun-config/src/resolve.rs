//! Merging templates, defaults and command-line overrides into a `SessionSpec`

use crate::config::{default_multiplex_name, Config};
use dayrun_api::{MultiplexLayout, PaneSpec, SessionSpec};
use dayrun_util::{expand_tilde, DayrunError, Result};
use std::time::Duration;
use tracing::debug;

/// Name given to sessions started without a template or `--name`
pub const ADHOC_SESSION_NAME: &str = "focus";

/// What the user asked for on the command line.
///
/// `None` means "not given"; lists are appended after the template's.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub template: Option<String>,
    pub name: Option<String>,
    pub duration: Option<Duration>,
    /// Ignore every configured duration and run until stopped
    pub until_stopped: bool,
    pub dnd: Option<bool>,
    pub notify: Option<bool>,
    pub open: Vec<String>,
    pub commands: Vec<String>,
    pub panes: Vec<PaneSpec>,
    pub multiplex_session: Option<String>,
    pub audio: Option<String>,
}

impl Config {
    /// Build the `SessionSpec` a `start` request describes.
    ///
    /// Precedence is flag, then template, then `[defaults]`.
    pub fn resolve(&self, request: &SessionRequest) -> Result<SessionSpec> {
        let template = match &request.template {
            Some(name) => Some(
                self.template(name)
                    .ok_or_else(|| DayrunError::TemplateNotFound(name.clone()))?,
            ),
            None => None,
        };

        let name = request
            .name
            .clone()
            .or_else(|| request.template.clone())
            .unwrap_or_else(|| ADHOC_SESSION_NAME.to_string());

        let duration = if request.until_stopped {
            None
        } else {
            Some(
                request
                    .duration
                    .or_else(|| template.and_then(|t| t.duration))
                    .unwrap_or(self.defaults.duration),
            )
        };

        let dnd = request
            .dnd
            .or_else(|| template.and_then(|t| t.dnd))
            .unwrap_or(self.defaults.dnd);
        let notify = request
            .notify
            .or_else(|| template.and_then(|t| t.notify))
            .unwrap_or(self.defaults.notify);

        let mut open: Vec<String> = template.map(|t| t.open.clone()).unwrap_or_default();
        open.extend(request.open.iter().cloned());
        let open = open.iter().map(|t| expand_target(t)).collect();

        let mut commands: Vec<String> = template.map(|t| t.commands.clone()).unwrap_or_default();
        commands.extend(request.commands.iter().cloned());

        let multiplex = resolve_multiplex(
            &name,
            template.and_then(|t| t.multiplex.as_ref()),
            request,
        );

        let audio = request
            .audio
            .as_ref()
            .or_else(|| template.and_then(|t| t.audio.as_ref()))
            .map(|a| expand_target(a));

        let spec = SessionSpec {
            name,
            duration,
            open,
            commands,
            multiplex,
            audio,
            dnd,
            notify,
        };
        spec.validate()?;

        debug!(
            name = %spec.name,
            duration = ?spec.duration,
            dnd = spec.dnd,
            open = spec.open.len(),
            commands = spec.commands.len(),
            "Resolved session spec"
        );

        Ok(spec)
    }
}

/// A layout survives resolution only if it has panes or was asked for by name
fn resolve_multiplex(
    session: &str,
    from_template: Option<&MultiplexLayout>,
    request: &SessionRequest,
) -> Option<MultiplexLayout> {
    let mut layout = from_template.cloned();

    if !request.panes.is_empty() {
        layout
            .get_or_insert_with(|| MultiplexLayout {
                session_name: default_multiplex_name(session),
                panes: Vec::new(),
            })
            .panes
            .extend(request.panes.iter().cloned());
    }

    match &request.multiplex_session {
        Some(name) => {
            let layout = layout.get_or_insert_with(|| MultiplexLayout {
                session_name: name.clone(),
                panes: Vec::new(),
            });
            layout.session_name = name.clone();
        }
        None => {
            if layout.as_ref().is_some_and(|l| l.panes.is_empty()) {
                layout = None;
            }
        }
    }

    layout
}

/// Expand `~/` in local paths; URLs and application names pass through
fn expand_target(target: &str) -> String {
    if target.starts_with('~') {
        expand_tilde(target).to_string_lossy().into_owned()
    } else {
        target.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Defaults, Template};

    fn config() -> Config {
        let mut config = Config::default();
        config.save_template(
            "review",
            Template {
                duration: Some(Duration::from_secs(1800)),
                dnd: Some(false),
                open: vec!["https://example.com/prs".into()],
                commands: vec!["make watch".into()],
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn adhoc_request_uses_defaults() {
        let spec = config().resolve(&SessionRequest::default()).unwrap();
        assert_eq!(spec.name, ADHOC_SESSION_NAME);
        assert_eq!(spec.duration, Some(Defaults::default().duration));
        assert!(spec.dnd);
        assert!(spec.notify);
        assert!(spec.multiplex.is_none());
    }

    #[test]
    fn template_then_flags() {
        let request = SessionRequest {
            template: Some("review".into()),
            duration: Some(Duration::from_secs(60)),
            open: vec!["notes.md".into()],
            ..Default::default()
        };
        let spec = config().resolve(&request).unwrap();

        assert_eq!(spec.name, "review");
        assert_eq!(spec.duration, Some(Duration::from_secs(60)));
        assert!(!spec.dnd);
        assert_eq!(spec.open, vec!["https://example.com/prs", "notes.md"]);
        assert_eq!(spec.commands, vec!["make watch"]);
    }

    #[test]
    fn dnd_flag_beats_template() {
        let request = SessionRequest {
            template: Some("review".into()),
            dnd: Some(true),
            ..Default::default()
        };
        assert!(config().resolve(&request).unwrap().dnd);
    }

    #[test]
    fn unknown_template() {
        let request = SessionRequest {
            template: Some("nope".into()),
            ..Default::default()
        };
        let err = config().resolve(&request).unwrap_err();
        assert!(matches!(err, DayrunError::TemplateNotFound(name) if name == "nope"));
    }

    #[test]
    fn until_stopped_drops_duration() {
        let request = SessionRequest {
            template: Some("review".into()),
            until_stopped: true,
            ..Default::default()
        };
        assert_eq!(config().resolve(&request).unwrap().duration, None);
    }

    #[test]
    fn empty_template_layout_is_dropped() {
        let request = SessionRequest {
            template: Some("deep-work".into()),
            ..Default::default()
        };
        assert!(config().resolve(&request).unwrap().multiplex.is_none());
    }

    #[test]
    fn pane_flags_build_a_layout() {
        let request = SessionRequest {
            name: Some("hack".into()),
            panes: vec![PaneSpec::titled("editor", "nvim"), PaneSpec::new("htop")],
            ..Default::default()
        };
        let layout = config().resolve(&request).unwrap().multiplex.unwrap();
        assert_eq!(layout.session_name, "dayrun_hack");
        assert_eq!(layout.panes.len(), 2);
    }

    #[test]
    fn session_name_flag_renames_template_layout() {
        let request = SessionRequest {
            template: Some("deep-work".into()),
            multiplex_session: Some("mine".into()),
            ..Default::default()
        };
        let layout = config().resolve(&request).unwrap().multiplex.unwrap();
        assert_eq!(layout.session_name, "mine");
        assert!(layout.panes.is_empty());
    }

    #[test]
    fn resolved_spec_is_validated() {
        let request = SessionRequest {
            commands: vec!["  ".into()],
            ..Default::default()
        };
        let err = config().resolve(&request).unwrap_err();
        assert!(err.is_invalid_request());
    }
}
