//! Validated configuration and the template registry

use crate::schema::{RawConfig, RawDefaults, RawMultiplex, RawPane, RawTemplate};
use crate::CURRENT_CONFIG_VERSION;
use dayrun_api::{MultiplexLayout, PaneSpec};
use dayrun_util::{expand_tilde, format_duration_compact, parse_duration};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default session length when neither a template nor the config sets one
pub const FALLBACK_DURATION: Duration = Duration::from_secs(25 * 60);

/// Validated configuration ready for session resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub defaults: Defaults,

    /// Templates keyed by name
    pub templates: BTreeMap<String, Template>,
}

/// Global defaults
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub duration: Duration,
    pub dnd: bool,
    pub notify: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            duration: FALLBACK_DURATION,
            dnd: true,
            notify: true,
        }
    }
}

/// A named, reusable session definition.
///
/// Unset fields fall through to flags and then to [`Defaults`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub duration: Option<Duration>,
    pub dnd: Option<bool>,
    pub notify: Option<bool>,
    pub open: Vec<String>,
    pub commands: Vec<String>,
    pub audio: Option<String>,
    pub multiplex: Option<MultiplexLayout>,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let fallback = Defaults::default();
        let defaults = Defaults {
            duration: raw
                .defaults
                .duration
                .as_deref()
                .and_then(|d| parse_duration(d).ok())
                .unwrap_or(fallback.duration),
            dnd: raw.defaults.dnd.unwrap_or(fallback.dnd),
            notify: raw.defaults.notify.unwrap_or(fallback.notify),
        };

        let templates = raw
            .templates
            .into_iter()
            .map(|(name, t)| {
                let template = Template::from_raw(&name, t);
                (name, template)
            })
            .collect();

        Self {
            defaults,
            templates,
        }
    }

    /// Convert back into the on-disk representation
    pub fn to_raw(&self) -> RawConfig {
        RawConfig {
            config_version: CURRENT_CONFIG_VERSION,
            defaults: RawDefaults {
                duration: Some(format_duration_compact(self.defaults.duration)),
                dnd: Some(self.defaults.dnd),
                notify: Some(self.defaults.notify),
            },
            templates: self
                .templates
                .iter()
                .map(|(name, t)| (name.clone(), t.to_raw()))
                .collect(),
        }
    }

    /// Look up a template by name
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Template names in sorted order
    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Insert or replace a template. Returns the previous definition.
    pub fn save_template(&mut self, name: impl Into<String>, template: Template) -> Option<Template> {
        self.templates.insert(name.into(), template)
    }

    /// Remove a template. Returns it if it existed.
    pub fn remove_template(&mut self, name: &str) -> Option<Template> {
        self.templates.remove(name)
    }
}

impl Default for Config {
    /// Configuration written on first run
    fn default() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(
            "deep-work".to_string(),
            Template {
                duration: Some(Duration::from_secs(90 * 60)),
                dnd: Some(true),
                notify: Some(true),
                multiplex: Some(MultiplexLayout {
                    session_name: "dayrun_deep".into(),
                    panes: Vec::new(),
                }),
                ..Default::default()
            },
        );
        Self {
            defaults: Defaults::default(),
            templates,
        }
    }
}

impl Template {
    fn from_raw(name: &str, raw: RawTemplate) -> Self {
        Self {
            duration: raw.duration.as_deref().and_then(|d| parse_duration(d).ok()),
            dnd: raw.dnd,
            notify: raw.notify,
            open: raw.open,
            commands: raw.commands,
            audio: raw.audio,
            multiplex: raw.multiplex.map(|m| MultiplexLayout {
                session_name: m
                    .session_name
                    .unwrap_or_else(|| default_multiplex_name(name)),
                panes: m.panes.into_iter().map(convert_pane).collect(),
            }),
        }
    }

    fn to_raw(&self) -> RawTemplate {
        RawTemplate {
            duration: self.duration.map(format_duration_compact),
            dnd: self.dnd,
            notify: self.notify,
            open: self.open.clone(),
            commands: self.commands.clone(),
            audio: self.audio.clone(),
            multiplex: self.multiplex.as_ref().map(|m| RawMultiplex {
                session_name: Some(m.session_name.clone()),
                panes: m
                    .panes
                    .iter()
                    .map(|p| RawPane {
                        title: p.title.clone(),
                        command: p.command.clone(),
                        cwd: p.cwd.as_ref().map(|c| c.to_string_lossy().into_owned()),
                    })
                    .collect(),
            }),
        }
    }

    /// One-line summary for template listings
    pub fn summary(&self, defaults: &Defaults) -> String {
        let duration = format_duration_compact(self.duration.unwrap_or(defaults.duration));
        let dnd = if self.dnd.unwrap_or(defaults.dnd) { "on" } else { "off" };
        let mut parts = vec![format!("duration={}", duration), format!("dnd={}", dnd)];
        if !self.open.is_empty() {
            parts.push(format!("open={}", self.open.len()));
        }
        if !self.commands.is_empty() {
            parts.push(format!("commands={}", self.commands.len()));
        }
        if let Some(m) = &self.multiplex {
            parts.push(format!("tmux={} ({} panes)", m.session_name, m.panes.len()));
        }
        if self.audio.is_some() {
            parts.push("audio".into());
        }
        parts.join(" ")
    }
}

/// Multiplexer session name used when a template doesn't pick one
pub fn default_multiplex_name(template: &str) -> String {
    let cleaned: String = template
        .chars()
        .map(|c| if c == ':' || c == '.' || c.is_whitespace() { '_' } else { c })
        .collect();
    format!("dayrun_{}", cleaned)
}

fn convert_pane(raw: RawPane) -> PaneSpec {
    PaneSpec {
        title: raw.title,
        command: raw.command,
        cwd: raw.cwd.as_deref().map(expand_tilde),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_deep_work() {
        let config = Config::default();
        let deep = config.template("deep-work").unwrap();
        assert_eq!(deep.duration, Some(Duration::from_secs(5400)));
        assert_eq!(
            deep.multiplex.as_ref().map(|m| m.session_name.as_str()),
            Some("dayrun_deep")
        );
        assert_eq!(config.defaults.duration, FALLBACK_DURATION);
    }

    #[test]
    fn save_and_remove_templates() {
        let mut config = Config::default();
        let previous = config.save_template(
            "writing",
            Template {
                duration: Some(Duration::from_secs(45 * 60)),
                ..Default::default()
            },
        );
        assert!(previous.is_none());
        assert_eq!(
            config.template_names().collect::<Vec<_>>(),
            vec!["deep-work", "writing"]
        );

        assert!(config.remove_template("writing").is_some());
        assert!(config.remove_template("writing").is_none());
        assert!(config.template("writing").is_none());
    }

    #[test]
    fn raw_conversion_preserves_templates() {
        let mut config = Config::default();
        config.save_template(
            "review",
            Template {
                duration: Some(Duration::from_secs(1800)),
                open: vec!["https://example.com/prs".into()],
                commands: vec!["make watch".into()],
                multiplex: Some(MultiplexLayout {
                    session_name: "rev".into(),
                    panes: vec![PaneSpec::titled("log", "tail -f build.log")],
                }),
                ..Default::default()
            },
        );

        let back = Config::from_raw(config.to_raw());
        assert_eq!(back, config);
    }

    #[test]
    fn multiplex_name_defaults_from_template() {
        assert_eq!(default_multiplex_name("deep work"), "dayrun_deep_work");
        assert_eq!(default_multiplex_name("a.b:c"), "dayrun_a_b_c");
    }

    #[test]
    fn summary_falls_back_to_defaults() {
        let template = Template {
            commands: vec!["x".into()],
            ..Default::default()
        };
        let summary = template.summary(&Defaults::default());
        assert!(summary.contains("duration=25m"));
        assert!(summary.contains("dnd=on"));
        assert!(summary.contains("commands=1"));
    }
}
