//! Open-target classification

use std::path::Path;

/// What an open target names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A URL or an existing file; handed to the default handler
    Location,
    /// Anything else; treated as an application name
    Application,
}

/// Classify an open target
pub fn classify_target(target: &str) -> TargetKind {
    if is_url(target) || Path::new(target).exists() {
        TargetKind::Location
    } else {
        TargetKind::Application
    }
}

fn is_url(target: &str) -> bool {
    match target.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && !rest.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => target.starts_with("mailto:"),
    }
}
