//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Values used when neither a template nor a flag sets them
    #[serde(default)]
    pub defaults: RawDefaults,

    /// Named session templates
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub templates: BTreeMap<String, RawTemplate>,
}

/// Global defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDefaults {
    /// Default session length, e.g. "25m"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Enable do-not-disturb unless told otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dnd: Option<bool>,

    /// Send start/end notifications unless told otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify: Option<bool>,
}

/// Raw template definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dnd: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify: Option<bool>,

    /// Applications, URLs or files to open
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open: Vec<String>,

    /// Background shell commands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    /// Ambient audio file or URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    /// Multiplexer workspace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplex: Option<RawMultiplex>,
}

/// Raw multiplexer workspace
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawMultiplex {
    /// Multiplexer session name (defaults to `dayrun_<template>`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub panes: Vec<RawPane>,
}

/// Raw pane definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPane {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub command: String,

    /// Working directory; `~/` is expanded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}
