//! Linux effect adapter
//!
//! - Do-not-disturb: GNOME `show-banners` via `gsettings`
//! - Notifications: `notify-send`
//! - Opening: `xdg-open` for URLs and files; executables on `PATH`, then
//!   `gtk-launch`, for application names

use async_trait::async_trait;
use dayrun_api::MultiplexLayout;
use dayrun_host_api::{
    Capabilities, EffectAdapter, EffectError, EffectResult, MultiplexOutcome, OsFamily,
};
use std::path::Path;
use tracing::debug;

use crate::{
    classify_target, create_or_fallback, has_tool, launch_detached, run_shell, run_tool,
    TargetKind,
};

const GNOME_NOTIFICATIONS_SCHEMA: &str = "org.gnome.desktop.notifications";

/// Linux effect adapter
pub struct LinuxEffects {
    capabilities: Capabilities,
}

impl LinuxEffects {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

/// argv that opens `target` on Linux, given which helpers exist
pub fn linux_open_argv(
    target: &str,
    kind: TargetKind,
    has: impl Fn(&str) -> bool,
) -> EffectResult<Vec<String>> {
    let argv = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();
    match kind {
        TargetKind::Location if has("xdg-open") => Ok(argv(&["xdg-open", target])),
        TargetKind::Location => Err(EffectError::ToolMissing("xdg-open".into())),
        TargetKind::Application if has(target) => Ok(argv(&[target])),
        TargetKind::Application if has("gtk-launch") => Ok(argv(&["gtk-launch", target])),
        TargetKind::Application if has("xdg-open") => Ok(argv(&["xdg-open", target])),
        TargetKind::Application => Err(EffectError::UnsupportedTarget(target.to_string())),
    }
}

#[async_trait]
impl EffectAdapter for LinuxEffects {
    fn os_family(&self) -> OsFamily {
        OsFamily::Linux
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn set_dnd(&self, enabled: bool) -> EffectResult<()> {
        if !self.capabilities.can_toggle_dnd {
            return Ok(());
        }
        let show_banners = if enabled { "false" } else { "true" };
        run_tool(
            "gsettings",
            &["set", GNOME_NOTIFICATIONS_SCHEMA, "show-banners", show_banners],
        )
        .await?;
        debug!(enabled, "Do-not-disturb set");
        Ok(())
    }

    async fn notify(&self, title: &str, body: &str) -> EffectResult<()> {
        if !self.capabilities.can_notify {
            return Ok(());
        }
        run_tool("notify-send", &["--app-name=dayrun", title, body]).await?;
        Ok(())
    }

    async fn open_target(&self, target: &str) -> EffectResult<()> {
        let argv = linux_open_argv(target, classify_target(target), has_tool)?;
        launch_detached(&argv, None).await?;
        Ok(())
    }

    async fn run_command(&self, command: &str, cwd: Option<&Path>) -> EffectResult<()> {
        run_shell(command, cwd).await?;
        Ok(())
    }

    async fn create_multiplex_session(
        &self,
        layout: &MultiplexLayout,
    ) -> EffectResult<MultiplexOutcome> {
        create_or_fallback(self, layout).await
    }
}
