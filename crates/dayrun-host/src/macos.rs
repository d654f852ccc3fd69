//! macOS effect adapter

use async_trait::async_trait;
use dayrun_api::MultiplexLayout;
use dayrun_host_api::{Capabilities, EffectAdapter, EffectResult, MultiplexOutcome, OsFamily};
use std::path::Path;
use tracing::{debug, warn};

use crate::{classify_target, create_or_fallback, run_shell, run_tool, TargetKind};

const NOTIFICATION_CENTER_DOMAIN: &str = "com.apple.notificationcenterui";

/// macOS effect adapter
pub struct MacEffects {
    capabilities: Capabilities,
}

impl MacEffects {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

/// Quote a string as an AppleScript string literal
pub fn applescript_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `display notification` script for osascript
pub fn notification_script(title: &str, body: &str) -> String {
    format!(
        "display notification {} with title {}",
        applescript_string(body),
        applescript_string(title)
    )
}

#[async_trait]
impl EffectAdapter for MacEffects {
    fn os_family(&self) -> OsFamily {
        OsFamily::MacOs
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn set_dnd(&self, enabled: bool) -> EffectResult<()> {
        if !self.capabilities.can_toggle_dnd {
            return Ok(());
        }
        let value = if enabled { "true" } else { "false" };
        run_tool(
            "defaults",
            &[
                "-currentHost",
                "write",
                NOTIFICATION_CENTER_DOMAIN,
                "doNotDisturb",
                "-boolean",
                value,
            ],
        )
        .await?;

        // Notification Center only rereads its preferences on restart
        if let Err(e) = run_tool("killall", &["NotificationCenter"]).await {
            warn!(error = %e, "Could not restart Notification Center");
        }
        debug!(enabled, "Do-not-disturb set");
        Ok(())
    }

    async fn notify(&self, title: &str, body: &str) -> EffectResult<()> {
        if !self.capabilities.can_notify {
            return Ok(());
        }
        let script = notification_script(title, body);
        run_tool("osascript", &["-e", &script]).await?;
        Ok(())
    }

    async fn open_target(&self, target: &str) -> EffectResult<()> {
        match classify_target(target) {
            TargetKind::Location => {
                run_tool("open", &[target]).await?;
            }
            TargetKind::Application => {
                if let Err(e) = run_tool("open", &["-a", target]).await {
                    debug!(target = %target, error = %e, "open -a failed, trying plain open");
                    run_tool("open", &[target]).await?;
                }
            }
        }
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
