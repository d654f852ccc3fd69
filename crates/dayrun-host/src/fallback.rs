//! Effect adapter for Unix systems without a known desktop integration

use async_trait::async_trait;
use dayrun_api::MultiplexLayout;
use dayrun_host_api::{
    Capabilities, EffectAdapter, EffectError, EffectResult, MultiplexOutcome, OsFamily,
};
use std::path::Path;

use crate::{classify_target, create_or_fallback, has_tool, launch_detached, run_shell, TargetKind};

/// Generic Unix effect adapter.
///
/// Do-not-disturb, notifications and a default opener are never available.
/// An open target that names an executable on `PATH` is still run directly.
pub struct UnixEffects {
    capabilities: Capabilities,
}

impl UnixEffects {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities: Capabilities {
                can_toggle_dnd: false,
                can_notify: false,
                can_open: false,
                ..capabilities
            },
        }
    }
}

#[async_trait]
impl EffectAdapter for UnixEffects {
    fn os_family(&self) -> OsFamily {
        OsFamily::OtherUnix
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn set_dnd(&self, _enabled: bool) -> EffectResult<()> {
        Ok(())
    }

    async fn notify(&self, _title: &str, _body: &str) -> EffectResult<()> {
        Ok(())
    }

    async fn open_target(&self, target: &str) -> EffectResult<()> {
        let argv = match classify_target(target) {
            TargetKind::Application if has_tool(target) => vec![target.to_string()],
            _ => return Err(EffectError::UnsupportedTarget(target.to_string())),
        };
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
