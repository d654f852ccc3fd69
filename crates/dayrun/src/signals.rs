//! Termination signals that end a session early

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;

/// SIGTERM, SIGINT and SIGHUP, registered up front so none of them kills
/// the process while start effects are still running.
pub struct StopSignals {
    sigterm: Signal,
    sigint: Signal,
    sighup: Signal,
}

impl StopSignals {
    pub fn register() -> Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?,
            sigint: signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?,
            sighup: signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?,
        })
    }

    /// Whether a signal already arrived, without waiting
    pub async fn arrived(&mut self) -> bool {
        tokio::select! {
            biased;
            _ = self.recv() => true,
            _ = std::future::ready(()) => false,
        }
    }

    /// Wait for the first of the signals
    pub async fn recv(&mut self) {
        let name = tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sighup.recv() => "SIGHUP",
        };
        info!(signal = name, "Received stop signal");
    }
}
