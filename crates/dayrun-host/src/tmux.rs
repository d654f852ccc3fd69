//! tmux workspace creation

use dayrun_api::MultiplexLayout;
use dayrun_host_api::{run_panes_as_commands, EffectAdapter, EffectResult, MultiplexOutcome};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::process::run_tool;

/// Thin driver over the `tmux` binary
#[derive(Debug, Clone)]
pub struct Tmux {
    program: String,
}

impl Tmux {
    pub fn new() -> Self {
        Self::with_program("tmux")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[String]) -> EffectResult<String> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_tool(&self.program, &args).await
    }

    pub async fn has_session(&self, name: &str) -> bool {
        self.run(&["has-session".into(), "-t".into(), exact_target(name)])
            .await
            .is_ok()
    }

    /// First of `base`, `base_1`, `base_2`, ... with no live session
    pub async fn unique_name(&self, base: &str) -> String {
        let mut n = 0;
        loop {
            let candidate = candidate_name(base, n);
            if !self.has_session(&candidate).await {
                return candidate;
            }
            n += 1;
        }
    }

    /// Create a detached session with one pane per layout entry.
    ///
    /// Returns the session name actually used.
    pub async fn create(&self, layout: &MultiplexLayout) -> EffectResult<String> {
        let name = self.unique_name(&layout.session_name).await;
        let home = dirs::home_dir();

        for args in build_commands(&name, layout, home) {
            debug!(args = ?args, "tmux");
            self.run(&args).await?;
        }

        info!(session = %name, panes = layout.panes.len(), "tmux session created");
        Ok(name)
    }
}

impl Default for Tmux {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared `create_multiplex_session` for every adapter: tmux when the
/// host has it, otherwise each pane as a background command.
pub async fn create_or_fallback<A>(adapter: &A, layout: &MultiplexLayout) -> EffectResult<MultiplexOutcome>
where
    A: EffectAdapter + ?Sized,
{
    if !adapter.capabilities().can_multiplex {
        debug!(session = %layout.session_name, "No multiplexer, running panes as commands");
        return Ok(run_panes_as_commands(adapter, layout).await);
    }
    let session_name = Tmux::new().create(layout).await?;
    Ok(MultiplexOutcome::Created { session_name })
}

/// `base` for the first attempt, `base_<n>` after that
pub fn candidate_name(base: &str, n: usize) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}_{}", base, n)
    }
}

fn exact_target(name: &str) -> String {
    format!("={}", name)
}

/// Active pane of the session named exactly `name`
fn pane_target(name: &str) -> String {
    format!("={}:", name)
}

/// tmux invocations that build `layout` under `name`, in order.
///
/// Each pane starts a shell in its directory and receives its command as
/// keystrokes, so the pane survives the command exiting.
pub fn build_commands(
    name: &str,
    layout: &MultiplexLayout,
    default_cwd: Option<PathBuf>,
) -> Vec<Vec<String>> {
    let target = pane_target(name);
    let mut cmds = Vec::new();

    let cwd_args = |cwd: Option<&PathBuf>| -> Vec<String> {
        cwd.or(default_cwd.as_ref())
            .map(|dir| vec!["-c".to_string(), dir.to_string_lossy().into_owned()])
            .unwrap_or_default()
    };

    let mut new_session = vec!["new-session".into(), "-d".into(), "-s".into(), name.to_string()];
    new_session.extend(cwd_args(layout.panes.first().and_then(|p| p.cwd.as_ref())));
    cmds.push(new_session);

    for (i, pane) in layout.panes.iter().enumerate() {
        if i > 0 {
            let mut split = vec!["split-window".into(), "-t".into(), target.clone()];
            split.extend(cwd_args(pane.cwd.as_ref()));
            cmds.push(split);
            cmds.push(vec![
                "select-layout".into(),
                "-t".into(),
                target.clone(),
                "tiled".into(),
            ]);
        }
        if let Some(title) = &pane.title {
            cmds.push(vec![
                "select-pane".into(),
                "-t".into(),
                target.clone(),
                "-T".into(),
                title.clone(),
            ]);
        }
        cmds.push(vec![
            "send-keys".into(),
            "-t".into(),
            target.clone(),
            pane.command.clone(),
            "Enter".into(),
        ]);
    }

    cmds
}

#[cfg(test)]
mod tests {
    use super::*;
    use dayrun_api::PaneSpec;

    fn layout(panes: Vec<PaneSpec>) -> MultiplexLayout {
        MultiplexLayout {
            session_name: "work".into(),
            panes,
        }
    }

    #[test]
    fn candidate_names() {
        assert_eq!(candidate_name("work", 0), "work");
        assert_eq!(candidate_name("work", 2), "work_2");
    }

    #[test]
    fn empty_layout_is_a_bare_session() {
        let cmds = build_commands("work", &layout(vec![]), None);
        assert_eq!(cmds, vec![vec!["new-session", "-d", "-s", "work"]]);
    }

    #[test]
    fn panes_are_split_in_order() {
        let mut editor = PaneSpec::titled("editor", "nvim");
        editor.cwd = Some(PathBuf::from("/src"));
        let cmds = build_commands(
            "work_1",
            &layout(vec![editor, PaneSpec::new("htop"), PaneSpec::new("tail -f log")]),
            Some(PathBuf::from("/home/me")),
        );

        assert_eq!(cmds[0], vec!["new-session", "-d", "-s", "work_1", "-c", "/src"]);
        assert_eq!(cmds[1], vec!["select-pane", "-t", "=work_1:", "-T", "editor"]);
        assert_eq!(cmds[2], vec!["send-keys", "-t", "=work_1:", "nvim", "Enter"]);
        assert_eq!(cmds[3], vec!["split-window", "-t", "=work_1:", "-c", "/home/me"]);

        let splits = cmds.iter().filter(|c| c[0] == "split-window").count();
        let sends: Vec<_> = cmds
            .iter()
            .filter(|c| c[0] == "send-keys")
            .map(|c| c[3].as_str())
            .collect();
        assert_eq!(splits, 2);
        assert_eq!(sends, vec!["nvim", "htop", "tail -f log"]);
    }

    #[tokio::test]
    async fn missing_binary_means_no_session() {
        let tmux = Tmux::with_program("dayrun-no-such-tmux");
        assert!(!tmux.has_session("anything").await);
        assert_eq!(tmux.unique_name("work").await, "work");
        assert!(tmux.create(&layout(vec![PaneSpec::new("true")])).await.is_err());
    }
}
