//! Typed `zellij action <verb>` catalogue.

use std::path::PathBuf;

use zjmux_core::SessionTarget;

use crate::error::ZellijError;
use crate::executor::ZellijCommandRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    DumpLayout,
    DumpScreen {
        path: PathBuf,
        full: bool,
    },
    FocusNextPane,
    FocusPreviousPane,
    GoToTabName(String),
    /// 1-based, as zellij numbers tabs.
    GoToTab(usize),
    WriteChars(String),
    NewPane {
        name: Option<String>,
        cwd: Option<String>,
        floating: bool,
        command: Vec<String>,
    },
    ClosePane,
    RenamePane(String),
    NewTab {
        name: Option<String>,
        cwd: Option<String>,
    },
    CloseTab,
    ToggleFloatingPanes,
}

impl Action {
    /// Full argument vector, starting with `action`.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["action".to_string()];
        let mut push = |s: &str| args.push(s.to_string());
        match self {
            Self::DumpLayout => push("dump-layout"),
            Self::DumpScreen { path, full } => {
                push("dump-screen");
                push(&path.to_string_lossy());
                if *full {
                    push("--full");
                }
            }
            Self::FocusNextPane => push("focus-next-pane"),
            Self::FocusPreviousPane => push("focus-previous-pane"),
            Self::GoToTabName(name) => {
                push("go-to-tab-name");
                push(name);
            }
            Self::GoToTab(index) => {
                push("go-to-tab");
                push(&index.to_string());
            }
            Self::WriteChars(chars) => {
                push("write-chars");
                if chars.starts_with('-') {
                    push("--");
                }
                push(chars);
            }
            Self::NewPane {
                name,
                cwd,
                floating,
                command,
            } => {
                push("new-pane");
                if *floating {
                    push("--floating");
                }
                if let Some(name) = name {
                    push("--name");
                    push(name);
                }
                if let Some(cwd) = cwd {
                    push("--cwd");
                    push(cwd);
                }
                if !command.is_empty() {
                    push("--");
                    for part in command {
                        push(part);
                    }
                }
            }
            Self::ClosePane => push("close-pane"),
            Self::RenamePane(name) => {
                push("rename-pane");
                push(name);
            }
            Self::NewTab { name, cwd } => {
                push("new-tab");
                if let Some(name) = name {
                    push("--name");
                    push(name);
                }
                if let Some(cwd) = cwd {
                    push("--cwd");
                    push(cwd);
                }
            }
            Self::CloseTab => push("close-tab"),
            Self::ToggleFloatingPanes => push("toggle-floating-panes"),
        }
        args
    }

    /// Whether a cached layout dump is stale after this action runs.
    pub fn is_layout_mutating(&self) -> bool {
        !matches!(
            self,
            Self::DumpLayout | Self::DumpScreen { .. } | Self::WriteChars(_)
        )
    }
}

pub fn run_action<R: ZellijCommandRunner + ?Sized>(
    runner: &R,
    target: &SessionTarget,
    action: &Action,
) -> Result<String, ZellijError> {
    let args = action.args();
    let refs: Vec<&str> = args.iter().map(String::as_str).collect();
    runner.run(target, &refs)
}

pub fn dump_layout<R: ZellijCommandRunner + ?Sized>(
    runner: &R,
    target: &SessionTarget,
) -> Result<String, ZellijError> {
    run_action(runner, target, &Action::DumpLayout)
}

/// Dump the focused pane's screen through a temp file.
///
/// Only meaningful when the caller is an attached client of `target`; from
/// outside, zellij dumps whatever pane its own client has focused.
pub fn dump_screen<R: ZellijCommandRunner + ?Sized>(
    runner: &R,
    target: &SessionTarget,
    full: bool,
) -> Result<String, ZellijError> {
    let path = tempfile::Builder::new()
        .prefix("zjmux-screen-")
        .suffix(".txt")
        .tempfile()?
        .into_temp_path();
    run_action(
        runner,
        target,
        &Action::DumpScreen {
            path: path.to_path_buf(),
            full,
        },
    )?;
    let bytes = std::fs::read(&path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
