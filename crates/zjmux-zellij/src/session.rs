//! `zellij list-sessions` parsing.

use serde::{Deserialize, Serialize};
use zjmux_core::{SessionTarget, strip_ansi};

use crate::error::ZellijError;
use crate::executor::ZellijCommandRunner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub current: bool,
    /// Listed for resurrection only; attaching would recreate it.
    pub exited: bool,
}

/// Parse `list-sessions --no-formatting` output, one session per line:
/// `work [Created 2h ago] (current)` or `old [Created 3days ago] (EXITED - attach to resurrect)`.
pub fn parse_list_sessions(output: &str) -> Vec<SessionInfo> {
    output
        .lines()
        .filter_map(|line| {
            let line = strip_ansi(line);
            let name = line.split_whitespace().next()?.to_string();
            Some(SessionInfo {
                name,
                current: line.contains("(current)"),
                exited: line.contains("EXITED"),
            })
        })
        .collect()
}

pub fn list_sessions<R: ZellijCommandRunner + ?Sized>(
    runner: &R,
) -> Result<Vec<SessionInfo>, ZellijError> {
    match runner.run(&SessionTarget::Current, &["list-sessions", "--no-formatting"]) {
        Ok(out) => Ok(parse_list_sessions(&out)),
        // zellij exits non-zero when there is nothing to list
        Err(ZellijError::CommandFailed(msg)) if msg.contains("No active zellij sessions") => {
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}
