//! Pipe client for the zellij-pane-bridge plugin.
//!
//! Each call is one `zellij pipe -p file://<plugin> -n <cmd> -- <json>`
//! invocation. The plugin answers `{success, error?, data?}` on stdout,
//! sometimes more than once per request; only the first object counts.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use zjmux_core::{ControlPane, SessionTarget};

use crate::error::ZellijError;
use crate::executor::ZellijCommandRunner;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipeResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Decode the first JSON object in a pipe's stdout.
pub fn parse_pipe_output(stdout: &str) -> Result<PipeResponse, ZellijError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(ZellijError::MalformedResponse {
            detail: "empty plugin output".into(),
            raw: String::new(),
        });
    }
    let first = serde_json::Deserializer::from_str(trimmed)
        .into_iter::<Value>()
        .next()
        .unwrap_or_else(|| Ok(Value::Null))
        .map_err(|e| ZellijError::MalformedResponse {
            detail: e.to_string(),
            raw: trimmed.to_string(),
        })?;
    serde_json::from_value(first).map_err(|e| ZellijError::MalformedResponse {
        detail: e.to_string(),
        raw: trimmed.to_string(),
    })
}

pub struct ControlPlane<R> {
    runner: R,
    plugin_path: PathBuf,
}

impl<R: ZellijCommandRunner> ControlPlane<R> {
    pub fn new(runner: R, plugin_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            plugin_path: plugin_path.into(),
        }
    }

    pub fn plugin_path(&self) -> &Path {
        &self.plugin_path
    }

    /// The plugin file exists. Says nothing about whether zellij can load it.
    pub fn is_available(&self) -> bool {
        self.plugin_path.is_file()
    }

    /// Run one plugin command and return its `data` (`Null` when absent).
    pub fn command(
        &self,
        target: &SessionTarget,
        cmd: &str,
        payload: Value,
    ) -> Result<Value, ZellijError> {
        if !self.is_available() {
            return Err(ZellijError::ControlPlaneUnavailable(format!(
                "plugin not found at {}",
                self.plugin_path.display()
            )));
        }
        let plugin = format!("file://{}", self.plugin_path.display());
        let body = if payload.is_null() {
            "{}".to_string()
        } else {
            payload.to_string()
        };
        debug!(%target, cmd, "control plane request");
        let stdout = self
            .runner
            .run(target, &["pipe", "-p", &plugin, "-n", cmd, "--", &body])?;
        let response = parse_pipe_output(&stdout)?;
        if !response.success {
            return Err(ZellijError::CommandFailed(format!(
                "plugin {cmd}: {}",
                response.error.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(response.data.unwrap_or(Value::Null))
    }

    pub fn list_panes(&self, target: &SessionTarget) -> Result<Vec<ControlPane>, ZellijError> {
        let data = self.command(target, "list", Value::Null)?;
        decode_panes(data)
    }

    pub fn query(&self, target: &SessionTarget, name: &str) -> Result<Vec<ControlPane>, ZellijError> {
        let data = self.command(target, "query", json!({ "name": name }))?;
        decode_panes(data)
    }

    pub fn focus(&self, target: &SessionTarget, pane_id: u32) -> Result<(), ZellijError> {
        self.command(target, "focus", json!({ "pane_id": pane_id }))
            .map(drop)
    }

    pub fn write(&self, target: &SessionTarget, pane_id: u32, chars: &str) -> Result<(), ZellijError> {
        self.command(target, "write", json!({ "pane_id": pane_id, "chars": chars }))
            .map(drop)
    }

    pub fn hide(&self, target: &SessionTarget, pane_id: u32) -> Result<(), ZellijError> {
        self.command(target, "hide", json!({ "pane_id": pane_id, "force": true }))
            .map(drop)
    }

    pub fn close(&self, target: &SessionTarget, pane_id: u32, force: bool) -> Result<(), ZellijError> {
        self.command(target, "close", json!({ "pane_id": pane_id, "force": force }))
            .map(drop)
    }

    pub fn rename_pane(
        &self,
        target: &SessionTarget,
        pane_id: u32,
        name: &str,
    ) -> Result<(), ZellijError> {
        self.command(target, "rename_pane", json!({ "pane_id": pane_id, "name": name }))
            .map(drop)
    }
}

fn decode_panes(data: Value) -> Result<Vec<ControlPane>, ZellijError> {
    if data.is_null() {
        return Ok(Vec::new());
    }
    let raw = data.to_string();
    serde_json::from_value(data).map_err(|e| ZellijError::MalformedResponse {
        detail: e.to_string(),
        raw,
    })
}
