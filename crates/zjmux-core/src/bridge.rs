//! Wire records for the pane-bridge daemon socket.
//!
//! One JSON object per connection in each direction:
//! `{"cmd":"read","pane_id":7,"tail":5}` → `{"success":true,"content":"...","pane_id":7}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum DaemonRequest {
    Read {
        pane_id: u32,
        #[serde(default)]
        full: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tail: Option<usize>,
    },
    Write {
        pane_id: u32,
        chars: String,
    },
    Focus {
        pane_id: u32,
    },
    List,
    Status,
    Stop,
}

const COMMANDS: &[&str] = &["read", "write", "focus", "list", "status", "stop"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Missing cmd")]
    MissingCommand,
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Invalid {cmd} request: {detail}")]
    InvalidFields { cmd: String, detail: String },
}

impl DaemonRequest {
    /// Decode one request line, distinguishing unknown commands from bad fields.
    pub fn from_json(line: &str) -> Result<Self, RequestError> {
        let value: Value =
            serde_json::from_str(line.trim()).map_err(|e| RequestError::InvalidJson(e.to_string()))?;
        let cmd = value
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or(RequestError::MissingCommand)?
            .to_string();
        if !COMMANDS.contains(&cmd.as_str()) {
            return Err(RequestError::UnknownCommand(cmd));
        }
        serde_json::from_value(value).map_err(|e| RequestError::InvalidFields {
            cmd,
            detail: e.to_string(),
        })
    }

    pub fn command(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Focus { .. } => "focus",
            Self::List => "list",
            Self::Status => "status",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<u32>,
}

impl DaemonResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            content: None,
            data: None,
            error: None,
            pane_id: None,
        }
    }

    pub fn content(pane_id: u32, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            pane_id: Some(pane_id),
            ..Self::ok()
        }
    }

    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"response encoding failed"}"#.to_string()
        });
        line.push('\n');
        line
    }
}

/// Last `n` lines of a screen dump, ignoring trailing blank lines.
///
/// zellij pads dumps with empty rows below the cursor; those are not
/// "recent output" and would otherwise fill the tail.
pub fn tail_lines(content: &str, n: usize) -> String {
    let mut lines: Vec<&str> = content.lines().collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// A read's optional `tail` applied to cleaned content. `None` and `Some(0)`
/// both keep the whole dump.
pub fn apply_tail(content: String, tail: Option<usize>) -> String {
    match tail {
        Some(n) if n > 0 => tail_lines(&content, n),
        _ => content,
    }
}

/// Remove CSI (`ESC [ ... letter`) and OSC (`ESC ] ... BEL`) sequences.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    // BEL or ST (`ESC \`) terminates
                    if c == '\x07' || (prev == '\x1b' && c == '\\') {
                        break;
                    }
                    prev = c;
                }
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_ansi_removes_csi_and_osc() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m done"), "ok done");
        assert_eq!(strip_ansi("\x1b]0;title\x07prompt$ "), "prompt$ ");
        assert_eq!(strip_ansi("\x1b]2;t\x1b\\x"), "x");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn read_request_decodes_with_defaults() {
        let req = DaemonRequest::from_json(r#"{"cmd":"read","pane_id":7,"tail":5}"#).expect("valid");
        assert_eq!(
            req,
            DaemonRequest::Read {
                pane_id: 7,
                full: false,
                tail: Some(5)
            }
        );
        assert_eq!(req.command(), "read");
    }

    #[test]
    fn unit_commands_decode() {
        assert_eq!(DaemonRequest::from_json(r#"{"cmd":"status"}"#), Ok(DaemonRequest::Status));
        assert_eq!(DaemonRequest::from_json(r#"{"cmd":"stop"}"#), Ok(DaemonRequest::Stop));
        assert_eq!(DaemonRequest::from_json(r#"{"cmd":"list"}"#), Ok(DaemonRequest::List));
    }

    #[test]
    fn unknown_and_malformed_requests() {
        assert_eq!(
            DaemonRequest::from_json(r#"{"cmd":"explode"}"#),
            Err(RequestError::UnknownCommand("explode".into()))
        );
        assert_eq!(
            DaemonRequest::from_json(r#"{"pane_id":1}"#),
            Err(RequestError::MissingCommand)
        );
        assert!(matches!(
            DaemonRequest::from_json("not json"),
            Err(RequestError::InvalidJson(_))
        ));
        assert!(matches!(
            DaemonRequest::from_json(r#"{"cmd":"write","pane_id":1}"#),
            Err(RequestError::InvalidFields { .. })
        ));
    }

    #[test]
    fn request_encodes_with_cmd_tag() {
        let req = DaemonRequest::Write {
            pane_id: 3,
            chars: "ls\n".into(),
        };
        let v: Value = serde_json::to_value(&req).expect("encode");
        assert_eq!(v, json!({"cmd": "write", "pane_id": 3, "chars": "ls\n"}));
    }

    #[test]
    fn read_response_wire_shape() {
        let content = tail_lines("x\ny\na\nb\nc\nd\ne\n\n\n", 5);
        let resp = DaemonResponse::content(7, content);
        assert_eq!(
            resp.to_line(),
            "{\"success\":true,\"content\":\"a\\nb\\nc\\nd\\ne\",\"pane_id\":7}\n"
        );
    }

    #[test]
    fn error_response_wire_shape() {
        let resp = DaemonResponse::error("Unknown command: x");
        let v: Value = serde_json::from_str(&resp.to_line()).expect("json");
        assert_eq!(v, json!({"success": false, "error": "Unknown command: x"}));
    }

    #[test]
    fn tail_shorter_than_n() {
        assert_eq!(tail_lines("one\ntwo", 10), "one\ntwo");
        assert_eq!(tail_lines("", 3), "");
        assert_eq!(tail_lines("a\nb", 0), "");
    }

    #[test]
    fn zero_tail_keeps_everything() {
        let dump = "a\nb\nc\n\n".to_string();
        assert_eq!(apply_tail(dump.clone(), Some(0)), dump);
        assert_eq!(apply_tail(dump.clone(), None), dump);
        assert_eq!(apply_tail(dump, Some(2)), "b\nc");
    }
}
