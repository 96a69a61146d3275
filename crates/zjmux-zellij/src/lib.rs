//! zjmux-zellij: zellij backend IO boundary.
//! Subprocess execution with timeouts, typed `zellij action` verbs, session
//! listing, the pane-bridge plugin pipe client, and headless attach clients
//! on a pseudo-terminal. No addressing logic lives here.

pub mod action;
pub mod attach;
pub mod control_plane;
pub mod error;
pub mod executor;
pub mod pty;
pub mod session;

pub use action::{Action, dump_layout, dump_screen, run_action};
pub use attach::{
    AttachSpawner, AttachedClient, PtyAttachSpawner, Readiness, SessionAttachment,
    SessionAttachmentManager,
};
pub use control_plane::{ControlPlane, PipeResponse, parse_pipe_output};
pub use error::ZellijError;
pub use executor::{DEFAULT_CLI_TIMEOUT, ZellijCommandRunner, ZellijExecutor};
pub use pty::AttachedProcess;
pub use session::{SessionInfo, list_sessions, parse_list_sessions};
