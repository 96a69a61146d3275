//! zjmux-core: pure addressing logic for name-based zellij pane control.
//!
//! Layout dump parsing, the pane registry, the layout cache, the ordered
//! locator strategies and the bridge daemon wire records. Nothing here
//! touches a process, a socket or a clock of its own; callers pass `now`.

pub mod bridge;
pub mod cache;
pub mod layout;
pub mod locator;
pub mod marker;
pub mod registry;
pub mod types;

pub use bridge::{DaemonRequest, DaemonResponse, RequestError, apply_tail, strip_ansi, tail_lines};
pub use cache::{DEFAULT_LAYOUT_TTL, LayoutCache};
pub use layout::{PaneDescriptor, ParsedLayout, TabDescriptor, parse_layout};
pub use locator::{LocateError, Located, PaneResolver, Strategy, locate, resolve_control_pane};
pub use registry::{PaneHandle, PaneRegistration, PaneRegistry, RegisteredPane};
pub use types::{CURRENT_SESSION_KEY, ControlPane, SessionTarget};
