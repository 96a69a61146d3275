//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Overrides;

#[derive(Parser)]
#[command(name = "zjmux", about = "name-addressed pane control for zellij")]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/zjmux/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// zellij binary
    #[arg(long, global = true, env = "ZJMUX_ZELLIJ_BIN")]
    pub zellij_bin: Option<String>,

    /// pane-bridge plugin (.wasm)
    #[arg(long, global = true, env = "ZJMUX_PLUGIN_PATH")]
    pub plugin_path: Option<PathBuf>,

    /// Bridge daemon request timeout in milliseconds
    #[arg(long, global = true, env = "ZJMUX_DAEMON_TIMEOUT_MS")]
    pub daemon_timeout_ms: Option<u64>,

    /// Directory for bridge daemon sockets
    #[arg(long, global = true, env = "ZJMUX_SOCKET_DIR")]
    pub socket_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            zellij_bin: self.zellij_bin.clone(),
            plugin_path: self.plugin_path.clone(),
            daemon_timeout_ms: self.daemon_timeout_ms,
            socket_dir: self.socket_dir.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve JSON-line requests on stdin/stdout
    Serve,
    /// Run the pane-bridge daemon inside the current session
    Bridge(BridgeOpts),
    /// Print a pane's screen
    Read(ReadOpts),
    /// Send characters to a pane
    Write(WriteOpts),
    /// Resolve a logical name to a live pane
    Locate(PaneOpts),
    /// Show the parsed layout
    Panes(SessionOpts),
    /// List zellij sessions
    Sessions,
}

#[derive(Args)]
pub struct BridgeOpts {
    /// Socket path (default: <socket_dir>/bridge-<session>.sock)
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

#[derive(Args)]
pub struct SessionOpts {
    /// Target session (default: the current one)
    #[arg(long, short = 's')]
    pub session: Option<String>,
}

#[derive(Args)]
pub struct PaneOpts {
    /// Logical pane name
    pub name: String,

    #[command(flatten)]
    pub session: SessionOpts,
}

#[derive(Args)]
pub struct ReadOpts {
    #[command(flatten)]
    pub pane: PaneOpts,

    /// Include scrollback
    #[arg(long)]
    pub full: bool,

    /// Keep only the last N lines
    #[arg(long)]
    pub tail: Option<usize>,
}

#[derive(Args)]
pub struct WriteOpts {
    #[command(flatten)]
    pub pane: PaneOpts,

    /// Characters to send
    pub chars: String,

    /// Append a newline (run the text as a command)
    #[arg(long, short = 'n')]
    pub newline: bool,
}
