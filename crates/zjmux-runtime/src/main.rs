//! zjmux: name-addressed pane control for zellij.
//!
//! `serve` answers JSON-line requests for agents; `bridge` is the per-session
//! daemon that reads panes by id; the rest are one-shot conveniences that
//! print the same JSON replies.

use std::sync::Arc;

use clap::Parser;

mod arbiter;
mod bridge_client;
mod bridge_launch;
mod bridge_server;
mod cli;
mod config;
mod layout_source;
mod locate;
mod ops;
mod serve;
mod services;
#[cfg(test)]
mod test_support;

use crate::cli::Command;
use crate::config::RuntimeConfig;
use crate::ops::OpRequest;
use crate::services::Services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // stdout carries replies; logs go to stderr
    let filter = std::env::var("ZJMUX_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = RuntimeConfig::load(args.config.as_deref())?.with_overrides(&args.overrides());
    let services = Arc::new(Services::from_env(config));

    let request = match args.command {
        Command::Serve => {
            tracing::info!("zjmux serving on stdio");
            return serve::run(services).await;
        }
        Command::Bridge(opts) => return bridge_server::run_bridge(services, opts.socket).await,
        Command::Read(opts) => OpRequest::ReadPane {
            name: opts.pane.name,
            full: opts.full,
            tail: opts.tail,
            session: opts.pane.session.session,
        },
        Command::Write(opts) if opts.newline => OpRequest::RunInPane {
            name: opts.pane.name,
            command: opts.chars,
            session: opts.pane.session.session,
        },
        Command::Write(opts) => OpRequest::WriteToPane {
            name: opts.pane.name,
            chars: opts.chars,
            session: opts.pane.session.session,
        },
        Command::Locate(opts) => OpRequest::LocatePane {
            name: opts.name,
            session: opts.session.session,
        },
        Command::Panes(opts) => OpRequest::ListPanes {
            session: opts.session,
        },
        Command::Sessions => OpRequest::ListSessions {},
    };

    let reply = ops::dispatch(&services, request).await;
    services.cleanup_attachments().await;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    if reply["success"] != true {
        std::process::exit(1);
    }
    Ok(())
}
