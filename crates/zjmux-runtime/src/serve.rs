//! `zjmux serve`: JSON-line requests on stdin, replies on stdout.
//!
//! Each line is `{"id": .., "op": "..", ...}`. Requests run concurrently;
//! replies carry the request's `id` and may arrive out of order. Operations
//! on one session still serialize through its focus lock.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::ops::{OpRequest, dispatch};
use crate::services::Services;

pub async fn run(services: Arc<Services>) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    serve_lines(services, stdin, tokio::io::stdout()).await
}

pub async fn serve_lines<R, W>(services: Arc<Services>, input: R, mut output: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = input.lines();
    let mut tasks = JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let services = Arc::clone(&services);
        let tx = tx.clone();
        tasks.spawn(async move {
            let mut reply = handle_line(&services, &line).await.to_string();
            reply.push('\n');
            if tx.send(reply).await.is_err() {
                warn!("reply dropped: output closed");
            }
        });
        // reap finished requests so the set does not grow without bound
        while tasks.try_join_next().is_some() {}
    }
    debug!("input closed, draining {} request(s)", tasks.len());

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "request task failed");
        }
    }
    drop(tx);
    let written = writer.await;
    services.cleanup_attachments().await;
    written??;
    Ok(())
}

/// One request line to one reply object. Never fails: bad input is a reply.
pub async fn handle_line(services: &Arc<Services>, line: &str) -> Value {
    let raw: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return serde_json::json!({
                "id": Value::Null,
                "success": false,
                "error": format!("invalid JSON: {e}"),
            });
        }
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    let mut reply = match serde_json::from_value::<OpRequest>(raw) {
        Ok(req) => dispatch(services, req).await,
        Err(e) => serde_json::json!({
            "success": false,
            "error": format!("invalid request: {e}"),
        }),
    };
    if let Value::Object(fields) = &mut reply {
        fields.insert("id".to_string(), id);
    }
    reply
}
