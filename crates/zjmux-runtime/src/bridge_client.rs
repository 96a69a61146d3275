//! Client side of the bridge daemon socket: one request line, one reply line.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use zjmux_core::{DaemonRequest, DaemonResponse};

#[derive(Debug, Error)]
pub enum BridgeError {
    /// No daemon to talk to; callers fall back to the arbiter path.
    #[error("bridge daemon unavailable: {0}")]
    Unavailable(String),

    #[error("bridge daemon timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("malformed bridge daemon reply: {raw}")]
    Malformed { raw: String },

    /// The daemon answered `success: false`.
    #[error("bridge daemon: {0}")]
    Daemon(String),

    #[error("bridge daemon io error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn request(
    socket_path: &Path,
    req: &DaemonRequest,
    timeout: Duration,
) -> Result<DaemonResponse, BridgeError> {
    tokio::time::timeout(timeout, exchange(socket_path, req))
        .await
        .map_err(|_| BridgeError::Timeout(timeout))?
}

async fn exchange(socket_path: &Path, req: &DaemonRequest) -> Result<DaemonResponse, BridgeError> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => {
            BridgeError::Unavailable(format!("{}: {e}", socket_path.display()))
        }
        _ => BridgeError::Io(e),
    })?;
    let (reader, mut writer) = stream.into_split();

    let mut line = serde_json::to_string(req).map_err(|e| BridgeError::Malformed { raw: e.to_string() })?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.shutdown().await?;

    let mut buf_reader = BufReader::new(reader);
    let mut response = String::new();
    buf_reader.read_line(&mut response).await?;
    if response.trim().is_empty() {
        return Err(BridgeError::Malformed { raw: response });
    }
    serde_json::from_str(response.trim()).map_err(|_| BridgeError::Malformed { raw: response })
}

/// Liveness check: a `status` round trip that reports success.
pub async fn ping(socket_path: &Path, timeout: Duration) -> bool {
    matches!(
        request(socket_path, &DaemonRequest::Status, timeout).await,
        Ok(resp) if resp.success
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    async fn one_shot_server(path: &Path, reply: &'static str) -> tokio::task::JoinHandle<String> {
        let listener = UnixListener::bind(path).expect("bind");
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.expect("read");
            writer.write_all(reply.as_bytes()).await.expect("write");
            line
        })
    }

    #[tokio::test]
    async fn missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = request(&dir.path().join("none.sock"), &DaemonRequest::Status, Duration::from_secs(1))
            .await
            .expect_err("no daemon");
        assert!(matches!(err, BridgeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn request_line_and_reply() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("d.sock");
        let server = one_shot_server(&path, "{\"success\":true,\"content\":\"hi\",\"pane_id\":7}\n").await;

        let resp = request(
            &path,
            &DaemonRequest::Read {
                pane_id: 7,
                full: false,
                tail: Some(5),
            },
            Duration::from_secs(2),
        )
        .await
        .expect("reply");
        assert!(resp.success);
        assert_eq!(resp.content.as_deref(), Some("hi"));

        let sent: serde_json::Value = serde_json::from_str(&server.await.expect("join")).expect("json");
        assert_eq!(sent["cmd"], "read");
        assert_eq!(sent["pane_id"], 7);
    }

    #[tokio::test]
    async fn garbage_reply_is_malformed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("d.sock");
        let _server = one_shot_server(&path, "<html>\n").await;
        let err = request(&path, &DaemonRequest::Status, Duration::from_secs(2))
            .await
            .expect_err("garbage");
        match err {
            BridgeError::Malformed { raw } => assert!(raw.contains("html")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_daemon_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("d.sock");
        let listener = UnixListener::bind(&path).expect("bind");
        let _hold = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let err = request(&path, &DaemonRequest::Status, Duration::from_millis(100))
            .await
            .expect_err("timeout");
        assert!(matches!(err, BridgeError::Timeout(_)));
    }
}
