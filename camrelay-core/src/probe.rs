//! TCP reachability probe for RTSP sources
//!
//! Answers "does this host:port accept TCP connections" only; a successful
//! probe does not guarantee a valid RTSP session can be established.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::info;
use url::Url;

use crate::error::{Error, Result};

/// Default port when the RTSP URL does not name one.
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Fixed window for a probe to reach a verdict.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempt a single TCP connection to `host:port`.
///
/// Resolves on successful connect (the probe connection is closed
/// immediately), fails with [`Error::ProbeConnect`] on an explicit
/// connection error and [`Error::ProbeTimeout`] when `timeout` elapses
/// without an outcome.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            info!(host, port, "successfully connected");
            drop(stream);
            Ok(())
        }
        Ok(Err(e)) => Err(Error::ProbeConnect { source: e }),
        Err(_) => Err(Error::ProbeTimeout {
            host: host.to_string(),
            port,
        }),
    }
}

/// Probe the host and port named by an RTSP URL.
pub async fn probe_url(url: &Url, timeout: Duration) -> Result<()> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidUrl("missing host".to_string()))?;
    let port = url.port().unwrap_or(DEFAULT_RTSP_PORT);

    info!(host, port, "testing TCP connection");
    probe(host, port, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_accepting_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        probe("127.0.0.1", addr.port(), Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_probe_closed_port_is_connection_error() {
        // Bind then drop to get a port nothing is listening on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = probe("127.0.0.1", addr.port(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProbeConnect { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_probe_timeout_classification() {
        // A zero window elapses before any connect attempt can complete.
        let err = probe("192.0.2.1", DEFAULT_RTSP_PORT, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProbeTimeout { .. }), "got {err:?}");
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_probe_url_defaults_rtsp_port() {
        let url = Url::parse("rtsp://192.0.2.1/stream").unwrap();
        let err = probe_url(&url, Duration::ZERO).await.unwrap_err();

        match err {
            Error::ProbeTimeout { port, .. } => assert_eq!(port, DEFAULT_RTSP_PORT),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
