// ABOUTME: Bounded-time HTTP GET probes used to warm and verify a release.
// ABOUTME: ReqwestProber speaks HTTP and HTTPS (rustls) with a per-request deadline.

use async_trait::async_trait;
use reqwest::{Client, Url, redirect};
use std::error::Error as _;
use std::time::Duration;

/// Issues a GET and reports the response status.
#[async_trait]
pub trait HttpProber: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid probe URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme {0} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

impl ProbeError {
    /// Whether the same request could succeed later. A malformed URL never will.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProbeError::Timeout { .. } | ProbeError::Transport { .. })
    }
}

/// HTTP(S) prober built on a shared reqwest client.
///
/// Proxies from the environment are ignored: probes must reach the edge or
/// origin that actually serves the site.
#[derive(Debug, Clone)]
pub struct ReqwestProber {
    client: Client,
}

impl ReqwestProber {
    pub fn new() -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(concat!("sitepub/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect::Policy::limited(5))
            .no_proxy()
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    fn parse(url: &str) -> Result<Url, ProbeError> {
        let parsed = Url::parse(url).map_err(|e| ProbeError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(ProbeError::UnsupportedScheme(other.to_string())),
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(ProbeError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(parsed)
    }
}

/// Flatten a reqwest error and its causes into one line.
fn describe(err: &reqwest::Error) -> String {
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}

#[async_trait]
impl HttpProber for ReqwestProber {
    async fn get(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        let parsed = Self::parse(url)?;
        let failed = |e: reqwest::Error| {
            if e.is_timeout() {
                ProbeError::Timeout {
                    url: url.to_string(),
                    timeout,
                }
            } else {
                ProbeError::Transport {
                    url: url.to_string(),
                    reason: describe(&e),
                }
            }
        };

        // The request timeout also covers reading the body.
        let response = self
            .client
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(failed)?;
        let status = response.status().as_u16();

        // Drain so the fetch actually reaches the edge cache.
        response.bytes().await.map_err(failed)?;

        Ok(status)
    }
}

/// Whether an HTTP status counts as healthy.
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn prober() -> ReqwestProber {
        ReqwestProber::new().unwrap()
    }

    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/health")
    }

    #[tokio::test]
    async fn reports_response_status() {
        let url = serve_once("HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n").await;
        let status = prober().get(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(status, 204);
    }

    #[tokio::test]
    async fn reports_error_statuses_without_failing() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndown",
        )
        .await;
        let status = prober().get(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(status, 503);
        assert!(!is_success(status));
    }

    #[tokio::test]
    async fn times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let result = prober()
            .get(&format!("http://{addr}/"), Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(ProbeError::Timeout { .. })));
    }

    #[tokio::test]
    async fn https_urls_open_a_tls_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (first_byte_tx, first_byte_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut byte = [0u8; 1];
            socket.read_exact(&mut byte).await.unwrap();
            let _ = first_byte_tx.send(byte[0]);
            // Hang up mid-handshake.
        });

        let result = prober()
            .get(&format!("https://127.0.0.1:{port}/"), Duration::from_secs(5))
            .await;

        // 0x16 opens a TLS handshake record (ClientHello).
        assert_eq!(first_byte_rx.await.unwrap(), 0x16);
        let err = result.unwrap_err();
        assert!(matches!(err, ProbeError::Transport { .. }), "{err}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn malformed_urls_are_permanent_errors() {
        for url in ["ftp://example.test/", "not a url", "http://"] {
            let err = prober().get(url, Duration::from_secs(1)).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    ProbeError::UnsupportedScheme(_) | ProbeError::InvalidUrl { .. }
                ),
                "{url}: {err}"
            );
            assert!(!err.is_transient(), "{url}");
        }
    }
}
