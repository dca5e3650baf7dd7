//! Backend reachability probe.
//!
//! Independent of the broker: the backend may be up while the broker is
//! down, and the UI shows both. The probe only checks that the backend's
//! host accepts a TCP connection; it does not speak HTTP.

use crate::{AgentError, Result};
use cardlink_core::constants::BACKEND_PROBE_TIMEOUT_MS;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;
use url::Url;

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub reachable: bool,
    pub message: String,
}

impl BackendStatus {
    pub fn reachable(message: impl Into<String>) -> Self {
        Self {
            reachable: true,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            reachable: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.reachable { "reachable" } else { "unreachable" };
        write!(f, "{state}: {}", self.message)
    }
}

/// Answers "is the backend reachable right now".
pub trait ReachabilityProbe: Send + Sync {
    fn probe(&self) -> impl Future<Output = BackendStatus> + Send;
}

/// Probe that opens a TCP connection to the backend's host and port.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe for the backend at `backend_url`.
    ///
    /// A bare `host:port` is read as `http://host:port`. Without an
    /// explicit port the scheme's default is used.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::InvalidBackendUrl` if the URL has no host or
    /// no known port.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardlink_agent::probe::TcpProbe;
    ///
    /// let probe = TcpProbe::from_url("https://backend.example.com/api")?;
    /// assert_eq!(probe.address(), "backend.example.com:443");
    ///
    /// let probe = TcpProbe::from_url("10.0.0.5:8000")?;
    /// assert_eq!(probe.address(), "10.0.0.5:8000");
    /// # Ok::<(), cardlink_agent::AgentError>(())
    /// ```
    pub fn from_url(backend_url: &str) -> Result<Self> {
        let input = backend_url.trim();
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("http://{input}")
        };

        let invalid = |reason: &str| AgentError::InvalidBackendUrl {
            url: backend_url.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        Ok(Self {
            host: host.trim_matches(['[', ']']).to_string(),
            port,
            timeout: Duration::from_millis(BACKEND_PROBE_TIMEOUT_MS),
        })
    }

    /// Override the connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `host:port` being probed.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl ReachabilityProbe for TcpProbe {
    async fn probe(&self) -> BackendStatus {
        let address = self.address();
        trace!(%address, "Probing backend");

        match timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port))).await {
            Ok(Ok(_stream)) => BackendStatus::reachable(format!("Backend reachable at {address}")),
            Ok(Err(e)) => BackendStatus::unreachable(format!("Backend unreachable: {e}")),
            Err(_) => BackendStatus::unreachable(format!(
                "Backend unreachable: no answer from {address} within {}ms",
                self.timeout.as_millis()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::net::TcpListener;

    #[rstest]
    #[case("http://localhost:8000", "localhost:8000")]
    #[case("http://localhost", "localhost:80")]
    #[case("https://api.example.com/v1/", "api.example.com:443")]
    #[case("  192.168.1.10:9000 ", "192.168.1.10:9000")]
    #[case("http://[::1]:8000", "[::1]:8000")]
    fn test_probe_address(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(TcpProbe::from_url(url).unwrap().address(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("http://")]
    #[case("ftp2://host")]
    fn test_invalid_backend_url(#[case] url: &str) {
        assert!(matches!(
            TcpProbe::from_url(url),
            Err(AgentError::InvalidBackendUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_probe_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::from_url(&format!("http://127.0.0.1:{port}")).unwrap();
        let status = probe.probe().await;
        assert!(status.reachable, "{status}");
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::from_url(&format!("http://127.0.0.1:{port}"))
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        let status = probe.probe().await;
        assert!(!status.reachable);
        assert!(status.message.starts_with("Backend unreachable"));
    }
}
