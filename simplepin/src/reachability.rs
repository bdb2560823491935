use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::net::TcpStream;
use url::Url;

#[derive(Debug, Error)]
pub enum ReachabilityError {
    #[error("url has no host: {0}")]
    MissingHost(Url),
    #[error("url has no known port: {0}")]
    MissingPort(Url),
}

/// Answers "is there a network path to the service" before any request is sent.
pub trait Reachability: Send + Sync {
    fn is_reachable(&self) -> BoxFuture<'_, bool>;
}

/// Treats the service as reachable when a TCP connection to its host opens in time.
#[derive(Debug, Clone)]
pub struct HostReachability {
    host: String,
    port: u16,
    timeout: Duration,
}

impl HostReachability {
    pub fn for_url(url: &Url, timeout: Duration) -> Result<Self, ReachabilityError> {
        let host = url
            .host_str()
            .ok_or_else(|| ReachabilityError::MissingHost(url.clone()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ReachabilityError::MissingPort(url.clone()))?;
        Ok(Self {
            host: host.to_string(),
            port,
            timeout,
        })
    }
}

impl Reachability for HostReachability {
    fn is_reachable(&self) -> BoxFuture<'_, bool> {
        async move {
            let connect = TcpStream::connect((self.host.as_str(), self.port));
            let reachable = matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)));
            if !reachable {
                tracing::debug!(host = %self.host, port = self.port, "service unreachable");
            }
            reachable
        }
        .boxed()
    }
}
