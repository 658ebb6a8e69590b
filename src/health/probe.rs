//! Health probes.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Why a probe or request failed.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

/// One health check attempt against an address.
pub trait HealthProbe<A>: Send + Sync {
    fn probe(&self, address: &A) -> BoxFuture<'static, Result<(), HealthError>>;
}

/// Probe that only checks a TCP connection can be established.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl HealthProbe<SocketAddr> for TcpProbe {
    fn probe(&self, address: &SocketAddr) -> BoxFuture<'static, Result<(), HealthError>> {
        tcp_health_check(*address, self.timeout).boxed()
    }
}

/// Perform a TCP health check (just connect).
async fn tcp_health_check(server: SocketAddr, check_timeout: Duration) -> Result<(), HealthError> {
    match timeout(check_timeout, TcpStream::connect(server)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(HealthError::Connect(e)),
        Err(_) => Err(HealthError::Timeout(check_timeout)),
    }
}
