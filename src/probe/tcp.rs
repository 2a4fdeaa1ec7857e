use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpStream;

use super::{Connected, Probe, RawFailure, RawOutcome};
use crate::config::TcpConfig;
use crate::models::{CheckKind, VantagePoint};
use crate::utils::{parse_host_port, resolve_ipv4, HostTarget};

/// Port used when the target names none: 443 for https, 80 otherwise
fn connect_port(target: &HostTarget) -> u16 {
    target
        .port
        .unwrap_or(if target.is_https() { 443 } else { 80 })
}

/// TCP handshake probe
pub struct TcpProbe {
    config: TcpConfig,
}

impl TcpProbe {
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Tcp
    }

    async fn execute(&self, target: &str, vantage: &VantagePoint) -> RawOutcome {
        let target = parse_host_port(target);
        let port = connect_port(&target);

        let address = match resolve_ipv4(&target.host).await {
            Ok(address) => address,
            Err(e) => {
                return RawOutcome::Tcp(Err(RawFailure::Unresolved {
                    host: target.host,
                    reason: e.to_string(),
                }))
            }
        };

        let start = Instant::now();
        let connect = TcpStream::connect(SocketAddr::new(address, port));

        let result = match tokio::time::timeout(self.config.timeout, connect).await {
            Ok(Ok(stream)) => {
                let elapsed = start.elapsed();
                drop(stream);
                Ok(Connected { elapsed, address })
            }
            Ok(Err(e)) => Err(RawFailure::Io(e)),
            Err(_) => Err(RawFailure::Elapsed(self.config.timeout)),
        };

        tracing::debug!(
            "[{}] tcp {}:{} -> {}",
            vantage.id,
            address,
            port,
            if result.is_ok() { "connected" } else { "failed" }
        );

        RawOutcome::Tcp(result)
    }
}
