use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Instant;
use tokio::net::UdpSocket;

use super::{DatagramExchange, Probe, RawFailure, RawOutcome};
use crate::config::{UdpConfig, UDP_PAYLOAD};
use crate::models::{CheckKind, VantagePoint};
use crate::utils::{parse_host_port, resolve_ipv4};

/// UDP reachability probe.
///
/// UDP has no handshake, so a reply and a silent wait window are both
/// reported as a successful exchange; only an ICMP unreachable surfacing as a
/// socket error counts as a failure.
pub struct UdpProbe {
    config: UdpConfig,
}

impl UdpProbe {
    pub fn new(config: UdpConfig) -> Self {
        Self { config }
    }

    async fn exchange(&self, address: IpAddr, port: u16) -> Result<DatagramExchange, RawFailure> {
        let local: SocketAddr = match address {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(local).await.map_err(RawFailure::Io)?;
        // A connected socket is what lets ICMP unreachable come back as an error
        socket
            .connect(SocketAddr::new(address, port))
            .await
            .map_err(RawFailure::Io)?;

        let start = Instant::now();
        socket.send(UDP_PAYLOAD).await.map_err(RawFailure::Io)?;

        let mut buf = [0u8; 1500];
        match tokio::time::timeout(self.config.wait, socket.recv(&mut buf)).await {
            Ok(Ok(_)) => Ok(DatagramExchange {
                elapsed: start.elapsed(),
                address,
                replied: true,
            }),
            Ok(Err(e)) => Err(RawFailure::Io(e)),
            Err(_) => Ok(DatagramExchange {
                elapsed: start.elapsed(),
                address,
                replied: false,
            }),
        }
    }
}

#[async_trait]
impl Probe for UdpProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Udp
    }

    async fn execute(&self, target: &str, vantage: &VantagePoint) -> RawOutcome {
        let target = parse_host_port(target);
        let port = target.port.unwrap_or(self.config.default_port);

        let address = match resolve_ipv4(&target.host).await {
            Ok(address) => address,
            Err(e) => {
                return RawOutcome::Udp(Err(RawFailure::Unresolved {
                    host: target.host,
                    reason: e.to_string(),
                }))
            }
        };

        let result = self.exchange(address, port).await;
        if let Err(e) = &result {
            tracing::debug!("[{}] udp {}:{} failed: {:?}", vantage.id, address, port, e);
        }

        RawOutcome::Udp(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeInfo;
    use std::time::Duration;

    fn vantage() -> VantagePoint {
        VantagePoint::new("t1", "node.test", NodeInfo::default())
    }

    fn quick_config() -> UdpConfig {
        UdpConfig {
            wait: Duration::from_millis(200),
            ..UdpConfig::default()
        }
    }

    #[tokio::test]
    async fn silent_port_is_open_or_filtered() {
        // Bound but never answers: no reply and no ICMP unreachable
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let probe = UdpProbe::new(quick_config());
        match probe.execute(&format!("127.0.0.1:{}", port), &vantage()).await {
            RawOutcome::Udp(Ok(exchange)) => {
                assert!(!exchange.replied);
                assert!(exchange.elapsed >= Duration::from_millis(200));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reply_is_recorded() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = responder.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            if let Ok((n, peer)) = responder.recv_from(&mut buf).await {
                let _ = responder.send_to(&buf[..n], peer).await;
            }
        });

        let probe = UdpProbe::new(quick_config());
        match probe.execute(&format!("127.0.0.1:{}", port), &vantage()).await {
            RawOutcome::Udp(Ok(exchange)) => assert!(exchange.replied),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn closed_port_surfaces_icmp_unreachable() {
        let port = {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            socket.local_addr().unwrap().port()
        };

        let probe = UdpProbe::new(quick_config());
        match probe.execute(&format!("127.0.0.1:{}", port), &vantage()).await {
            RawOutcome::Udp(Err(RawFailure::Io(e))) => {
                assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unresolvable_host_is_reported() {
        let probe = UdpProbe::new(quick_config());
        let outcome = probe.execute("no-such-host.invalid", &vantage()).await;
        assert!(matches!(
            outcome,
            RawOutcome::Udp(Err(RawFailure::Unresolved { .. }))
        ));
    }
}
