use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::cli::Cli;

const DEFAULT_PING_COUNT: u32 = 4;
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_PING_SPACING: Duration = Duration::from_millis(100);
const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_UDP_WAIT: Duration = Duration::from_secs(1);
const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HTTP_REDIRECTS: usize = 5;
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Payload sent by UDP probes
pub const UDP_PAYLOAD: &[u8] = b"test";

/// Ping runner bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingConfig {
    /// Number of sequential echo requests
    pub count: u32,
    /// Wait for a single echo reply
    pub timeout: Duration,
    /// Pause between two echo requests
    pub spacing: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_PING_COUNT,
            timeout: DEFAULT_PING_TIMEOUT,
            spacing: DEFAULT_PING_SPACING,
        }
    }
}

impl PingConfig {
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// TCP connect runner bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    pub timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TCP_TIMEOUT,
        }
    }
}

/// UDP runner bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpConfig {
    /// Port used when the target names none
    pub default_port: u16,
    /// How long to wait for a reply after sending
    pub wait: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            default_port: 53,
            wait: DEFAULT_UDP_WAIT,
        }
    }
}

/// Which resolver answers first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryResolver {
    /// Whatever the host system is configured with
    System,
    /// Explicit name servers
    Servers(Vec<IpAddr>),
}

/// DNS runner configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsConfig {
    pub primary: PrimaryResolver,
    /// Public resolvers tried in order when the primary has no usable answer.
    /// Empty means no fallback.
    pub fallbacks: Vec<IpAddr>,
    pub timeout: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            primary: PrimaryResolver::System,
            fallbacks: vec![
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)),
            ],
            timeout: DEFAULT_DNS_TIMEOUT,
        }
    }
}

/// HTTP runner configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
            max_redirects: DEFAULT_HTTP_REDIRECTS,
            user_agent: format!("netcheck/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Bounds for every probe runner, handed to each runner at construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeConfig {
    pub ping: PingConfig,
    pub tcp: TcpConfig,
    pub udp: UdpConfig,
    pub dns: DnsConfig,
    pub http: HttpConfig,
}

impl ProbeConfig {
    /// Build runner configuration from command-line flags
    pub fn from_cli(cli: &Cli) -> Self {
        let config = ProbeConfig {
            ping: PingConfig {
                count: cli.ping_count,
                timeout: Duration::from_secs(cli.ping_timeout),
                spacing: Duration::from_millis(cli.ping_spacing_ms),
            },
            tcp: TcpConfig {
                timeout: Duration::from_secs(cli.tcp_timeout),
            },
            udp: UdpConfig {
                wait: Duration::from_millis(cli.udp_wait_ms),
                ..UdpConfig::default()
            },
            dns: DnsConfig {
                fallbacks: if cli.no_dns_fallback {
                    Vec::new()
                } else {
                    cli.dns_fallback.clone()
                },
                timeout: Duration::from_secs(cli.dns_timeout),
                ..DnsConfig::default()
            },
            http: HttpConfig {
                timeout: Duration::from_secs(cli.http_timeout),
                max_redirects: cli.http_max_redirects,
                ..HttpConfig::default()
            },
        };

        if config.dns.fallbacks.is_empty() {
            tracing::warn!("No fallback DNS resolvers configured");
        } else {
            tracing::info!(
                "Loaded {} fallback DNS resolvers",
                config.dns.fallbacks.len()
            );
        }

        config
    }
}
