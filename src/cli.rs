use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{DEFAULT_RESULT_TTL, DEFAULT_SWEEP_INTERVAL};

/// Command-line interface for the netcheck service
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "netcheck",
    about = "Runs ping, TCP, UDP, DNS and HTTP checks from a set of vantage points and keeps the results for later retrieval",
    version
)]
pub struct Cli {
    /// Port to run the web server on
    #[clap(short, long, env("PORT"), default_value = "8000")]
    pub port: u16,

    /// Redis URL for storing check results (in-memory storage when unset)
    #[clap(long, env("REDIS_URL"))]
    pub redis_url: Option<String>,

    /// JSON file describing the vantage points
    #[clap(long, env("NODES_FILE"))]
    pub nodes_file: Option<PathBuf>,

    /// Domain appended to vantage point ids to form their hostnames
    #[clap(long, env("NODE_DOMAIN"), default_value = "node.check-host.net")]
    pub node_domain: String,

    /// Base URL used for permanent report links
    #[clap(long, env("BASE_URL"), default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Number of echo requests per ping check
    #[clap(long, default_value = "4")]
    pub ping_count: u32,

    /// Timeout for a single echo request in seconds
    #[clap(long, default_value = "3")]
    pub ping_timeout: u64,

    /// Pause between echo requests in milliseconds
    #[clap(long, default_value = "100")]
    pub ping_spacing_ms: u64,

    /// TCP connect timeout in seconds
    #[clap(long, default_value = "5")]
    pub tcp_timeout: u64,

    /// How long a UDP probe waits for a reply, in milliseconds
    #[clap(long, default_value = "1000")]
    pub udp_wait_ms: u64,

    /// Timeout for each DNS query in seconds
    #[clap(long, default_value = "5")]
    pub dns_timeout: u64,

    /// Fallback resolvers tried in order when the system resolver gives no answer
    #[clap(
        long,
        env("DNS_FALLBACK_SERVERS"),
        value_delimiter = ',',
        default_value = "8.8.8.8,1.1.1.1,9.9.9.9"
    )]
    pub dns_fallback: Vec<IpAddr>,

    /// Only ever ask the system resolver
    #[clap(long, env("NO_DNS_FALLBACK"))]
    pub no_dns_fallback: bool,

    /// Timeout for HTTP checks in seconds
    #[clap(long, default_value = "10")]
    pub http_timeout: u64,

    /// Maximum number of redirects followed by HTTP checks
    #[clap(long, default_value = "5")]
    pub http_max_redirects: usize,

    /// How long results are kept, in seconds
    #[clap(long, env("RESULT_TTL"), default_value_t = DEFAULT_RESULT_TTL.as_secs())]
    pub result_ttl: u64,

    /// Interval between expired-result sweeps, in seconds
    #[clap(long, env("SWEEP_INTERVAL"), default_value_t = DEFAULT_SWEEP_INTERVAL.as_secs())]
    pub sweep_interval: u64,

    /// Id of this process as a vantage point; enables `/info` and task execution
    #[clap(long, env("AGENT_ID"))]
    pub agent_id: Option<String>,

    #[clap(long, env("AGENT_NAME"), default_value = "netcheck agent")]
    pub agent_name: String,

    #[clap(long, env("AGENT_LOCATION"))]
    pub agent_location: Option<String>,

    #[clap(long, env("AGENT_COUNTRY_CODE"), default_value = "")]
    pub agent_country_code: String,

    #[clap(long, env("AGENT_COUNTRY"), default_value = "")]
    pub agent_country: String,

    #[clap(long, env("AGENT_CITY"), default_value = "")]
    pub agent_city: String,

    #[clap(long, env("AGENT_IP"), default_value = "")]
    pub agent_ip: String,

    #[clap(long, env("AGENT_ASN"), default_value = "")]
    pub agent_asn: String,
}

impl Cli {
    /// Get the result time-to-live as a Duration
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl)
    }

    /// Get the sweep interval as a Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}
