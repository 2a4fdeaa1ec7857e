//! Protocol probes.
//!
//! Every runner implements [`Probe`] and reports what happened as a
//! [`RawOutcome`]: failures are data, never errors. The [`normalize`] module
//! turns raw outcomes into the persisted [`ProbeOutcome`] shape.
//!
//! [`ProbeOutcome`]: crate::models::ProbeOutcome

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ProbeConfig;
use crate::error::AppError;
use crate::models::{CheckKind, VantagePoint};

mod dns;
mod http;
pub mod normalize;
mod ping;
mod tcp;
mod udp;

pub use dns::{DnsBackend, DnsProbe, HickoryBackend, LookupFailure, RecordSet};
pub use http::HttpProbe;
pub use ping::{parse_echo_time, EchoFacility, PingProbe, SystemPing};
pub use tcp::TcpProbe;
pub use udp::UdpProbe;

/// A protocol-specific probe executed once per vantage point
#[async_trait]
pub trait Probe: Send + Sync {
    fn kind(&self) -> CheckKind;

    /// Run the probe against `target`. Must return within the runner's own
    /// bound and must not leak sockets or child processes.
    async fn execute(&self, target: &str, vantage: &VantagePoint) -> RawOutcome;
}

/// Why a probe step failed, before classification
#[derive(Debug)]
pub enum RawFailure {
    /// The hostname did not resolve to a usable address
    Unresolved { host: String, reason: String },
    /// The target could not be turned into something to probe
    InvalidTarget(String),
    /// The runner's own bound elapsed
    Elapsed(Duration),
    /// Socket-level error
    Io(io::Error),
    /// HTTP client error
    Http(reqwest::Error),
    /// DNS lookup error
    Lookup(LookupFailure),
}

/// What the echo facility reported for one round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoReport {
    /// A reply came back; the facility's textual report is kept for parsing
    Reply { report: String },
    /// The facility ran but saw no reply
    NoReply,
    /// The facility did not finish within the wait bound
    Elapsed,
    /// The facility itself could not be run
    FacilityFailed(String),
}

#[derive(Debug)]
pub struct PingSeries {
    pub address: IpAddr,
    pub timeout: Duration,
    /// One report per echo request, in issuance order
    pub reports: Vec<EchoReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connected {
    pub elapsed: Duration,
    pub address: IpAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramExchange {
    pub elapsed: Duration,
    pub address: IpAddr,
    /// A datagram came back inside the wait window
    pub replied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsAnswer {
    Forward {
        a: Vec<Ipv4Addr>,
        aaaa: Vec<Ipv6Addr>,
        ttl: Option<u32>,
    },
    Reverse {
        names: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseMeta {
    pub status: u16,
    pub reason: Option<String>,
    pub remote: Option<IpAddr>,
}

#[derive(Debug)]
pub struct HttpAttempt {
    pub elapsed: Duration,
    pub result: Result<HttpResponseMeta, RawFailure>,
}

/// Native outcome of one probe execution
#[derive(Debug)]
pub enum RawOutcome {
    Ping(Result<PingSeries, RawFailure>),
    Tcp(Result<Connected, RawFailure>),
    Udp(Result<DatagramExchange, RawFailure>),
    Dns(Result<DnsAnswer, RawFailure>),
    Http(HttpAttempt),
}

/// The runner for every check kind
#[derive(Clone)]
pub struct ProbeSet {
    probes: HashMap<CheckKind, Arc<dyn Probe>>,
}

impl ProbeSet {
    /// Build the production runners from configuration
    pub fn from_config(config: &ProbeConfig) -> Result<Self, AppError> {
        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(PingProbe::new(config.ping.clone(), Arc::new(SystemPing))),
            Arc::new(TcpProbe::new(config.tcp.clone())),
            Arc::new(UdpProbe::new(config.udp.clone())),
            Arc::new(DnsProbe::from_config(&config.dns)?),
            Arc::new(HttpProbe::new(config.http.clone())?),
        ];
        Ok(Self::from_probes(probes))
    }

    /// Assemble a set from individual runners; later entries replace earlier
    /// ones of the same kind
    pub fn from_probes(probes: impl IntoIterator<Item = Arc<dyn Probe>>) -> Self {
        let probes = probes
            .into_iter()
            .map(|probe| (probe.kind(), probe))
            .collect();
        Self { probes }
    }

    pub fn get(&self, kind: CheckKind) -> Option<Arc<dyn Probe>> {
        self.probes.get(&kind).cloned()
    }
}
