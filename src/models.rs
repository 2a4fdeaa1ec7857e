use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;

use crate::agent::AgentIdentity;
use crate::error::AppError;
use crate::service::CheckService;

/// Application state shared across API handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CheckService>,
    /// Prefix used to build permanent report links
    pub base_url: String,
    /// Set when this process also serves as a vantage point
    pub agent: Option<Arc<AgentIdentity>>,
}

/// Type alias for the application state that can be used with Axum
pub type SharedState = State<AppState>;

/// Per-vantage-point results, keyed by vantage-point hostname
pub type VantageResults = BTreeMap<String, Vec<ProbeOutcome>>;

/// Kind of check a client can submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Ping,
    Tcp,
    Udp,
    Dns,
    Http,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::Ping,
        CheckKind::Tcp,
        CheckKind::Udp,
        CheckKind::Dns,
        CheckKind::Http,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Ping => "ping",
            CheckKind::Tcp => "tcp",
            CheckKind::Udp => "udp",
            CheckKind::Dns => "dns",
            CheckKind::Http => "http",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::ValidationError(format!("Unknown check kind: {}", s)))
    }
}

/// Registry metadata for a vantage point, opaque to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(alias = "country_code")]
    pub country_code: String,
    pub country: String,
    pub city: String,
    pub ip: String,
    pub asn: String,
}

/// A named execution context a probe is run from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VantagePoint {
    pub id: String,
    /// Display hostname, also the key results are stored under
    pub hostname: String,
    pub info: NodeInfo,
}

impl VantagePoint {
    /// Build a vantage point whose hostname is `<id>.<node_domain>`
    pub fn new(id: &str, node_domain: &str, info: NodeInfo) -> Self {
        Self {
            id: id.to_string(),
            hostname: format!("{}.{}", id, node_domain),
            info,
        }
    }

    pub fn key(&self) -> &str {
        &self.hostname
    }
}

/// Fixed failure taxonomy reported inside outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ResolutionFailure,
    Timeout,
    ConnectionRefused,
    MalformedResponse,
    TransportError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::ResolutionFailure => "resolution failure",
            FailureKind::Timeout => "timeout",
            FailureKind::ConnectionRefused => "connection refused",
            FailureKind::MalformedResponse => "malformed response",
            FailureKind::TransportError => "transport error",
        };
        f.write_str(name)
    }
}

/// Status of a single echo round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PingStatus {
    Ok,
    Timeout,
    Malformed,
}

/// Canonical, persisted outcome of one probe step.
///
/// Each check kind produces its own variants, plus `Error` for failures that
/// carry no protocol-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Ping {
        status: PingStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip: Option<IpAddr>,
    },
    Tcp {
        time: f64,
        address: IpAddr,
    },
    Udp {
        time: f64,
        address: IpAddr,
        note: String,
        /// Whether a datagram actually came back during the wait window
        replied: bool,
    },
    DnsForward {
        a: Vec<Ipv4Addr>,
        aaaa: Vec<Ipv6Addr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u32>,
    },
    DnsReverse {
        ptr: Vec<String>,
    },
    Http {
        success: u8,
        time: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip: Option<IpAddr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FailureKind>,
    },
    Error {
        error: FailureKind,
        message: String,
    },
}

pub const OPEN_OR_FILTERED: &str = "open-or-filtered";

impl ProbeOutcome {
    pub fn error(kind: FailureKind, message: impl Into<String>) -> Self {
        ProbeOutcome::Error {
            error: kind,
            message: message.into(),
        }
    }

    /// Failure class carried by this outcome, if it represents a failure
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ProbeOutcome::Ping { status, .. } => match status {
                PingStatus::Ok => None,
                PingStatus::Timeout => Some(FailureKind::Timeout),
                PingStatus::Malformed => Some(FailureKind::MalformedResponse),
            },
            ProbeOutcome::Http { error, .. } => *error,
            ProbeOutcome::Error { error, .. } => Some(*error),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        match self {
            ProbeOutcome::Http { success, .. } => *success == 0,
            other => other.failure_kind().is_some(),
        }
    }
}

/// Persisted unit: everything one check produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub request_id: String,
    pub check_kind: CheckKind,
    pub target_host: String,
    pub results: VantageResults,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result view with the metadata reporting collaborators need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedResult {
    pub command: CheckKind,
    /// Creation time as epoch seconds
    pub created: i64,
    pub host: String,
    pub results: VantageResults,
}

impl From<CheckResult> for ExtendedResult {
    fn from(result: CheckResult) -> Self {
        Self {
            command: result.check_kind,
            created: result.created_at.timestamp(),
            host: result.target_host,
            results: result.results,
        }
    }
}

/// Response sent back when a check is submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub ok: u8,
    pub request_id: String,
    pub permanent_link: String,
    pub nodes: BTreeMap<String, Vec<String>>,
    pub results: VantageResults,
}
