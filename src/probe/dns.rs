use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{ResolveError, ResolverBuilder, TokioResolver};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{DnsAnswer, Probe, RawFailure, RawOutcome};
use crate::config::{DnsConfig, PrimaryResolver};
use crate::error::AppError;
use crate::models::{CheckKind, VantagePoint};
use crate::utils::parse_host_port;

/// Extra time granted on top of the resolver's own per-query timeout
const LOOKUP_GRACE: Duration = Duration::from_secs(1);

/// Why a single lookup produced nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// The name exists but has no record of the requested type
    NoRecords,
    /// The name does not exist
    NxDomain(String),
    Timeout,
    Other(String),
}

impl LookupFailure {
    /// The resolver answered definitively; asking it again would not help
    fn is_definite(&self) -> bool {
        matches!(self, LookupFailure::NoRecords | LookupFailure::NxDomain(_))
    }
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupFailure::NoRecords => f.write_str("no records found"),
            LookupFailure::NxDomain(name) => write!(f, "domain {} does not exist", name),
            LookupFailure::Timeout => f.write_str("lookup timed out"),
            LookupFailure::Other(reason) => f.write_str(reason),
        }
    }
}

/// Records of one type plus the remaining cache lifetime, when known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet<T> {
    pub records: Vec<T>,
    pub ttl: Option<u32>,
}

/// A resolver the DNS probe can query
#[async_trait]
pub trait DnsBackend: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str;

    async fn lookup_a(&self, host: &str) -> Result<RecordSet<Ipv4Addr>, LookupFailure>;

    async fn lookup_aaaa(&self, host: &str) -> Result<RecordSet<Ipv6Addr>, LookupFailure>;

    async fn reverse(&self, address: IpAddr) -> Result<Vec<String>, LookupFailure>;
}

/// [`DnsBackend`] backed by a hickory resolver
pub struct HickoryBackend {
    name: String,
    resolver: TokioResolver,
    timeout: Duration,
}

impl HickoryBackend {
    /// Resolver using the host's own configuration (`/etc/resolv.conf` or the
    /// platform equivalent)
    pub fn system(timeout: Duration) -> Result<Self, AppError> {
        let builder = TokioResolver::builder_tokio().map_err(|e| {
            AppError::ConfigError(format!("Failed to read system resolver config: {}", e))
        })?;
        Ok(Self::build("system".to_string(), builder, timeout))
    }

    /// Resolver querying the given name servers over plain UDP/TCP port 53
    pub fn servers(servers: &[IpAddr], timeout: Duration) -> Self {
        let group = NameServerConfigGroup::from_ips_clear(servers, 53, true);
        let name = servers
            .iter()
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self::with_config(name, ResolverConfig::from_parts(None, vec![], group), timeout)
    }

    pub fn with_config(name: String, config: ResolverConfig, timeout: Duration) -> Self {
        let builder =
            TokioResolver::builder_with_config(config, TokioConnectionProvider::default());
        Self::build(name, builder, timeout)
    }

    fn build(
        name: String,
        mut builder: ResolverBuilder<TokioConnectionProvider>,
        timeout: Duration,
    ) -> Self {
        builder.options_mut().timeout = timeout;
        builder.options_mut().attempts = 1;
        Self {
            name,
            resolver: builder.build(),
            timeout,
        }
    }

    async fn guarded<T, F>(&self, name: &str, lookup: F) -> Result<T, LookupFailure>
    where
        F: std::future::Future<Output = Result<T, ResolveError>>,
    {
        match tokio::time::timeout(self.timeout + LOOKUP_GRACE, lookup).await {
            Ok(Ok(found)) => Ok(found),
            Ok(Err(e)) => Err(classify_resolve_error(&e, name)),
            Err(_) => Err(LookupFailure::Timeout),
        }
    }
}

fn classify_resolve_error(err: &ResolveError, name: &str) -> LookupFailure {
    if err.is_nx_domain() {
        return LookupFailure::NxDomain(name.to_string());
    }
    if err.is_no_records_found() {
        return LookupFailure::NoRecords;
    }

    let message = err.to_string();
    if message.to_ascii_lowercase().contains("timed out") {
        LookupFailure::Timeout
    } else {
        LookupFailure::Other(message)
    }
}

fn remaining_ttl(valid_until: Instant) -> Option<u32> {
    let secs = valid_until.saturating_duration_since(Instant::now()).as_secs();
    u32::try_from(secs).ok()
}

#[async_trait]
impl DnsBackend for HickoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup_a(&self, host: &str) -> Result<RecordSet<Ipv4Addr>, LookupFailure> {
        let lookup = self.guarded(host, self.resolver.ipv4_lookup(host)).await?;
        Ok(RecordSet {
            records: lookup.iter().map(|a| a.0).collect(),
            ttl: remaining_ttl(lookup.valid_until()),
        })
    }

    async fn lookup_aaaa(&self, host: &str) -> Result<RecordSet<Ipv6Addr>, LookupFailure> {
        let lookup = self.guarded(host, self.resolver.ipv6_lookup(host)).await?;
        Ok(RecordSet {
            records: lookup.iter().map(|aaaa| aaaa.0).collect(),
            ttl: remaining_ttl(lookup.valid_until()),
        })
    }

    async fn reverse(&self, address: IpAddr) -> Result<Vec<String>, LookupFailure> {
        let lookup = self
            .guarded(&address.to_string(), self.resolver.reverse_lookup(address))
            .await?;
        Ok(lookup
            .iter()
            .map(|ptr| ptr.0.to_utf8().trim_end_matches('.').to_string())
            .collect())
    }
}

/// What one resolver had to say about a query
enum Verdict<T> {
    /// At least one record came back
    Usable(T),
    /// The resolver answered, with nothing in it
    Empty,
    Failed(LookupFailure),
}

/// DNS probe: forward (A + AAAA) lookups for names, PTR for IP literals.
///
/// The primary resolver is asked first; when it has no usable answer the
/// fallbacks are tried in order.
pub struct DnsProbe {
    primary: Arc<dyn DnsBackend>,
    fallbacks: Vec<Arc<dyn DnsBackend>>,
}

impl DnsProbe {
    pub fn new(primary: Arc<dyn DnsBackend>, fallbacks: Vec<Arc<dyn DnsBackend>>) -> Self {
        Self { primary, fallbacks }
    }

    pub fn from_config(config: &DnsConfig) -> Result<Self, AppError> {
        let primary: Arc<dyn DnsBackend> = match &config.primary {
            PrimaryResolver::System => match HickoryBackend::system(config.timeout) {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    tracing::warn!("{}; using public resolvers as primary", e);
                    Arc::new(HickoryBackend::with_config(
                        "default".to_string(),
                        ResolverConfig::default(),
                        config.timeout,
                    ))
                }
            },
            PrimaryResolver::Servers(servers) if servers.is_empty() => {
                return Err(AppError::ConfigError(
                    "Primary DNS resolver has no servers".to_string(),
                ))
            }
            PrimaryResolver::Servers(servers) => {
                Arc::new(HickoryBackend::servers(servers, config.timeout))
            }
        };

        let fallbacks = config
            .fallbacks
            .iter()
            .map(|ip| {
                Arc::new(HickoryBackend::servers(&[*ip], config.timeout)) as Arc<dyn DnsBackend>
            })
            .collect();

        Ok(Self::new(primary, fallbacks))
    }

    fn resolvers(&self) -> impl Iterator<Item = &Arc<dyn DnsBackend>> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    async fn forward_with(backend: &dyn DnsBackend, host: &str) -> Verdict<DnsAnswer> {
        let (a, aaaa) = tokio::join!(backend.lookup_a(host), backend.lookup_aaaa(host));

        let a_has = matches!(&a, Ok(set) if !set.records.is_empty());
        let aaaa_has = matches!(&aaaa, Ok(set) if !set.records.is_empty());

        if a_has || aaaa_has {
            let ttl = a
                .as_ref()
                .ok()
                .filter(|set| !set.records.is_empty())
                .and_then(|set| set.ttl)
                .or_else(|| aaaa.as_ref().ok().and_then(|set| set.ttl));
            return Verdict::Usable(DnsAnswer::Forward {
                a: a.map(|set| set.records).unwrap_or_default(),
                aaaa: aaaa.map(|set| set.records).unwrap_or_default(),
                ttl,
            });
        }

        // Neither family has records: one failed, the name is unknown, or it
        // exists without address records
        match (a, aaaa) {
            (Err(e), _) if !e.is_definite() => Verdict::Failed(e),
            (_, Err(e)) if !e.is_definite() => Verdict::Failed(e),
            (Err(e @ LookupFailure::NxDomain(_)), Err(LookupFailure::NxDomain(_))) => {
                Verdict::Failed(e)
            }
            _ => Verdict::Empty,
        }
    }

    /// A missing reverse zone is an empty answer, not a failure
    async fn reverse_with(backend: &dyn DnsBackend, address: IpAddr) -> Verdict<DnsAnswer> {
        match backend.reverse(address).await {
            Ok(names) if !names.is_empty() => Verdict::Usable(DnsAnswer::Reverse { names }),
            Ok(_) => Verdict::Empty,
            Err(e) if e.is_definite() => Verdict::Empty,
            Err(e) => Verdict::Failed(e),
        }
    }

    async fn resolve(&self, host: &str, literal: Option<IpAddr>) -> Result<DnsAnswer, RawFailure> {
        let mut answered_empty = false;
        let mut failures = Vec::new();

        for backend in self.resolvers() {
            let verdict = match literal {
                Some(address) => Self::reverse_with(backend.as_ref(), address).await,
                None => Self::forward_with(backend.as_ref(), host).await,
            };

            match verdict {
                Verdict::Usable(answer) => return Ok(answer),
                Verdict::Empty => {
                    tracing::debug!("dns {}: resolver {} has no records", host, backend.name());
                    answered_empty = true;
                }
                Verdict::Failed(e) => {
                    tracing::debug!("dns {}: resolver {} failed: {}", host, backend.name(), e);
                    failures.push(e);
                }
            }
        }

        if answered_empty {
            return Ok(match literal {
                Some(_) => DnsAnswer::Reverse { names: Vec::new() },
                None => DnsAnswer::Forward {
                    a: Vec::new(),
                    aaaa: Vec::new(),
                    ttl: None,
                },
            });
        }

        let failure = if failures.iter().all(|e| *e == LookupFailure::Timeout) {
            LookupFailure::Timeout
        } else {
            failures
                .into_iter()
                .find(|e| *e != LookupFailure::Timeout)
                .unwrap_or(LookupFailure::Timeout)
        };
        Err(RawFailure::Lookup(failure))
    }
}

#[async_trait]
impl Probe for DnsProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Dns
    }

    async fn execute(&self, target: &str, vantage: &VantagePoint) -> RawOutcome {
        let target = parse_host_port(target);
        if target.host.is_empty() {
            return RawOutcome::Dns(Err(RawFailure::Unresolved {
                host: target.host,
                reason: "empty hostname".to_string(),
            }));
        }

        let result = self.resolve(&target.host, target.ip()).await;
        if let Err(e) = &result {
            tracing::debug!("[{}] dns {} failed: {:?}", vantage.id, target.host, e);
        }

        RawOutcome::Dns(result)
    }
}
