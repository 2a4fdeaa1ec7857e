#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use netcheck::agent::AgentIdentity;
use netcheck::api;
use netcheck::config::{HttpConfig, TcpConfig, UdpConfig};
use netcheck::dispatch::Dispatcher;
use netcheck::error::AppError;
use netcheck::models::{AppState, CheckResult, NodeInfo};
use netcheck::probe::{
    DnsBackend, DnsProbe, EchoFacility, EchoReport, HttpProbe, LookupFailure, PingProbe, Probe,
    ProbeSet, RecordSet, TcpProbe, UdpProbe,
};
use netcheck::registry::Registry;
use netcheck::service::CheckService;
use netcheck::store::{Clock, MemoryBackend, ResultStore, StoreBackend};

pub const NODE_DOMAIN: &str = "node.test";
pub const BASE_URL: &str = "http://netcheck.test";

/// Clock that only moves when told to
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Utc::now())))
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

/// Backend whose every operation fails
pub struct FailingBackend;

#[async_trait]
impl StoreBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn insert_if_absent(&self, _record: &CheckResult) -> Result<bool, AppError> {
        Err(AppError::StorageError("backend unavailable".into()))
    }

    async fn fetch(&self, _request_id: &str) -> Result<Option<CheckResult>, AppError> {
        Err(AppError::StorageError("backend unavailable".into()))
    }

    async fn remove(&self, _request_id: &str) -> Result<bool, AppError> {
        Err(AppError::StorageError("backend unavailable".into()))
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, AppError> {
        Err(AppError::StorageError("backend unavailable".into()))
    }
}

/// Echo facility that always answers in 2 ms
pub struct InstantEcho;

#[async_trait]
impl EchoFacility for InstantEcho {
    async fn echo(&self, address: IpAddr, _timeout: Duration) -> EchoReport {
        EchoReport::Reply {
            report: format!("64 bytes from {}: icmp_seq=1 ttl=64 time=2.0 ms", address),
        }
    }
}

/// Resolver that knows a single A-only name; every other name is NXDOMAIN
pub struct StaticDns;

#[async_trait]
impl DnsBackend for StaticDns {
    fn name(&self) -> &str {
        "static"
    }

    async fn lookup_a(&self, host: &str) -> Result<RecordSet<Ipv4Addr>, LookupFailure> {
        if host == "a-only.test" {
            Ok(RecordSet {
                records: vec![Ipv4Addr::new(192, 0, 2, 1)],
                ttl: Some(300),
            })
        } else {
            Err(LookupFailure::NxDomain(host.to_string()))
        }
    }

    async fn lookup_aaaa(&self, host: &str) -> Result<RecordSet<Ipv6Addr>, LookupFailure> {
        if host == "a-only.test" {
            Err(LookupFailure::NoRecords)
        } else {
            Err(LookupFailure::NxDomain(host.to_string()))
        }
    }

    async fn reverse(&self, _address: IpAddr) -> Result<Vec<String>, LookupFailure> {
        Ok(vec!["localhost".to_string()])
    }
}

/// Real socket runners with short bounds, fake ping and DNS
pub fn test_probes() -> ProbeSet {
    let probes: Vec<Arc<dyn Probe>> = vec![
        Arc::new(PingProbe::new(
            netcheck::config::PingConfig {
                count: 2,
                timeout: Duration::from_millis(100),
                spacing: Duration::ZERO,
            },
            Arc::new(InstantEcho),
        )),
        Arc::new(TcpProbe::new(TcpConfig {
            timeout: Duration::from_secs(2),
        })),
        Arc::new(UdpProbe::new(UdpConfig {
            wait: Duration::from_millis(200),
            ..UdpConfig::default()
        })),
        Arc::new(DnsProbe::new(Arc::new(StaticDns), vec![])),
        Arc::new(
            HttpProbe::new(HttpConfig {
                timeout: Duration::from_millis(500),
                ..HttpConfig::default()
            })
            .unwrap(),
        ),
    ];
    ProbeSet::from_probes(probes)
}

pub fn store_with(backend: Arc<dyn StoreBackend>, clock: Arc<dyn Clock>) -> Arc<ResultStore> {
    Arc::new(ResultStore::new(backend, clock, Duration::from_secs(24 * 60 * 60)).unwrap())
}

pub fn memory_store() -> Arc<ResultStore> {
    store_with(Arc::new(MemoryBackend::new()), ManualClock::new())
}

pub fn service_with(store: Arc<ResultStore>) -> Arc<CheckService> {
    Arc::new(CheckService::new(
        Registry::with_defaults(NODE_DOMAIN),
        Dispatcher::new(test_probes()),
        store,
    ))
}

pub fn app_with(store: Arc<ResultStore>) -> Router {
    api::router(AppState {
        service: service_with(store),
        base_url: BASE_URL.to_string(),
        agent: None,
    })
}

pub fn test_agent() -> AgentIdentity {
    AgentIdentity::new(
        "fi1",
        NODE_DOMAIN,
        "Helsinki agent",
        Some("Helsinki, Finland".to_string()),
        NodeInfo {
            country_code: "fi".to_string(),
            country: "Finland".to_string(),
            city: "Helsinki".to_string(),
            ip: "192.0.2.50".to_string(),
            asn: "AS64500".to_string(),
        },
    )
}

/// Router for a process that is also the `fi1` vantage point
pub fn agent_app_with(store: Arc<ResultStore>) -> Router {
    api::router(AppState {
        service: service_with(store),
        base_url: BASE_URL.to_string(),
        agent: Some(Arc::new(test_agent())),
    })
}

/// GET `uri` and decode the JSON body
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

/// POST a raw JSON body to `uri` and decode the JSON answer
pub async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
