use axum::{
    extract::{rejection::JsonRejection, Path, Query},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    agent::{AgentIdentity, AgentInfo, TaskRequest, TaskResponse},
    error::AppError,
    models::{AppState, CheckKind, CheckResponse, ExtendedResult, SharedState, VantageResults},
    registry::Registry,
};

/// Build the HTTP API
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/info", get(agent_info))
        .route("/task/execute", post(execute_task))
        .route("/check-ping", get(check_ping))
        .route("/check-tcp", get(check_tcp))
        .route("/check-udp", get(check_udp))
        .route("/check-dns", get(check_dns))
        .route("/check-http", get(check_http))
        .route("/check-result/:request_id", get(get_check_result))
        .route(
            "/check-result-extended/:request_id",
            get(get_check_result_extended),
        )
        .route("/nodes/hosts", get(get_nodes))
        .route("/nodes/ips", get(get_nodes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(state: SharedState) -> Json<Value> {
    match &state.agent {
        Some(agent) => Json(json!({
            "status": "healthy",
            "agentId": agent.agent_id(),
            "version": env!("CARGO_PKG_VERSION")
        })),
        None => Json(json!({ "status": "healthy" })),
    }
}

fn configured_agent(state: &SharedState) -> Result<&AgentIdentity, AppError> {
    state
        .agent
        .as_deref()
        .ok_or_else(|| AppError::ConfigError("AGENT_ID not configured".to_string()))
}

pub async fn agent_info(state: SharedState) -> Result<Json<AgentInfo>, AppError> {
    Ok(Json(configured_agent(&state)?.info()))
}

/// Run one probe from this agent on behalf of a coordinator
pub async fn execute_task(
    state: SharedState,
    payload: Result<Json<TaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, AppError> {
    let agent = configured_agent(&state)?;
    let Json(request) = payload?;
    let task = request.validate()?;

    tracing::info!(
        "Executing task {} ({} {}) as {}",
        task.task_id,
        task.kind,
        task.host,
        agent.agent_id()
    );

    let result = state
        .service
        .run_local(task.kind, &task.host, &agent.vantage)
        .await;

    Ok(Json(TaskResponse {
        success: true,
        task_id: task.task_id,
        check_type: task.kind,
        host: task.host,
        agent_id: agent.agent_id().to_string(),
        node_id: agent.node_id().to_string(),
        result,
        timestamp: Utc::now(),
    }))
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "netcheck API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "ping": "/check-ping?host=<hostname>",
            "http": "/check-http?host=<url>",
            "tcp": "/check-tcp?host=<host:port>",
            "udp": "/check-udp?host=<host:port>",
            "dns": "/check-dns?host=<hostname>",
            "nodes": "/nodes/ips or /nodes/hosts",
            "task": "POST /task/execute",
            "info": "/info"
        }
    }))
}

/// Query parameters accepted by every check route
#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    pub host: Option<String>,
    pub max_nodes: Option<usize>,
    /// Comma-separated vantage point ids
    pub node: Option<String>,
}

impl CheckQuery {
    fn node_ids(&self) -> Vec<String> {
        self.node
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

async fn run_check(
    state: SharedState,
    kind: CheckKind,
    query: CheckQuery,
) -> Result<Json<CheckResponse>, AppError> {
    let host = query
        .host
        .as_deref()
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .ok_or_else(|| AppError::ValidationError("host parameter is required".to_string()))?;

    let check = state
        .service
        .run_check(kind, host, query.max_nodes, &query.node_ids())
        .await?;

    Ok(Json(CheckResponse {
        ok: 1,
        permanent_link: format!(
            "{}/check-report/{}",
            state.base_url.trim_end_matches('/'),
            check.request_id
        ),
        request_id: check.request_id,
        nodes: Registry::nodes_for_api(&check.vantage_points),
        results: check.results,
    }))
}

pub async fn check_ping(
    state: SharedState,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, AppError> {
    run_check(state, CheckKind::Ping, query).await
}

pub async fn check_tcp(
    state: SharedState,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, AppError> {
    run_check(state, CheckKind::Tcp, query).await
}

pub async fn check_udp(
    state: SharedState,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, AppError> {
    run_check(state, CheckKind::Udp, query).await
}

pub async fn check_dns(
    state: SharedState,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, AppError> {
    run_check(state, CheckKind::Dns, query).await
}

pub async fn check_http(
    state: SharedState,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, AppError> {
    run_check(state, CheckKind::Http, query).await
}

/// Per-vantage-point results of a stored check
pub async fn get_check_result(
    state: SharedState,
    Path(request_id): Path<String>,
) -> Result<Json<VantageResults>, AppError> {
    let result = state.service.get_result(&request_id).await?;
    Ok(Json(result.results))
}

pub async fn get_check_result_extended(
    state: SharedState,
    Path(request_id): Path<String>,
) -> Result<Json<ExtendedResult>, AppError> {
    let result = state.service.get_extended_result(&request_id).await?;
    Ok(Json(result))
}

#[derive(Debug, Serialize)]
pub struct NodeEntry {
    pub ip: String,
    pub asn: String,
    /// `[country_code, country, city]`
    pub location: [String; 3],
}

#[derive(Debug, Serialize)]
pub struct NodesResponse {
    pub nodes: BTreeMap<String, NodeEntry>,
}

/// Every registered vantage point, keyed by hostname
pub async fn get_nodes(state: SharedState) -> Json<NodesResponse> {
    let nodes = state
        .service
        .registry()
        .all()
        .into_iter()
        .map(|vp| {
            (
                vp.hostname,
                NodeEntry {
                    ip: vp.info.ip,
                    asn: vp.info.asn,
                    location: [vp.info.country_code, vp.info.country, vp.info.city],
                },
            )
        })
        .collect();

    Json(NodesResponse { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_list_is_split_on_commas() {
        let query = CheckQuery {
            node: Some(" us1, de1,,ir1 ".to_string()),
            ..CheckQuery::default()
        };
        assert_eq!(query.node_ids(), vec!["us1", "de1", "ir1"]);
        assert!(CheckQuery::default().node_ids().is_empty());
    }
}
