use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::AppError;
use crate::models::{
    CheckKind, CheckResult, ExtendedResult, ProbeOutcome, VantagePoint, VantageResults,
};
use crate::registry::Registry;
use crate::store::ResultStore;

/// A finished, persisted check
#[derive(Debug, Clone)]
pub struct CompletedCheck {
    pub request_id: String,
    pub vantage_points: Vec<VantagePoint>,
    pub results: VantageResults,
}

/// Runs checks end to end: select vantage points, fan out, persist
pub struct CheckService {
    registry: Registry,
    dispatcher: Dispatcher,
    store: Arc<ResultStore>,
}

impl CheckService {
    pub fn new(registry: Registry, dispatcher: Dispatcher, store: Arc<ResultStore>) -> Self {
        Self {
            registry,
            dispatcher,
            store,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run a check and persist it. Probe failures are part of the results;
    /// only an empty selection or a storage failure is an error.
    pub async fn run_check(
        &self,
        kind: CheckKind,
        target: &str,
        max_nodes: Option<usize>,
        node_ids: &[String],
    ) -> Result<CompletedCheck, AppError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(AppError::ValidationError("host is required".to_string()));
        }

        let vantage_points = self.registry.select(max_nodes, node_ids);
        if vantage_points.is_empty() {
            return Err(AppError::ValidationError(
                "No vantage points match the request".to_string(),
            ));
        }

        tracing::info!(
            "Running {} check of {} from {} vantage points",
            kind,
            target,
            vantage_points.len()
        );

        let results = self.dispatcher.run(kind, target, &vantage_points).await;
        let request_id = self.store.create(kind, target, results.clone()).await?;

        Ok(CompletedCheck {
            request_id,
            vantage_points,
            results,
        })
    }

    /// Run one probe from `vantage` only; nothing is stored
    pub async fn run_local(
        &self,
        kind: CheckKind,
        target: &str,
        vantage: &VantagePoint,
    ) -> Vec<ProbeOutcome> {
        let mut results = self
            .dispatcher
            .run(kind, target.trim(), std::slice::from_ref(vantage))
            .await;
        results.remove(vantage.key()).unwrap_or_default()
    }

    pub async fn get_result(&self, request_id: &str) -> Result<CheckResult, AppError> {
        self.store
            .get(request_id)
            .await?
            .ok_or_else(|| AppError::NotFoundError(format!("Result {} not found", request_id)))
    }

    pub async fn get_extended_result(&self, request_id: &str) -> Result<ExtendedResult, AppError> {
        self.store
            .get_extended(request_id)
            .await?
            .ok_or_else(|| AppError::NotFoundError(format!("Result {} not found", request_id)))
    }
}
