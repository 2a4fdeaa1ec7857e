//! Persistence of check results with time-based expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{CheckKind, CheckResult, ExtendedResult, VantageResults};

mod memory;
mod redis_backend;
mod sweeper;

pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use sweeper::{Sweeper, SweeperHandle};

/// Length of a request id in hex characters
pub const REQUEST_ID_LEN: usize = 12;

const MAX_MINT_ATTEMPTS: usize = 5;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Where check results actually live.
///
/// Every operation is individually atomic. Errors are storage failures;
/// a missing record is `Ok(None)` / `Ok(false)`.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Store `record` unless its id is already taken. Returns whether it was
    /// stored.
    async fn insert_if_absent(&self, record: &CheckResult) -> Result<bool, AppError>;

    async fn fetch(&self, request_id: &str) -> Result<Option<CheckResult>, AppError>;

    /// Returns whether a record was removed
    async fn remove(&self, request_id: &str) -> Result<bool, AppError>;

    /// Delete every record expired at `now`; returns how many were purged
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AppError>;
}

/// Fresh 12-character lowercase hex id
pub fn mint_request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(REQUEST_ID_LEN);
    id
}

/// Check results keyed by request id, each living for a fixed TTL
pub struct ResultStore {
    backend: Arc<dyn StoreBackend>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl ResultStore {
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Result<Self, AppError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AppError::ConfigError(format!("Invalid result TTL: {}", e)))?;
        Ok(Self {
            backend,
            clock,
            ttl,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Persist a finished check and return its request id
    pub async fn create(
        &self,
        kind: CheckKind,
        target: &str,
        results: VantageResults,
    ) -> Result<String, AppError> {
        let created_at = self.clock.now();
        let mut record = CheckResult {
            request_id: String::new(),
            check_kind: kind,
            target_host: target.to_string(),
            results,
            created_at,
            expires_at: created_at + self.ttl,
        };

        for _ in 0..MAX_MINT_ATTEMPTS {
            record.request_id = mint_request_id();
            if self.backend.insert_if_absent(&record).await? {
                tracing::debug!(
                    "Stored {} check {} in {} backend",
                    kind,
                    record.request_id,
                    self.backend.name()
                );
                return Ok(record.request_id);
            }
            tracing::warn!("Request id {} already taken, minting another", record.request_id);
        }

        Err(AppError::StorageError(
            "Could not allocate a unique request id".to_string(),
        ))
    }

    /// Look a result up; expired results are deleted and reported missing
    pub async fn get(&self, request_id: &str) -> Result<Option<CheckResult>, AppError> {
        let Some(record) = self.backend.fetch(request_id).await? else {
            return Ok(None);
        };

        if record.is_expired_at(self.clock.now()) {
            tracing::debug!("Result {} expired, removing", request_id);
            self.backend.remove(request_id).await?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    pub async fn get_extended(&self, request_id: &str) -> Result<Option<ExtendedResult>, AppError> {
        Ok(self.get(request_id).await?.map(ExtendedResult::from))
    }

    /// Delete every expired result; returns how many were purged
    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        let purged = self.backend.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            tracing::info!("Swept {} expired results", purged);
        }
        Ok(purged)
    }
}
