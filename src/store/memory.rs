use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::StoreBackend;
use crate::error::AppError;
use crate::models::CheckResult;

/// In-process backend; contents are lost on restart
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, CheckResult>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert_if_absent(&self, record: &CheckResult) -> Result<bool, AppError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.request_id) {
            return Ok(false);
        }
        records.insert(record.request_id.clone(), record.clone());
        Ok(true)
    }

    async fn fetch(&self, request_id: &str) -> Result<Option<CheckResult>, AppError> {
        Ok(self.records.lock().get(request_id).cloned())
    }

    async fn remove(&self, request_id: &str) -> Result<bool, AppError> {
        Ok(self.records.lock().remove(request_id).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok(before - records.len())
    }
}
