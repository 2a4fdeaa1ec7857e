use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;

use super::StoreBackend;
use crate::error::AppError;
use crate::models::CheckResult;

/// Sorted set of request ids scored by expiry (epoch millis)
const EXPIRY_INDEX_KEY: &str = "checks:expiry";

fn record_key(request_id: &str) -> String {
    format!("check:{}", request_id)
}

/// Redis-backed result storage.
///
/// Records are JSON values with a native `EX` expiry; the expiry index lets
/// the sweep find what to purge without scanning the keyspace.
pub struct RedisBackend {
    client: ConnectionManager,
    expiry_index: String,
}

impl RedisBackend {
    pub async fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::StorageError(format!("Failed to create Redis client: {}", e)))?;

        // Connection manager reconnects on its own
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to connect to Redis: {}", e)))?;

        tracing::info!("Connected to Redis result store");

        Ok(Self {
            client: conn_manager,
            expiry_index: EXPIRY_INDEX_KEY.to_string(),
        })
    }

    /// Keep the expiry index under another key
    pub fn with_expiry_index(mut self, key: impl Into<String>) -> Self {
        self.expiry_index = key.into();
        self
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn insert_if_absent(&self, record: &CheckResult) -> Result<bool, AppError> {
        let mut conn = self.client.clone();
        let key = record_key(&record.request_id);
        let json = serde_json::to_string(record)
            .map_err(|e| AppError::StorageError(format!("Failed to serialize result: {}", e)))?;
        let ttl_secs = (record.expires_at - record.created_at).num_seconds().max(1);

        let stored: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&json)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to store result in Redis: {}", e)))?;

        if stored.is_none() {
            return Ok(false);
        }

        let indexed = redis::cmd("ZADD")
            .arg(&self.expiry_index)
            .arg(record.expires_at.timestamp_millis())
            .arg(&record.request_id)
            .query_async::<_, ()>(&mut conn)
            .await;

        if let Err(e) = indexed {
            // Nobody will be handed this id, so the record must not stay readable
            if let Err(del_err) = redis::cmd("DEL")
                .arg(&key)
                .query_async::<_, ()>(&mut conn)
                .await
            {
                tracing::warn!("Failed to roll back unindexed result {}: {}", key, del_err);
            }
            return Err(AppError::StorageError(format!(
                "Failed to index result expiry: {}",
                e
            )));
        }

        Ok(true)
    }

    async fn fetch(&self, request_id: &str) -> Result<Option<CheckResult>, AppError> {
        let mut conn = self.client.clone();

        let json: Option<String> = redis::cmd("GET")
            .arg(record_key(request_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to read result from Redis: {}", e)))?;

        match json {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                AppError::StorageError(format!("Corrupt result {} in Redis: {}", request_id, e))
            }),
            None => Ok(None),
        }
    }

    async fn remove(&self, request_id: &str) -> Result<bool, AppError> {
        let mut conn = self.client.clone();

        let (deleted,): (usize,) = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(record_key(request_id))
            .cmd("ZREM")
            .arg(&self.expiry_index)
            .arg(request_id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                AppError::StorageError(format!("Failed to delete result from Redis: {}", e))
            })?;

        Ok(deleted > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let mut conn = self.client.clone();

        let expired: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.expiry_index)
            .arg("-inf")
            .arg(now.timestamp_millis())
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to scan expiry index: {}", e)))?;

        if expired.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = expired.iter().map(|id| record_key(id)).collect();

        // Native EX may already have dropped the value; the index entry is
        // what counts as the purged record
        let (purged,): (usize,) = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(&keys)
            .ignore()
            .cmd("ZREM")
            .arg(&self.expiry_index)
            .arg(&expired)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to purge expired results: {}", e)))?;

        Ok(purged)
    }
}
