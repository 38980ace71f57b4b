//! TTL'd key/value cache backed by the warehouse database.
//!
//! Key contracts (namespaces) live in `config::cache_keys`. TTLs are
//! freshness hints; stale blobs remain readable as fallbacks when upstream
//! APIs fail. Writes are idempotent last-writer-wins.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::storage::Warehouse;

#[derive(Clone)]
pub struct KvCache {
    conn: Arc<Mutex<Connection>>,
}

impl KvCache {
    pub fn new(warehouse: &Warehouse) -> Self {
        Self {
            conn: warehouse.raw(),
        }
    }

    /// Raw read: value plus stored-at seconds, regardless of freshness.
    pub fn get(&self, key: &str) -> Result<Option<(String, i64)>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT cache_json, fetched_at FROM kv_cache WHERE cache_key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("cache get")
    }

    pub fn put(&self, key: &str, value: &str, now_secs: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv_cache (cache_key, cache_json, fetched_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET
                cache_json = excluded.cache_json,
                fetched_at = excluded.fetched_at",
            params![key, value, now_secs],
        )
        .context("cache put")?;
        Ok(())
    }

    /// Typed read honoring the TTL. Returns the deserialized value plus a
    /// staleness flag; callers may still use a stale value as fallback.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl_secs: i64,
        now_secs: i64,
    ) -> Result<Option<(T, bool)>> {
        let Some((json, fetched_at)) = self.get(key)? else {
            return Ok(None);
        };
        let stale = now_secs - fetched_at > ttl_secs;
        match serde_json::from_str(&json) {
            Ok(v) => Ok(Some((v, stale))),
            Err(_) => Ok(None),
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &str, value: &T, now_secs: i64) -> Result<()> {
        let json = serde_json::to_string(value).context("serialize cache value")?;
        self.put(key, &json, now_secs)
    }

    /// Drop entries stored before `cutoff_secs`. Best-effort housekeeping.
    pub fn purge_older_than(&self, cutoff_secs: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM kv_cache WHERE fetched_at < ?1",
            params![cutoff_secs],
        )?;
        Ok(n)
    }
}

/// Namespaced key for a per-token or per-wallet entry.
pub fn scoped_key(namespace: &str, id: &str) -> String {
    format!("{}:{}", namespace, id.to_lowercase())
}
