//! Key-value cache holding order book snapshots and signal windows.
//!
//! Only the handful of operations the relay needs are exposed: whole-hash
//! replace, capped list append, and scalar get/set.

use std::collections::{HashMap, VecDeque};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Replaces the whole hash at `key` with `entries`. An empty slice removes the key.
    async fn hash_replace(&self, key: &str, entries: &[(String, String)]) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Appends `values` to the list and keeps only the last `max_len` entries.
    async fn list_push_capped(&self, key: &str, values: &[String], max_len: usize) -> Result<()>;

    /// Replaces the list with `values`, keeping only the last `max_len` entries.
    async fn list_replace(&self, key: &str, values: &[String], max_len: usize) -> Result<()>;

    async fn list_all(&self, key: &str) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

fn trim_start(max_len: usize) -> isize {
    -isize::try_from(max_len).unwrap_or(isize::MAX)
}

/// Redis-backed cache. The connection manager is cheap to clone and reconnects on its own.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis at `url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid Redis URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn
            .hgetall(key)
            .await
            .with_context(|| format!("HGETALL {key}"))?;
        Ok(map)
    }

    async fn hash_replace(&self, key: &str, entries: &[(String, String)]) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !entries.is_empty() {
            pipe.hset_multiple(key, entries).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .with_context(|| format!("replace hash {key}"))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(key)
            .await
            .with_context(|| format!("EXISTS {key}"))?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.with_context(|| format!("DEL {key}"))?;
        Ok(())
    }

    async fn list_push_capped(&self, key: &str, values: &[String], max_len: usize) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .rpush(key, values.to_vec())
            .ignore()
            .ltrim(key, trim_start(max_len), -1)
            .ignore()
            .query_async(&mut conn)
            .await
            .with_context(|| format!("append to list {key}"))?;
        Ok(())
    }

    async fn list_replace(&self, key: &str, values: &[String], max_len: usize) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !values.is_empty() {
            pipe.rpush(key, values.to_vec())
                .ignore()
                .ltrim(key, trim_start(max_len), -1)
                .ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .with_context(|| format!("replace list {key}"))?;
        Ok(())
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn
            .lrange(key, 0, -1)
            .await
            .with_context(|| format!("LRANGE {key}"))?;
        Ok(values)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.with_context(|| format!("GET {key}"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(key, value)
            .await
            .with_context(|| format!("SET {key}"))?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryCacheState {
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
    scalars: HashMap<String, String>,
}

impl MemoryCacheState {
    fn remove(&mut self, key: &str) {
        self.hashes.remove(key);
        self.lists.remove(key);
        self.scalars.remove(key);
    }
}

/// In-process cache with the same semantics as [`RedisCache`].
#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<MemoryCacheState>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn push_capped(list: &mut VecDeque<String>, values: &[String], max_len: usize) {
    list.extend(values.iter().cloned());
    while list.len() > max_len {
        list.pop_front();
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.state.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_replace(&self, key: &str, entries: &[(String, String)]) -> Result<()> {
        let mut state = self.state.lock();
        state.remove(key);
        if !entries.is_empty() {
            state
                .hashes
                .insert(key.to_string(), entries.iter().cloned().collect());
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let state = self.state.lock();
        Ok(state.hashes.contains_key(key)
            || state.lists.contains_key(key)
            || state.scalars.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state.lock().remove(key);
        Ok(())
    }

    async fn list_push_capped(&self, key: &str, values: &[String], max_len: usize) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock();
        let list = state.lists.entry(key.to_string()).or_default();
        push_capped(list, values, max_len);
        Ok(())
    }

    async fn list_replace(&self, key: &str, values: &[String], max_len: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.remove(key);
        if !values.is_empty() {
            let mut list = VecDeque::with_capacity(values.len().min(max_len));
            push_capped(&mut list, values, max_len);
            state.lists.insert(key.to_string(), list);
        }
        Ok(())
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().scalars.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.remove(key);
        state.scalars.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
