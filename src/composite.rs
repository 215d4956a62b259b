//! Expanded maps: one logical hash spread over many records.
//!
//! A logical key `K` owns a root record `composite_K_____MAIN____` whose `z` bin holds a suffix
//! token `K_<8 random letters>`. Each field `F` lives in its own record `composite_<token>_F`,
//! which points back to the token through its `m` bin so the whole hash can be listed with an
//! equality query. Deleting the root orphans the field records; a later write creates a new
//! token, so the orphans are never seen again and expire on their own.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::TryStreamExt;
use rand::Rng;
use tokio::time::Duration;
use tracing::debug;

use crate::backend::{
    BackendError, Bin, Expiration, Filter, Key, Operation, Value, WritePolicy,
};
use crate::cache::LookupCache;
use crate::frame::Frame;
use crate::store::{Store, StoreError};

pub const MAIN_SUFFIX: &str = "____MAIN____";
pub const ROOT_BIN: &str = "z";
pub const VALUE_BIN: &str = "v";
pub const MAIN_KEY_BIN: &str = "m";
pub const FIELD_BIN: &str = "s";
pub const CREATED_AT_BIN: &str = "created_at";

/// Field records are rewritten with this time to live unless configured otherwise.
pub const DEFAULT_TTL: u32 = 3600 * 24 * 31;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

const TOKEN_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TOKEN_LEN: usize = 8;

#[derive(Clone)]
pub struct ExpandedMap {
    pub default_ttl: u32,
    pub cache: Option<Arc<dyn LookupCache>>,
    pub cache_ttl: Duration,
}

impl Default for ExpandedMap {
    fn default() -> Self {
        ExpandedMap {
            default_ttl: DEFAULT_TTL,
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

pub struct CompositeMap<'a> {
    store: &'a Store,
    expanded: &'a ExpandedMap,
}

impl<'a> CompositeMap<'a> {
    pub fn new(store: &'a Store, expanded: &'a ExpandedMap) -> CompositeMap<'a> {
        CompositeMap { store, expanded }
    }

    pub fn root_key(&self, key: &str) -> Key {
        self.composite_key(key, MAIN_SUFFIX)
    }

    pub fn composite_key(&self, token: &str, field: &str) -> Key {
        self.store.key(&format!("composite_{token}_{field}"))
    }

    fn field_policy(&self) -> WritePolicy {
        WritePolicy::new(Expiration::Seconds(self.expanded.default_ttl))
    }

    fn cache_set(&self, key: &str, token: &str) {
        if let Some(cache) = &self.expanded.cache {
            cache.set(key, token.to_string(), self.expanded.cache_ttl);
        }
    }

    fn forget(&self, key: &str) {
        if let Some(cache) = &self.expanded.cache {
            cache.delete(key);
        }
    }

    /// Finds the suffix token of `key`, consulting the lookup cache first.
    pub async fn resolve(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(token) = self.expanded.cache.as_ref().and_then(|cache| cache.get(key)) {
            return Ok(Some(token));
        }

        let record = self
            .store
            .backend()
            .get(&self.root_key(key), &[ROOT_BIN])
            .await?;

        let token = record
            .as_ref()
            .and_then(|record| record.bin(ROOT_BIN))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(token) = &token {
            self.cache_set(key, token);
        }

        Ok(token)
    }

    /// Reads the token held by a root record, refreshing its expiration on the way unless
    /// `expiration` leaves it unchanged.
    async fn live_token(
        &self,
        root: &Key,
        expiration: Expiration,
    ) -> Result<Option<String>, StoreError> {
        let mut ops = vec![Operation::Get(ROOT_BIN.to_string())];
        if expiration != Expiration::Unchanged {
            ops.push(Operation::Touch);
        }

        let res = self
            .store
            .backend()
            .operate(root, ops, &WritePolicy::new(expiration))
            .await;

        match res {
            Ok(record) => Ok(record
                .bin(ROOT_BIN)
                .and_then(Value::as_str)
                .map(str::to_string)),
            Err(BackendError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Finds the suffix token of `key`, creating the root record when there is none. An existing
    /// root gets its expiration refreshed unless `expiration` leaves it unchanged.
    ///
    /// Writes always read the root itself: a cached token may have outlived it.
    pub async fn resolve_or_create(
        &self,
        key: &str,
        expiration: Expiration,
    ) -> Result<String, StoreError> {
        let root = self.root_key(key);
        let mut can_retry = true;

        loop {
            match self.live_token(&root, expiration).await? {
                Some(token) => {
                    self.cache_set(key, &token);
                    return Ok(token);
                }
                None => self.forget(key),
            }

            let token = new_token(key);
            let bins = vec![
                Bin::new(ROOT_BIN, token.as_str()),
                Bin::new(CREATED_AT_BIN, now_nanos()),
            ];
            let policy = WritePolicy::create_only(expiration);

            match self.store.backend().put(&root, bins, &policy).await {
                Ok(()) => {
                    debug!(key, %token, "composite root created");
                    self.cache_set(key, &token);
                    return Ok(token);
                }
                // Another client created the root in between: use theirs.
                Err(BackendError::AlreadyExists) if can_retry => can_retry = false,
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Frame, StoreError> {
        let Some(token) = self.resolve(key).await? else {
            return Ok(Frame::Null);
        };

        let record = self
            .store
            .backend()
            .get(&self.composite_key(&token, field), &[VALUE_BIN])
            .await?;

        self.store
            .bulk(record.as_ref().and_then(|record| record.bin(VALUE_BIN)))
    }

    pub async fn hmget(&self, key: &str, fields: &[String]) -> Result<Frame, StoreError> {
        let Some(token) = self.resolve(key).await? else {
            return Ok(Frame::Array(vec![Frame::Null; fields.len()]));
        };

        let mut frames = Vec::with_capacity(fields.len());
        for field in fields {
            let record = self
                .store
                .backend()
                .get(&self.composite_key(&token, field), &[VALUE_BIN])
                .await?;
            frames.push(
                self.store
                    .bulk(record.as_ref().and_then(|record| record.bin(VALUE_BIN)))?,
            );
        }

        Ok(Frame::Array(frames))
    }

    fn field_bins(&self, token: &str, field: &str, value: &Bytes) -> Vec<Bin> {
        vec![
            Bin::new(MAIN_KEY_BIN, token),
            Bin::new(FIELD_BIN, field),
            Bin::new(VALUE_BIN, self.store.codec().encode(value)),
            Bin::new(CREATED_AT_BIN, now_nanos()),
        ]
    }

    /// Sets one field and reports whether it was created.
    pub async fn hset(
        &self,
        key: &str,
        field: &str,
        value: &Bytes,
        expiration: Expiration,
    ) -> Result<bool, StoreError> {
        let token = self.resolve_or_create(key, expiration).await?;
        let field_key = self.composite_key(&token, field);
        let bins = self.field_bins(&token, field, value);

        self.store
            .guarded_put(
                "HSET",
                &field_key,
                VALUE_BIN,
                bins,
                Expiration::Seconds(self.expanded.default_ttl),
            )
            .await
    }

    pub async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let Some(token) = self.resolve(key).await? else {
            return Ok(false);
        };

        let existed = self
            .store
            .backend()
            .delete(&self.composite_key(&token, field))
            .await?;

        Ok(existed)
    }

    pub async fn hmset(&self, key: &str, pairs: &[(String, Bytes)]) -> Result<(), StoreError> {
        let token = self.resolve_or_create(key, Expiration::Unchanged).await?;
        let policy = self.field_policy();

        for (field, value) in pairs {
            let bins = self.field_bins(&token, field, value);
            self.store
                .backend()
                .put(&self.composite_key(&token, field), bins, &policy)
                .await?;
        }

        Ok(())
    }

    pub async fn hgetall(&self, key: &str) -> Result<Frame, StoreError> {
        let Some(token) = self.resolve(key).await? else {
            return Ok(Frame::Array(vec![]));
        };

        let records: Vec<(Key, _)> = self
            .store
            .backend()
            .query(
                self.store.namespace(),
                self.store.set(),
                Filter::equal(MAIN_KEY_BIN, token.as_str()),
            )
            .await?
            .try_collect()
            .await?;

        let mut frames = Vec::with_capacity(records.len() * 2);
        for (_, record) in &records {
            let (Some(field), Some(value)) = (record.bin(FIELD_BIN), record.bin(VALUE_BIN)) else {
                continue;
            };
            frames.push(self.store.bulk(Some(field))?);
            frames.push(self.store.bulk(Some(value))?);
        }

        Ok(Frame::Array(frames))
    }

    fn incr_ops(token: &str, field: &str, delta: i64) -> Vec<Operation> {
        vec![
            Operation::Put(Bin::new(MAIN_KEY_BIN, token)),
            Operation::Put(Bin::new(FIELD_BIN, field)),
            Operation::Add {
                bin: VALUE_BIN.to_string(),
                delta,
            },
        ]
    }

    /// Increments one field and replies with its new value, or null when the field does not
    /// hold an integer.
    pub async fn hincrby(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        expiration: Expiration,
    ) -> Result<Frame, StoreError> {
        let token = self.resolve_or_create(key, expiration).await?;
        let mut ops = Self::incr_ops(&token, field, delta);
        ops.push(Operation::Get(VALUE_BIN.to_string()));

        let res = self
            .store
            .backend()
            .operate(&self.composite_key(&token, field), ops, &self.field_policy())
            .await;

        match res {
            Ok(record) => match record.bin(VALUE_BIN).and_then(Value::as_int) {
                Some(value) => Ok(Frame::Integer(value)),
                None => Ok(Frame::Null),
            },
            Err(BackendError::TypeMismatch(_)) => Ok(Frame::Null),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn hmincrbyex(
        &self,
        key: &str,
        expiration: Expiration,
        increments: &[(String, i64)],
    ) -> Result<(), StoreError> {
        let token = self.resolve_or_create(key, expiration).await?;
        let policy = self.field_policy();

        for (field, delta) in increments {
            let ops = Self::incr_ops(&token, field, *delta);
            self.store
                .backend()
                .operate(&self.composite_key(&token, field), ops, &policy)
                .await?;
        }

        Ok(())
    }

    /// Touches the root record. Returns `false` when there is no root.
    pub async fn expire_root(&self, key: &str, expiration: Expiration) -> Result<bool, StoreError> {
        match self
            .store
            .backend()
            .touch(&self.root_key(key), expiration)
            .await
        {
            Ok(()) => Ok(true),
            Err(BackendError::NotFound) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Remaining time to live of the root record, if there is one.
    pub async fn root_ttl(&self, key: &str) -> Result<Option<u32>, StoreError> {
        let header = self.store.backend().get_header(&self.root_key(key)).await?;
        Ok(header.map(|header| header.expiration))
    }

    /// Deletes the root record, forgetting the cached token. Returns `false` when there is none.
    pub async fn delete_root(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.store.backend().delete(&self.root_key(key)).await?;
        self.forget(key);

        Ok(existed)
    }

    /// Drops every cached token, after the records behind them were removed wholesale.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.expanded.cache {
            cache.clear();
        }
    }
}

fn new_token(key: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TOKEN_LEN)
        .map(|_| TOKEN_LETTERS[rng.gen_range(0..TOKEN_LETTERS.len())] as char)
        .collect();

    format!("{key}_{suffix}")
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
