//! The record store consumed by the gateway.
//!
//! A record is identified by a namespace, a set and a user key. It holds named, typed bins and
//! carries a generation (bumped on every write) and an expiration. The store has no notion of
//! hash fields, lists or multi-key transactions: those are emulated on top of the primitives
//! exposed by the [`Backend`] trait.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error as ThisError;

pub mod memory;

/// Expiration reported for records that never expire.
pub const NEVER_EXPIRES: u32 = u32::MAX;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub namespace: String,
    pub set: String,
    pub user_key: String,
}

impl Key {
    pub fn new(
        namespace: impl Into<String>,
        set: impl Into<String>,
        user_key: impl Into<String>,
    ) -> Key {
        Key {
            namespace: namespace.into(),
            set: set.into(),
            user_key: user_key.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.set, self.user_key)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Writing `Nil` to a bin removes it.
    Nil,
    Int(i64),
    Str(String),
    Blob(Bytes),
    List(Vec<Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Blob(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bin {
    pub name: String,
    pub value: Value,
}

impl Bin {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Bin {
        Bin {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub bins: BTreeMap<String, Value>,
    pub generation: u32,
    /// Remaining time to live in seconds, [`NEVER_EXPIRES`] when the record does not expire.
    pub expiration: u32,
}

impl Record {
    pub fn bin(&self, name: &str) -> Option<&Value> {
        self.bins.get(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub generation: u32,
    pub expiration: u32,
}

/// The expiration applied by a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Expiration {
    /// Keep the current expiration; new records get the namespace default.
    #[default]
    Unchanged,
    /// Expire after the given number of seconds. Zero means the namespace default.
    Seconds(u32),
}

impl Expiration {
    /// Interprets a client supplied TTL, where `-1` leaves the expiration untouched.
    pub fn from_seconds(ttl: i64) -> Option<Expiration> {
        match ttl {
            -1 => Some(Expiration::Unchanged),
            ttl => u32::try_from(ttl).ok().map(Expiration::Seconds),
        }
    }

    pub fn as_seconds(&self) -> i64 {
        match self {
            Expiration::Unchanged => -1,
            Expiration::Seconds(seconds) => i64::from(*seconds),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordExists {
    #[default]
    Update,
    CreateOnly,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WritePolicy {
    pub expiration: Expiration,
    pub exists: RecordExists,
    /// When set, the write fails with [`BackendError::GenerationConflict`] unless the stored
    /// generation matches.
    pub generation: Option<u32>,
}

impl WritePolicy {
    pub fn new(expiration: Expiration) -> WritePolicy {
        WritePolicy {
            expiration,
            ..Default::default()
        }
    }

    pub fn create_only(expiration: Expiration) -> WritePolicy {
        WritePolicy {
            expiration,
            exists: RecordExists::CreateOnly,
            generation: None,
        }
    }

    pub fn with_generation(self, generation: u32) -> WritePolicy {
        WritePolicy {
            generation: Some(generation),
            ..self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListEnd {
    Head,
    Tail,
}

/// One step of an atomic multi-operation on a single record.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Put(Bin),
    Add { bin: String, delta: i64 },
    Get(String),
    ListPush { bin: String, end: ListEnd, value: Value },
    ListPop { bin: String, end: ListEnd },
    ListSize(String),
    Touch,
}

impl Operation {
    pub fn is_write(&self) -> bool {
        !matches!(self, Operation::Get(_) | Operation::ListSize(_))
    }
}

/// Secondary index predicate used by [`Backend::query`].
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Equal { bin: String, value: Value },
}

impl Filter {
    pub fn equal(bin: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::Equal {
            bin: bin.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Equal { bin, value } => record.bin(bin) == Some(value),
        }
    }
}

pub type RecordStream = BoxStream<'static, BackendResult<(Key, Record)>>;

#[derive(Clone, Debug, ThisError, PartialEq)]
pub enum BackendError {
    #[error("key not found")]
    NotFound,
    #[error("key already exists")]
    AlreadyExists,
    #[error("generation error")]
    GenerationConflict,
    #[error("bin type error on '{0}'")]
    TypeMismatch(String),
    #[error("parameter error: {0}")]
    InvalidParameter(String),
    #[error("connection to the cluster lost: {0}")]
    ConnectivityLost(String),
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Whether a check-and-set attempt lost a race and may be retried from a fresh read.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            BackendError::GenerationConflict | BackendError::AlreadyExists
        )
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Reads the given bins, or every bin when `bins` is empty.
    async fn get(&self, key: &Key, bins: &[&str]) -> BackendResult<Option<Record>>;

    async fn get_header(&self, key: &Key) -> BackendResult<Option<Header>>;

    async fn put(&self, key: &Key, bins: Vec<Bin>, policy: &WritePolicy) -> BackendResult<()>;

    async fn put_if_generation(
        &self,
        key: &Key,
        bins: Vec<Bin>,
        generation: u32,
        expiration: Expiration,
    ) -> BackendResult<()> {
        let policy = WritePolicy::new(expiration).with_generation(generation);
        self.put(key, bins, &policy).await
    }

    /// Returns whether a record was removed.
    async fn delete(&self, key: &Key) -> BackendResult<bool>;

    /// Fails with [`BackendError::NotFound`] when the record does not exist.
    async fn touch(&self, key: &Key, expiration: Expiration) -> BackendResult<()>;

    async fn add(
        &self,
        key: &Key,
        bin: &str,
        delta: i64,
        policy: &WritePolicy,
    ) -> BackendResult<i64> {
        let ops = vec![
            Operation::Add {
                bin: bin.to_string(),
                delta,
            },
            Operation::Get(bin.to_string()),
        ];
        let record = self.operate(key, ops, policy).await?;

        record
            .bin(bin)
            .and_then(Value::as_int)
            .ok_or_else(|| BackendError::Other(format!("add on '{bin}' returned no value")))
    }

    /// Applies `ops` atomically, in order. The returned record holds the results of the read
    /// operations (`Get`, `ListPop`, `ListSize`) keyed by bin name. A read-only operation on a
    /// missing record fails with [`BackendError::NotFound`].
    async fn operate(
        &self,
        key: &Key,
        ops: Vec<Operation>,
        policy: &WritePolicy,
    ) -> BackendResult<Record>;

    async fn query(&self, namespace: &str, set: &str, filter: Filter)
        -> BackendResult<RecordStream>;

    async fn scan(&self, namespace: &str, set: &str) -> BackendResult<RecordStream>;

    fn is_connected(&self) -> bool;
}
