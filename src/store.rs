use std::future::Future;
use std::sync::Arc;

use thiserror::Error as ThisError;
use tracing::debug;

use crate::backend::{
    Backend, BackendError, Bin, Expiration, Key, Value, WritePolicy,
};
use crate::composite::{CompositeMap, ExpandedMap};
use crate::encoding::{ValueCodec, ValueError};
use crate::frame::Frame;

/// Bin holding the value of string and list keys.
pub const VALUE_BIN: &str = "r";

pub const DEFAULT_MAX_RETRIES: usize = 5;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Value(#[from] ValueError),
    #[error("{op} aborted after {retries} retries on concurrent updates")]
    RetriesExhausted { op: &'static str, retries: usize },
}

/// Everything a listener needs to know to translate commands into record operations.
#[derive(Clone)]
pub struct Settings {
    pub namespace: String,
    pub set: String,
    pub legacy_encoding: bool,
    pub max_retries: usize,
    pub expanded: Option<ExpandedMap>,
}

impl Settings {
    pub fn new(namespace: impl Into<String>, set: impl Into<String>) -> Settings {
        Settings {
            namespace: namespace.into(),
            set: set.into(),
            legacy_encoding: false,
            max_retries: DEFAULT_MAX_RETRIES,
            expanded: None,
        }
    }
}

/// The data-model translation layer shared by every connection of a listener.
///
/// It owns the backend handle and the policies commands are executed with, and provides the
/// building blocks commands are written with: key construction, value replies and the bounded
/// retry loop used for read-modify-write cycles guarded by the record generation.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    namespace: String,
    set: String,
    codec: ValueCodec,
    max_retries: usize,
    expanded: Option<ExpandedMap>,
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>, settings: Settings) -> Store {
        Store {
            inner: Arc::new(Inner {
                backend,
                namespace: settings.namespace,
                set: settings.set,
                codec: ValueCodec::new(settings.legacy_encoding),
                max_retries: settings.max_retries,
                expanded: settings.expanded,
            }),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn set(&self) -> &str {
        &self.inner.set
    }

    pub fn codec(&self) -> ValueCodec {
        self.inner.codec
    }

    pub fn key(&self, user_key: &str) -> Key {
        Key::new(&*self.inner.namespace, &*self.inner.set, user_key)
    }

    /// The composite-key layer, when hashes of this listener are expanded over many records.
    pub fn composite(&self) -> Option<CompositeMap<'_>> {
        self.inner
            .expanded
            .as_ref()
            .map(|expanded| CompositeMap::new(self, expanded))
    }

    /// Replies with a bin value, or the null bulk string when it is missing.
    pub fn bulk(&self, value: Option<&Value>) -> Result<Frame, StoreError> {
        match value {
            Some(value) => Ok(Frame::Bulk(self.codec().decode(value)?)),
            None => Ok(Frame::Null),
        }
    }

    /// Reads one bin of a record and replies with its value.
    pub async fn read_bin(&self, user_key: &str, bin: &str) -> Result<Frame, StoreError> {
        let key = self.key(user_key);
        let record = self.backend().get(&key, &[bin]).await?;

        self.bulk(record.as_ref().and_then(|record| record.bin(bin)))
    }

    /// Adds `delta` to an integer bin and replies with the new value. A bin holding anything but
    /// an integer yields the null bulk string.
    pub async fn incr(
        &self,
        key: &Key,
        bin: &str,
        delta: i64,
        expiration: Expiration,
    ) -> Result<Frame, StoreError> {
        let policy = WritePolicy::new(expiration);

        match self.backend().add(key, bin, delta, &policy).await {
            Ok(value) => Ok(Frame::Integer(value)),
            Err(BackendError::TypeMismatch(_)) => Ok(Frame::Null),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes `bins`, guarded by the generation read just before, and reports whether
    /// `presence_bin` was absent (the field is created) or present (it is overwritten).
    ///
    /// Absent records are written with a create-only policy, so concurrent creators race on the
    /// same guard as concurrent updaters.
    pub async fn guarded_put(
        &self,
        op: &'static str,
        key: &Key,
        presence_bin: &str,
        bins: Vec<Bin>,
        expiration: Expiration,
    ) -> Result<bool, StoreError> {
        self.with_retries(op, || {
            let bins = bins.clone();
            async move {
                let record = self.backend().get(key, &[presence_bin]).await?;

                let created = match record {
                    Some(record) => {
                        self.backend()
                            .put_if_generation(key, bins, record.generation, expiration)
                            .await?;
                        record.bin(presence_bin).is_none()
                    }
                    None => {
                        let policy = WritePolicy::create_only(expiration);
                        self.backend().put(key, bins, &policy).await?;
                        true
                    }
                };

                Ok::<_, BackendError>(created)
            }
        })
        .await
    }

    /// Runs `attempt` until it succeeds, fails with an error other than a lost race, or lost
    /// the race `max_retries` more times.
    pub async fn with_retries<T, F, Fut>(
        &self,
        op: &'static str,
        mut attempt: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let retries = self.inner.max_retries;

        for retry in 0..=retries {
            match attempt().await {
                Err(err) if err.is_conflict() => {
                    debug!(op, retry, "concurrent update detected, retrying");
                }
                res => return res.map_err(StoreError::from),
            }
        }

        Err(StoreError::RetriesExhausted { op, retries })
    }
}
