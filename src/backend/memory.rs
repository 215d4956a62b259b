use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Notify;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

use super::{
    Backend, BackendError, BackendResult, Bin, Expiration, Filter, Header, Key, ListEnd,
    Operation, Record, RecordExists, RecordStream, Value, WritePolicy, NEVER_EXPIRES,
};

/// Longest bin name accepted by the store.
pub const MAX_BIN_NAME_LEN: usize = 15;

/// An in-process record store with the same semantics as the remote one: generations,
/// create-only writes, per-record expiration, list bins and an equality index on any bin.
///
/// Expired records are removed by a background task and are also hidden at access time, so a
/// record is never observed after its deadline. The handle is cheap to clone.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    waker: Notify,
    connected: AtomicBool,
    forced_conflicts: AtomicUsize,
}

#[derive(Default)]
struct State {
    records: BTreeMap<Key, Entry>,
    expirations: BTreeSet<(Instant, Key)>,
    preempted_creates: VecDeque<Vec<Bin>>,
    delete_budget: Option<usize>,
}

#[derive(Clone, Debug)]
struct Entry {
    bins: BTreeMap<String, Value>,
    generation: u32,
    expires_at: Option<Instant>,
}

impl MemoryBackend {
    /// Creates an empty store. Must be called from within a tokio runtime.
    pub fn new() -> MemoryBackend {
        let inner = Arc::new(Inner {
            state: Mutex::new(State::default()),
            waker: Notify::new(),
            connected: AtomicBool::new(true),
            forced_conflicts: AtomicUsize::new(0),
        });

        tokio::spawn({
            let inner = inner.clone();
            async move { remove_expired_records(inner).await }
        });

        MemoryBackend { inner }
    }

    /// Makes the next `n` generation-guarded writes fail with a generation conflict, as if
    /// another client had written the record in between.
    pub fn fail_next_generation_checks(&self, n: usize) {
        self.inner.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Makes the next create-only write fail as if another client had created the record with
    /// `bins` just before. With no bins the other record is already gone again when the write
    /// fails.
    pub fn preempt_next_create(&self, bins: Vec<Bin>) {
        self.inner.lock().preempted_creates.push_back(bins);
    }

    /// Lets `n` more deletes through and fails every one after them.
    pub fn fail_deletes_after(&self, n: usize) {
        self.inner.lock().delete_budget = Some(n);
    }

    /// Simulates losing (or regaining) the connection to the cluster.
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of live records, across every namespace and set.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .records
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_connected(&self) -> BackendResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BackendError::ConnectivityLost(
                "no node of the cluster is reachable".to_string(),
            ))
        }
    }

    fn take_forced_conflict(&self) -> bool {
        self.inner
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn records_where<F>(&self, namespace: &str, set: &str, predicate: F) -> RecordStream
    where
        F: Fn(&Record) -> bool,
    {
        let now = Instant::now();
        let state = self.inner.lock();

        let records: Vec<BackendResult<(Key, Record)>> = state
            .records
            .iter()
            .filter(|(key, entry)| {
                key.namespace == namespace && key.set == set && !entry.is_expired(now)
            })
            .map(|(key, entry)| (key.clone(), entry.to_record(now, &[])))
            .filter(|(_, record)| predicate(record))
            .map(Ok)
            .collect();

        stream::iter(records).boxed()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Entry {
    fn new() -> Entry {
        Entry {
            bins: BTreeMap::new(),
            generation: 0,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    fn remaining(&self, now: Instant) -> u32 {
        match self.expires_at {
            None => NEVER_EXPIRES,
            Some(expires_at) => {
                let millis = expires_at.saturating_duration_since(now).as_millis();
                let seconds = millis.div_ceil(1000);
                u32::try_from(seconds).unwrap_or(NEVER_EXPIRES - 1)
            }
        }
    }

    fn to_record(&self, now: Instant, bins: &[&str]) -> Record {
        let bins = self
            .bins
            .iter()
            .filter(|(name, _)| bins.is_empty() || bins.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Record {
            bins,
            generation: self.generation,
            expiration: self.remaining(now),
        }
    }

    fn apply(&mut self, op: Operation, result: &mut Record) -> BackendResult<()> {
        match op {
            Operation::Put(Bin { name, value }) => {
                check_bin_name(&name)?;
                match value {
                    Value::Nil => {
                        self.bins.remove(&name);
                    }
                    value => {
                        self.bins.insert(name, value);
                    }
                }
            }
            Operation::Add { bin, delta } => {
                check_bin_name(&bin)?;
                let current = match self.bins.get(&bin) {
                    None => 0,
                    Some(Value::Int(i)) => *i,
                    Some(_) => return Err(BackendError::TypeMismatch(bin)),
                };
                let sum = current.checked_add(delta).ok_or_else(|| {
                    BackendError::InvalidParameter(format!("integer overflow on '{bin}'"))
                })?;
                self.bins.insert(bin, Value::Int(sum));
            }
            Operation::Get(bin) => {
                if let Some(value) = self.bins.get(&bin) {
                    result.bins.insert(bin, value.clone());
                }
            }
            Operation::ListPush { bin, end, value } => {
                check_bin_name(&bin)?;
                let list = self.list_mut(&bin)?;
                match end {
                    ListEnd::Head => list.insert(0, value),
                    ListEnd::Tail => list.push(value),
                }
            }
            Operation::ListPop { bin, end } => {
                let popped = match self.bins.get_mut(&bin) {
                    None => None,
                    Some(Value::List(list)) if list.is_empty() => None,
                    Some(Value::List(list)) => match end {
                        ListEnd::Head => Some(list.remove(0)),
                        ListEnd::Tail => list.pop(),
                    },
                    Some(_) => return Err(BackendError::TypeMismatch(bin)),
                };
                if let Some(value) = popped {
                    result.bins.insert(bin, value);
                }
            }
            Operation::ListSize(bin) => {
                let size = match self.bins.get(&bin) {
                    None => 0,
                    Some(Value::List(list)) => list.len(),
                    Some(_) => return Err(BackendError::TypeMismatch(bin)),
                };
                result.bins.insert(bin, Value::Int(size as i64));
            }
            Operation::Touch => {}
        }

        Ok(())
    }

    fn list_mut(&mut self, bin: &str) -> BackendResult<&mut Vec<Value>> {
        let value = self
            .bins
            .entry(bin.to_string())
            .or_insert_with(|| Value::List(Vec::new()));

        match value {
            Value::List(list) => Ok(list),
            _ => Err(BackendError::TypeMismatch(bin.to_string())),
        }
    }
}

impl State {
    /// Returns the live entry for `key`, dropping it first when its deadline has passed.
    fn live(&mut self, key: &Key, now: Instant) -> Option<&Entry> {
        self.expire_if_due(key, now);
        self.records.get(key)
    }

    fn expire_if_due(&mut self, key: &Key, now: Instant) {
        if self.records.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.remove(key);
        }
    }

    fn remove(&mut self, key: &Key) -> Option<Entry> {
        let entry = self.records.remove(key)?;
        if let Some(expires_at) = entry.expires_at {
            self.expirations.remove(&(expires_at, key.clone()));
        }
        Some(entry)
    }

    /// Stores `entry`, keeping the expiration index in sync. Returns whether the new deadline is
    /// now the earliest one.
    fn store(&mut self, key: &Key, entry: Entry) -> bool {
        if let Some(previous) = self.records.get(key).and_then(|entry| entry.expires_at) {
            self.expirations.remove(&(previous, key.clone()));
        }

        let expires_at = entry.expires_at;
        if entry.bins.is_empty() {
            self.records.remove(key);
            return false;
        }
        self.records.insert(key.clone(), entry);

        match expires_at {
            Some(expires_at) => {
                self.expirations.insert((expires_at, key.clone()));
                self.expirations.iter().next().map(|(_, next)| next) == Some(key)
            }
            None => false,
        }
    }

    fn remove_expired_records(&mut self) -> Option<Instant> {
        let now = Instant::now();

        let expired: Vec<(Instant, Key)> = self
            .expirations
            .iter()
            .take_while(|(expires_at, _)| *expires_at <= now)
            .cloned()
            .collect();

        for (expires_at, key) in expired {
            debug!(%key, "record expired");
            self.records.remove(&key);
            self.expirations.remove(&(expires_at, key));
        }

        self.expirations
            .iter()
            .next()
            .map(|(expires_at, _)| *expires_at)
    }
}

fn check_bin_name(name: &str) -> BackendResult<()> {
    if name.len() > MAX_BIN_NAME_LEN {
        return Err(BackendError::InvalidParameter(format!(
            "bin name '{name}' is longer than {MAX_BIN_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

fn deadline(expiration: Expiration, current: Option<Instant>, now: Instant) -> Option<Instant> {
    match expiration {
        Expiration::Unchanged => current,
        // The namespace default: records never expire.
        Expiration::Seconds(0) => None,
        Expiration::Seconds(seconds) => Some(now + Duration::from_secs(u64::from(seconds))),
    }
}

fn creates_data(op: &Operation) -> bool {
    matches!(
        op,
        Operation::Put(_) | Operation::Add { .. } | Operation::ListPush { .. }
    )
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &Key, bins: &[&str]) -> BackendResult<Option<Record>> {
        self.ensure_connected()?;
        let now = Instant::now();
        let mut state = self.inner.lock();

        Ok(state.live(key, now).map(|entry| entry.to_record(now, bins)))
    }

    async fn get_header(&self, key: &Key) -> BackendResult<Option<Header>> {
        self.ensure_connected()?;
        let now = Instant::now();
        let mut state = self.inner.lock();

        Ok(state.live(key, now).map(|entry| Header {
            generation: entry.generation,
            expiration: entry.remaining(now),
        }))
    }

    async fn put(&self, key: &Key, bins: Vec<Bin>, policy: &WritePolicy) -> BackendResult<()> {
        if bins.is_empty() {
            return Err(BackendError::InvalidParameter(
                "a write needs at least one bin".to_string(),
            ));
        }

        let ops = bins.into_iter().map(Operation::Put).collect();
        self.operate(key, ops, policy).await.map(|_| ())
    }

    async fn delete(&self, key: &Key) -> BackendResult<bool> {
        self.ensure_connected()?;
        let now = Instant::now();
        let mut state = self.inner.lock();

        if let Some(budget) = state.delete_budget.as_mut() {
            if *budget == 0 {
                return Err(BackendError::Other("delete refused by the node".to_string()));
            }
            *budget -= 1;
        }

        state.expire_if_due(key, now);
        Ok(state.remove(key).is_some())
    }

    async fn touch(&self, key: &Key, expiration: Expiration) -> BackendResult<()> {
        let policy = WritePolicy::new(expiration);
        self.operate(key, vec![Operation::Touch], &policy)
            .await
            .map(|_| ())
    }

    async fn operate(
        &self,
        key: &Key,
        ops: Vec<Operation>,
        policy: &WritePolicy,
    ) -> BackendResult<Record> {
        self.ensure_connected()?;

        if policy.generation.is_some() && self.take_forced_conflict() {
            return Err(BackendError::GenerationConflict);
        }

        let now = Instant::now();
        let mut state = self.inner.lock();
        let existing = state.live(key, now).cloned();

        if existing.is_none() && !ops.iter().any(creates_data) {
            return Err(BackendError::NotFound);
        }
        if policy.exists == RecordExists::CreateOnly {
            if let Some(bins) = state.preempted_creates.pop_front() {
                if existing.is_none() && !bins.is_empty() {
                    let mut winner = Entry::new();
                    for bin in bins {
                        winner.apply(Operation::Put(bin), &mut Record::default())?;
                    }
                    winner.generation = 1;
                    winner.expires_at = deadline(policy.expiration, None, now);

                    if state.store(key, winner) {
                        self.inner.waker.notify_one();
                    }
                }
                return Err(BackendError::AlreadyExists);
            }
        }
        if let Some(expected) = policy.generation {
            if existing.as_ref().map(|entry| entry.generation) != Some(expected) {
                return Err(BackendError::GenerationConflict);
            }
        }
        if existing.is_some() && policy.exists == RecordExists::CreateOnly {
            return Err(BackendError::AlreadyExists);
        }

        let writes = ops.iter().any(Operation::is_write);
        let mut entry = existing.unwrap_or_else(Entry::new);
        let mut result = Record::default();

        // Ops are applied to a copy so a failing op leaves the record untouched.
        for op in ops {
            entry.apply(op, &mut result)?;
        }

        if writes {
            entry.generation = entry.generation.wrapping_add(1).max(1);
            entry.expires_at = deadline(policy.expiration, entry.expires_at, now);

            result.generation = entry.generation;
            result.expiration = entry.remaining(now);

            if state.store(key, entry) {
                self.inner.waker.notify_one();
            }
        } else {
            result.generation = entry.generation;
            result.expiration = entry.remaining(now);
        }

        Ok(result)
    }

    async fn query(
        &self,
        namespace: &str,
        set: &str,
        filter: Filter,
    ) -> BackendResult<RecordStream> {
        self.ensure_connected()?;
        Ok(self.records_where(namespace, set, |record| filter.matches(record)))
    }

    async fn scan(&self, namespace: &str, set: &str) -> BackendResult<RecordStream> {
        self.ensure_connected()?;
        Ok(self.records_where(namespace, set, |_| true))
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

async fn remove_expired_records(inner: Arc<Inner>) {
    loop {
        let next_expiration = inner.lock().remove_expired_records();

        if let Some(next_expiration) = next_expiration {
            tokio::select! {
                _ = sleep_until(next_expiration) => {}
                _ = inner.waker.notified() => {}
            }
        } else {
            inner.waker.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tokio::time;

    fn key(user_key: &str) -> Key {
        Key::new("test", "redis", user_key)
    }

    #[tokio::test]
    async fn put_and_get() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::default();

        backend
            .put(&key("a"), vec![Bin::new("r", "1"), Bin::new("x", 2_i64)], &policy)
            .await
            .unwrap();

        let record = backend.get(&key("a"), &["r"]).await.unwrap().unwrap();
        assert_eq!(record.bin("r"), Some(&Value::from("1")));
        assert_eq!(record.bin("x"), None);
        assert_eq!(record.generation, 1);
        assert_eq!(record.expiration, NEVER_EXPIRES);

        assert_eq!(backend.get(&key("b"), &[]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn generation_is_bumped_on_every_write() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::default();

        backend.put(&key("a"), vec![Bin::new("r", 1_i64)], &policy).await.unwrap();
        backend.put(&key("a"), vec![Bin::new("r", 2_i64)], &policy).await.unwrap();
        backend.touch(&key("a"), Expiration::Unchanged).await.unwrap();

        let header = backend.get_header(&key("a")).await.unwrap().unwrap();
        assert_eq!(header.generation, 3);
    }

    #[tokio::test]
    async fn generation_guard() {
        let backend = MemoryBackend::new();

        let res = backend
            .put_if_generation(&key("a"), vec![Bin::new("r", 1_i64)], 0, Expiration::Unchanged)
            .await;
        assert_eq!(res, Err(BackendError::GenerationConflict));

        backend
            .put(&key("a"), vec![Bin::new("r", 1_i64)], &WritePolicy::default())
            .await
            .unwrap();

        let res = backend
            .put_if_generation(&key("a"), vec![Bin::new("r", 2_i64)], 2, Expiration::Unchanged)
            .await;
        assert_eq!(res, Err(BackendError::GenerationConflict));

        backend
            .put_if_generation(&key("a"), vec![Bin::new("r", 2_i64)], 1, Expiration::Unchanged)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_only() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::create_only(Expiration::Unchanged);

        backend.put(&key("a"), vec![Bin::new("r", 1_i64)], &policy).await.unwrap();
        let res = backend.put(&key("a"), vec![Bin::new("r", 2_i64)], &policy).await;

        assert_eq!(res, Err(BackendError::AlreadyExists));
    }

    #[tokio::test]
    async fn nil_bins_are_removed() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::default();

        backend
            .put(&key("a"), vec![Bin::new("f1", 1_i64), Bin::new("f2", 2_i64)], &policy)
            .await
            .unwrap();
        backend
            .put(&key("a"), vec![Bin::new("f1", Value::Nil)], &policy)
            .await
            .unwrap();

        let record = backend.get(&key("a"), &[]).await.unwrap().unwrap();
        assert_eq!(record.bins.len(), 1);

        backend
            .put(&key("a"), vec![Bin::new("f2", Value::Nil)], &policy)
            .await
            .unwrap();
        assert_eq!(backend.get(&key("a"), &[]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn long_bin_names_are_rejected() {
        let backend = MemoryBackend::new();
        let res = backend
            .put(
                &key("a"),
                vec![Bin::new("a_very_long_bin_name", 1_i64)],
                &WritePolicy::default(),
            )
            .await;

        assert!(matches!(res, Err(BackendError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn add() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::default();

        assert_eq!(backend.add(&key("a"), "r", 5, &policy).await, Ok(5));
        assert_eq!(backend.add(&key("a"), "r", -7, &policy).await, Ok(-2));

        backend.put(&key("b"), vec![Bin::new("r", "x")], &policy).await.unwrap();
        assert_eq!(
            backend.add(&key("b"), "r", 1, &policy).await,
            Err(BackendError::TypeMismatch("r".to_string()))
        );

        backend.put(&key("c"), vec![Bin::new("r", i64::MAX)], &policy).await.unwrap();
        assert!(matches!(
            backend.add(&key("c"), "r", 1, &policy).await,
            Err(BackendError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn failed_operate_leaves_record_untouched() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::default();

        backend.put(&key("a"), vec![Bin::new("s", "x")], &policy).await.unwrap();

        let ops = vec![
            Operation::Put(Bin::new("t", 1_i64)),
            Operation::Add {
                bin: "s".to_string(),
                delta: 1,
            },
        ];
        assert!(backend.operate(&key("a"), ops, &policy).await.is_err());

        let record = backend.get(&key("a"), &[]).await.unwrap().unwrap();
        assert_eq!(record.bin("t"), None);
        assert_eq!(record.generation, 1);
    }

    #[tokio::test]
    async fn list_operations() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::default();
        let push = |value: &str, end| Operation::ListPush {
            bin: "r".to_string(),
            end,
            value: Value::from(value),
        };

        backend
            .operate(&key("l"), vec![push("b", ListEnd::Tail)], &policy)
            .await
            .unwrap();
        backend
            .operate(&key("l"), vec![push("a", ListEnd::Head)], &policy)
            .await
            .unwrap();
        let record = backend
            .operate(
                &key("l"),
                vec![push("c", ListEnd::Tail), Operation::ListSize("r".to_string())],
                &policy,
            )
            .await
            .unwrap();
        assert_eq!(record.bin("r"), Some(&Value::Int(3)));

        let pop = |end| Operation::ListPop {
            bin: "r".to_string(),
            end,
        };
        let record = backend
            .operate(&key("l"), vec![pop(ListEnd::Head)], &policy)
            .await
            .unwrap();
        assert_eq!(record.bin("r"), Some(&Value::from("a")));

        let record = backend
            .operate(&key("l"), vec![pop(ListEnd::Tail)], &policy)
            .await
            .unwrap();
        assert_eq!(record.bin("r"), Some(&Value::from("c")));

        let res = backend.operate(&key("missing"), vec![pop(ListEnd::Tail)], &policy).await;
        assert_eq!(res, Err(BackendError::NotFound));
    }

    #[tokio::test]
    async fn read_only_operate_on_missing_record() {
        let backend = MemoryBackend::new();
        let res = backend
            .operate(
                &key("a"),
                vec![Operation::Get("r".to_string())],
                &WritePolicy::default(),
            )
            .await;

        assert_eq!(res, Err(BackendError::NotFound));
        assert_eq!(
            backend.touch(&key("a"), Expiration::Seconds(10)).await,
            Err(BackendError::NotFound)
        );
    }

    #[tokio::test]
    async fn expiration() {
        time::pause();

        let backend = MemoryBackend::new();

        backend
            .put(
                &key("a"),
                vec![Bin::new("r", 1_i64)],
                &WritePolicy::new(Expiration::Seconds(10)),
            )
            .await
            .unwrap();
        backend
            .put(
                &key("b"),
                vec![Bin::new("r", 1_i64)],
                &WritePolicy::new(Expiration::Seconds(20)),
            )
            .await
            .unwrap();

        let header = backend.get_header(&key("a")).await.unwrap().unwrap();
        assert_eq!(header.expiration, 10);

        // Writes that leave the expiration unchanged keep the deadline.
        backend
            .put(&key("a"), vec![Bin::new("r", 2_i64)], &WritePolicy::default())
            .await
            .unwrap();
        assert_eq!(backend.len(), 2);

        time::advance(Duration::from_secs(10)).await;
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(backend.len(), 1);
        assert_eq!(backend.get(&key("a"), &[]).await.unwrap(), None);

        backend.touch(&key("b"), Expiration::Seconds(0)).await.unwrap();
        time::advance(Duration::from_secs(20)).await;
        time::sleep(Duration::from_millis(1)).await;

        let header = backend.get_header(&key("b")).await.unwrap().unwrap();
        assert_eq!(header.expiration, NEVER_EXPIRES);
    }

    #[tokio::test]
    async fn query_and_scan() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::default();

        backend.put(&key("a"), vec![Bin::new("m", "t1")], &policy).await.unwrap();
        backend.put(&key("b"), vec![Bin::new("m", "t2")], &policy).await.unwrap();
        backend.put(&key("c"), vec![Bin::new("m", "t1")], &policy).await.unwrap();
        backend
            .put(&Key::new("test", "other", "d"), vec![Bin::new("m", "t1")], &policy)
            .await
            .unwrap();

        let found: Vec<(Key, Record)> = backend
            .query("test", "redis", Filter::equal("m", "t1"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let keys: Vec<&str> = found.iter().map(|(key, _)| key.user_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);

        let all: Vec<(Key, Record)> = backend
            .scan("test", "redis")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn forced_conflicts_only_hit_guarded_writes() {
        let backend = MemoryBackend::new();
        backend.fail_next_generation_checks(1);

        backend
            .put(&key("a"), vec![Bin::new("r", 1_i64)], &WritePolicy::default())
            .await
            .unwrap();

        let res = backend
            .put_if_generation(&key("a"), vec![Bin::new("r", 2_i64)], 1, Expiration::Unchanged)
            .await;
        assert_eq!(res, Err(BackendError::GenerationConflict));

        backend
            .put_if_generation(&key("a"), vec![Bin::new("r", 2_i64)], 1, Expiration::Unchanged)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn preempted_creates() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::create_only(Expiration::Seconds(30));
        backend.preempt_next_create(vec![Bin::new("r", "theirs")]);
        backend.preempt_next_create(vec![]);

        let res = backend.put(&key("a"), vec![Bin::new("r", "ours")], &policy).await;
        assert_eq!(res, Err(BackendError::AlreadyExists));

        let record = backend.get(&key("a"), &[]).await.unwrap().unwrap();
        assert_eq!(record.bin("r"), Some(&Value::from("theirs")));
        assert_eq!(record.generation, 1);
        assert_eq!(record.expiration, 30);

        let res = backend.put(&key("b"), vec![Bin::new("r", "ours")], &policy).await;
        assert_eq!(res, Err(BackendError::AlreadyExists));
        assert_eq!(backend.get(&key("b"), &[]).await, Ok(None));

        backend.put(&key("b"), vec![Bin::new("r", "ours")], &policy).await.unwrap();
    }

    #[tokio::test]
    async fn deletes_fail_after_budget() {
        let backend = MemoryBackend::new();
        let policy = WritePolicy::default();
        for name in ["a", "b"] {
            backend.put(&key(name), vec![Bin::new("r", 1_i64)], &policy).await.unwrap();
        }
        backend.fail_deletes_after(1);

        assert_eq!(backend.delete(&key("a")).await, Ok(true));
        assert!(matches!(
            backend.delete(&key("b")).await,
            Err(BackendError::Other(_))
        ));
        assert!(backend.get(&key("b"), &[]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn connectivity_lost() {
        let backend = MemoryBackend::new();
        backend.set_connected(false);

        assert!(matches!(
            backend.get(&key("a"), &[]).await,
            Err(BackendError::ConnectivityLost(_))
        ));

        backend.set_connected(true);
        assert_eq!(backend.get(&key("a"), &[]).await, Ok(None));
    }
}
