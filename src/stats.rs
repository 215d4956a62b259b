use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{info, warn};

use crate::cache::LookupCache;

pub const STATSD_INTERVAL: Duration = Duration::from_secs(5);
pub const CACHE_STATS_INTERVAL: Duration = Duration::from_secs(300);

/// Request counters and the open connection gauge of one listener.
#[derive(Debug, Default)]
pub struct Stats {
    ok: AtomicU64,
    write_back_ok: AtomicU64,
    errors: AtomicU64,
    connections: AtomicI64,
}

/// Counter values taken by [`Stats::take`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub ok: u64,
    pub write_back_ok: u64,
    pub errors: u64,
    pub connections: i64,
}

impl Stats {
    pub fn new() -> Stats {
        Stats::default()
    }

    pub fn record_ok(&self) {
        self.ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_back_ok(&self) {
        self.write_back_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections(&self) -> i64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Counts a connection as open until the returned guard is dropped.
    pub fn open_connection(self: &Arc<Self>) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            stats: Arc::clone(self),
        }
    }

    /// Reads the counters and resets them to zero. The gauge is left as is.
    pub fn take(&self) -> Snapshot {
        Snapshot {
            ok: self.ok.swap(0, Ordering::Relaxed),
            write_back_ok: self.write_back_ok.swap(0, Ordering::Relaxed),
            errors: self.errors.swap(0, Ordering::Relaxed),
            connections: self.connections(),
        }
    }
}

pub struct ConnectionGuard {
    stats: Arc<Stats>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Formats a snapshot as statsd lines, tagged with the namespace and set.
pub fn statsd_lines(prefix: &str, namespace: &str, set: &str, snapshot: &Snapshot) -> Vec<String> {
    let tags = format!("ns={namespace},set={set}");

    vec![
        format!("{prefix}.ops,type=ok,{tags}:{}|c", snapshot.ok),
        format!("{prefix}.ops,type=wbok,{tags}:{}|c", snapshot.write_back_ok),
        format!("{prefix}.ops,type=err,{tags}:{}|c", snapshot.errors),
        format!("{prefix}.conn,{tags}:{}|g", snapshot.connections),
    ]
}

/// Sends the counters of a listener to a statsd daemon every [`STATSD_INTERVAL`].
pub async fn spawn_statsd_reporter(
    target: &str,
    prefix: String,
    namespace: String,
    set: String,
    stats: Arc<Stats>,
) -> std::io::Result<JoinHandle<()>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(target).await?;

    info!(%set, target, "sending stats to statsd");

    Ok(tokio::spawn(async move {
        let mut interval = time::interval(STATSD_INTERVAL);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;

            let snapshot = stats.take();
            for line in statsd_lines(&prefix, &namespace, &set, &snapshot) {
                if let Err(e) = socket.send(line.as_bytes()).await {
                    warn!(%set, "couldn't send stats: {}", e);
                }
            }
        }
    }))
}

/// Logs the lookup cache hit rate of a listener every [`CACHE_STATS_INTERVAL`].
pub fn spawn_cache_reporter(set: String, cache: Arc<dyn LookupCache>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(CACHE_STATS_INTERVAL);
        interval.tick().await;

        loop {
            interval.tick().await;

            let stats = cache.take_stats();
            info!(
                "{}: cache ratio {} {:.2} %",
                set,
                stats.lookups,
                stats.hit_rate() * 100.0
            );
        }
    })
}
