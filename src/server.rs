use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::backend::Backend;
use crate::codec::RequestCodec;
use crate::config::{Config, Proto, SetConfig};
use crate::connection::Connection;
use crate::frame::{self, Frame};
use crate::gateway::{FatalError, Gateway};
use crate::stats;
use crate::store::Store;
use crate::transaction::{Outcome, Session};
use crate::write_back::WriteBack;
use crate::Error;

/// Starts one listener per configured set and serves them until one fails.
pub async fn run(
    config: Config,
    namespace: &str,
    exit_on_backend_lost: bool,
    backend: Arc<dyn Backend>,
) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let mut listeners: Vec<BoxFuture<'static, Result<(), Error>>> = Vec::new();

    for set in &config.sets {
        let gateway = build_gateway(&config, set, namespace, backend.clone())
            .await?
            .exit_on_backend_lost(exit_on_backend_lost);
        let max_request_size = set.max_request_size();

        let listener = match set.proto {
            Proto::Tcp => {
                let listener = TcpListener::bind(set.listen.as_str()).await?;
                info!("[ {} ] listening on tcp://{}", set.set, listener.local_addr()?);
                serve_tcp(listener, gateway, max_request_size).boxed()
            }
            Proto::Unix => {
                let listener = bind_unix(&set.listen)?;
                info!("[ {} ] listening on unix://{}", set.set, set.listen);
                serve_unix(listener, gateway, max_request_size).boxed()
            }
        };
        listeners.push(listener);
    }

    future::try_join_all(listeners).await?;
    Ok(())
}

async fn build_gateway(
    config: &Config,
    set: &SetConfig,
    namespace: &str,
    backend: Arc<dyn Backend>,
) -> Result<Gateway, Error> {
    let settings = set.settings(namespace);
    let cache = settings
        .expanded
        .as_ref()
        .and_then(|expanded| expanded.cache.clone());

    let mut gateway = Gateway::new(Store::new(backend, settings)).log_commands(set.log_commands);

    if let Some(target) = &set.write_back_target {
        let write_back = WriteBack::connect(
            target,
            &set.set,
            set.write_back_set_timeout,
            set.write_back_hincrby,
        )
        .await?;
        info!("[ {} ] write-back to {}", set.set, target);
        gateway = gateway.with_write_back(write_back);
    }

    if let Some(target) = &config.statsd {
        stats::spawn_statsd_reporter(
            target,
            config.statsd_prefix.clone(),
            namespace.to_string(),
            set.set.clone(),
            gateway.stats().clone(),
        )
        .await?;
    }

    if let Some(cache) = cache {
        stats::spawn_cache_reporter(set.set.clone(), cache);
    }

    Ok(gateway)
}

/// Binds a Unix socket, replacing a stale socket file, and opens it to every local user.
pub fn bind_unix(path: impl AsRef<Path>) -> io::Result<UnixListener> {
    let path = path.as_ref();

    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let listener = UnixListener::bind(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o777))?;

    Ok(listener)
}

/// Accepts TCP clients until a connection reports a fatal error.
pub async fn serve_tcp(
    listener: TcpListener,
    gateway: Gateway,
    max_request_size: usize,
) -> Result<(), Error> {
    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, client_address)) => {
                    info!("Accepted connection from {:?}", client_address);
                    spawn_connection(
                        socket,
                        client_address.to_string(),
                        gateway.clone(),
                        max_request_size,
                        fatal_tx.clone(),
                    );
                }
                Err(e) => error!("[ {} ] accept failed: {}", gateway.store().set(), e),
            },
            Some(fatal) = fatal_rx.recv() => return Err(fatal.into()),
        }
    }
}

/// Accepts Unix socket clients until a connection reports a fatal error.
pub async fn serve_unix(
    listener: UnixListener,
    gateway: Gateway,
    max_request_size: usize,
) -> Result<(), Error> {
    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, _)) => {
                    spawn_connection(
                        socket,
                        "unix".to_string(),
                        gateway.clone(),
                        max_request_size,
                        fatal_tx.clone(),
                    );
                }
                Err(e) => error!("[ {} ] accept failed: {}", gateway.store().set(), e),
            },
            Some(fatal) = fatal_rx.recv() => return Err(fatal.into()),
        }
    }
}

fn spawn_connection<S>(
    stream: S,
    client_address: String,
    gateway: Gateway,
    max_request_size: usize,
    fatal: mpsc::Sender<FatalError>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match handle_connection(stream, client_address, gateway, max_request_size).await {
            Ok(()) => {}
            Err(ConnectionError::Fatal(e)) => {
                error!("{}", e);
                let _ = fatal.send(e).await;
            }
            Err(ConnectionError::Protocol(e)) => error!("{}", e),
        }
    });
}

enum ConnectionError {
    Protocol(frame::Error),
    Fatal(FatalError),
}

impl From<frame::Error> for ConnectionError {
    fn from(e: frame::Error) -> Self {
        ConnectionError::Protocol(e)
    }
}

#[instrument(
    name = "connection",
    skip(stream, client_address, gateway, max_request_size),
    fields(connection_id, client_address)
)]
async fn handle_connection<S>(
    stream: S,
    client_address: String,
    gateway: Gateway,
    max_request_size: usize,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _open = gateway.stats().open_connection();
    let mut conn = Connection::new(stream, client_address, RequestCodec::new(max_request_size));

    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", conn.client_address.as_str());

    let mut session = Session::new(gateway);

    loop {
        let args = match conn.read_request().await {
            Ok(Some(args)) => args,
            Ok(None) => break,
            Err(frame::Error::Io(e)) => return Err(frame::Error::Io(e).into()),
            Err(e) => {
                let _ = conn.write_frame(Frame::Error(format!("ERR {e}"))).await;
                return Err(e.into());
            }
        };

        if args.is_empty() {
            continue;
        }

        match session.handle(args).await {
            Ok(Outcome::Reply(frame)) => conn.write_frame(frame).await?,
            Ok(Outcome::Close(frame)) => {
                conn.write_frame(frame).await?;
                break;
            }
            Err(e) => return Err(ConnectionError::Fatal(e)),
        }
    }

    info!("Connection closed");
    Ok(())
}
