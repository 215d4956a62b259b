use std::sync::Arc;

use bytes::Bytes;
use itertools::Itertools;
use thiserror::Error as ThisError;
use tracing::{error, info};

use crate::backend::BackendError;
use crate::commands::executable::Executable;
use crate::commands::{Command, CommandName};
use crate::frame::Frame;
use crate::stats::Stats;
use crate::store::Store;
use crate::write_back::WriteBack;
use crate::Error;

/// Errors that end the process rather than a single request.
#[derive(Debug, ThisError, PartialEq)]
pub enum FatalError {
    #[error("lost connection to the backend: {0}")]
    BackendLost(String),
}

/// Everything a connection of one listener shares with the others: the store translating its
/// commands, the counters, and the write-back forwarder.
#[derive(Clone)]
pub struct Gateway {
    store: Store,
    stats: Arc<Stats>,
    write_back: Option<Arc<WriteBack>>,
    log_commands: bool,
    exit_on_backend_lost: bool,
}

impl Gateway {
    pub fn new(store: Store) -> Gateway {
        Gateway {
            store,
            stats: Arc::new(Stats::new()),
            write_back: None,
            log_commands: false,
            exit_on_backend_lost: false,
        }
    }

    pub fn with_write_back(mut self, write_back: WriteBack) -> Gateway {
        self.write_back = Some(Arc::new(write_back));
        self
    }

    pub fn log_commands(mut self, enabled: bool) -> Gateway {
        self.log_commands = enabled;
        self
    }

    pub fn exit_on_backend_lost(mut self, enabled: bool) -> Gateway {
        self.exit_on_backend_lost = enabled;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Logs the command name and its leading arguments, leaving values out.
    pub fn log_request(&self, args: &[Bytes]) {
        if !self.log_commands {
            return;
        }

        let Some(name) = args
            .first()
            .and_then(|name| std::str::from_utf8(name).ok())
            .and_then(|name| name.parse::<CommandName>().ok())
        else {
            return;
        };

        let logged = args
            .iter()
            .skip(1)
            .take(name.log_args())
            .map(|arg| String::from_utf8_lossy(arg))
            .join(" ");

        info!("[ {} ] Command: {}: {}", self.store.set(), name, logged);
    }

    /// Runs a command and turns its outcome into a reply. Request errors become `-ERR` replies;
    /// a lost backend is fatal when the gateway is configured to exit on it.
    pub async fn execute(&self, name: CommandName, command: Command) -> Result<Frame, FatalError> {
        if let Some(write_back) = &self.write_back {
            if let Some(datagram) = write_back.datagram(name, &command) {
                write_back.send(&datagram).await;
                self.stats.record_write_back_ok();
                return Ok(Frame::ok());
            }
        }

        match command.exec(self.store.clone()).await {
            Ok(frame) => {
                self.stats.record_ok();
                Ok(frame)
            }
            Err(err) => {
                if self.exit_on_backend_lost && !self.store.backend().is_connected() {
                    error!("[ {} ] {}: {}", self.store.set(), name, err);
                    return Err(FatalError::BackendLost(err.to_string()));
                }

                self.stats.record_error();
                Ok(error_reply(&err))
            }
        }
    }

    /// Counts a request that failed before reaching the store.
    pub fn reject(&self, message: impl std::fmt::Display) -> Frame {
        self.stats.record_error();
        Frame::Error(format!("ERR {message}"))
    }
}

fn error_reply(err: &Error) -> Frame {
    match err.downcast_ref::<BackendError>() {
        Some(err) => Frame::Error(format!("ERR backend error: {err}")),
        None => Frame::Error(format!("ERR {err}")),
    }
}
