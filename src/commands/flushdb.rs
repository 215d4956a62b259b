use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::debug;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Deletes every record of the namespace and set the listener serves. The first failure aborts
/// the flush; records deleted up to that point stay deleted. The composite lookup cache is
/// emptied either way.
///
/// Ref: <https://redis.io/docs/latest/commands/flushdb>
#[derive(Debug, PartialEq)]
pub struct Flushdb;

#[async_trait]
impl Executable for Flushdb {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let res = flush(&store).await;

        if let Some(map) = store.composite() {
            map.clear_cache();
        }

        let deleted = res?;
        debug!(deleted, namespace = store.namespace(), set = store.set(), "flushed");

        Ok(Frame::ok())
    }
}

async fn flush(store: &Store) -> Result<usize, Error> {
    let mut records = store.backend().scan(store.namespace(), store.set()).await?;

    let mut deleted = 0;
    while let Some((key, _)) = records.try_next().await? {
        if store.backend().delete(&key).await? {
            deleted += 1;
        }
    }

    Ok(deleted)
}

impl TryFrom<&mut CommandParser> for Flushdb {
    type Error = CommandParserError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self)
    }
}
