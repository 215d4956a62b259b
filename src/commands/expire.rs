use async_trait::async_trait;

use crate::backend::{BackendError, Expiration};
use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Set a timeout on key. After the timeout has expired, the key will automatically be deleted.
/// Replies `1` when the timeout was set and `0` when the key does not exist. A TTL of `-1`
/// rewrites the record without changing its expiration.
///
/// Ref: <https://redis.io/docs/latest/commands/expire>
#[derive(Debug, PartialEq)]
pub struct Expire {
    pub key: String,
    pub expiration: Expiration,
}

#[async_trait]
impl Executable for Expire {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        if let Some(map) = store.composite() {
            if map.expire_root(&self.key, self.expiration).await? {
                return Ok(Frame::Integer(1));
            }
        }

        let key = store.key(&self.key);

        match store.backend().touch(&key, self.expiration).await {
            Ok(()) => Ok(Frame::Integer(1)),
            Err(BackendError::NotFound) => Ok(Frame::Integer(0)),
            Err(err) => Err(err.into()),
        }
    }
}

impl TryFrom<&mut CommandParser> for Expire {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let expiration = parser.next_expiration()?;

        Ok(Self { key, expiration })
    }
}
