use async_trait::async_trait;

use crate::backend::Expiration;
use crate::commands::executable::Executable;
use crate::commands::{CommandName, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Increments the number stored at `key` by `delta`. A missing key is set to `0` before
/// performing the operation; a value that is not an integer replies with the null bulk string.
///
/// Covers `INCR`, `DECR`, `INCRBY key n`, `DECRBY key n`, `INCRBYEX key ttl n` and
/// `DECRBYEX key ttl n`; the decrementing forms are parsed into a negative `delta`.
///
/// Ref: <https://redis.io/docs/latest/commands/incrby>
#[derive(Debug, PartialEq)]
pub struct IncrBy {
    pub key: String,
    pub delta: i64,
    pub expiration: Expiration,
}

#[async_trait]
impl Executable for IncrBy {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let key = store.key(&self.key);
        let frame = store
            .incr(&key, VALUE_BIN, self.delta, self.expiration)
            .await?;

        Ok(frame)
    }
}

impl TryFrom<&mut CommandParser> for IncrBy {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        use CommandName as N;

        let key = parser.next_string()?;

        let (delta, expiration) = match parser.name() {
            N::Incr => (1, Expiration::Unchanged),
            N::Decr => (-1, Expiration::Unchanged),
            N::Incrby | N::Decrby => (parser.next_integer()?, Expiration::Unchanged),
            _ => {
                let expiration = parser.next_expiration()?;
                (parser.next_integer()?, expiration)
            }
        };

        let delta = match parser.name() {
            N::Decrby | N::Decrbyex => delta
                .checked_neg()
                .ok_or(CommandParserError::InvalidInteger)?,
            _ => delta,
        };

        Ok(Self {
            key,
            delta,
            expiration,
        })
    }
}
