use async_trait::async_trait;

use crate::backend::Expiration;
use crate::commands::executable::Executable;
use crate::commands::{CommandName, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Increments the integer stored in `field` of the hash at `key` by `delta`. Covers
/// `HINCRBY key field delta` and `HINCRBYEX key field delta ttl`.
///
/// A field holding something other than an integer replies with the null bulk string.
///
/// Ref: <https://redis.io/docs/latest/commands/hincrby>
#[derive(Debug, PartialEq)]
pub struct HincrBy {
    pub key: String,
    pub field: String,
    pub delta: i64,
    pub expiration: Expiration,
}

#[async_trait]
impl Executable for HincrBy {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let frame = match store.composite() {
            Some(map) => {
                map.hincrby(&self.key, &self.field, self.delta, self.expiration)
                    .await?
            }
            None => {
                let key = store.key(&self.key);
                store
                    .incr(&key, &self.field, self.delta, self.expiration)
                    .await?
            }
        };

        Ok(frame)
    }
}

impl TryFrom<&mut CommandParser> for HincrBy {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let field = parser.next_string()?;
        let delta = parser.next_integer()?;
        let expiration = match parser.name() {
            CommandName::Hincrbyex => parser.next_expiration()?,
            _ => Expiration::Unchanged,
        };

        Ok(Self {
            key,
            field,
            delta,
            expiration,
        })
    }
}
