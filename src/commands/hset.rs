use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{Bin, Expiration};
use crate::commands::executable::Executable;
use crate::commands::{CommandName, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Sets `field` in the hash stored at `key` to `value`. Covers `HSET key field value` and
/// `HSETEX key ttl field value`.
///
/// Replies `1` when the field is new and `0` when an existing value was overwritten. The record
/// store cannot tell whether a write created a bin, so the field is read first and the write is
/// guarded by the generation of that read; a concurrent update makes the cycle start over.
#[derive(Debug, PartialEq)]
pub struct Hset {
    pub key: String,
    pub field: String,
    pub value: Bytes,
    pub expiration: Expiration,
}

#[async_trait]
impl Executable for Hset {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let created = match store.composite() {
            Some(map) => {
                map.hset(&self.key, &self.field, &self.value, self.expiration)
                    .await?
            }
            None => {
                let key = store.key(&self.key);
                let bins = vec![Bin::new(&*self.field, store.codec().encode(&self.value))];

                store
                    .guarded_put("HSET", &key, &self.field, bins, self.expiration)
                    .await?
            }
        };

        Ok(Frame::Integer(created as i64))
    }
}

impl TryFrom<&mut CommandParser> for Hset {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let expiration = match parser.name() {
            CommandName::Hsetex => parser.next_expiration()?,
            _ => Expiration::Unchanged,
        };
        let field = parser.next_string()?;
        let value = parser.next_bytes()?;

        Ok(Self {
            key,
            field,
            value,
            expiration,
        })
    }
}
