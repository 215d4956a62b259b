use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{Expiration, ListEnd, Operation, Value, WritePolicy};
use crate::commands::executable::Executable;
use crate::commands::{CommandName, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Inserts `value` at the tail (`RPUSH`, `RPUSHEX`) or the head (`LPUSH`, `LPUSHEX`) of the list
/// stored at `key`, creating the list when needed. Replies with the length of the list after the
/// push. The `EX` forms take a trailing TTL: `RPUSHEX key value ttl`.
///
/// Ref: <https://redis.io/docs/latest/commands/rpush>
#[derive(Debug, PartialEq)]
pub struct Push {
    pub key: String,
    pub value: Bytes,
    pub end: ListEnd,
    pub expiration: Expiration,
}

#[async_trait]
impl Executable for Push {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let ops = vec![
            Operation::ListPush {
                bin: VALUE_BIN.to_string(),
                end: self.end,
                value: store.codec().encode(&self.value),
            },
            Operation::ListSize(VALUE_BIN.to_string()),
        ];

        let record = store
            .backend()
            .operate(&store.key(&self.key), ops, &WritePolicy::new(self.expiration))
            .await?;

        let size = record.bin(VALUE_BIN).and_then(Value::as_int).unwrap_or(0);

        Ok(Frame::Integer(size))
    }
}

impl TryFrom<&mut CommandParser> for Push {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        use CommandName as N;

        let key = parser.next_string()?;
        let value = parser.next_bytes()?;

        let end = match parser.name() {
            N::Lpush | N::Lpushex => ListEnd::Head,
            _ => ListEnd::Tail,
        };
        let expiration = match parser.name() {
            N::Rpushex | N::Lpushex => parser.next_expiration()?,
            _ => Expiration::Unchanged,
        };

        Ok(Self {
            key,
            value,
            end,
            expiration,
        })
    }
}
