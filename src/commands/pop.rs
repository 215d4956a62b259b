use async_trait::async_trait;

use crate::backend::{BackendError, ListEnd, Operation, WritePolicy};
use crate::commands::executable::Executable;
use crate::commands::{CommandName, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Removes and returns the last (`RPOP`) or first (`LPOP`) element of the list stored at `key`.
/// A missing key or an empty list replies with the null bulk string.
///
/// Ref: <https://redis.io/docs/latest/commands/lpop>
#[derive(Debug, PartialEq)]
pub struct Pop {
    pub key: String,
    pub end: ListEnd,
}

#[async_trait]
impl Executable for Pop {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let ops = vec![Operation::ListPop {
            bin: VALUE_BIN.to_string(),
            end: self.end,
        }];

        let res = store
            .backend()
            .operate(&store.key(&self.key), ops, &WritePolicy::default())
            .await;

        let record = match res {
            Ok(record) => record,
            Err(BackendError::NotFound) => return Ok(Frame::Null),
            Err(err) => return Err(err.into()),
        };

        Ok(store.bulk(record.bin(VALUE_BIN))?)
    }
}

impl TryFrom<&mut CommandParser> for Pop {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let end = match parser.name() {
            CommandName::Lpop => ListEnd::Head,
            _ => ListEnd::Tail,
        };

        Ok(Self { key, end })
    }
}
