use async_trait::async_trait;

use crate::backend::{BackendError, Operation, Value, WritePolicy};
use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Returns the length of the list stored at `key`, `0` when it does not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/llen>
#[derive(Debug, PartialEq)]
pub struct Llen {
    pub key: String,
}

#[async_trait]
impl Executable for Llen {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let ops = vec![Operation::ListSize(VALUE_BIN.to_string())];

        let res = store
            .backend()
            .operate(&store.key(&self.key), ops, &WritePolicy::default())
            .await;

        match res {
            Ok(record) => Ok(Frame::Integer(
                record.bin(VALUE_BIN).and_then(Value::as_int).unwrap_or(0),
            )),
            Err(BackendError::NotFound) => Ok(Frame::Integer(0)),
            Err(err) => Err(err.into()),
        }
    }
}

impl TryFrom<&mut CommandParser> for Llen {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        Ok(Self { key })
    }
}
