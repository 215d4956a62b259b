use async_trait::async_trait;

use crate::backend::{BackendError, Bin, Expiration, Value};
use crate::commands::executable::Executable;
use crate::commands::lrange::resolve_range;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Trims the list stored at `key` to the elements between `start` and `stop`, with the offsets
/// interpreted as in `LRANGE`. A list trimmed to nothing is removed.
///
/// The list is rewritten as a whole, guarded by the generation it was read at, so a push landing
/// in between makes the trim start over instead of being lost.
///
/// Ref: <https://redis.io/docs/latest/commands/ltrim>
#[derive(Debug, PartialEq)]
pub struct Ltrim {
    pub key: String,
    pub start: i64,
    pub stop: i64,
}

#[async_trait]
impl Executable for Ltrim {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let store = &store;
        let key = &store.key(&self.key);
        let (start, stop) = (self.start, self.stop);

        let trimmed = store
            .with_retries("LTRIM", || async move {
                let Some(record) = store.backend().get(key, &[VALUE_BIN]).await? else {
                    return Ok(false);
                };

                let list = match record.bin(VALUE_BIN) {
                    None => return Ok(false),
                    Some(Value::List(list)) => list,
                    Some(_) => return Err(BackendError::TypeMismatch(VALUE_BIN.to_string())),
                };

                let kept = list[resolve_range(start, stop, list.len())].to_vec();
                let value = if kept.is_empty() {
                    Value::Nil
                } else {
                    Value::List(kept)
                };

                store
                    .backend()
                    .put_if_generation(
                        key,
                        vec![Bin::new(VALUE_BIN, value)],
                        record.generation,
                        Expiration::Unchanged,
                    )
                    .await?;

                Ok::<_, BackendError>(true)
            })
            .await?;

        if trimmed {
            Ok(Frame::ok())
        } else {
            Ok(Frame::NullArray)
        }
    }
}

impl TryFrom<&mut CommandParser> for Ltrim {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let start = parser.next_integer()?;
        let stop = parser.next_integer()?;

        Ok(Self { key, start, stop })
    }
}
