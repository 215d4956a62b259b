use std::ops::Range;

use async_trait::async_trait;

use crate::backend::{BackendError, Value};
use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Returns the specified elements of the list stored at `key`. Offsets are zero-based and may be
/// negative to count from the end of the list; `stop` is inclusive. Out of range offsets are
/// clamped, crossed offsets yield an empty array and a missing key the null array.
///
/// Ref: <https://redis.io/docs/latest/commands/lrange>
#[derive(Debug, PartialEq)]
pub struct Lrange {
    pub key: String,
    pub start: i64,
    pub stop: i64,
}

#[async_trait]
impl Executable for Lrange {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let record = store
            .backend()
            .get(&store.key(&self.key), &[VALUE_BIN])
            .await?;

        let list = match record.as_ref().and_then(|record| record.bin(VALUE_BIN)) {
            None => return Ok(Frame::NullArray),
            Some(Value::List(list)) => list,
            Some(_) => return Err(BackendError::TypeMismatch(VALUE_BIN.to_string()).into()),
        };

        let frames = list[resolve_range(self.start, self.stop, list.len())]
            .iter()
            .map(|value| store.bulk(Some(value)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Frame::Array(frames))
    }
}

/// Translates inclusive, possibly negative, offsets into a range of valid indices.
pub(crate) fn resolve_range(start: i64, stop: i64, len: usize) -> Range<usize> {
    let len = len as i64;

    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return 0..0;
    }

    start as usize..(stop + 1) as usize
}

impl TryFrom<&mut CommandParser> for Lrange {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let start = parser.next_integer()?;
        let stop = parser.next_integer()?;

        Ok(Self { key, start, stop })
    }
}
