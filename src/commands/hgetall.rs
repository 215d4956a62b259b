use async_trait::async_trait;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns all fields and values of the hash stored at `key`, as a flat array of
/// field-value pairs. A missing hash yields an empty array.
///
/// Ref: <https://redis.io/docs/latest/commands/hgetall>
#[derive(Debug, PartialEq)]
pub struct Hgetall {
    pub key: String,
}

#[async_trait]
impl Executable for Hgetall {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        if let Some(map) = store.composite() {
            return Ok(map.hgetall(&self.key).await?);
        }

        let Some(record) = store.backend().get(&store.key(&self.key), &[]).await? else {
            return Ok(Frame::Array(vec![]));
        };

        let mut frames = Vec::with_capacity(record.bins.len() * 2);
        for (field, value) in &record.bins {
            frames.push(Frame::Bulk(field.clone().into()));
            frames.push(store.bulk(Some(value))?);
        }

        Ok(Frame::Array(frames))
    }
}

impl TryFrom<&mut CommandParser> for Hgetall {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        Ok(Self { key })
    }
}
