use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{Bin, WritePolicy};
use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Sets the specified fields to their respective values in the hash stored at `key`, in a single
/// write.
///
/// Ref: <https://redis.io/docs/latest/commands/hmset>
#[derive(Debug, PartialEq)]
pub struct Hmset {
    pub key: String,
    pub pairs: Vec<(String, Bytes)>,
}

#[async_trait]
impl Executable for Hmset {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        if let Some(map) = store.composite() {
            map.hmset(&self.key, &self.pairs).await?;
            return Ok(Frame::ok());
        }

        let codec = store.codec();
        let bins = self
            .pairs
            .iter()
            .map(|(field, value)| Bin::new(field.as_str(), codec.encode(value)))
            .collect();

        store
            .backend()
            .put(&store.key(&self.key), bins, &WritePolicy::default())
            .await?;

        Ok(Frame::ok())
    }
}

impl TryFrom<&mut CommandParser> for Hmset {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let pairs = parser.pairs(|parser| parser.next_bytes())?;

        Ok(Self { key, pairs })
    }
}
