use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{Bin, WritePolicy};
use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Sets the given keys to their respective values, one write per key. Keys written before a
/// failing write keep their new value.
///
/// Ref: <https://redis.io/docs/latest/commands/mset>
#[derive(Debug, PartialEq)]
pub struct Mset {
    pub pairs: Vec<(String, Bytes)>,
}

#[async_trait]
impl Executable for Mset {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let policy = WritePolicy::default();

        for (key, value) in &self.pairs {
            let bins = vec![Bin::new(VALUE_BIN, store.codec().encode(value))];
            store.backend().put(&store.key(key), bins, &policy).await?;
        }

        Ok(Frame::ok())
    }
}

impl TryFrom<&mut CommandParser> for Mset {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let pairs = parser.pairs(|parser| parser.next_bytes())?;

        Ok(Self { pairs })
    }
}
