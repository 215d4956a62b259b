use async_trait::async_trait;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes a key. Replies `1` when a record was deleted, `0` otherwise.
///
/// With expanded maps the composite root is tried first, then a plain record of the same name.
#[derive(Debug, PartialEq)]
pub struct Del {
    pub key: String,
}

#[async_trait]
impl Executable for Del {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        if let Some(map) = store.composite() {
            if map.delete_root(&self.key).await? {
                return Ok(Frame::Integer(1));
            }
        }

        let existed = store.backend().delete(&store.key(&self.key)).await?;

        Ok(Frame::Integer(existed as i64))
    }
}

impl TryFrom<&mut CommandParser> for Del {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        Ok(Self { key })
    }
}
