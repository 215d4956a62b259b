use async_trait::async_trait;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Get the value of key. If the key does not exist the special value nil is returned.
///
/// Ref: <https://redis.io/docs/latest/commands/get>
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: String,
}

#[async_trait]
impl Executable for Get {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let frame = store.read_bin(&self.key, VALUE_BIN).await?;
        Ok(frame)
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
