use async_trait::async_trait;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Returns the values of all specified keys. For every key that does not hold a value, the
/// special value nil is returned.
///
/// Ref: <https://redis.io/docs/latest/commands/mget>
#[derive(Debug, PartialEq)]
pub struct Mget {
    pub keys: Vec<String>,
}

#[async_trait]
impl Executable for Mget {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let mut frames = Vec::with_capacity(self.keys.len());

        for key in &self.keys {
            frames.push(store.read_bin(key, VALUE_BIN).await?);
        }

        Ok(Frame::Array(frames))
    }
}

impl TryFrom<&mut CommandParser> for Mget {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let mut keys = vec![];

        loop {
            match parser.next_string() {
                Ok(key) => keys.push(key),
                Err(CommandParserError::EndOfStream) if !keys.is_empty() => {
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(Self { keys })
    }
}
