use async_trait::async_trait;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// TTL returns the remaining time to live of a key, in seconds, as the backend reports it. A
/// missing key replies `-2`; a key without expiration replies the backend's never-expires marker.
///
/// With expanded maps the composite root is consulted first.
///
/// Ref: <https://redis.io/docs/latest/commands/ttl>
#[derive(Debug, PartialEq)]
pub struct Ttl {
    pub key: String,
}

#[async_trait]
impl Executable for Ttl {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let mut ttl = match store.composite() {
            Some(map) => map.root_ttl(&self.key).await?,
            None => None,
        };

        if ttl.is_none() {
            let header = store.backend().get_header(&store.key(&self.key)).await?;
            ttl = header.map(|header| header.expiration);
        }

        let ttl = match ttl {
            None => -2,
            Some(ttl) => i64::from(ttl),
        };

        Ok(Frame::Integer(ttl))
    }
}

impl TryFrom<&mut CommandParser> for Ttl {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
