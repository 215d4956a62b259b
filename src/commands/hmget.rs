use async_trait::async_trait;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the values associated with the specified fields in the hash stored at key.
///
/// Ref: <https://redis.io/docs/latest/commands/hmget>
#[derive(Debug, PartialEq)]
pub struct Hmget {
    pub key: String,
    pub fields: Vec<String>,
}

#[async_trait]
impl Executable for Hmget {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        if let Some(map) = store.composite() {
            return Ok(map.hmget(&self.key, &self.fields).await?);
        }

        let fields: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        let record = store.backend().get(&store.key(&self.key), &fields).await?;

        let frames = fields
            .iter()
            .map(|field| store.bulk(record.as_ref().and_then(|record| record.bin(field))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Frame::Array(frames))
    }
}

impl TryFrom<&mut CommandParser> for Hmget {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        let mut fields = vec![];
        while parser.remaining() > 0 {
            fields.push(parser.next_string()?);
        }

        Ok(Self { key, fields })
    }
}
