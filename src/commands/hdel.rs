use async_trait::async_trait;

use crate::backend::{BackendError, Bin, Expiration, Value};
use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes `field` from the hash stored at `key`. Replies `1` when the field was removed and `0`
/// when the hash or the field did not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/hdel>
#[derive(Debug, PartialEq)]
pub struct Hdel {
    pub key: String,
    pub field: String,
}

#[async_trait]
impl Executable for Hdel {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        if let Some(map) = store.composite() {
            let removed = map.hdel(&self.key, &self.field).await?;
            return Ok(Frame::Integer(removed as i64));
        }

        let store = &store;
        let key = &store.key(&self.key);
        let field = self.field.as_str();

        let removed = store
            .with_retries("HDEL", || async move {
                let record = store.backend().get(key, &[field]).await?;

                let generation = match record {
                    Some(record) if record.bin(field).is_some() => record.generation,
                    _ => return Ok(false),
                };

                let bins = vec![Bin::new(field, Value::Nil)];
                store
                    .backend()
                    .put_if_generation(key, bins, generation, Expiration::Unchanged)
                    .await?;

                Ok::<_, BackendError>(true)
            })
            .await?;

        Ok(Frame::Integer(removed as i64))
    }
}

impl TryFrom<&mut CommandParser> for Hdel {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let field = parser.next_string()?;

        Ok(Self { key, field })
    }
}
