use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{BackendError, Bin, Expiration, WritePolicy};
use crate::commands::executable::Executable;
use crate::commands::{CommandName, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, VALUE_BIN};
use crate::Error;

/// Sets the string value of a key. Covers `SET key value [EX seconds] [NX]`,
/// `SETEX key ttl value`, `SETNX key value` and `SETNXEX key ttl value`.
///
/// Plain writes reply `OK`. Writes that only create the key reply `1`, or `0` when the key
/// already exists.
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: String,
    pub value: Bytes,
    pub expiration: Expiration,
    pub create_only: bool,
}

#[async_trait]
impl Executable for Set {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        let key = store.key(&self.key);
        let bins = vec![Bin::new(VALUE_BIN, store.codec().encode(&self.value))];

        if !self.create_only {
            store
                .backend()
                .put(&key, bins, &WritePolicy::new(self.expiration))
                .await?;
            return Ok(Frame::ok());
        }

        let policy = WritePolicy::create_only(self.expiration);
        match store.backend().put(&key, bins, &policy).await {
            Ok(()) => Ok(Frame::Integer(1)),
            Err(BackendError::AlreadyExists) => Ok(Frame::Integer(0)),
            Err(err) => Err(err.into()),
        }
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        let (value, expiration, create_only) = match parser.name() {
            CommandName::Setex | CommandName::Setnxex => {
                let expiration = parser.next_expiration()?;
                let value = parser.next_bytes()?;
                (value, expiration, parser.name() == CommandName::Setnxex)
            }
            CommandName::Setnx => (parser.next_bytes()?, Expiration::Unchanged, true),
            _ => {
                let value = parser.next_bytes()?;
                let mut expiration = Expiration::Unchanged;
                let mut create_only = false;

                while parser.remaining() > 0 {
                    let option = parser.next_string()?;
                    match option.to_uppercase().as_str() {
                        "EX" => expiration = parser.next_expiration()?,
                        "NX" => create_only = true,
                        _ => {
                            return Err(CommandParserError::InvalidCommandArgument {
                                command: parser.name(),
                                argument: option,
                            })
                        }
                    }
                }

                (value, expiration, create_only)
            }
        };

        Ok(Self {
            key,
            value,
            expiration,
            create_only,
        })
    }
}
