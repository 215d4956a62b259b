use async_trait::async_trait;

use crate::backend::{BackendError, Expiration, Operation, WritePolicy};
use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// `HMINCRBYEX key ttl [field delta ...]`: increments several fields of a hash at once and sets
/// its time to live. Without any field, only the time to live is refreshed.
#[derive(Debug, PartialEq)]
pub struct Hmincrbyex {
    pub key: String,
    pub expiration: Expiration,
    pub increments: Vec<(String, i64)>,
}

#[async_trait]
impl Executable for Hmincrbyex {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        if let Some(map) = store.composite() {
            map.hmincrbyex(&self.key, self.expiration, &self.increments)
                .await?;
            return Ok(Frame::ok());
        }

        let key = store.key(&self.key);

        if self.increments.is_empty() {
            return match store.backend().touch(&key, self.expiration).await {
                Ok(()) | Err(BackendError::NotFound) => Ok(Frame::ok()),
                Err(err) => Err(err.into()),
            };
        }

        let ops = self
            .increments
            .into_iter()
            .map(|(bin, delta)| Operation::Add { bin, delta })
            .collect();

        store
            .backend()
            .operate(&key, ops, &WritePolicy::new(self.expiration))
            .await?;

        Ok(Frame::ok())
    }
}

impl TryFrom<&mut CommandParser> for Hmincrbyex {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let expiration = parser.next_expiration()?;
        let increments = parser.pairs(|parser| parser.next_integer())?;

        Ok(Self {
            key,
            expiration,
            increments,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::backend::Backend;
    use crate::commands::tests::{command, expanded_store, run, store};
    use crate::commands::Command;

    #[tokio::test]
    async fn increments_fields() {
        let (backend, store) = store();

        let cmd = command(&["HMINCRBYEX", "h", "60", "a", "1", "b", "-2"]);
        assert_eq!(
            cmd,
            Command::Hmincrbyex(Hmincrbyex {
                key: "h".to_string(),
                expiration: Expiration::Seconds(60),
                increments: vec![("a".to_string(), 1), ("b".to_string(), -2)],
            })
        );

        assert_eq!(cmd.exec(store.clone()).await.unwrap(), Frame::ok());
        run(&store, &["HMINCRBYEX", "h", "-1", "a", "10"]).await;

        assert_eq!(
            run(&store, &["HMGET", "h", "a", "b"]).await,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("11")),
                Frame::Bulk(Bytes::from("-2")),
            ])
        );

        let header = backend.get_header(&store.key("h")).await.unwrap().unwrap();
        assert_eq!(header.expiration, 60);
    }

    #[tokio::test]
    async fn without_fields_only_touches() {
        let (backend, store) = store();

        assert_eq!(run(&store, &["HMINCRBYEX", "h", "30"]).await, Frame::ok());
        assert!(backend.get_header(&store.key("h")).await.unwrap().is_none());

        run(&store, &["HSET", "h", "f", "v"]).await;
        assert_eq!(run(&store, &["HMINCRBYEX", "h", "30"]).await, Frame::ok());

        let header = backend.get_header(&store.key("h")).await.unwrap().unwrap();
        assert_eq!(header.expiration, 30);
    }

    #[tokio::test]
    async fn non_integer_argument() {
        let res = crate::commands::Request::try_from(crate::commands::tests::args(&[
            "HMINCRBYEX", "h", "30", "a", "x",
        ]));

        assert_eq!(res, Err(CommandParserError::InvalidInteger));
    }

    #[tokio::test]
    async fn expanded_map() {
        let (backend, store) = expanded_store();

        assert_eq!(
            run(&store, &["HMINCRBYEX", "h", "100", "a", "1", "b", "2"]).await,
            Frame::ok()
        );
        run(&store, &["HMINCRBYEX", "h", "-1", "a", "1"]).await;

        assert_eq!(
            run(&store, &["HMGET", "h", "a", "b"]).await,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("2")),
                Frame::Bulk(Bytes::from("2")),
            ])
        );

        let map = store.composite().unwrap();
        let root = backend.get_header(&map.root_key("h")).await.unwrap().unwrap();
        assert_eq!(root.expiration, 100);
    }
}
