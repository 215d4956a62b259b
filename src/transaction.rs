use bytes::Bytes;
use tracing::debug;

use crate::commands::{Command, CommandName, Request};
use crate::frame::Frame;
use crate::gateway::{FatalError, Gateway};

/// What the connection does after a request.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Reply(Frame),
    /// Write the reply, then close the connection.
    Close(Frame),
}

/// Per-connection request state. Between `MULTI` and `EXEC` commands are queued and replied to
/// with `+QUEUED`; `EXEC` runs them in order and replies with one array of their results.
pub struct Session {
    gateway: Gateway,
    queue: Option<Vec<(CommandName, Command)>>,
}

impl Session {
    pub fn new(gateway: Gateway) -> Session {
        Session {
            gateway,
            queue: None,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.queue.is_some()
    }

    pub async fn handle(&mut self, args: Vec<Bytes>) -> Result<Outcome, FatalError> {
        self.gateway.log_request(&args);

        let request = match Request::try_from(args) {
            Ok(request) => request,
            Err(err) => return Ok(Outcome::Reply(self.gateway.reject(err))),
        };

        let reply = match request {
            Request::Quit => return Ok(Outcome::Close(Frame::ok())),
            Request::Multi => match self.queue {
                Some(_) => self.gateway.reject("MULTI calls can not be nested"),
                None => {
                    self.queue = Some(Vec::new());
                    Frame::ok()
                }
            },
            Request::Discard => match self.queue.take() {
                Some(queue) => {
                    debug!(discarded = queue.len(), "transaction discarded");
                    Frame::ok()
                }
                None => self.gateway.reject("DISCARD without MULTI"),
            },
            Request::Exec => match self.queue.take() {
                Some(queue) => {
                    let mut replies = Vec::with_capacity(queue.len());
                    for (name, command) in queue {
                        replies.push(self.gateway.execute(name, command).await?);
                    }
                    Frame::Array(replies)
                }
                None => self.gateway.reject("EXEC without MULTI"),
            },
            Request::Command(name, command) => match &mut self.queue {
                Some(queue) => {
                    queue.push((name, command));
                    Frame::Simple("QUEUED".to_string())
                }
                None => self.gateway.execute(name, command).await?,
            },
        };

        Ok(Outcome::Reply(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{args, store};

    fn session() -> Session {
        let (_, store) = store();
        Session::new(Gateway::new(store))
    }

    async fn reply(session: &mut Session, parts: &[&str]) -> Frame {
        match session.handle(args(parts)).await.unwrap() {
            Outcome::Reply(frame) => frame,
            outcome => panic!("expected a reply, got {outcome:?}"),
        }
    }

    #[tokio::test]
    async fn exec_replies_in_order() {
        let mut session = session();

        assert_eq!(reply(&mut session, &["MULTI"]).await, Frame::ok());
        assert!(session.in_transaction());
        assert_eq!(
            reply(&mut session, &["SET", "k", "1"]).await,
            Frame::Simple("QUEUED".to_string())
        );
        assert_eq!(
            reply(&mut session, &["INCR", "k"]).await,
            Frame::Simple("QUEUED".to_string())
        );
        assert_eq!(
            reply(&mut session, &["GET", "k"]).await,
            Frame::Simple("QUEUED".to_string())
        );

        assert_eq!(
            reply(&mut session, &["EXEC"]).await,
            Frame::Array(vec![
                Frame::ok(),
                Frame::Integer(2),
                Frame::Bulk("2".into())
            ])
        );
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn queued_commands_run_at_exec() {
        let mut session = session();

        reply(&mut session, &["MULTI"]).await;
        reply(&mut session, &["SET", "k", "v"]).await;

        let mut other = Session::new(session.gateway.clone());
        assert_eq!(reply(&mut other, &["GET", "k"]).await, Frame::Null);

        reply(&mut session, &["EXEC"]).await;
        assert_eq!(reply(&mut other, &["GET", "k"]).await, Frame::Bulk("v".into()));
    }

    #[tokio::test]
    async fn discard() {
        let mut session = session();

        reply(&mut session, &["MULTI"]).await;
        reply(&mut session, &["SET", "k", "v"]).await;
        assert_eq!(reply(&mut session, &["DISCARD"]).await, Frame::ok());
        assert!(!session.in_transaction());

        assert_eq!(reply(&mut session, &["GET", "k"]).await, Frame::Null);
    }

    #[tokio::test]
    async fn misuse() {
        let mut session = session();

        assert_eq!(
            reply(&mut session, &["EXEC"]).await,
            Frame::Error("ERR EXEC without MULTI".to_string())
        );
        assert_eq!(
            reply(&mut session, &["DISCARD"]).await,
            Frame::Error("ERR DISCARD without MULTI".to_string())
        );

        reply(&mut session, &["MULTI"]).await;
        assert_eq!(
            reply(&mut session, &["MULTI"]).await,
            Frame::Error("ERR MULTI calls can not be nested".to_string())
        );
        assert!(session.in_transaction());
    }

    #[tokio::test]
    async fn invalid_request_inside_transaction() {
        let mut session = session();

        reply(&mut session, &["MULTI"]).await;
        assert_eq!(
            reply(&mut session, &["GET"]).await,
            Frame::Error("ERR wrong number of arguments for 'GET' command".to_string())
        );
        reply(&mut session, &["SET", "k", "v"]).await;

        assert_eq!(
            reply(&mut session, &["EXEC"]).await,
            Frame::Array(vec![Frame::ok()])
        );
    }

    #[tokio::test]
    async fn unknown_command() {
        let mut session = session();

        assert_eq!(
            reply(&mut session, &["PING"]).await,
            Frame::Error("ERR unknown command 'PING'".to_string())
        );
        assert_eq!(session.gateway.stats().take().errors, 1);
    }

    #[tokio::test]
    async fn quit() {
        let mut session = session();

        assert_eq!(
            session.handle(args(&["QUIT"])).await,
            Ok(Outcome::Close(Frame::ok()))
        );
    }
}
