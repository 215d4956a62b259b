use serde::Serialize;
use serde_json::Value as Json;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::commands::{Command, CommandName};

/// Forwards selected commands of a listener to a cache process over UDP instead of running them
/// against the backend.
#[derive(Debug)]
pub struct WriteBack {
    socket: UdpSocket,
    cache_name: String,
    set_timeout: bool,
    hincrby: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    args: Vec<Json>,
    cache_name: &'a str,
    method: &'static str,
}

impl WriteBack {
    pub async fn connect(
        target: &str,
        set: &str,
        set_timeout: bool,
        hincrby: bool,
    ) -> std::io::Result<WriteBack> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(target).await?;

        Ok(WriteBack {
            socket,
            cache_name: format!("CACHE_{}", set.to_uppercase()),
            set_timeout,
            hincrby,
        })
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Builds the datagram replacing `command`, if the command is forwarded.
    pub fn datagram(&self, name: CommandName, command: &Command) -> Option<String> {
        let (key, method, args) = match command {
            Command::Expire(expire) if self.set_timeout => (
                &expire.key,
                "setTimeout",
                vec![
                    Json::from(expire.key.as_str()),
                    Json::from(expire.expiration.as_seconds()),
                ],
            ),
            Command::HincrBy(incr) if self.hincrby && name == CommandName::Hincrby => (
                &incr.key,
                "hIncrBy",
                vec![
                    Json::from(incr.key.as_str()),
                    Json::from(incr.field.as_str()),
                    Json::from(incr.delta),
                ],
            ),
            _ => return None,
        };

        let message = Message {
            args,
            cache_name: &self.cache_name,
            method,
        };
        // Serializing strings and integers cannot fail.
        let json = serde_json::to_string(&message).ok()?;
        let target = format!("{}_{}", self.cache_name, key).replace('|', "_");

        Some(format!("{target}|{json}"))
    }

    /// Sends a datagram. Failures are logged and otherwise ignored.
    pub async fn send(&self, datagram: &str) {
        match self.socket.send(datagram.as_bytes()).await {
            Ok(_) => debug!(datagram, "write-back sent"),
            Err(e) => warn!("{}: couldn't send write-back datagram: {}", self.cache_name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::args;
    use crate::commands::Request;

    fn request(parts: &[&str]) -> (CommandName, Command) {
        match Request::try_from(args(parts)).unwrap() {
            Request::Command(name, command) => (name, command),
            request => panic!("expected a command, got {request:?}"),
        }
    }

    async fn write_back(set_timeout: bool, hincrby: bool) -> (UdpSocket, WriteBack) {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap().to_string();
        let write_back = WriteBack::connect(&target, "maps", set_timeout, hincrby)
            .await
            .unwrap();

        (receiver, write_back)
    }

    #[tokio::test]
    async fn set_timeout() {
        let (receiver, write_back) = write_back(true, false).await;
        assert_eq!(write_back.cache_name(), "CACHE_MAPS");

        let (name, cmd) = request(&["EXPIRE", "a|b", "30"]);
        let datagram = write_back.datagram(name, &cmd).unwrap();
        assert_eq!(
            datagram,
            r#"CACHE_MAPS_a_b|{"args":["a|b",30],"cache_name":"CACHE_MAPS","method":"setTimeout"}"#
        );

        write_back.send(&datagram).await;

        let mut buf = [0; 256];
        let len = receiver.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], datagram.as_bytes());
    }

    #[tokio::test]
    async fn hincrby() {
        let (_receiver, write_back) = write_back(false, true).await;

        let (name, cmd) = request(&["HINCRBY", "k", "f", "-3"]);
        assert_eq!(
            write_back.datagram(name, &cmd).unwrap(),
            r#"CACHE_MAPS_k|{"args":["k","f",-3],"cache_name":"CACHE_MAPS","method":"hIncrBy"}"#
        );

        // Only the plain form is forwarded.
        let (name, cmd) = request(&["HINCRBYEX", "k", "f", "1", "30"]);
        assert_eq!(write_back.datagram(name, &cmd), None);

        let (name, cmd) = request(&["EXPIRE", "k", "30"]);
        assert_eq!(write_back.datagram(name, &cmd), None);
    }

    #[tokio::test]
    async fn other_commands_are_not_forwarded() {
        let (_receiver, write_back) = write_back(true, true).await;

        for parts in [&["GET", "k"][..], &["HSET", "k", "f", "v"], &["INCRBY", "k", "2"]] {
            let (name, cmd) = request(parts);
            assert_eq!(write_back.datagram(name, &cmd), None);
        }
    }
}
