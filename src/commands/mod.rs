pub mod del;
pub mod executable;
pub mod expire;
pub mod flushdb;
pub mod get;
pub mod hdel;
pub mod hget;
pub mod hgetall;
pub mod hincrby;
pub mod hmget;
pub mod hmincrbyex;
pub mod hmset;
pub mod hset;
pub mod incrby;
pub mod llen;
pub mod lrange;
pub mod ltrim;
pub mod mget;
pub mod mset;
pub mod pop;
pub mod push;
pub mod set;
pub mod ttl;

use async_trait::async_trait;
use bytes::Bytes;
use std::str::{self, FromStr};
use std::vec;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error as ThisError;

use crate::backend::Expiration;
use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

use del::Del;
use expire::Expire;
use flushdb::Flushdb;
use get::Get;
use hdel::Hdel;
use hget::Hget;
use hgetall::Hgetall;
use hincrby::HincrBy;
use hmget::Hmget;
use hmincrbyex::Hmincrbyex;
use hmset::Hmset;
use hset::Hset;
use incrby::IncrBy;
use llen::Llen;
use lrange::Lrange;
use ltrim::Ltrim;
use mget::Mget;
use mset::Mset;
use pop::Pop;
use push::Push;
use set::Set;
use ttl::Ttl;

/// Every command the gateway answers to. Names are matched case-insensitively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum CommandName {
    Del,
    Get,
    Mget,
    Set,
    Setex,
    Setnx,
    Setnxex,
    Mset,
    Hget,
    Hset,
    Hsetex,
    Hdel,
    Hmget,
    Hmset,
    Hgetall,
    Hmincrbyex,
    Incr,
    Decr,
    Incrby,
    Decrby,
    Incrbyex,
    Decrbyex,
    Hincrby,
    Hincrbyex,
    Rpush,
    Lpush,
    Rpushex,
    Lpushex,
    Rpop,
    Lpop,
    Llen,
    Lrange,
    Ltrim,
    Expire,
    Ttl,
    Flushdb,
    Multi,
    Exec,
    Discard,
    Quit,
}

impl CommandName {
    /// Minimum number of arguments following the command name.
    pub fn min_args(&self) -> usize {
        use CommandName as N;

        match self {
            N::Flushdb | N::Multi | N::Exec | N::Discard | N::Quit => 0,
            N::Del | N::Get | N::Mget | N::Hgetall | N::Incr | N::Decr | N::Rpop | N::Lpop
            | N::Llen | N::Ttl => 1,
            N::Set | N::Setnx | N::Mset | N::Hget | N::Hdel | N::Hmget | N::Hmincrbyex
            | N::Incrby | N::Decrby | N::Rpush | N::Lpush | N::Expire => 2,
            N::Setex | N::Setnxex | N::Hset | N::Hmset | N::Incrbyex | N::Decrbyex
            | N::Hincrby | N::Rpushex | N::Lpushex | N::Lrange | N::Ltrim => 3,
            N::Hsetex | N::Hincrbyex => 4,
        }
    }

    /// Number of leading arguments written to the command log. Values are left out.
    pub fn log_args(&self) -> usize {
        use CommandName as N;

        match self {
            N::Flushdb | N::Multi | N::Exec | N::Discard | N::Quit => 0,
            N::Del | N::Get | N::Set | N::Setnx | N::Llen | N::Rpush | N::Lpush | N::Rpushex
            | N::Lpushex | N::Rpop | N::Lpop | N::Lrange | N::Incr | N::Decr | N::Hgetall
            | N::Ttl => 1,
            N::Setex | N::Setnxex | N::Mget | N::Mset | N::Incrby | N::Decrby | N::Hget
            | N::Hset | N::Hdel | N::Hmget | N::Hmset | N::Hmincrbyex | N::Expire => 2,
            N::Ltrim | N::Incrbyex | N::Decrbyex | N::Hincrby | N::Hsetex => 3,
            N::Hincrbyex => 4,
        }
    }
}

/// A decoded client request.
#[derive(Debug, PartialEq)]
pub enum Request {
    Multi,
    Exec,
    Discard,
    Quit,
    Command(CommandName, Command),
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Del(Del),
    Expire(Expire),
    Flushdb(Flushdb),
    Get(Get),
    Hdel(Hdel),
    Hget(Hget),
    Hgetall(Hgetall),
    HincrBy(HincrBy),
    Hmget(Hmget),
    Hmincrbyex(Hmincrbyex),
    Hmset(Hmset),
    Hset(Hset),
    IncrBy(IncrBy),
    Llen(Llen),
    Lrange(Lrange),
    Ltrim(Ltrim),
    Mget(Mget),
    Mset(Mset),
    Pop(Pop),
    Push(Push),
    Set(Set),
    Ttl(Ttl),
}

#[async_trait]
impl Executable for Command {
    async fn exec(self, store: Store) -> Result<Frame, Error> {
        match self {
            Command::Del(cmd) => cmd.exec(store).await,
            Command::Expire(cmd) => cmd.exec(store).await,
            Command::Flushdb(cmd) => cmd.exec(store).await,
            Command::Get(cmd) => cmd.exec(store).await,
            Command::Hdel(cmd) => cmd.exec(store).await,
            Command::Hget(cmd) => cmd.exec(store).await,
            Command::Hgetall(cmd) => cmd.exec(store).await,
            Command::HincrBy(cmd) => cmd.exec(store).await,
            Command::Hmget(cmd) => cmd.exec(store).await,
            Command::Hmincrbyex(cmd) => cmd.exec(store).await,
            Command::Hmset(cmd) => cmd.exec(store).await,
            Command::Hset(cmd) => cmd.exec(store).await,
            Command::IncrBy(cmd) => cmd.exec(store).await,
            Command::Llen(cmd) => cmd.exec(store).await,
            Command::Lrange(cmd) => cmd.exec(store).await,
            Command::Ltrim(cmd) => cmd.exec(store).await,
            Command::Mget(cmd) => cmd.exec(store).await,
            Command::Mset(cmd) => cmd.exec(store).await,
            Command::Pop(cmd) => cmd.exec(store).await,
            Command::Push(cmd) => cmd.exec(store).await,
            Command::Set(cmd) => cmd.exec(store).await,
            Command::Ttl(cmd) => cmd.exec(store).await,
        }
    }
}

impl TryFrom<Vec<Bytes>> for Request {
    type Error = CommandParserError;

    fn try_from(args: Vec<Bytes>) -> Result<Self, Self::Error> {
        let mut parts = args.into_iter();

        let name = parts.next().ok_or(CommandParserError::EndOfStream)?;
        let name = str::from_utf8(&name[..])
            .ok()
            .and_then(|name| CommandName::from_str(name).ok())
            .ok_or_else(|| {
                CommandParserError::UnknownCommand(String::from_utf8_lossy(&name).into_owned())
            })?;

        if parts.len() < name.min_args() {
            return Err(CommandParserError::WrongArity(name));
        }

        let parser = &mut CommandParser { name, parts };

        use CommandName as N;
        let command = match name {
            N::Multi => return Ok(Request::Multi),
            N::Exec => return Ok(Request::Exec),
            N::Discard => return Ok(Request::Discard),
            N::Quit => return Ok(Request::Quit),

            N::Del => Del::try_from(parser).map(Command::Del),
            N::Expire => Expire::try_from(parser).map(Command::Expire),
            N::Flushdb => Flushdb::try_from(parser).map(Command::Flushdb),
            N::Get => Get::try_from(parser).map(Command::Get),
            N::Mget => Mget::try_from(parser).map(Command::Mget),
            N::Set | N::Setex | N::Setnx | N::Setnxex => Set::try_from(parser).map(Command::Set),
            N::Mset => Mset::try_from(parser).map(Command::Mset),
            N::Hget => Hget::try_from(parser).map(Command::Hget),
            N::Hset | N::Hsetex => Hset::try_from(parser).map(Command::Hset),
            N::Hdel => Hdel::try_from(parser).map(Command::Hdel),
            N::Hmget => Hmget::try_from(parser).map(Command::Hmget),
            N::Hmset => Hmset::try_from(parser).map(Command::Hmset),
            N::Hgetall => Hgetall::try_from(parser).map(Command::Hgetall),
            N::Hmincrbyex => Hmincrbyex::try_from(parser).map(Command::Hmincrbyex),
            N::Incr | N::Decr | N::Incrby | N::Decrby | N::Incrbyex | N::Decrbyex => {
                IncrBy::try_from(parser).map(Command::IncrBy)
            }
            N::Hincrby | N::Hincrbyex => HincrBy::try_from(parser).map(Command::HincrBy),
            N::Rpush | N::Lpush | N::Rpushex | N::Lpushex => {
                Push::try_from(parser).map(Command::Push)
            }
            N::Rpop | N::Lpop => Pop::try_from(parser).map(Command::Pop),
            N::Llen => Llen::try_from(parser).map(Command::Llen),
            N::Lrange => Lrange::try_from(parser).map(Command::Lrange),
            N::Ltrim => Ltrim::try_from(parser).map(Command::Ltrim),
            N::Ttl => Ttl::try_from(parser).map(Command::Ttl),
        }?;

        Ok(Request::Command(name, command))
    }
}

pub struct CommandParser {
    name: CommandName,
    parts: vec::IntoIter<Bytes>,
}

impl CommandParser {
    pub fn name(&self) -> CommandName {
        self.name
    }

    /// Number of arguments left to parse.
    pub fn remaining(&self) -> usize {
        self.parts.len()
    }

    pub fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        self.parts.next().ok_or(CommandParserError::EndOfStream)
    }

    pub fn next_string(&mut self) -> Result<String, CommandParserError> {
        let bytes = self.next_bytes()?;

        str::from_utf8(&bytes[..])
            .map(|s| s.to_string())
            .map_err(CommandParserError::InvalidUTF8String)
    }

    pub fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        let bytes = self.next_bytes()?;

        str::from_utf8(&bytes[..])
            .map_err(CommandParserError::InvalidUTF8String)?
            .parse::<i64>()
            .map_err(|_| CommandParserError::InvalidInteger)
    }

    /// Parses a TTL argument. `-1` leaves the expiration of the record untouched.
    pub fn next_expiration(&mut self) -> Result<Expiration, CommandParserError> {
        let ttl = self.next_integer()?;

        Expiration::from_seconds(ttl).ok_or(CommandParserError::InvalidExpiration(self.name))
    }

    /// Parses the remaining arguments as `(field, value)` pairs.
    pub fn pairs<T, F>(&mut self, mut value: F) -> Result<Vec<(String, T)>, CommandParserError>
    where
        F: FnMut(&mut CommandParser) -> Result<T, CommandParserError>,
    {
        if self.remaining() % 2 != 0 {
            return Err(CommandParserError::WrongArity(self.name));
        }

        let mut pairs = Vec::with_capacity(self.remaining() / 2);
        while self.remaining() > 0 {
            let field = self.next_string()?;
            pairs.push((field, value(self)?));
        }

        Ok(pairs)
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(CommandName),
    #[error("invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("value is not an integer or out of range")]
    InvalidInteger,
    #[error("invalid expire time in '{0}' command")]
    InvalidExpiration(CommandName),
    #[error("syntax error in '{command}' command near '{argument}'")]
    InvalidCommandArgument {
        command: CommandName,
        argument: String,
    },
    #[error("attempting to extract a value failed due to the request being fully consumed")]
    EndOfStream,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::cache::TtlCache;
    use crate::composite::ExpandedMap;
    use crate::store::Settings;
    use std::sync::Arc;

    pub fn args(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|part| Bytes::from(part.to_string())).collect()
    }

    pub fn command(parts: &[&str]) -> Command {
        match Request::try_from(args(parts)).unwrap() {
            Request::Command(_, command) => command,
            request => panic!("expected a command, got {request:?}"),
        }
    }

    pub fn store() -> (MemoryBackend, Store) {
        let backend = MemoryBackend::new();
        let store = Store::new(Arc::new(backend.clone()), Settings::new("test", "redis"));
        (backend, store)
    }

    pub fn expanded_store() -> (MemoryBackend, Store) {
        let backend = MemoryBackend::new();
        let mut settings = Settings::new("test", "redis");
        settings.expanded = Some(Default::default());
        let store = Store::new(Arc::new(backend.clone()), settings);
        (backend, store)
    }

    /// An expanded-map store whose composite lookups go through a cache.
    pub fn cached_expanded_store() -> (MemoryBackend, Arc<TtlCache>, Store) {
        let backend = MemoryBackend::new();
        let cache = Arc::new(TtlCache::new(100));
        let mut settings = Settings::new("test", "redis");
        settings.expanded = Some(ExpandedMap {
            cache: Some(cache.clone()),
            ..Default::default()
        });
        let store = Store::new(Arc::new(backend.clone()), settings);
        (backend, cache, store)
    }

    pub async fn run(store: &Store, parts: &[&str]) -> Frame {
        command(parts).exec(store.clone()).await.unwrap()
    }

    #[test]
    fn command_names_are_case_insensitive() {
        let request = Request::try_from(args(&["get", "foo"])).unwrap();
        assert_eq!(
            request,
            Request::Command(
                CommandName::Get,
                Command::Get(Get {
                    key: "foo".to_string()
                })
            )
        );

        let request = Request::try_from(args(&["HmIncrByEx", "foo", "10"])).unwrap();
        assert!(matches!(
            request,
            Request::Command(CommandName::Hmincrbyex, Command::Hmincrbyex(_))
        ));

        assert_eq!(Request::try_from(args(&["multi"])).unwrap(), Request::Multi);
        assert_eq!(Request::try_from(args(&["Exec"])).unwrap(), Request::Exec);
    }

    #[test]
    fn unknown_command() {
        let res = Request::try_from(args(&["PING"]));

        assert_eq!(res, Err(CommandParserError::UnknownCommand("PING".to_string())));
        assert_eq!(
            res.unwrap_err().to_string(),
            "unknown command 'PING'".to_string()
        );
    }

    #[test]
    fn wrong_arity() {
        assert_eq!(
            Request::try_from(args(&["HSETEX", "key", "10", "field"])),
            Err(CommandParserError::WrongArity(CommandName::Hsetex))
        );
        assert_eq!(
            Request::try_from(args(&["GET"])),
            Err(CommandParserError::WrongArity(CommandName::Get))
        );
        assert_eq!(
            Request::try_from(args(&["MSET", "a", "1", "b"])),
            Err(CommandParserError::WrongArity(CommandName::Mset))
        );
        assert_eq!(
            CommandParserError::WrongArity(CommandName::Hsetex).to_string(),
            "wrong number of arguments for 'HSETEX' command"
        );
    }

    #[test]
    fn invalid_arguments() {
        assert_eq!(
            Request::try_from(args(&["INCRBY", "key", "ten"])),
            Err(CommandParserError::InvalidInteger)
        );
        assert_eq!(
            Request::try_from(args(&["EXPIRE", "key", "-5"])),
            Err(CommandParserError::InvalidExpiration(CommandName::Expire))
        );
    }

    #[test]
    fn arity_table() {
        let cases = [
            (CommandName::Flushdb, 0),
            (CommandName::Mget, 1),
            (CommandName::Hmincrbyex, 2),
            (CommandName::Hmset, 3),
            (CommandName::Hincrbyex, 4),
        ];

        for (name, min_args) in cases {
            assert_eq!(name.min_args(), min_args, "{name}");
        }
    }
}
