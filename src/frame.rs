// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io;
use std::io::Cursor;

use bytes::Buf;
use bytes::Bytes;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire request")]
    Incomplete,
    #[error("Protocol error: invalid multibulk length '{0}'")]
    InvalidMultiBulkLength(String),
    #[error("Protocol error: expected '$', got '{0}'")]
    ExpectedBulkString(char),
    #[error("Protocol error: invalid bulk length '{0}'")]
    InvalidBulkLength(String),
    #[error("Protocol error: bulk payload is not followed by a line terminator")]
    MissingTerminator,
    #[error("Protocol error: connection closed in the middle of a request")]
    Truncated,
    #[error("Protocol error: request of {size} bytes exceeds the {limit} bytes limit")]
    RequestTooLarge { size: usize, limit: usize },
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// A reply sent back to the client.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    /// The null bulk string, `$-1`.
    Null,
    /// The null array, `*-1`.
    NullArray,
    Array(Vec<Frame>),
}

impl Frame {
    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleError));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Integer(i) => {
                let i = i.to_string();
                let mut bytes = Vec::with_capacity(1 + i.len() + CRLF.len());
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(i.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Bulk(bytes) => {
                let length_str = bytes.len().to_string();
                let mut result = Vec::with_capacity(
                    1 + length_str.len() + CRLF.len() + bytes.len() + CRLF.len(),
                );
                result.push(u8::from(DataType::BulkString));
                result.extend_from_slice(length_str.as_bytes());
                result.extend_from_slice(CRLF);
                result.extend_from_slice(bytes);
                result.extend_from_slice(CRLF);
                result
            }
            Frame::Null => b"$-1\r\n".to_vec(),
            Frame::NullArray => b"*-1\r\n".to_vec(),
            Frame::Array(arr) => {
                let length_str = arr.len().to_string();
                let mut bytes = Vec::with_capacity(1 + length_str.len() + CRLF.len());
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(length_str.as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in arr {
                    bytes.extend(frame.serialize());
                }
                bytes
            }
        }
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::NullArray => write!(f, "*-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

/// Parses one client request into its arguments.
///
/// Two grammars are accepted: the multi-bulk form (`*<n>` followed by `n` bulk strings) and the
/// inline form, where any other line is split on single spaces. Both CRLF and a bare LF end a
/// line. An empty request yields an empty argument list.
pub fn parse_request(src: &mut Cursor<&[u8]>) -> Result<Vec<Bytes>, Error> {
    let line = get_line(src)?;

    match line.split_first() {
        Some((b'*', count)) => {
            let count = parse_decimal(count)
                .ok_or_else(|| Error::InvalidMultiBulkLength(lossy(count)))?;

            if count <= 0 {
                return Ok(vec![]);
            }

            let mut args = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let line = get_line(src)?;
                let length = match line.split_first() {
                    Some((b'$', length)) => parse_decimal(length)
                        .and_then(|length| usize::try_from(length).ok())
                        .ok_or_else(|| Error::InvalidBulkLength(lossy(length)))?,
                    Some((&byte, _)) => return Err(Error::ExpectedBulkString(byte as char)),
                    None => return Err(Error::ExpectedBulkString('\n')),
                };

                let data = get_bytes(src, length)?;
                skip_line_terminator(src)?;
                args.push(Bytes::copy_from_slice(data));
            }

            Ok(args)
        }
        Some(_) => Ok(line
            .split(|byte| *byte == b' ')
            .map(Bytes::copy_from_slice)
            .collect()),
        None => Ok(vec![]),
    }
}

/// Returns the next line without its terminator.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let newline = buf[start..]
        .iter()
        .position(|byte| *byte == b'\n')
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((newline + 1) as u64);

    let line = &buf[start..newline];
    Ok(line.strip_suffix(b"\r").unwrap_or(line))
}

fn get_bytes<'a>(src: &mut Cursor<&'a [u8]>, length: usize) -> Result<&'a [u8], Error> {
    if src.remaining() < length {
        return Err(Error::Incomplete);
    }

    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();
    src.advance(length);

    Ok(&buf[start..start + length])
}

fn skip_line_terminator(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
    match get_byte(src)? {
        b'\n' => Ok(()),
        b'\r' => match get_byte(src)? {
            b'\n' => Ok(()),
            _ => Err(Error::MissingTerminator),
        },
        _ => Err(Error::MissingTerminator),
    }
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

fn parse_decimal(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    BulkString,   // '$'
    SimpleError,  // '-'
    Integer,      // ':'
    Array,        // '*'
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
