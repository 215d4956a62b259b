use bytes::{Buf, Bytes, BytesMut};
use std::convert::TryInto;
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame};

/// Default upper bound on the size of a single buffered request.
pub const MAX_REQUEST_SIZE: usize = 512 * 1024 * 1024;

/// Splits the incoming byte stream into requests and serializes replies.
///
/// Requests may arrive fragmented; the decoder leaves partial data in the buffer until the rest
/// of the request is available.
pub struct RequestCodec {
    max_request_size: usize,
}

impl RequestCodec {
    pub fn new(max_request_size: usize) -> RequestCodec {
        RequestCodec { max_request_size }
    }
}

impl Default for RequestCodec {
    fn default() -> Self {
        Self::new(MAX_REQUEST_SIZE)
    }
}

impl Decoder for RequestCodec {
    type Item = Vec<Bytes>;
    type Error = frame::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&src[..]);
        let request = match frame::parse_request(&mut cursor) {
            Ok(request) => request,
            Err(frame::Error::Incomplete) => {
                if src.len() > self.max_request_size {
                    return Err(frame::Error::RequestTooLarge {
                        size: src.len(),
                        limit: self.max_request_size,
                    });
                }
                // Not enough data to parse a request yet.
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let position: usize = cursor
            .position()
            .try_into()
            .map_err(|_| frame::Error::RequestTooLarge {
                size: src.len(),
                limit: self.max_request_size,
            })?;

        // Remove the parsed request from the buffer.
        src.advance(position);

        Ok(Some(request))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(request) => Ok(Some(request)),
            None if src.is_empty() => Ok(None),
            None => Err(frame::Error::Truncated),
        }
    }
}

impl Encoder<Frame> for RequestCodec {
    type Error = frame::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.serialize());
        Ok(())
    }
}
