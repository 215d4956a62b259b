use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use uuid::Uuid;

use crate::codec::RequestCodec;
use crate::frame::{self, Frame};

/// A client connection: requests are read from the socket through the request codec, replies are
/// written back in the order they are produced.
pub struct Connection<S> {
    pub id: Uuid,
    pub client_address: String,
    framed: Framed<S, RequestCodec>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, client_address: impl Into<String>, codec: RequestCodec) -> Connection<S> {
        Connection {
            id: Uuid::new_v4(),
            client_address: client_address.into(),
            framed: Framed::new(stream, codec),
        }
    }

    /// Reads the next request. Returns `None` once the client closed the connection.
    pub async fn read_request(&mut self) -> Result<Option<Vec<Bytes>>, frame::Error> {
        self.framed.next().await.transpose()
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), frame::Error> {
        self.framed.send(frame).await
    }
}
