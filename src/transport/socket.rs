//! Connected message sockets and listeners

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};

use super::endpoint::Endpoint;
use super::frame::{self, Message};

/// A connected bidirectional message socket.
///
/// Sends and receives whole multipart messages. Request/response roles are a
/// usage convention layered on top by the transaction primitives.
#[derive(Debug)]
pub struct MessageSocket {
    stream: TcpStream,
    inbound: Vec<u8>,
}

impl MessageSocket {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        let stream = TcpStream::connect(endpoint.connect_pair())
            .await
            .map_err(|e| Error::Transport(format!("unable to connect to {endpoint}: {e}")))?;

        stream
            .set_nodelay(true)
            .map_err(|e| Error::Transport(format!("unable to configure socket: {e}")))?;

        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            inbound: Vec::new(),
        }
    }

    pub async fn send(&mut self, parts: &[Vec<u8>]) -> Result<()> {
        frame::write_message(&mut self.stream, parts)
            .await
            .map_err(|e| Error::Transport(format!("unable to send message: {e}")))
    }

    /// Receive the next whole message.
    ///
    /// Cancel safe: a receive abandoned mid-message (losing a `select!`
    /// race, a transaction timeout) leaves partially read bytes buffered,
    /// and the next call resumes from them.
    pub async fn recv(&mut self) -> Result<Message> {
        loop {
            match frame::decode_message(&self.inbound) {
                Ok(Some((message, consumed))) => {
                    self.inbound.drain(..consumed);
                    return Ok(message);
                }
                Ok(None) => {}
                Err(e) => return Err(Error::Protocol(e.to_string())),
            }

            let mut chunk = [0u8; 4096];
            let read = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| Error::Transport(format!("unable to receive message: {e}")))?;

            if read == 0 {
                return Err(Error::Transport("connection closed by peer".to_string()));
            }

            self.inbound.extend_from_slice(&chunk[..read]);
        }
    }

    pub fn peer_endpoint(&self) -> Option<Endpoint> {
        self.stream.peer_addr().ok().map(Endpoint::from)
    }

    /// Split into independently-owned read and write halves for tasks that
    /// pump both directions concurrently. Split before the first receive;
    /// buffered partial input does not carry over.
    pub fn into_split(self) -> (tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf) {
        self.stream.into_split()
    }
}

/// A bound listener producing [`MessageSocket`]s.
#[derive(Debug)]
pub struct MessageListener {
    listener: TcpListener,
    local: Endpoint,
}

impl MessageListener {
    /// Bind to an ephemeral loopback port. The bound endpoint is reported by
    /// [`MessageListener::local_endpoint`], matching the rendezvous pattern
    /// where the actual address travels in a bootstrap message.
    pub async fn bind_local() -> Result<Self> {
        Self::bind(&Endpoint::new("127.0.0.1", 0)).await
    }

    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let listener = TcpListener::bind(endpoint.connect_pair())
            .await
            .map_err(|e| Error::Transport(format!("unable to bind {endpoint}: {e}")))?;

        let local = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("unable to determine bound endpoint: {e}")))?
            .into();

        Ok(Self { listener, local })
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    pub async fn accept(&self) -> Result<MessageSocket> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(|e| Error::Transport(format!("accept failed on {}: {e}", self.local)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| Error::Transport(format!("unable to configure socket: {e}")))?;

        Ok(MessageSocket::from_stream(stream))
    }
}
