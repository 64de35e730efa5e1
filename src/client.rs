//! Per-connection handler.
//!
//! Each accepted connection is owned by exactly one `Client`, running in its
//! own task. The handler loops over timed read, dispatch and write until the
//! peer goes idle, closes, or the transport fails.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

use crate::commands::CommandTable;
use crate::protocol::{decode_request, encode_response, READ_BUFFER_SIZE};

/// Why a connection's request loop ended
#[derive(Debug)]
pub enum ClientError {
    /// No request arrived within the idle timeout
    Timeout(Duration),
    /// The peer closed the connection (zero-byte read)
    Closed,
    /// Transport error on read or write
    Io(std::io::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Timeout(d) => write!(f, "idle for {}s", d.as_secs_f64()),
            ClientError::Closed => write!(f, "closed by peer"),
            ClientError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

/// Connection state, exclusively owned by its handler task
pub struct Client {
    id: String,
    idle_timeout: Duration,
    requests: u64,
    buffer: [u8; READ_BUFFER_SIZE],
}

impl Client {
    pub fn new(id: String, idle_timeout: Duration) -> Self {
        Client {
            id,
            idle_timeout,
            requests: 0,
            buffer: [0; READ_BUFFER_SIZE],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of completed reads so far
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Own `stream` until the connection ends, then close it.
    pub async fn run(mut self, mut stream: TcpStream, commands: Arc<CommandTable>) {
        let peer = stream.peer_addr().ok();
        debug!(peer = ?peer, id = %self.id, "Handling connection");

        let reason = self.serve(&mut stream, &commands).await;

        let _ = stream.shutdown().await;
        log_close(peer, &self, &reason);
    }

    /// Request loop. Returns only once the connection is done, with the reason.
    pub async fn serve<S>(&mut self, stream: &mut S, commands: &CommandTable) -> ClientError
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let request = match self.read_request(stream).await {
                Ok(request) => request,
                Err(e) => return e,
            };

            let response = commands.dispatch(&request);
            trace!(id = %self.id, request = %request, response = %response, "Request");

            if let Err(e) = stream.write_all(&encode_response(&response)).await {
                return ClientError::Io(e);
            }
        }
    }

    /// Read the next request chunk, giving up after the idle timeout.
    ///
    /// A single read of at most `READ_BUFFER_SIZE` bytes is one request;
    /// longer or split lines are not reassembled. On timeout the pending
    /// read is dropped, which cancels it.
    pub async fn read_request<R>(&mut self, reader: &mut R) -> Result<String, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        let read = tokio::time::timeout(self.idle_timeout, reader.read(&mut self.buffer)).await;

        let n = match read {
            Err(_) => return Err(ClientError::Timeout(self.idle_timeout)),
            Ok(result) => {
                self.requests += 1;
                result?
            }
        };

        if n == 0 {
            return Err(ClientError::Closed);
        }

        Ok(decode_request(&self.buffer[..n]))
    }
}

fn log_close(peer: Option<SocketAddr>, client: &Client, reason: &ClientError) {
    match peer {
        Some(peer) => info!(
            peer = %peer,
            id = %client.id(),
            requests = client.requests(),
            reason = %reason,
            "Closing connection"
        ),
        None => info!(
            id = %client.id(),
            requests = client.requests(),
            reason = %reason,
            "Closing connection"
        ),
    }
}
