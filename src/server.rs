//! TCP acceptor.
//!
//! Owns the listening socket, accepts connections and spawns one
//! `Client` task per connection. There is no connection limit.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::client::Client;
use crate::commands::CommandTable;
use crate::config::Config;
use crate::generator;

/// Server instance
pub struct Server {
    config: Config,
    commands: Arc<CommandTable>,
}

impl Server {
    /// Create a new server instance. The command table is built here, before
    /// any connection is accepted.
    pub fn new(config: Config) -> Self {
        let commands = Arc::new(CommandTable::new(config.bytes_length));
        debug!(commands = ?commands.keywords(), "Command table ready");

        Server { config, commands }
    }

    /// Bind the listening socket. Failure here is fatal to the process.
    pub fn bind(&self) -> io::Result<TcpListener> {
        let ip: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let addr = SocketAddr::new(ip, self.config.port);

        let listener = TcpListener::from_std(create_listener(addr)?)?;
        info!(address = %listener.local_addr()?, "Server listening");
        Ok(listener)
    }

    /// Accept connections forever. Accept errors are logged and skipped.
    pub async fn run(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let client = Client::new(generator::create_txid(), self.config.idle_timeout);
                    info!(peer = %addr, id = %client.id(), "New connection");

                    let commands = Arc::clone(&self.commands);
                    tokio::spawn(client.run(stream, commands));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Get a reference to the command table for testing
    #[cfg(test)]
    pub fn commands(&self) -> &Arc<CommandTable> {
        &self.commands
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR set.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config(idle_timeout: Duration) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            idle_timeout,
            ..Config::default()
        }
    }

    /// Start a server on an ephemeral port and return its address.
    async fn start_server(idle_timeout: Duration) -> SocketAddr {
        let server = Server::new(test_config(idle_timeout));
        let listener = server.bind().unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.run(listener).await });
        addr
    }

    async fn request(stream: &mut TcpStream, command: &str) -> String {
        stream
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .unwrap();

        let mut response = Vec::new();
        let mut buf = [0u8; 256];
        while !response.ends_with(b"\n\r") {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed mid-response");
            response.extend_from_slice(&buf[..n]);
        }
        response.truncate(response.len() - 2);
        String::from_utf8(response).unwrap()
    }

    /// True once the server has dropped the connection.
    async fn is_closed(stream: &mut TcpStream) -> bool {
        let _ = stream.write_all(b"ping\n").await;
        let mut buf = [0u8; 16];
        matches!(stream.read(&mut buf).await, Ok(0) | Err(_))
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = Server::new(test_config(Duration::from_secs(300)));
        assert!(server.commands().keywords().contains(&"ping"));
        assert_eq!(server.commands().keywords().len(), 11);
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let first = Server::new(test_config(Duration::from_secs(300)));
        let listener = first.bind().unwrap();

        let config = Config {
            port: listener.local_addr().unwrap().port(),
            ..test_config(Duration::from_secs(300))
        };
        // SO_REUSEADDR does not allow two listeners on one port
        assert!(Server::new(config).bind().is_err());
    }

    #[tokio::test]
    async fn test_bind_invalid_host() {
        let config = Config {
            host: "not an address".to_string(),
            ..test_config(Duration::from_secs(300))
        };
        let err = Server::new(config).bind().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_session() {
        let addr = start_server(Duration::from_millis(300)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        assert_eq!(request(&mut stream, "ping").await, "pong");
        assert_eq!(request(&mut stream, "bogus").await, "error");
        assert_eq!(request(&mut stream, "noop").await, "ok");
        assert_eq!(request(&mut stream, "version").await, generator::version());
        assert_eq!(request(&mut stream, "uuid").await.len(), 36);
        assert_eq!(request(&mut stream, "bytes").await.len(), 48);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(is_closed(&mut stream).await);
    }

    #[tokio::test]
    async fn test_raw_framing() {
        let addr = start_server(Duration::from_secs(5)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(b"  ping \r\n").await.unwrap();
        let mut buf = [0u8; 6];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong\n\r");
    }

    #[tokio::test]
    async fn test_slow_client_is_disconnected() {
        let addr = start_server(Duration::from_millis(200)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        assert_eq!(request(&mut stream, "ping").await, "pong");

        // gap longer than the idle timeout
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(is_closed(&mut stream).await);
    }

    #[tokio::test]
    async fn test_concurrent_clients_no_cross_talk() {
        let addr = start_server(Duration::from_secs(5)).await;
        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        for _ in 0..10 {
            assert_eq!(request(&mut a, "ping").await, "pong");
            assert_eq!(request(&mut b, "noop").await, "ok");
            assert_eq!(request(&mut a, "bogus").await, "error");
            assert_eq!(request(&mut b, "version").await, generator::version());
        }
    }

    #[tokio::test]
    async fn test_many_parallel_clients() {
        let addr = start_server(Duration::from_secs(5)).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            handles.push(tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                let mut ids = Vec::new();
                for _ in 0..5 {
                    ids.push(request(&mut stream, "txid").await);
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert_eq!(id.len(), 16);
                assert!(seen.insert(id));
            }
        }
    }

    #[tokio::test]
    async fn test_peer_close_does_not_affect_others() {
        let addr = start_server(Duration::from_secs(5)).await;
        let mut survivor = TcpStream::connect(addr).await.unwrap();

        let gone = TcpStream::connect(addr).await.unwrap();
        drop(gone);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(request(&mut survivor, "ping").await, "pong");
    }
}
