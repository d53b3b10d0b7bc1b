//! TCP transport.
//!
//! # Example
//!
//! ```no_run
//! use beepwire::transport::{connect, Listener};
//!
//! # async fn run() -> beepwire::Result<()> {
//! let listener = Listener::bind("127.0.0.1:10288").await?;
//! let (stream, peer) = listener.accept().await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::Result;

/// TCP listener accepting session connections.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Bind to `addr`. Port 0 picks a free port.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        debug!(addr = %listener.local_addr()?, "listening");
        Ok(Self { listener })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        debug!(peer = %peer, "connection accepted");
        Ok((stream, peer))
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Connect to a listening peer.
pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    debug!(peer = %stream.peer_addr()?, "connected");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_and_accept() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = connect(addr).await.unwrap();
            stream.write_all(b"RPY 0 0 . 0 0\r\nEND\r\n").await.unwrap();
        });

        let (mut stream, _peer) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        client.await.unwrap();

        assert_eq!(buf, b"RPY 0 0 . 0 0\r\nEND\r\n");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(connect(addr).await.is_err());
    }
}
