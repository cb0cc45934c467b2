//! Peer-side connection to the hub.
//!
//! [`PeerClient`] speaks the same framing as the server and is what the
//! integration tests and the `send_request` demo use to act as a sequencer.
//!
//! # Example
//!
//! ```no_run
//! use shared_publisher::client::PeerClient;
//! use shared_publisher::protocol::{Message, TransactionRequest};
//!
//! #[tokio::main]
//! async fn main() -> shared_publisher::Result<()> {
//!     let mut client = PeerClient::connect("127.0.0.1:8080", 10 * 1024 * 1024).await?;
//!
//!     let batch = Message::xt_request(
//!         "sequencer-a",
//!         vec![TransactionRequest::new(vec![0x12, 0x34], vec![b"tx".to_vec()])],
//!     );
//!     client.send(&batch).await?;
//!
//!     let forwarded = client.recv().await?;
//!     println!("from {}", forwarded.sender_id);
//!     client.close().await;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::codec::FrameCodec;
use crate::connection::ConnectionId;
use crate::error::{PublisherError, Result};
use crate::protocol::Message;
use crate::writer::SerializedWriter;

/// A single peer session with the hub.
pub struct PeerClient {
    codec: FrameCodec,
    reader: OwnedReadHalf,
    writer: SerializedWriter,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl PeerClient {
    /// Connect to the hub at `addr`.
    ///
    /// `max_message_size` bounds frames in both directions, as on the server.
    pub async fn connect(addr: impl ToSocketAddrs, max_message_size: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;

        let codec = FrameCodec::new(max_message_size);
        let (reader, write_half) = stream.into_split();
        let writer = SerializedWriter::new(ConnectionId::new(), write_half, codec, Duration::ZERO);

        Ok(Self {
            codec,
            reader,
            writer,
            local_addr,
            peer_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Send one message.
    pub async fn send(&self, message: &Message) -> Result<()> {
        self.writer.write(message).await.map(|_| ())
    }

    /// Wait for the next frame from the hub.
    ///
    /// # Errors
    ///
    /// `StreamClosed` once the hub has closed the connection.
    pub async fn recv(&mut self) -> Result<Message> {
        self.codec.decode(&mut self.reader).await
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` if nothing arrived. A timeout that fires while a
    /// frame is partially read leaves the stream misaligned; use it only to
    /// assert silence or on whole-frame traffic.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Message>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// True once the hub has closed its side, checked for up to `timeout`.
    pub async fn is_closed_by_peer(&mut self, timeout: Duration) -> bool {
        matches!(
            self.recv_timeout(timeout).await,
            Err(PublisherError::StreamClosed) | Err(PublisherError::Io(_))
        )
    }

    /// Shut down the write side and drop the connection.
    pub async fn close(self) {
        self.writer.close().await;
    }
}

impl std::fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient")
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TransactionRequest;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_and_recv_against_raw_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = PeerClient::connect(addr, 4096).await.unwrap();
        let (mut server_side, _) = listener.accept().await.unwrap();
        assert_eq!(client.peer_addr(), addr);

        let msg = Message::xt_request(
            "seq-a",
            vec![TransactionRequest::new(vec![7], vec![b"tx".to_vec()])],
        );
        client.send(&msg).await.unwrap();

        let codec = FrameCodec::new(4096);
        let received = codec.decode(&mut server_side).await.unwrap();
        assert_eq!(received, msg);

        let reply = codec.encode(&Message::xt_request("hub", vec![])).unwrap();
        server_side.write_all(&reply).await.unwrap();
        assert_eq!(client.recv().await.unwrap().sender_id, "hub");
    }

    #[tokio::test]
    async fn test_recv_timeout_returns_none_on_silence() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = PeerClient::connect(listener.local_addr().unwrap(), 4096)
            .await
            .unwrap();
        let _server_side = listener.accept().await.unwrap();

        let got = client.recv_timeout(Duration::from_millis(30)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_detects_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = PeerClient::connect(listener.local_addr().unwrap(), 4096)
            .await
            .unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        drop(server_side);

        assert!(client.is_closed_by_peer(Duration::from_secs(1)).await);
    }
}
