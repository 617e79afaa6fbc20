//! A single producer<->consumer TCP connection after it has joined the
//! mesh: its handshake-derived identity plus the framed codec stream
//! used to exchange schema blobs and per-value frame messages.
//!
//! A `Connection` is only ever constructed once its handshake and schema
//! blob have already been exchanged synchronously, so there is no
//! separate connecting/handshaking state to track here - by the time one
//! exists, it is ready to stream.

use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::wire::FrameCodec;

/// One connection's identity and framed transport. `remote_rank` and
/// `remote_ranks_total` are the peer's rank and group size as learned
/// during the handshake (producer rank for a consumer-side connection,
/// and vice versa).
pub struct Connection {
    pub id: u64,
    pub remote_rank: i32,
    pub remote_ranks_total: i32,
    /// Set for a connection accepted after the initial mesh bootstrap
    /// completed; cleared after its first `write()` on the producer
    /// side.
    pub is_new: bool,
    pub same_endianness: bool,
    pub framed: Framed<TcpStream, FrameCodec>,
}

impl Connection {
    pub fn new(
        id: u64,
        remote_rank: i32,
        remote_ranks_total: i32,
        is_new: bool,
        same_endianness: bool,
        stream: TcpStream,
    ) -> Self {
        Self {
            id,
            remote_rank,
            remote_ranks_total,
            is_new,
            same_endianness,
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_rank", &self.remote_rank)
            .field("remote_ranks_total", &self.remote_ranks_total)
            .field("is_new", &self.is_new)
            .field("same_endianness", &self.same_endianness)
            .finish()
    }
}
