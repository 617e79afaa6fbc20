//! Group communicator boundary: the collective operations a producer or
//! consumer peer group needs during bootstrap (gather the master list,
//! broadcast it, barrier before tearing down) modeled as a trait so a
//! real deployment can back it with an MPI/PMIx-style communicator
//! without streammesh depending on one directly.
//!
//! `LocalGroupComm` is the one concrete implementation streammesh ships:
//! an in-process, channel-backed stand-in for N cooperating
//! `tokio::task`s, used by this crate's own tests and demo binaries.

pub mod local;

pub use local::LocalGroupComm;

use crate::error::Result;

/// Collective operations over a fixed-size group of ranks. All methods
/// are `async fn`s used through a generic type parameter rather than a
/// trait object, so no boxed-future adapter is needed here.
pub trait GroupComm: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Broadcasts `buf`'s contents from `root` to every rank. On
    /// non-root ranks, `buf` is replaced with the broadcast contents.
    async fn broadcast_bytes(&self, root: usize, buf: &mut Vec<u8>) -> Result<()>;

    /// Gathers one byte buffer from every rank to `root`. Returns
    /// `Some(Vec<Vec<u8>>)` (ordered by rank) on `root`, `None` elsewhere.
    async fn gather_bytes(&self, root: usize, buf: &[u8]) -> Result<Option<Vec<Vec<u8>>>>;

    /// Blocks until every rank has called `barrier`.
    async fn barrier(&self) -> Result<()>;
}
