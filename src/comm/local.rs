//! In-process `GroupComm` for N cooperating `tokio::task`s in the same
//! process. Not a general-purpose concurrent collectives library - it
//! assumes every rank calls collective operations in the same order
//! (true of the bootstrap protocol in `mesh`, which is the only caller),
//! and uses a shared `tokio::sync::Barrier` to serialize rounds: one
//! wait after ranks deposit into a shared slot, a second after the
//! reading rank(s) have consumed it, so the next round's writes can't
//! race the current round's reads.

use std::sync::Arc;

use tokio::sync::{Barrier, Mutex};

use crate::comm::GroupComm;
use crate::error::Result;

struct Shared {
    size: usize,
    barrier: Barrier,
    gather_slots: Mutex<Vec<Vec<u8>>>,
    broadcast_slot: Mutex<Vec<u8>>,
}

/// One rank's handle onto a `LocalGroupComm` group. Cheaply `Clone`,
/// cheap to pass into a `tokio::spawn`ed task per rank.
#[derive(Clone)]
pub struct LocalGroupComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalGroupComm {
    /// Builds a group of `size` handles, one per rank, sharing one
    /// synchronization core. Typically each is moved into its own
    /// `tokio::spawn`ed task.
    pub fn new_group(size: usize) -> Vec<LocalGroupComm> {
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            gather_slots: Mutex::new(vec![Vec::new(); size]),
            broadcast_slot: Mutex::new(Vec::new()),
        });
        (0..size)
            .map(|rank| LocalGroupComm {
                rank,
                shared: shared.clone(),
            })
            .collect()
    }
}

impl GroupComm for LocalGroupComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    async fn broadcast_bytes(&self, root: usize, buf: &mut Vec<u8>) -> Result<()> {
        if self.rank == root {
            let mut slot = self.shared.broadcast_slot.lock().await;
            *slot = buf.clone();
        }
        self.shared.barrier.wait().await;
        if self.rank != root {
            let slot = self.shared.broadcast_slot.lock().await;
            *buf = slot.clone();
        }
        self.shared.barrier.wait().await;
        Ok(())
    }

    async fn gather_bytes(&self, root: usize, buf: &[u8]) -> Result<Option<Vec<Vec<u8>>>> {
        {
            let mut slots = self.shared.gather_slots.lock().await;
            slots[self.rank] = buf.to_vec();
        }
        self.shared.barrier.wait().await;
        let result = if self.rank == root {
            let slots = self.shared.gather_slots.lock().await;
            Some(slots.clone())
        } else {
            None
        };
        self.shared.barrier.wait().await;
        Ok(result)
    }

    async fn barrier(&self) -> Result<()> {
        self.shared.barrier.wait().await;
        Ok(())
    }
}
