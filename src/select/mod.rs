//! Global Selection & Remap: turns a consumer's per-connection partition
//! metadata plus a caller-specified `(size, offset)` window into a
//! redistribution descriptor, then scatters the owned partitions' bytes
//! into the caller's window buffer.
//!
//! The N-to-M redistribution kernel itself ([`remap::scatter_window`]) is
//! kept as a single function so an external, more sophisticated kernel
//! could be swapped in behind it without changing [`Selection`]'s public
//! shape.

pub mod remap;

use crate::error::{Result, StreamError};
use crate::wire::types::BaseType;

/// Which remap shape applies to a selection, chosen from the selected
/// variable's dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    Continuous,
    Grid2D,
    Grid3D,
}

impl ProblemKind {
    pub fn from_dims(dims: usize) -> Result<Self> {
        Ok(match dims {
            1 => ProblemKind::Continuous,
            2 => ProblemKind::Grid2D,
            3 => ProblemKind::Grid3D,
            other => return Err(StreamError::InvalidSelectionDims(other as u32)),
        })
    }
}

/// One owned connection's current partition metadata in the producer's
/// global coordinate space, as of the last frame read.
#[derive(Debug, Clone)]
pub struct ConnPartition {
    pub l_size: Vec<u32>,
    pub l_offset: Vec<u32>,
}

/// Everything [`remap::scatter_window`] needs: every owned connection's
/// partition, in connection order, plus the desired window.
#[derive(Debug, Clone)]
pub struct SelectionDescriptor {
    pub owned_chunks: Vec<ConnPartition>,
    pub window_size: Vec<u32>,
    pub window_offset: Vec<u32>,
}

/// A consumer-side reorganization descriptor for one array variable,
/// built by `Consumer::create_global_array_selection` and consumed by
/// `Consumer::fill_selection`.
#[derive(Debug, Clone)]
pub struct Selection {
    pub var_name: String,
    pub kind: ProblemKind,
    pub element_type: BaseType,
    pub element_size: usize,
    pub descriptor: SelectionDescriptor,
}
