//! streammesh: a distributed streaming library that carries typed,
//! multi-dimensional array data from a parallel producer cluster to a
//! parallel consumer cluster over TCP.
//!
//! The crate is organized by concern rather than by peer role:
//! - [`wire`] - the variable schema model and the binary codecs for the
//!   schema blob and per-value frame messages.
//! - [`mesh`] - connection-mesh bootstrap, the 21-byte handshake, and the
//!   [`Producer`]/[`Consumer`] peer types built on top of it.
//! - [`flow`] - the stream-behavior switch (`WaitForAll`/`DropFrames`)
//!   shared by both peer types' frame-advance logic.
//! - [`select`] - the consumer-side global array selection and remap.
//! - [`comm`] - the group-communicator trait boundary plus an in-process
//!   implementation for tests and demos.
//! - [`config`] - the handful of construction-time knobs each peer needs.

pub mod comm;
pub mod config;
pub mod error;
pub mod flow;
pub mod mesh;
pub mod select;
pub mod util;
pub mod wire;

pub use config::{ConsumerConfig, ProducerConfig};
pub use error::{Result, StreamError};
pub use flow::StreamBehavior;
pub use mesh::{Consumer, Producer};
pub use select::{ProblemKind, Selection};
pub use wire::{BaseType, Variable};
