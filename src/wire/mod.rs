//! Variable schema model and binary wire codecs shared by the producer
//! and consumer sides of the mesh: the typed `Variable`/`BaseType` data
//! model (`types`), the one-byte-order-quirk-preserved endianness helpers
//! (`endian`), the per-connection schema blob codec (`schema`), and the
//! per-value frame message codec (`frame`).

pub mod endian;
pub mod frame;
pub mod schema;
pub mod types;

pub use endian::Endianness;
pub use frame::{FrameCodec, FrameMessage, END_OF_FRAME};
pub use schema::{decode_schema, encode_schema};
pub use types::{BaseType, Variable};
