pub mod cursor;

pub use cursor::{ReadCursor, WriteCursor};
