//! Frame protocol & flow control shared types. The producer-side
//! `write()`/`advance_time_step()` and consumer-side `read()`/
//! `release_time_step()` operations themselves live on `Producer` and
//! `Consumer` in `mesh::producer`/`mesh::consumer`, since they're
//! intimately tied to each side's connection bookkeeping; this module
//! holds the behavior switch both sides are configured with.

/// Chosen once at `var_definitions_complete` and fixed for the life of
/// the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamBehavior {
    /// `advance_time_step` blocks until every streaming connection has
    /// sent its release byte for the current frame.
    WaitForAll,
    /// `advance_time_step` drains whatever release bytes have already
    /// arrived and returns immediately, regardless of how many
    /// connections are still behind.
    DropFrames,
}
