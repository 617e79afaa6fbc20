//! Configuration surface: the handful of knobs a producer or consumer
//! needs at construction time, built programmatically or via a
//! `#[derive(Parser)]` struct in the demo binaries. No config file or
//! environment variable support - these are in-process peer roles, not
//! a standalone daemon.

use crate::flow::StreamBehavior;

/// Settings a producer rank needs to bind its listener and define its
/// initial streaming behavior.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub interface: String,
    pub port_min: u16,
    pub port_max: u16,
    pub stream_behavior: StreamBehavior,
    /// Number of connections `var_definitions_complete` blocks for
    /// before returning.
    pub initial_wait_count: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interface: "lo".to_string(),
            port_min: 8000,
            port_max: 8999,
            stream_behavior: StreamBehavior::WaitForAll,
            initial_wait_count: 1,
        }
    }
}

/// Settings a consumer rank needs to reach a producer's master listener.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub master_host: String,
    pub master_port: u16,
}
