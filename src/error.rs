use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Address parse error: {0}")]
    AddrParseError(#[from] std::net::AddrParseError),

    #[error("no free port in range {min}..={max}")]
    PortRangeExhausted { min: u16, max: u16 },

    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("group communicator error: {0}")]
    CommError(String),

    #[error("handshake record had unexpected size: expected {expected}, got {got}")]
    HandshakeSize { expected: usize, got: usize },

    #[error("handshake remote_ranks_total mismatch: expected {expected}, got {got}")]
    HandshakeRanksMismatch { expected: i32, got: i32 },

    #[error("schema decode error: {0}")]
    SchemaDecode(String),

    #[error("variable '{0}' dimensions do not match between global/local/offset lists")]
    VariableDimsMismatch(String),

    #[error("variable '{0}' has no allocated storage (length is still zero)")]
    VariableNotSized(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("invalid selection dims: {0} (expected 1, 2, or 3)")]
    InvalidSelectionDims(u32),

    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    #[error("channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, StreamError>;
