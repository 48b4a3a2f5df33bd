//! Bridge error types.

use thiserror::Error;

/// Errors produced by the bridge.
///
/// Per-connection failures are surfaced through the bridge-exception
/// callback rather than returned; only startup operations (resolution,
/// bind) report errors to the caller.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Host resolution produced no addresses.
    #[error("could not resolve upstream host {host:?}")]
    Resolve {
        /// The host name that failed to resolve.
        host: String,
    },

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Disconnected,

    /// Socket-level IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
