//! Framing error types.

use thiserror::Error;

/// Errors that can occur while decoding framed data.
///
/// The framing layer trusts declared lengths, so the only fallible entry
/// point is decoding a header from a buffer that is too short. Malformed
/// headers still produce packets; a relay surfaces length lies as I/O
/// failures when the declared bytes never arrive.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Not enough bytes to decode a packet header.
    #[error("incomplete header: expected {expected} bytes, got {actual}")]
    IncompleteHeader {
        /// Bytes required for a full header.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
}
