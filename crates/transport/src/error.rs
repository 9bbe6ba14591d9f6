//! Errors surfaced by the replay transport (spec §7 "Protocol error").
//!
//! Protocol errors terminate the owning session; they never propagate into
//! the interpreter's own error space (`gapir_vm::VmError`), which the
//! daemon crate maps separately.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The inbound message did not match the kind the blocking call expected.
    #[error("expected {expected} message, got {got}")]
    KindMismatch { expected: &'static str, got: &'static str },

    /// `Resources.data` did not match `ResourceRequest.expectedTotalSize`.
    #[error("resource response carried {got} bytes, expected {expected}")]
    SizeMismatch { got: u64, expected: u64 },

    /// The stream ended before a requested message arrived.
    #[error("replay stream closed while waiting for {0}")]
    StreamClosed(&'static str),

    /// `gapir-auth-token` did not byte-match the configured token.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A frame's declared length exceeded the maximum allowed frame size.
    #[error("frame length {got} exceeds maximum of {max}")]
    FrameTooLarge { got: u32, max: u32 },

    /// Underlying I/O failure on the transport socket or archive files.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame's JSON payload could not be decoded.
    #[error("malformed message frame: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;
