//! Structured error types surfaced by the engine and the parameter decoder.
//!
//! Distinct variants per failure mode, built with `thiserror`, the way
//! `oferchen-rsync`'s `protocol`/`logging` crates do it.

use crate::frame::{FrameError, NackError, Opcode};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to open local file {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote {opcode:?} failed: {nack}")]
    RemoteFailed { opcode: Opcode, nack: NackError },

    #[error("operation timed out")]
    Timeout,

    #[error("another command is already in progress")]
    Busy,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum ParamDecodeError {
    #[error("bad magic {found:#06x}, expected 0x671b or 0x671c")]
    BadMagic { found: u16 },
    #[error("bad parameter type tag {0:#x}")]
    BadType(u8),
    #[error("parameter count mismatch: decoded {decoded}, header said {expected}")]
    CountMismatch { decoded: u16, expected: u16 },
    #[error("truncated parameter blob")]
    Truncated,
}
