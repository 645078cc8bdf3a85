//! Client-side engine for the MAVLink File Transfer Protocol (MAVFTP).
//!
//! The engine ([`engine::MavFtpEngine`]) owns session/sequence bookkeeping,
//! burst-read gap repair, pipelined writes and directory listing, against
//! any [`transport::Transport`] implementation. Feature `mavlink-transport`
//! (on by default) adds an adapter over a live `mavlink::MavConnection` and
//! the `mavftp-demo` binary.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gap;
pub mod param;
pub mod sink;
pub mod transport;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::FtpSettings;
pub use engine::{EntryKind, ListEntry, MavFtpEngine, TransferStatus};
pub use error::{Error, ParamDecodeError};
pub use frame::{Frame, NackError, Opcode};
pub use param::{decode_param_blob, encode_param_blob, ParamEntry, ParamTable, ParamType, ParamValue};
pub use sink::Sink;
pub use transport::{ChannelTransport, RawMessage, Transport};

#[cfg(feature = "mavlink-transport")]
pub use transport::mavlink_adapter::MavlinkTransport;
