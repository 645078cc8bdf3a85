//! The engine: one struct owning all protocol state, split across files by
//! concern (session bookkeeping, read, write, list, misc commands, idle
//! ticking, dispatch) the way the source's single `MAVFTP` class is one
//! object with many methods.

mod commands;
mod dispatch;
mod idle;
mod list;
mod read;
mod session;
mod write;

use std::fs::File;
use std::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::FtpSettings;
use crate::error::Error;
use crate::frame::{Frame, Opcode};
use crate::gap::GapList;
use crate::sink::Sink;
use crate::transport::Transport;

pub use list::{EntryKind, ListEntry};

type ReadCallback = Box<dyn FnMut(Option<Sink>)>;
type ReadProgressCallback = Box<dyn FnMut(Option<(u64, u64)>)>;
type PutCallback = Box<dyn FnMut(Option<u64>)>;
type PutProgressCallback = Box<dyn FnMut(Option<f64>)>;
type EntryCallback = Box<dyn FnMut(ListEntry)>;
type ListDoneCallback = Box<dyn FnMut()>;

pub(crate) struct ListState {
    pub path: String,
    pub dir_offset: u32,
    pub total_size: u64,
}

pub(crate) struct WriteState {
    pub fh: File,
    pub remote_name: String,
    pub file_size: u64,
    pub block_size: u32,
    pub total: u32,
    pub list: std::collections::HashSet<u32>,
    pub idx: u32,
    pub recv_idx: i64,
    pub pending: u32,
    pub last_send: Option<Instant>,
    pub acks: u32,
}

/// The MAVFTP client engine. Generic over the transport and, for tests,
/// the clock (so retry deadlines are driven deterministically).
pub struct MavFtpEngine<T: Transport, C: Clock = SystemClock> {
    pub(crate) settings: FtpSettings,
    pub(crate) transport: T,
    pub(crate) clock: C,
    pub(crate) target_system: u8,
    pub(crate) target_component: u8,

    pub(crate) seq: u8,
    pub(crate) session: u8,
    pub(crate) last_op: Option<Frame>,
    pub(crate) last_op_time: Instant,
    pub(crate) rtt_secs: f64,
    pub(crate) op_pending: bool,
    pub(crate) op_start: Option<Instant>,
    pub(crate) open_retries: u32,
    pub(crate) last_error: Option<Error>,

    pub(crate) fh: Option<Sink>,
    pub(crate) filename: Option<String>,
    pub(crate) read_callback: Option<ReadCallback>,
    pub(crate) read_progress: Option<ReadProgressCallback>,
    pub(crate) read_retries: u32,
    pub(crate) read_total: u64,
    pub(crate) duplicates: u32,
    pub(crate) reached_eof: bool,
    pub(crate) last_burst_read: Option<Instant>,
    pub(crate) burst_size: u8,
    pub(crate) gaps: GapList,
    pub(crate) backlog: u32,
    pub(crate) last_gap_send: Option<Instant>,

    pub(crate) write: Option<WriteState>,
    pub(crate) put_callback: Option<PutCallback>,
    pub(crate) put_progress: Option<PutProgressCallback>,

    pub(crate) list_state: Option<ListState>,
    pub(crate) on_entry: Option<EntryCallback>,
    pub(crate) on_list_done: Option<ListDoneCallback>,

    pub(crate) crc_callback: Option<Box<dyn FnOnce(Option<u32>)>>,
}

impl<T: Transport> MavFtpEngine<T, SystemClock> {
    pub fn new(transport: T, target_system: u8, target_component: u8, settings: FtpSettings) -> Self {
        Self::with_clock(transport, target_system, target_component, settings, SystemClock)
    }
}

impl<T: Transport, C: Clock> MavFtpEngine<T, C> {
    pub fn with_clock(
        transport: T,
        target_system: u8,
        target_component: u8,
        settings: FtpSettings,
        clock: C,
    ) -> Self {
        let now = clock.now();
        Self {
            settings,
            transport,
            clock,
            target_system,
            target_component,
            seq: 0,
            session: 0,
            last_op: None,
            last_op_time: now,
            rtt_secs: 0.5,
            op_pending: false,
            op_start: None,
            open_retries: 0,
            last_error: None,
            fh: None,
            filename: None,
            read_callback: None,
            read_progress: None,
            read_retries: 0,
            read_total: 0,
            duplicates: 0,
            reached_eof: false,
            last_burst_read: None,
            burst_size: 80,
            gaps: GapList::new(),
            backlog: 0,
            last_gap_send: None,
            write: None,
            put_callback: None,
            put_progress: None,
            list_state: None,
            on_entry: None,
            on_list_done: None,
            crc_callback: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.op_pending
    }

    pub fn duplicates(&self) -> u32 {
        self.duplicates
    }

    pub fn read_retries(&self) -> u32 {
        self.read_retries
    }

    pub fn gap_count(&self) -> usize {
        self.gaps.len()
    }

    /// Take the most recent protocol/transport/remote failure, if any.
    /// `execute` surfaces this itself; callers driving the engine by hand
    /// (outside `execute`) should check this after a command to tell a
    /// remote Nack or transport failure apart from a plain "no reply yet".
    pub fn last_error(&mut self) -> Option<Error> {
        self.last_error.take()
    }

    /// Current transfer offset, gap count, retry count and observed
    /// throughput.
    pub fn status(&mut self) -> Option<TransferStatus> {
        let fh = self.fh.as_mut()?;
        let offset = fh.position().ok()?;
        let dt = self
            .op_start
            .map(|start| self.clock.now().saturating_duration_since(start).as_secs_f64())
            .unwrap_or(0.0);
        let rate_kbps = if dt > 0.0 {
            (offset as f64 / dt) / 1024.0
        } else {
            0.0
        };
        Some(TransferStatus {
            offset,
            gaps: self.gaps.len(),
            retries: self.read_retries,
            rate_kbps,
        })
    }

    /// Cancel any pending operation immediately.
    pub fn cancel(&mut self) {
        self.terminate_session();
    }

    /// Drive the protocol until `op_pending` clears or `timeout` elapses
    /// The caller is expected to own the blocking
    /// receive loop in real deployments; this helper is provided for tests
    /// and the demo binary, matching `execute_ftp_operation` in the source.
    pub fn execute(&mut self, timeout: std::time::Duration) -> Result<(), Error> {
        let start = self.clock.now();
        while self.op_pending {
            if let Some(err) = self.last_error.take() {
                self.terminate_session();
                return Err(err);
            }
            if let Some(msg) = self.transport.recv_match(std::time::Duration::from_millis(100)) {
                self.handle_packet(&msg);
            }
            self.tick();
            if self.clock.now().saturating_duration_since(start) > timeout {
                log::warn!("mavftp: operation timed out after {:?}", timeout);
                self.terminate_session();
                return Err(Error::Timeout);
            }
        }
        if let Some(err) = self.last_error.take() {
            return Err(err);
        }
        Ok(())
    }
}

impl<T: Transport> MavFtpEngine<T, crate::clock::FakeClock> {
    /// Advance the fake clock driving retry/timeout deadlines. Only
    /// available when the engine was built with `with_clock(..., FakeClock)`,
    /// for deterministic tests outside this crate.
    pub fn advance_clock(&self, dt: std::time::Duration) {
        self.clock.advance(dt);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransferStatus {
    pub offset: u64,
    pub gaps: usize,
    pub retries: u32,
    pub rate_kbps: f64,
}

/// Shared send primitive used by every command: stamp `seq`, pack, hand to
/// the transport, advance `seq`, record `last_op`.
impl<T: Transport, C: Clock> MavFtpEngine<T, C> {
    pub(crate) fn send(&mut self, mut op: Frame) {
        op.seq = self.seq as u16;
        let payload = op.to_bytes();
        if let Err(msg) = self
            .transport
            .send_frame(self.target_system, self.target_component, &payload)
        {
            log::warn!("mavftp: send failed: {msg}");
            self.last_error = Some(Error::Transport(msg));
        }
        self.seq = self.seq.wrapping_add(1);
        let now = self.clock.now();
        if self.settings.debug > 1 {
            log::info!("> {:?} dt={:.2}", op, now.saturating_duration_since(self.last_op_time).as_secs_f64());
        }
        self.last_op_time = now;
        self.last_op = Some(op);
        self.op_pending = true;
    }

    pub(crate) fn make_op(&self, opcode: Opcode, offset: u32, payload: Vec<u8>) -> Frame {
        Frame::new(self.seq as u16, self.session, opcode, offset, payload)
    }
}
