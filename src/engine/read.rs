//! Read engine: burst reads, gap tracking/repair, EOF detection.
//!
//! Grounded on `original_source/mavftp.py::cmd_get`,
//! `__handle_open_ro_reply`, `__handle_burst_read`, `__handle_reply_read`,
//! `__check_read_finished`, `__check_read_send`, `__send_gap_read`. The
//! teacher's `controller.rs` `ReadingFileStatus` path only covers the
//! no-loss case; this restores full gap repair.

use std::time::Instant;

use rand::Rng;

use crate::clock::Clock;
use crate::error::Error;
use crate::frame::{Frame, NackError, Opcode};
use crate::gap::GapKey;
use crate::sink::{write_at, write_at_and_restore, Sink};
use crate::transport::Transport;

use super::MavFtpEngine;

impl<T: Transport, C: Clock> MavFtpEngine<T, C> {
    /// Begin a `get`: terminate any in-flight session, resolve the sink,
    /// send `OpenFileRO`.
    pub fn get(
        &mut self,
        remote: &str,
        local: Option<&str>,
        callback: Option<impl FnMut(Option<Sink>) + 'static>,
        progress: Option<impl FnMut(Option<(u64, u64)>) + 'static>,
    ) {
        self.terminate_session();

        self.filename = Some(match local {
            Some(name) => name.to_string(),
            None => remote
                .rsplit('/')
                .next()
                .unwrap_or(remote)
                .to_string(),
        });
        self.op_start = Some(self.clock.now());
        self.read_callback = callback.map(|cb| Box::new(cb) as Box<dyn FnMut(Option<Sink>)>);
        self.read_progress =
            progress.map(|cb| Box::new(cb) as Box<dyn FnMut(Option<(u64, u64)>)>);
        self.read_retries = 0;
        self.duplicates = 0;
        self.reached_eof = false;
        self.open_retries = 0;
        self.burst_size = match self.settings.burst_read_size {
            0 => 239,
            n if n > 239 => 239,
            n => n,
        };

        let op = self.make_op(Opcode::OpenFileRO, 0, remote.as_bytes().to_vec());
        self.send(op);
    }

    pub(crate) fn handle_open_reply(&mut self, op: &Frame) {
        if op.opcode != Opcode::Ack {
            if self.read_callback.is_none() || self.settings.debug > 0 {
                log::info!("mavftp: open failed");
            }
            self.last_error = Some(Error::RemoteFailed {
                opcode: op.req_opcode,
                nack: op.nack_error(),
            });
            self.terminate_session();
            return;
        }
        let Some(filename) = self.filename.clone() else {
            return;
        };
        let sink_result = if self.read_callback.is_some() || filename == "-" {
            Ok(Sink::memory())
        } else {
            Sink::open_file(&filename)
        };
        match sink_result {
            Ok(sink) => self.fh = Some(sink),
            Err(err) => {
                log::info!("mavftp: failed to open {filename}: {err}");
                self.terminate_session();
                return;
            }
        }
        let read = self.make_op(Opcode::BurstReadFile, 0, Vec::new());
        let read = Frame {
            size: self.burst_size,
            ..read
        };
        self.last_burst_read = Some(self.clock.now());
        self.send(read);
    }

    /// Write a payload at `offset`. `restore` controls whether the cursor is
    /// put back afterwards: gap fills (behind the main read cursor) restore
    /// it so the next in-order write still lands where it should; in-order
    /// and forward-jump writes leave the cursor at `offset + len`, which
    /// becomes the new read position.
    fn write_payload(&mut self, offset: u32, payload: &[u8], restore: bool) {
        if let Some(fh) = self.fh.as_mut() {
            let result = if restore {
                write_at_and_restore(fh, offset, payload)
            } else {
                write_at(fh, offset, payload)
            };
            let _ = result;
        }
        self.read_total += payload.len() as u64;
        if let Some(cb) = self.read_progress.as_mut() {
            cb(Some((self.read_total, self.read_total + 1)));
        }
    }

    pub(crate) fn handle_burst_read(&mut self, op: &Frame) {
        if self.settings.pkt_loss_tx > 0
            && rand::thread_rng().gen_range(0..100) < self.settings.pkt_loss_tx
        {
            if self.settings.debug > 0 {
                log::warn!("mavftp: dropping simulated TX loss");
            }
            return;
        }
        if self.fh.is_none() || self.filename.is_none() {
            if op.session != self.session {
                return;
            }
            log::warn!("mavftp: unexpected burst read reply: {:?}", op);
            self.last_error = Some(Error::Protocol(format!(
                "burst read reply with no open file: {:?}",
                op
            )));
            return;
        }
        self.last_burst_read = Some(self.clock.now());

        let size = op.payload.len();
        if size > self.burst_size as usize {
            self.burst_size = 239;
            if self.settings.debug > 0 {
                log::info!("mavftp: server ignored burst size, raising to 239");
            }
        }

        match op.opcode {
            Opcode::Ack => self.handle_burst_ack(op),
            Opcode::Nack => self.handle_burst_nack(op),
            _ => log::warn!("mavftp: burst error: {:?}", op),
        }
    }

    fn handle_burst_ack(&mut self, op: &Frame) {
        let ofs = match self.fh.as_mut() {
            Some(fh) => fh.position().unwrap_or(0),
            None => return,
        };

        if (op.offset as u64) < ofs {
            let gap = GapKey {
                offset: op.offset,
                length: op.payload.len() as u8,
            };
            if self.gaps.remove_exact(gap) {
                self.write_payload(op.offset, &op.payload, true);
                if self.check_read_finished() {
                    return;
                }
            } else {
                self.duplicates += 1;
                return;
            }
        } else if (op.offset as u64) > ofs {
            let mut start = ofs as u32;
            let mut remaining = op.offset - start;
            let max_read = self.burst_size as u32;
            while remaining > max_read {
                self.gaps.push(GapKey {
                    offset: start,
                    length: max_read as u8,
                });
                start += max_read;
                remaining -= max_read;
            }
            self.gaps.push(GapKey {
                offset: start,
                length: remaining as u8,
            });
            self.write_payload(op.offset, &op.payload, false);
        } else {
            self.write_payload(op.offset, &op.payload, false);
        }

        if op.burst_complete {
            if op.size > 0 && (op.size as u32) < self.burst_size as u32 {
                if !self.reached_eof && self.settings.debug > 0 {
                    log::info!("mavftp: EOF with {} gaps", self.gaps.len());
                }
                self.reached_eof = true;
                if self.check_read_finished() {
                    return;
                }
                self.check_read_send();
                return;
            }
            let mut more = self.last_op.clone().expect("burst reply implies a prior op");
            more.offset = op.offset + op.size as u32;
            self.send(more);
        }
    }

    fn handle_burst_nack(&mut self, op: &Frame) {
        let ecode = op.payload.first().copied().unwrap_or(0);
        if ecode == NackError::EndOfFile as u8 || ecode == 0 {
            let ofs = self.fh.as_mut().and_then(|fh| fh.position().ok()).unwrap_or(0);
            if !self.reached_eof && (op.offset as u64) > ofs {
                if self.settings.debug > 0 {
                    log::info!("mavftp: lost last part of burst, at {ofs} server says {}", op.offset);
                }
                return;
            }
            self.reached_eof = true;
            if self.check_read_finished() {
                return;
            }
            self.check_read_send();
        } else if self.settings.debug > 0 {
            log::info!("mavftp: burst nack ecode={ecode}: {:?}", op);
        }
    }

    /// `ReadFile` reply: a gap-fill response.
    pub(crate) fn handle_read_reply(&mut self, op: &Frame) {
        if self.fh.is_none() || self.filename.is_none() {
            if self.settings.debug > 0 {
                log::warn!("mavftp: unexpected read reply: {:?}", op);
            }
            self.last_error = Some(Error::Protocol(format!(
                "read reply with no open file: {:?}",
                op
            )));
            return;
        }
        if self.backlog > 0 {
            self.backlog -= 1;
        }
        match op.opcode {
            Opcode::Ack => {
                let gap = GapKey {
                    offset: op.offset,
                    length: op.size,
                };
                if self.gaps.remove_exact(gap) {
                    self.write_payload(op.offset, &op.payload, true);
                    if self.check_read_finished() {
                        return;
                    }
                } else if (op.size as u8) < self.burst_size {
                    log::info!("mavftp: file size changed to {}", op.offset + op.size as u32);
                    self.terminate_session();
                    return;
                } else {
                    self.duplicates += 1;
                }
            }
            Opcode::Nack => {
                log::info!("mavftp: read failed with {} gaps", self.gaps.len());
                self.last_error = Some(Error::RemoteFailed {
                    opcode: op.req_opcode,
                    nack: op.nack_error(),
                });
                self.terminate_session();
                return;
            }
            _ => {}
        }
        self.check_read_send();
    }

    /// Rewind and deliver the assembled file if EOF has been reached and no
    /// gaps remain. Exactly one completion callback fires per command.
    pub(crate) fn check_read_finished(&mut self) -> bool {
        if self.reached_eof && self.gaps.is_empty() {
            let Some(mut fh) = self.fh.take() else {
                return false;
            };
            let _ = fh.position();
            use std::io::{Seek, SeekFrom};
            let _ = fh.seek(SeekFrom::Start(0));
            if let Some(mut cb) = self.read_callback.take() {
                cb(Some(fh));
            } else if self.filename.as_deref() == Some("-") {
                if let Ok(bytes) = fh.into_bytes() {
                    log::info!("{}", String::from_utf8_lossy(&bytes));
                }
            }
            self.read_progress = None;
            self.op_pending = false;
            self.terminate_session();
            true
        } else {
            false
        }
    }

    pub(crate) fn send_gap_read(&mut self, gap: GapKey) {
        if self.settings.debug > 0 {
            log::info!(
                "mavftp: gap read of {} at {} rem={} backlog={}",
                gap.length,
                gap.offset,
                self.gaps.len(),
                self.backlog
            );
        }
        let read = self.make_op(Opcode::ReadFile, gap.offset, Vec::new());
        let read = Frame {
            size: gap.length,
            ..read
        };
        self.send(read);
        let now = self.clock.now();
        self.gaps.mark_sent(gap, now);
        self.last_gap_send = Some(now);
        self.backlog += 1;
    }

    /// Decide whether to send another gap read.
    pub(crate) fn check_read_send(&mut self) {
        if self.gaps.is_empty() {
            return;
        }
        if !self.reached_eof {
            for gap in self.gaps.unsent() {
                self.send_gap_read(gap);
            }
            return;
        }

        let now = self.clock.now();
        if let Some(Some(last_sent)) = self.gaps.head_last_sent() {
            if now.saturating_duration_since(last_sent) > self.settings.retry_time {
                if self.backlog > 0 {
                    self.backlog -= 1;
                }
                self.gaps.reset_head_last_sent();
            }
        }

        if self.gaps.head_last_sent() != Some(None) {
            return;
        }
        if self.backlog >= self.settings.max_backlog {
            return;
        }
        if let Some(last) = self.last_gap_send {
            if now.saturating_duration_since(last) < std::time::Duration::from_millis(50) {
                return;
            }
        }
        if let Some(gap) = self.gaps.head() {
            self.send_gap_read(gap);
        }
    }

    pub(crate) fn retry_burst_stall(&mut self, now: Instant) {
        if !self.reached_eof && self.last_burst_read.is_some() {
            let last = self.last_burst_read.unwrap();
            if now.saturating_duration_since(last) > self.settings.retry_time {
                self.last_burst_read = Some(now);
                let offset = self
                    .fh
                    .as_mut()
                    .and_then(|fh| fh.position().ok())
                    .unwrap_or(0) as u32;
                let read = self.make_op(Opcode::BurstReadFile, offset, Vec::new());
                let read = Frame {
                    size: self.burst_size,
                    ..read
                };
                self.send(read);
                self.read_retries += 1;
            }
        }
    }
}
