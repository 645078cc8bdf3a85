//! Simple one-shot commands: remove, rmdir, rename, mkdir, crc.
//!
//! Grounded on `original_source/mavftp.py::cmd_rm`/`cmd_rmdir`/`cmd_rename`/
//! `cmd_mkdir`/`cmd_crc` and their `__handle_*_reply` counterparts; the CRC
//! path also matches `patrickelectric-mavftp-cli/src/controller.rs`'s
//! `CalcFileCRC32Status` arm.

use crate::clock::Clock;
use crate::error::Error;
use crate::frame::{Frame, Opcode};
use crate::transport::Transport;

use super::MavFtpEngine;

impl<T: Transport, C: Clock> MavFtpEngine<T, C> {
    pub fn rm(&mut self, name: &str) {
        log::info!("mavftp: removing {name}");
        let op = self.make_op(Opcode::RemoveFile, 0, name.as_bytes().to_vec());
        self.send(op);
    }

    pub fn rmdir(&mut self, name: &str) {
        log::info!("mavftp: removing directory {name}");
        let op = self.make_op(Opcode::RemoveDirectory, 0, name.as_bytes().to_vec());
        self.send(op);
    }

    pub fn rename(&mut self, old: &str, new: &str) {
        log::info!("mavftp: renaming {old} to {new}");
        let mut payload = old.as_bytes().to_vec();
        payload.push(0);
        payload.extend_from_slice(new.as_bytes());
        let op = self.make_op(Opcode::Rename, 0, payload);
        self.send(op);
    }

    pub fn mkdir(&mut self, name: &str) {
        log::info!("mavftp: creating directory {name}");
        let op = self.make_op(Opcode::CreateDirectory, 0, name.as_bytes().to_vec());
        self.send(op);
    }

    pub fn crc(&mut self, name: &str, on_result: impl FnOnce(Option<u32>) + 'static) {
        log::info!("mavftp: crc {name}");
        self.op_start = Some(self.clock.now());
        self.filename = Some(name.to_string());
        self.crc_callback = Some(Box::new(on_result));
        let op = self.make_op(Opcode::CalcFileCRC32, 0, name.as_bytes().to_vec());
        self.send(op);
    }

    pub(crate) fn handle_remove_reply(&mut self, op: &Frame) {
        if op.opcode != Opcode::Ack {
            log::warn!("mavftp: remove failed: {:?}", op);
            self.last_error = Some(Error::RemoteFailed {
                opcode: op.req_opcode,
                nack: op.nack_error(),
            });
        }
        self.op_pending = false;
    }

    pub(crate) fn handle_rename_reply(&mut self, op: &Frame) {
        if op.opcode != Opcode::Ack {
            log::error!("mavftp: rename failed: {:?}", op);
            self.last_error = Some(Error::RemoteFailed {
                opcode: op.req_opcode,
                nack: op.nack_error(),
            });
        }
        self.op_pending = false;
    }

    pub(crate) fn handle_mkdir_reply(&mut self, op: &Frame) {
        if op.opcode != Opcode::Ack {
            log::error!("mavftp: mkdir failed: {:?}", op);
            self.last_error = Some(Error::RemoteFailed {
                opcode: op.req_opcode,
                nack: op.nack_error(),
            });
        }
        self.op_pending = false;
    }

    pub(crate) fn handle_crc_reply(&mut self, op: &Frame) {
        let result = if op.opcode == Opcode::Ack && op.payload.len() == 4 {
            Some(u32::from_le_bytes([
                op.payload[0],
                op.payload[1],
                op.payload[2],
                op.payload[3],
            ]))
        } else {
            log::error!("mavftp: crc failed: {:?}", op);
            self.last_error = Some(Error::RemoteFailed {
                opcode: op.req_opcode,
                nack: op.nack_error(),
            });
            None
        };
        if let Some(cb) = self.crc_callback.take() {
            cb(result);
        }
        self.op_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::FtpSettings;
    use crate::transport::ChannelTransport;

    fn engine() -> MavFtpEngine<ChannelTransport, FakeClock> {
        MavFtpEngine::with_clock(
            ChannelTransport::new(1, 1),
            1,
            1,
            FtpSettings::default(),
            FakeClock::new(),
        )
    }

    #[test]
    fn crc_ack_decodes_little_endian_u32() {
        let mut e = engine();
        let result = std::rc::Rc::new(std::cell::Cell::new(None));
        let result2 = result.clone();
        e.crc("file.bin", move |v| result2.set(v));
        let ack = Frame {
            seq: 1,
            session: 0,
            opcode: Opcode::Ack,
            size: 4,
            req_opcode: Opcode::CalcFileCRC32,
            burst_complete: false,
            offset: 0,
            payload: 0xDEADBEEFu32.to_le_bytes().to_vec(),
        };
        e.handle_crc_reply(&ack);
        assert_eq!(result.get(), Some(0xDEADBEEF));
        assert!(!e.op_pending);
    }

    #[test]
    fn rename_payload_is_nul_separated() {
        let mut e = engine();
        e.rename("old.txt", "new.txt");
        let (_, _, payload) = e.transport.last_sent().unwrap();
        let body = &payload[crate::frame::HDR_LEN..crate::frame::HDR_LEN + 15];
        assert_eq!(body, b"old.txt\0new.txt");
    }
}
