//! Inbound dispatch: target filtering, RTT update, routing by `req_opcode`.
//!
//! Grounded on `original_source/mavftp.py::MAVFTP.__mavlink_packet`. The
//! source dispatches with a chain of `if m.req_opcode == OP_...`; here it's
//! a `match` keyed on `req_opcode` instead.

use rand::Rng;

use crate::clock::Clock;
use crate::frame::{Frame, Opcode};
use crate::transport::{RawMessage, Transport};

use super::MavFtpEngine;

impl<T: Transport, C: Clock> MavFtpEngine<T, C> {
    /// Decode and route one inbound datagram. Frames not addressed to us, or
    /// frames dropped by the simulated RX loss setting, are silently ignored.
    pub fn handle_packet(&mut self, msg: &RawMessage) {
        if msg.target_system != self.transport.source_system()
            || msg.target_component != self.transport.source_component()
        {
            return;
        }
        if self.settings.pkt_loss_rx > 0
            && rand::thread_rng().gen_range(0..100) < self.settings.pkt_loss_rx
        {
            if self.settings.debug > 0 {
                log::warn!("mavftp: dropping simulated RX loss");
            }
            return;
        }

        let op = match Frame::from_bytes(&msg.payload) {
            Ok(op) => op,
            Err(err) => {
                log::warn!("mavftp: malformed frame: {err}");
                return;
            }
        };

        let now = self.clock.now();
        self.maybe_update_rtt(op.req_opcode, op.seq, now);

        if self.settings.debug > 1 {
            log::info!("< {:?}", op);
        }

        match op.req_opcode {
            Opcode::ListDirectory => self.handle_list_reply(&op),
            Opcode::OpenFileRO => self.handle_open_reply(&op),
            Opcode::BurstReadFile => self.handle_burst_read(&op),
            Opcode::ReadFile => self.handle_read_reply(&op),
            Opcode::CreateFile => self.handle_create_reply(&op),
            Opcode::WriteFile => self.handle_write_reply(&op),
            Opcode::RemoveFile | Opcode::RemoveDirectory => self.handle_remove_reply(&op),
            Opcode::Rename => self.handle_rename_reply(&op),
            Opcode::CreateDirectory => self.handle_mkdir_reply(&op),
            Opcode::CalcFileCRC32 => self.handle_crc_reply(&op),
            Opcode::TerminateSession | Opcode::ResetSessions => {
                self.op_pending = false;
            }
            _ => {
                log::info!("mavftp: unhandled reply for {:?}: {:?}", op.req_opcode, op);
            }
        }
    }
}
