//! Session teardown and RTT estimation.
//!
//! Grounded on `original_source/mavftp.py::MAVFTP.__terminate_session` and
//! the RTT update inline in `__mavlink_packet`.

use std::time::Duration;

use crate::clock::Clock;
use crate::frame::Opcode;
use crate::transport::Transport;

use super::MavFtpEngine;

impl<T: Transport, C: Clock> MavFtpEngine<T, C> {
    /// Tear down the current session: send `TerminateSession`, fire any
    /// pending callbacks with the null sentinel exactly once, reset transfer
    /// state, and cycle the session id.
    pub(crate) fn terminate_session(&mut self) {
        let op = self.make_op(Opcode::TerminateSession, 0, Vec::new());
        self.send(op);

        self.fh = None;
        self.filename = None;
        self.write = None;

        if let Some(mut cb) = self.read_callback.take() {
            cb(None);
        }
        if let Some(mut cb) = self.read_progress.take() {
            cb(None);
        }
        if let Some(mut cb) = self.put_callback.take() {
            cb(None);
        }
        if let Some(mut cb) = self.put_progress.take() {
            cb(None);
        }

        self.gaps.clear();
        self.read_total = 0;
        self.last_burst_read = None;
        self.session = self.session.wrapping_add(1);
        self.reached_eof = false;
        self.backlog = 0;
        self.duplicates = 0;
        self.list_state = None;
        self.on_entry = None;
        self.on_list_done = None;

        if self.settings.debug > 0 {
            log::info!("mavftp: terminated session");
        }
    }

    /// Send a bare `TerminateSession` without the rest of the teardown
    /// (callback firing, gap/write reset). Used by the open-retry path in
    /// `idle.rs`, which bumps the session itself and resends the open.
    pub(crate) fn send_terminate_frame(&mut self) {
        let op = self.make_op(Opcode::TerminateSession, 0, Vec::new());
        self.send(op);
    }

    /// Update the smoothed RTT estimate when the incoming frame is a direct
    /// reply to the last outbound frame.
    pub(crate) fn maybe_update_rtt(&mut self, req_opcode: Opcode, incoming_seq: u16, now: std::time::Instant) {
        if let Some(last_op) = &self.last_op {
            if req_opcode == last_op.opcode && incoming_seq == (last_op.seq + 1) % 256 {
                let dt = now.saturating_duration_since(self.last_op_time).as_secs_f64();
                self.rtt_secs = self.rtt_secs.min(dt).max(0.01);
            }
        }
    }

    pub(crate) fn write_stall_deadline(&self) -> Duration {
        Duration::from_secs_f64((10.0 * self.rtt_secs).min(1.0).max(0.2))
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
    fn terminate_session_cycles_session_id_once() {
        let mut e = engine();
        assert_eq!(e.session, 0);
        e.terminate_session();
        assert_eq!(e.session, 1);
    }

    #[test]
    fn terminate_session_fires_pending_callback_with_none_exactly_once() {
        let mut e = engine();
        let fired = std::rc::Rc::new(std::cell::Cell::new(0));
        let fired2 = fired.clone();
        e.read_callback = Some(Box::new(move |v| {
            assert!(v.is_none());
            fired2.set(fired2.get() + 1);
        }));
        e.terminate_session();
        assert_eq!(fired.get(), 1);
        assert!(e.read_callback.is_none());
    }

    #[test]
    fn rtt_floors_at_10ms() {
        let mut e = engine();
        e.rtt_secs = 0.5;
        e.last_op = Some(e.make_op(crate::frame::Opcode::OpenFileRO, 0, Vec::new()));
        let last_op_seq = e.last_op.as_ref().unwrap().seq;
        e.last_op_time = e.clock.now();
        e.clock.advance(Duration::from_millis(1));
        let now = e.clock.now();
        e.maybe_update_rtt(Opcode::OpenFileRO, last_op_seq + 1, now);
        assert!(e.rtt_secs >= 0.01);
    }
}
