//! Idle/ticker: periodic work driven by the caller.
//!
//! Grounded on `original_source/mavftp.py::__idle_task`.

use crate::clock::Clock;
use crate::error::Error;
use crate::frame::Opcode;
use crate::transport::Transport;

use super::MavFtpEngine;

impl<T: Transport, C: Clock> MavFtpEngine<T, C> {
    pub fn tick(&mut self) {
        let now = self.clock.now();

        if let (Some(op_start), Some(last_op)) = (self.op_start, self.last_op.clone()) {
            if now.saturating_duration_since(op_start) > std::time::Duration::from_secs(1)
                && last_op.opcode == Opcode::OpenFileRO
            {
                self.op_start = Some(now);
                self.open_retries += 1;
                // 3 attempts total: the original open plus two retries here.
                if self.open_retries > 2 {
                    self.op_start = None;
                    self.last_error = Some(Error::Timeout);
                    self.terminate_session();
                    return;
                }
                if self.settings.debug > 0 {
                    log::info!("mavftp: retrying open (attempt {})", self.open_retries);
                }
                let mut resend = last_op;
                self.send_terminate_frame();
                self.session = self.session.wrapping_add(1);
                resend.session = self.session;
                self.send(resend);
            }
        }

        if self.gaps.is_empty() && self.last_burst_read.is_none() && self.write.is_none() {
            return;
        }
        if self.fh.is_none() {
            return;
        }

        self.retry_burst_stall(now);
        self.check_read_send();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::FtpSettings;
    use crate::frame::Frame;
    use crate::sink::Sink;
    use crate::transport::ChannelTransport;
    use std::time::Duration;

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
    fn open_retry_caps_at_three_attempts() {
        let mut e = engine();
        e.get(
            "x.bin",
            Some("-"),
            None::<fn(Option<Sink>)>,
            None::<fn(Option<(u64, u64)>)>,
        );
        assert_eq!(e.last_op.as_ref().unwrap().opcode, Opcode::OpenFileRO);

        for _ in 0..3 {
            e.clock.advance(Duration::from_secs(2));
            e.tick();
        }
        // a 4th retry beyond the cap gives up entirely
        e.clock.advance(Duration::from_secs(2));
        e.tick();
        assert!(e.op_start.is_none());
    }

    #[test]
    fn burst_stall_retries_indefinitely() {
        let mut e = engine();
        e.fh = Some(Sink::memory());
        e.filename = Some("-".to_string());
        e.last_op = Some(Frame {
            seq: 0,
            session: 0,
            opcode: Opcode::BurstReadFile,
            size: 0,
            req_opcode: Opcode::None,
            burst_complete: false,
            offset: 0,
            payload: vec![],
        });
        e.last_burst_read = Some(e.clock.now());
        e.clock.advance(Duration::from_millis(600));
        e.tick();
        assert_eq!(e.read_retries, 1);
        e.clock.advance(Duration::from_millis(600));
        e.tick();
        assert_eq!(e.read_retries, 2);
    }
}
