//! Write engine: pipelined block writes with a bounded in-flight window.
//! Grounded on `original_source/mavftp.py::cmd_put`,
//! `__handle_create_file_reply`, `__send_more_writes`,
//! `__handle_write_reply`.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::clock::Clock;
use crate::error::Error;
use crate::frame::{Frame, Opcode};
use crate::transport::Transport;

use super::{MavFtpEngine, WriteState};

impl<T: Transport, C: Clock> MavFtpEngine<T, C> {
    /// Begin a `put`: open (or take) the local file, compute the block
    /// layout, send `CreateFile`.
    pub fn put(
        &mut self,
        local: &str,
        remote: Option<&str>,
        fh: Option<File>,
        callback: Option<impl FnMut(Option<u64>) + 'static>,
        progress: Option<impl FnMut(Option<f64>) + 'static>,
    ) -> Result<(), crate::error::Error> {
        if self.write.is_some() {
            return Err(crate::error::Error::Busy);
        }

        let mut fh = match fh {
            Some(fh) => fh,
            None => File::open(local).map_err(|source| crate::error::Error::OpenFailed {
                path: local.to_string(),
                source,
            })?,
        };

        let mut remote_name = match remote {
            Some(name) => name.to_string(),
            None => local.rsplit('/').next().unwrap_or(local).to_string(),
        };
        if remote_name.ends_with('/') {
            let basename = local.rsplit('/').next().unwrap_or(local);
            remote_name.push_str(basename);
        }

        let file_size = fh.seek(SeekFrom::End(0)).unwrap_or(0);
        fh.seek(SeekFrom::Start(0)).ok();

        let block_size = self.settings.write_size.max(1) as u32;
        let mut total = (file_size / block_size as u64) as u32;
        if file_size % block_size as u64 != 0 {
            total += 1;
        }

        self.write = Some(WriteState {
            fh,
            remote_name: remote_name.clone(),
            file_size,
            block_size,
            total,
            list: (0..total).collect::<HashSet<u32>>(),
            idx: 0,
            recv_idx: -1,
            pending: 0,
            last_send: None,
            acks: 0,
        });
        self.put_callback = callback.map(|cb| Box::new(cb) as Box<dyn FnMut(Option<u64>)>);
        self.put_progress = progress.map(|cb| Box::new(cb) as Box<dyn FnMut(Option<f64>)>);
        self.op_start = Some(self.clock.now());

        let op = self.make_op(Opcode::CreateFile, 0, remote_name.into_bytes());
        self.send(op);
        Ok(())
    }

    pub(crate) fn handle_create_reply(&mut self, op: &Frame) {
        if self.write.is_none() {
            self.terminate_session();
            self.op_pending = false;
            return;
        }
        if op.opcode == Opcode::Ack {
            self.send_more_writes();
        } else {
            log::error!("mavftp: create failed");
            self.last_error = Some(Error::RemoteFailed {
                opcode: op.req_opcode,
                nack: op.nack_error(),
            });
            self.terminate_session();
            self.op_pending = false;
        }
    }

    pub(crate) fn send_more_writes(&mut self) {
        let Some(write) = self.write.as_ref() else {
            return;
        };
        if write.list.is_empty() {
            let file_size = write.file_size;
            if let Some(cb) = self.put_progress.as_mut() {
                cb(Some(1.0));
            }
            self.put_progress = None;
            if let Some(mut cb) = self.put_callback.take() {
                cb(Some(file_size));
            }
            self.write = None;
            self.terminate_session();
            self.op_pending = false;
            return;
        }

        let now = self.clock.now();
        let stall_deadline = self.write_stall_deadline();
        {
            let write = self.write.as_mut().unwrap();
            if let Some(last_send) = write.last_send {
                if now.saturating_duration_since(last_send) > stall_deadline {
                    write.pending = write.pending.saturating_sub(1);
                }
            }
        }

        let n = {
            let write = self.write.as_ref().unwrap();
            (self.settings.write_qsize.saturating_sub(write.pending)).min(write.list.len() as u32)
        };

        for _ in 0..n {
            let (idx, offset, data) = {
                let write = self.write.as_mut().unwrap();
                let mut idx = write.idx;
                while !write.list.contains(&idx) {
                    idx = (idx + 1) % write.total;
                }
                let offset = idx as u64 * write.block_size as u64;
                let mut buf = vec![0u8; write.block_size as usize];
                write.fh.seek(SeekFrom::Start(offset)).ok();
                let n = write.fh.read(&mut buf).unwrap_or(0);
                buf.truncate(n);
                (idx, offset as u32, buf)
            };
            let write_op = self.make_op(Opcode::WriteFile, offset, data);
            self.send(write_op);
            let write = self.write.as_mut().unwrap();
            write.idx = (idx + 1) % write.total;
            write.pending += 1;
            write.last_send = Some(now);
        }
    }

    pub(crate) fn handle_write_reply(&mut self, op: &Frame) {
        if self.write.is_none() {
            self.terminate_session();
            return;
        }
        if op.opcode != Opcode::Ack {
            log::warn!("mavftp: write failed");
            self.last_error = Some(Error::RemoteFailed {
                opcode: op.req_opcode,
                nack: op.nack_error(),
            });
            self.terminate_session();
            return;
        }

        let progress_fraction = {
            let write = self.write.as_mut().unwrap();
            let idx = (op.offset / write.block_size) as i64;
            let count = (idx - write.recv_idx).rem_euclid(write.total as i64) as u32;
            write.pending = write.pending.saturating_sub(count);
            write.recv_idx = idx;
            write.list.remove(&(idx as u32));
            write.acks += 1;
            write.acks as f64 / write.total as f64
        };
        if let Some(cb) = self.put_progress.as_mut() {
            cb(Some(progress_fraction));
        }
        self.send_more_writes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

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

    fn write_file(bytes: &[u8]) -> File {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(bytes).unwrap();
        tmp.seek(SeekFrom::Start(0)).unwrap();
        tmp
    }

    #[test]
    fn put_250_bytes_block_80_sends_four_writes() {
        let mut e = engine();
        let fh = write_file(&vec![7u8; 250]);
        e.put(
            "local.bin",
            Some("remote.bin"),
            Some(fh),
            None::<fn(Option<u64>)>,
            None::<fn(Option<f64>)>,
        )
        .unwrap();
        // CreateFile ack triggers the first batch of writes
        let ack = Frame {
            seq: 1,
            session: 0,
            opcode: Opcode::Ack,
            size: 0,
            req_opcode: Opcode::CreateFile,
            burst_complete: false,
            offset: 0,
            payload: vec![],
        };
        e.handle_create_reply(&ack);
        let write = e.write.as_ref().unwrap();
        assert_eq!(write.total, 4);
        // CreateFile, then all 4 blocks fit within the qsize=5 window.
        assert_eq!(e.transport.sent.len(), 5);
    }

    #[test]
    fn every_block_acked_exactly_once_on_completion() {
        let mut e = engine();
        let fh = write_file(&vec![7u8; 250]);
        let done = std::rc::Rc::new(std::cell::Cell::new(None));
        let done2 = done.clone();
        e.put(
            "local.bin",
            Some("remote.bin"),
            Some(fh),
            Some(move |v: Option<u64>| done2.set(v)),
            None::<fn(Option<f64>)>,
        )
        .unwrap();
        let create_ack = Frame {
            seq: 1,
            session: 0,
            opcode: Opcode::Ack,
            size: 0,
            req_opcode: Opcode::CreateFile,
            burst_complete: false,
            offset: 0,
            payload: vec![],
        };
        e.handle_create_reply(&create_ack);

        for offset in [0u32, 80, 160, 240] {
            let ack = Frame {
                seq: 2,
                session: 0,
                opcode: Opcode::Ack,
                size: 0,
                req_opcode: Opcode::WriteFile,
                burst_complete: false,
                offset,
                payload: vec![],
            };
            e.handle_write_reply(&ack);
        }
        assert_eq!(done.take(), Some(250));
    }
}
