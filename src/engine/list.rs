//! Directory listing.
//!
//! Grounded on `patrickelectric-mavftp-cli/src/controller.rs`
//! (`ScanningFolderStatus`, `parse_directory_entry` in `mavftp.rs`) and
//! `original_source/mavftp.py::cmd_list`/`__handle_list_reply`. Entries are
//! handed to the caller via callback instead of printed directly; printing
//! is the demo's job, not the library's.

use crate::clock::Clock;
use crate::frame::{NackError, Opcode};
use crate::transport::Transport;

use super::{ListState, MavFtpEngine};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EntryKind {
    File,
    Directory,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub kind: EntryKind,
    pub name: String,
    pub size: u32,
}

fn parse_entry(raw: &[u8]) -> Option<ListEntry> {
    if raw.is_empty() {
        return None;
    }
    let kind = match raw[0] {
        b'F' => EntryKind::File,
        b'D' => EntryKind::Directory,
        b'S' => EntryKind::Skip,
        _ => return None,
    };
    let rest = String::from_utf8_lossy(&raw[1..]);
    let (name, size) = match rest.split_once('\t') {
        Some((name, size_str)) => (name.to_string(), size_str.parse().unwrap_or(0)),
        None => (rest.to_string(), 0),
    };
    Some(ListEntry { kind, name, size })
}

impl<T: Transport, C: Clock> MavFtpEngine<T, C> {
    /// List `path`, invoking `on_entry` for every directory/file entry as
    /// pages arrive and `on_done` once the listing is complete.
    pub fn list(
        &mut self,
        path: &str,
        on_entry: impl FnMut(ListEntry) + 'static,
        on_done: impl FnMut() + 'static,
    ) {
        log::info!("mavftp: listing {path}");
        self.list_state = Some(ListState {
            path: path.to_string(),
            dir_offset: 0,
            total_size: 0,
        });
        self.on_entry = Some(Box::new(on_entry));
        self.on_list_done = Some(Box::new(on_done));
        let op = self.make_op(Opcode::ListDirectory, 0, path.as_bytes().to_vec());
        self.send(op);
    }

    pub(crate) fn handle_list_reply(&mut self, op: &crate::frame::Frame) {
        match op.opcode {
            Opcode::Ack => {
                let mut entries: Vec<&[u8]> = op.payload.split(|&b| b == 0).collect();
                entries.sort();
                let Some(state) = self.list_state.as_mut() else {
                    return;
                };
                let mut advanced = false;
                for raw in entries {
                    if raw.is_empty() {
                        continue;
                    }
                    state.dir_offset += 1;
                    advanced = true;
                    if let Some(entry) = parse_entry(raw) {
                        if entry.kind == EntryKind::File {
                            state.total_size += entry.size;
                        }
                        if let Some(cb) = self.on_entry.as_mut() {
                            cb(entry);
                        }
                    }
                }
                if advanced {
                    let offset = self.list_state.as_ref().unwrap().dir_offset;
                    let mut more = self.last_op.clone().expect("list reply implies a prior op");
                    more.offset = offset;
                    self.send(more);
                }
            }
            Opcode::Nack
                if op.payload.first().copied() == Some(NackError::EndOfFile as u8) =>
            {
                if let Some(state) = self.list_state.take() {
                    if self.settings.debug > 0 {
                        log::info!("mavftp: total size {:.2} kByte", state.total_size as f64 / 1024.0);
                    }
                }
                if let Some(mut cb) = self.on_list_done.take() {
                    cb();
                }
                self.on_entry = None;
                self.op_pending = false;
            }
            _ => {
                log::info!("mavftp: list reply: {:?}", op);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::FtpSettings;
    use crate::frame::Frame;
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
    fn list_collects_entries_and_completes_on_eof_nack() {
        let mut e = engine();
        let collected = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let collected2 = collected.clone();
        let done = std::rc::Rc::new(std::cell::Cell::new(false));
        let done2 = done.clone();
        e.list(
            "/",
            move |entry| collected2.borrow_mut().push(entry),
            move || done2.set(true),
        );

        let mut payload = Vec::new();
        payload.extend_from_slice(b"Dlogs");
        payload.push(0);
        payload.extend_from_slice(b"Ffoo.bin\t123");
        let ack = Frame {
            seq: 1,
            session: 0,
            opcode: Opcode::Ack,
            size: payload.len() as u8,
            req_opcode: Opcode::ListDirectory,
            burst_complete: false,
            offset: 0,
            payload,
        };
        e.handle_list_reply(&ack);
        assert_eq!(collected.borrow().len(), 2);

        let nack = Frame {
            seq: 2,
            session: 0,
            opcode: Opcode::Nack,
            size: 1,
            req_opcode: Opcode::ListDirectory,
            burst_complete: false,
            offset: 0,
            payload: vec![NackError::EndOfFile as u8],
        };
        e.handle_list_reply(&nack);
        assert!(done.get());
        assert!(!e.op_pending);
    }
}
