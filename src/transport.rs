//! Transport boundary: a thin adapter over whatever sends/receives MAVLink
//! `FILE_TRANSFER_PROTOCOL` datagrams. The engine owns the transport for the
//! duration of a call and never depends on a concrete MAVLink message enum
//! directly, only on this trait.

use std::collections::VecDeque;
use std::time::Duration;

use crate::frame::WIRE_LEN;

/// An inbound datagram, already filtered down to its raw 251-byte payload.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub target_system: u8,
    pub target_component: u8,
    pub payload: [u8; WIRE_LEN],
}

pub trait Transport {
    /// Send one fully-padded 251-byte frame payload. `Err` carries a
    /// human-readable description of the underlying failure (e.g. a closed
    /// serial port), which the engine surfaces as `Error::Transport`.
    fn send_frame(
        &mut self,
        target_system: u8,
        target_component: u8,
        payload: &[u8; WIRE_LEN],
    ) -> Result<(), String>;

    /// Blocking receive with a timeout; `None` on timeout. The caller
    /// (`execute`/the driver loop) is expected to call this repeatedly with a
    /// short timeout (0.1s) rather than once with the full budget.
    fn recv_match(&mut self, timeout: Duration) -> Option<RawMessage>;

    fn source_system(&self) -> u8;
    fn source_component(&self) -> u8;
}

/// In-memory transport double used by tests and the integration suite: lets
/// a test script feed canned server replies and assert on what the engine
/// sent, without a real serial port or MAVLink stack.
#[derive(Debug)]
pub struct ChannelTransport {
    source_system: u8,
    source_component: u8,
    pub sent: Vec<(u8, u8, [u8; WIRE_LEN])>,
    inbound: VecDeque<RawMessage>,
}

impl ChannelTransport {
    pub fn new(source_system: u8, source_component: u8) -> Self {
        Self {
            source_system,
            source_component,
            sent: Vec::new(),
            inbound: VecDeque::new(),
        }
    }

    /// Queue a reply as if it came from the target system/component.
    pub fn push_reply(&mut self, payload: [u8; WIRE_LEN]) {
        self.inbound.push_back(RawMessage {
            target_system: self.source_system,
            target_component: self.source_component,
            payload,
        });
    }

    /// Queue a reply addressed to someone else, for discard-filtering tests.
    pub fn push_reply_to(&mut self, target_system: u8, target_component: u8, payload: [u8; WIRE_LEN]) {
        self.inbound.push_back(RawMessage {
            target_system,
            target_component,
            payload,
        });
    }

    pub fn last_sent(&self) -> Option<&(u8, u8, [u8; WIRE_LEN])> {
        self.sent.last()
    }
}

impl Transport for ChannelTransport {
    fn send_frame(
        &mut self,
        target_system: u8,
        target_component: u8,
        payload: &[u8; WIRE_LEN],
    ) -> Result<(), String> {
        self.sent.push((target_system, target_component, *payload));
        Ok(())
    }

    fn recv_match(&mut self, _timeout: Duration) -> Option<RawMessage> {
        self.inbound.pop_front()
    }

    fn source_system(&self) -> u8 {
        self.source_system
    }

    fn source_component(&self) -> u8 {
        self.source_component
    }
}

#[cfg(feature = "mavlink-transport")]
pub mod mavlink_adapter {
    use super::*;
    use mavlink::common::{MavMessage, FILE_TRANSFER_PROTOCOL_DATA};
    use mavlink::MavConnection;
    use std::sync::Arc;

    /// Adapts a live `mavlink::MavConnection` to the engine's `Transport`
    /// trait, converting to/from `FILE_TRANSFER_PROTOCOL_DATA` the way the
    /// teacher's `controller.rs` builds `MavMessage::FILE_TRANSFER_PROTOCOL`
    /// values directly.
    pub struct MavlinkTransport {
        conn: Arc<dyn MavConnection<MavMessage> + Send + Sync>,
        source_system: u8,
        source_component: u8,
        target_network: u8,
    }

    impl MavlinkTransport {
        pub fn new(
            conn: Arc<dyn MavConnection<MavMessage> + Send + Sync>,
            source_system: u8,
            source_component: u8,
        ) -> Self {
            Self {
                conn,
                source_system,
                source_component,
                target_network: 0,
            }
        }
    }

    impl Transport for MavlinkTransport {
        fn send_frame(
            &mut self,
            target_system: u8,
            target_component: u8,
            payload: &[u8; WIRE_LEN],
        ) -> Result<(), String> {
            let msg = MavMessage::FILE_TRANSFER_PROTOCOL(FILE_TRANSFER_PROTOCOL_DATA {
                target_network: self.target_network,
                target_system,
                target_component,
                payload: *payload,
            });
            self.conn.send_default(&msg).map(|_| ()).map_err(|err| err.to_string())
        }

        fn recv_match(&mut self, _timeout: Duration) -> Option<RawMessage> {
            // The underlying `mavlink` connection blocks on its own
            // configured read timeout; the driver loop supplies its own
            // cadence on top.
            match self.conn.recv() {
                Ok((_header, MavMessage::FILE_TRANSFER_PROTOCOL(data))) => Some(RawMessage {
                    target_system: data.target_system,
                    target_component: data.target_component,
                    payload: data.payload,
                }),
                _ => None,
            }
        }

        fn source_system(&self) -> u8 {
            self.source_system
        }

        fn source_component(&self) -> u8 {
            self.source_component
        }
    }
}
