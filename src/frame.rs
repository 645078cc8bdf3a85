//! MAVFTP wire frame: 12-byte header plus payload, packed into the fixed
//! 251-byte `FILE_TRANSFER_PROTOCOL` MAVLink payload.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use strum_macros::{Display, EnumString};

/// Header length in bytes.
pub const HDR_LEN: usize = 12;
/// Maximum payload bytes carried by a single frame.
pub const MAX_PAYLOAD: usize = 239;
/// Total wire size of a `FILE_TRANSFER_PROTOCOL` datagram payload.
pub const WIRE_LEN: usize = HDR_LEN + MAX_PAYLOAD;

#[derive(Debug, Copy, Clone, Eq, PartialEq, FromPrimitive)]
pub enum Opcode {
    None = 0,
    TerminateSession = 1,
    ResetSessions = 2,
    ListDirectory = 3,
    OpenFileRO = 4,
    ReadFile = 5,
    CreateFile = 6,
    WriteFile = 7,
    RemoveFile = 8,
    CreateDirectory = 9,
    RemoveDirectory = 10,
    OpenFileWO = 11,
    TruncateFile = 12,
    Rename = 13,
    CalcFileCRC32 = 14,
    BurstReadFile = 15,
    Ack = 128,
    Nack = 129,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, EnumString, Display, FromPrimitive)]
pub enum NackError {
    #[strum(serialize = "no error")]
    None = 0,
    #[strum(serialize = "unknown failure")]
    Fail = 1,
    #[strum(serialize = "command failed, errno sent back")]
    FailErrno = 2,
    #[strum(serialize = "payload size is invalid")]
    InvalidDataSize = 3,
    #[strum(serialize = "session is not currently open")]
    InvalidSession = 4,
    #[strum(serialize = "all available sessions are already in use")]
    NoSessionsAvailable = 5,
    #[strum(serialize = "offset past end of file")]
    EndOfFile = 6,
    #[strum(serialize = "unknown command / opcode")]
    UnknownCommand = 7,
    #[strum(serialize = "file/directory already exists")]
    FileExists = 8,
    #[strum(serialize = "file/directory is write protected")]
    FileProtected = 9,
    #[strum(serialize = "file/directory not found")]
    FileNotFound = 10,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short: {0} bytes, need at least {HDR_LEN}")]
    TooShort(usize),
    #[error("unknown opcode byte {0:#x}")]
    UnknownOpcode(u8),
}

/// A single MAVFTP operation: header fields plus payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u16,
    pub session: u8,
    pub opcode: Opcode,
    pub size: u8,
    pub req_opcode: Opcode,
    pub burst_complete: bool,
    pub offset: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(seq: u16, session: u8, opcode: Opcode, offset: u32, payload: Vec<u8>) -> Self {
        let size = payload.len().min(MAX_PAYLOAD) as u8;
        Self {
            seq,
            session,
            opcode,
            size,
            req_opcode: Opcode::None,
            burst_complete: false,
            offset,
            payload,
        }
    }

    /// Pack into the fixed 251-byte wire payload, zero-padded.
    pub fn to_bytes(&self) -> [u8; WIRE_LEN] {
        let mut buf = [0u8; WIRE_LEN];
        buf[0..2].copy_from_slice(&self.seq.to_le_bytes());
        buf[2] = self.session;
        buf[3] = self.opcode as u8;
        buf[4] = self.size;
        buf[5] = self.req_opcode as u8;
        buf[6] = self.burst_complete as u8;
        buf[7] = 0; // pad
        buf[8..12].copy_from_slice(&self.offset.to_le_bytes());
        let n = self.payload.len().min(MAX_PAYLOAD);
        buf[HDR_LEN..HDR_LEN + n].copy_from_slice(&self.payload[..n]);
        buf
    }

    /// Decode the Nack error code carried in `payload[0]`, defaulting to
    /// `Fail` for an empty or unrecognized payload. Only meaningful when
    /// `opcode == Opcode::Nack`.
    pub fn nack_error(&self) -> NackError {
        NackError::from_u8(self.payload.first().copied().unwrap_or(0)).unwrap_or(NackError::Fail)
    }

    /// Unpack a frame from the first `12 + size` bytes of `bytes`. Trailing
    /// zero padding beyond `size` is ignored. Buffers shorter than the
    /// 12-byte header are malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Frame, FrameError> {
        if bytes.len() < HDR_LEN {
            return Err(FrameError::TooShort(bytes.len()));
        }
        let seq = u16::from_le_bytes([bytes[0], bytes[1]]);
        let session = bytes[2];
        let opcode = Opcode::from_u8(bytes[3]).ok_or(FrameError::UnknownOpcode(bytes[3]))?;
        let size = bytes[4];
        let req_opcode = Opcode::from_u8(bytes[5]).ok_or(FrameError::UnknownOpcode(bytes[5]))?;
        let burst_complete = bytes[6] != 0;
        let offset = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let end = (HDR_LEN + size as usize).min(bytes.len());
        let payload = bytes[HDR_LEN..end].to_vec();
        Ok(Frame {
            seq,
            session,
            opcode,
            size,
            req_opcode,
            burst_complete,
            offset,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_is_exactly_wire_len() {
        let f = Frame::new(7, 3, Opcode::ReadFile, 80, vec![1, 2, 3]);
        assert_eq!(f.to_bytes().len(), WIRE_LEN);
    }

    #[test]
    fn pack_unpack_round_trip() {
        let f = Frame {
            seq: 1234,
            session: 9,
            opcode: Opcode::Ack,
            size: 5,
            req_opcode: Opcode::BurstReadFile,
            burst_complete: true,
            offset: 0xDEAD_BEEF,
            payload: vec![1, 2, 3, 4, 5],
        };
        let bytes = f.to_bytes();
        let g = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(g.seq, f.seq);
        assert_eq!(g.session, f.session);
        assert_eq!(g.opcode, f.opcode);
        assert_eq!(g.size, f.size);
        assert_eq!(g.req_opcode, f.req_opcode);
        assert_eq!(g.burst_complete, f.burst_complete);
        assert_eq!(g.offset, f.offset);
        assert_eq!(g.payload, f.payload);
    }

    #[test]
    fn unpack_ignores_trailing_zero_pad() {
        let f = Frame::new(0, 0, Opcode::ListDirectory, 0, vec![b'/']);
        let bytes = f.to_bytes();
        let g = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(g.payload, vec![b'/']);
    }

    #[test]
    fn short_buffer_is_malformed() {
        let err = Frame::from_bytes(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, FrameError::TooShort(4)));
    }

    #[test]
    fn nack_error_display_matches_wire_meaning() {
        assert_eq!(NackError::EndOfFile.to_string(), "offset past end of file");
    }
}
