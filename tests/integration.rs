//! End-to-end scenarios, driven through the public API against
//! an in-memory `ChannelTransport` rather than live MAVLink.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use mavftp::{ChannelTransport, FakeClock, FtpSettings, MavFtpEngine, NackError, Opcode, RawMessage, Sink};

fn engine() -> MavFtpEngine<ChannelTransport, FakeClock> {
    MavFtpEngine::with_clock(
        ChannelTransport::new(1, 1),
        1,
        1,
        FtpSettings::default(),
        FakeClock::new(),
    )
}

fn burst(offset: u32, payload: Vec<u8>, burst_complete: bool) -> mavftp::Frame {
    let mut f = mavftp::Frame::new(0, 0, Opcode::Ack, offset, payload);
    f.req_opcode = Opcode::BurstReadFile;
    f.burst_complete = burst_complete;
    f
}

fn open_ack() -> mavftp::Frame {
    let mut f = mavftp::Frame::new(0, 0, Opcode::Ack, 0, vec![]);
    f.req_opcode = Opcode::OpenFileRO;
    f
}

fn msg(f: &mavftp::Frame) -> RawMessage {
    RawMessage {
        target_system: 1,
        target_component: 1,
        payload: f.to_bytes(),
    }
}

#[test]
fn scenario_1_happy_path_get_200_bytes() {
    let mut e = engine();
    let result: Rc<RefCell<Option<Vec<u8>>>> = Rc::new(RefCell::new(None));
    let result2 = result.clone();
    e.get(
        "remote.bin",
        Some("-"),
        Some(move |fh: Option<Sink>| {
            use std::io::Read;
            let mut fh = fh.expect("get must succeed");
            let mut data = Vec::new();
            fh.read_to_end(&mut data).unwrap();
            *result2.borrow_mut() = Some(data);
        }),
        None::<fn(Option<(u64, u64)>)>,
    );
    e.handle_packet(&msg(&open_ack()));

    e.handle_packet(&msg(&burst(0, vec![1u8; 80], false)));
    e.handle_packet(&msg(&burst(80, vec![2u8; 80], false)));
    e.handle_packet(&msg(&burst(160, vec![3u8; 40], true)));

    assert_eq!(result.borrow().as_ref().unwrap().len(), 200);
    assert_eq!(e.read_retries(), 0);
    assert_eq!(e.duplicates(), 0);
}

#[test]
fn scenario_2_gap_repair_across_two_gaps() {
    let mut e = engine();
    let result: Rc<RefCell<Option<Vec<u8>>>> = Rc::new(RefCell::new(None));
    let result2 = result.clone();
    e.get(
        "remote.bin",
        Some("-"),
        Some(move |fh: Option<Sink>| {
            use std::io::Read;
            let mut fh = fh.expect("get must succeed");
            let mut data = Vec::new();
            fh.read_to_end(&mut data).unwrap();
            *result2.borrow_mut() = Some(data);
        }),
        None::<fn(Option<(u64, u64)>)>,
    );
    e.handle_packet(&msg(&open_ack()));

    e.handle_packet(&msg(&burst(0, vec![1u8; 80], false)));
    // forward jump to 240 opens gaps at (80,80) and (160,80)
    e.handle_packet(&msg(&burst(240, vec![2u8; 80], false)));
    assert_eq!(e.gap_count(), 2);

    // gap-fill both gaps via ReadFile replies
    for offset in [80u32, 160] {
        let mut f = mavftp::Frame::new(0, 0, Opcode::Ack, offset, vec![9u8; 80]);
        f.req_opcode = Opcode::ReadFile;
        f.size = 80;
        e.handle_packet(&msg(&f));
    }
    assert_eq!(e.gap_count(), 0);

    // short final burst (size < burst_size) marks EOF and completes the transfer
    e.handle_packet(&msg(&burst(320, vec![3u8; 40], true)));

    assert_eq!(result.borrow().as_ref().unwrap().len(), 360);
    assert_eq!(e.duplicates(), 0);
}

#[test]
fn scenario_3_duplicate_burst_does_not_corrupt() {
    let mut e = engine();
    e.get(
        "remote.bin",
        Some("-"),
        None::<fn(Option<Sink>)>,
        None::<fn(Option<(u64, u64)>)>,
    );
    e.handle_packet(&msg(&open_ack()));
    e.handle_packet(&msg(&burst(0, vec![9u8; 80], false)));
    e.handle_packet(&msg(&burst(0, vec![9u8; 80], false)));
    assert_eq!(e.duplicates(), 1);
}

#[test]
fn scenario_4_put_250_bytes_block_80() {
    let mut e = engine();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut tmp, &vec![7u8; 250]).unwrap();

    let done: Rc<Cell<Option<u64>>> = Rc::new(Cell::new(None));
    let done2 = done.clone();
    e.put(
        tmp.path().to_str().unwrap(),
        Some("remote.bin"),
        None,
        Some(move |v: Option<u64>| done2.set(v)),
        None::<fn(Option<f64>)>,
    )
    .unwrap();

    let mut create_ack = mavftp::Frame::new(0, 0, Opcode::Ack, 0, vec![]);
    create_ack.req_opcode = Opcode::CreateFile;
    e.handle_packet(&msg(&create_ack));

    for offset in [0u32, 80, 160, 240] {
        let mut ack = mavftp::Frame::new(0, 0, Opcode::Ack, offset, vec![]);
        ack.req_opcode = Opcode::WriteFile;
        e.handle_packet(&msg(&ack));
    }

    assert_eq!(done.take(), Some(250));
}

#[test]
fn scenario_5_open_retry_exhausts_after_three_attempts() {
    let mut e = engine();
    let result: Rc<Cell<bool>> = Rc::new(Cell::new(false));
    let result2 = result.clone();
    e.get(
        "x.bin",
        Some("-"),
        Some(move |fh: Option<Sink>| result2.set(fh.is_none())),
        None::<fn(Option<(u64, u64)>)>,
    );

    for _ in 0..3 {
        e.advance_clock(Duration::from_secs(2));
        e.tick();
    }

    assert!(result.get(), "callback must fire with null after exhausting retries");
}

#[test]
fn scenario_6_parameter_blob_round_trip() {
    use mavftp::{decode_param_blob, encode_param_blob, ParamEntry, ParamTable, ParamType, ParamValue};

    fn entry(name: &str, value: f32) -> ParamEntry {
        ParamEntry {
            name: name.as_bytes().to_vec(),
            value: ParamValue {
                value: value as f64,
                ptype: ParamType::F32,
            },
        }
    }

    let table = ParamTable {
        params: vec![entry("FOO", 1.0), entry("FOOBAR", 2.5)],
        defaults: Some(vec![entry("FOO", 1.0), entry("FOOBAR", 0.0)]),
    };
    let blob = encode_param_blob(&table);
    let decoded = decode_param_blob(&blob).unwrap();
    assert_eq!(decoded.params, table.params);
    assert_eq!(decoded.defaults, table.defaults);
}

#[test]
fn nack_eof_before_gaps_filled_does_not_complete_transfer() {
    let mut e = engine();
    e.get(
        "x.bin",
        Some("-"),
        None::<fn(Option<Sink>)>,
        None::<fn(Option<(u64, u64)>)>,
    );
    e.handle_packet(&msg(&open_ack()));
    e.handle_packet(&msg(&burst(0, vec![1u8; 80], false)));
    e.handle_packet(&msg(&burst(240, vec![2u8; 80], false)));
    assert_eq!(e.gap_count(), 2);

    let mut nack = mavftp::Frame::new(0, 0, Opcode::Nack, 0, vec![NackError::EndOfFile as u8]);
    nack.req_opcode = Opcode::BurstReadFile;
    e.handle_packet(&msg(&nack));

    assert_eq!(e.gap_count(), 2, "gaps must remain open until filled");
}
