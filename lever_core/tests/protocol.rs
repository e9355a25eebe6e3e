//! Motor-board driver against the in-memory board.

use std::time::Duration;

use lever_core::error::{ProtocolError, RigError};
use lever_core::mocks::{BoardFault, SimulatedBoard};
use lever_core::protocol::{
    Command, Frame, HomingProfile, LeverState, MotorBoard, PidUpload, crc16, parse_frame,
    response_crc,
};
use lever_traits::SerialLink;
use rstest::rstest;

fn board() -> (SimulatedBoard, MotorBoard<SimulatedBoard>) {
    let sim = SimulatedBoard::new();
    let drv = MotorBoard::new(sim.clone(), Duration::from_millis(10));
    (sim, drv)
}

fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn profile() -> HomingProfile {
    HomingProfile {
        pid: PidUpload {
            p: 600.0,
            i: 0.0,
            d: 0.0,
            max_integral: 200,
            deadzone: 10,
            min_pos: -5000,
            max_pos: 5000,
        },
        accel: 800,
        speed: 100,
        decel: 2000,
        home: 0,
        unlock_p: 200.0,
        unlock_i: 0.03,
    }
}

#[rstest]
#[case(&[0x80, 0x41], 0x437D)]
#[case(&[0x80, 0x14], 0x492D)]
#[case(&[0x80, 0x10], 0x09A9)]
#[case(b"123456789", 0x31C3)]
fn crc_vectors(#[case] bytes: &[u8], #[case] expected: u16) {
    assert_eq!(crc16(bytes), expected);
}

#[test]
fn response_crc_covers_request_header() {
    let body = hex("ffffffe780");
    assert_eq!(response_crc(Command::READ_ENCODER, &body), 0x77BF);
}

#[test]
fn buffered_position_frame_is_bit_exact() {
    let (sim, mut drv) = board();
    drv.set_position(800, 100, 2000, 0, true).unwrap();
    let mut expected = hex("80410000032000000064000007d00000000001");
    expected.extend_from_slice(&0xAC7Eu16.to_be_bytes());
    assert_eq!(sim.frames(), vec![expected]);
}

#[test]
fn drive_frame_is_bit_exact() {
    let (sim, mut drv) = board();
    drv.drive_m1(1, 2, 3, -4).unwrap();
    let mut expected = hex("8041000000010000000200000003fffffffc");
    expected.extend_from_slice(&0x4B83u16.to_be_bytes());
    assert_eq!(sim.frames(), vec![expected]);
    assert_eq!(sim.position(), -4);
}

#[test]
fn frame_round_trips_through_parser() {
    let mut f = Frame::new(Command::DRIVE_M1);
    f.push_i32(-7).unwrap().push_u8(1).unwrap();
    f.seal();
    let (cmd, payload) = parse_frame(f.as_bytes()).unwrap();
    assert_eq!(cmd, Command::DRIVE_M1);
    assert_eq!(payload, &[0xFF, 0xFF, 0xFF, 0xF9, 0x01]);
}

#[test]
fn parser_rejects_flipped_bit() {
    let mut f = Frame::new(Command::RESET_ENCODER);
    f.seal();
    let mut bytes = f.as_bytes().to_vec();
    bytes[1] ^= 0x01;
    assert!(matches!(
        parse_frame(&bytes),
        Err(ProtocolError::CrcMismatch { .. })
    ));
}

#[test]
fn encoder_read_sends_bare_header() {
    let (sim, mut drv) = board();
    sim.set_position(-25);
    let r = drv.read_encoder_value();
    assert_eq!(r.position, -25);
    assert!(!r.stale);
    assert_eq!(sim.frames(), vec![vec![0x80, 0x10]]);
    assert_eq!(drv.last_good(), -25);
}

#[rstest]
#[case(BoardFault::CorruptCrc)]
#[case(BoardFault::Silent)]
#[case(BoardFault::Truncate)]
fn bad_response_falls_back_to_last_good(#[case] fault: BoardFault) {
    let (sim, mut drv) = board();
    sim.set_position(120);
    assert_eq!(drv.read_encoder_value().position, 120);

    sim.set_position(300);
    sim.set_fault(fault);
    for n in 1..=3 {
        let r = drv.read_encoder_value();
        assert!(r.stale);
        assert_eq!(r.position, 120);
        assert_eq!(drv.stale_streak(), n);
    }

    sim.set_fault(BoardFault::None);
    let r = drv.read_encoder_value();
    assert_eq!((r.position, r.stale), (300, false));
    assert_eq!(drv.stale_streak(), 0);
    assert_eq!(drv.stale_total(), 3);
}

#[test]
fn stale_before_any_good_read_is_zero() {
    let (sim, mut drv) = board();
    sim.set_position(55);
    sim.set_fault(BoardFault::Silent);
    let r = drv.read_encoder_value();
    assert_eq!((r.position, r.stale), (0, true));
}

#[test]
fn read_command_reports_typed_errors() {
    let (sim, mut drv) = board();
    sim.set_fault(BoardFault::CorruptCrc);
    let mut data = [0u8; 5];
    let err = drv.read_command(Command::READ_ENCODER, &mut data).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RigError>(),
        Some(RigError::Protocol(ProtocolError::CrcMismatch { .. }))
    ));

    sim.set_fault(BoardFault::Silent);
    let err = drv.read_command(Command::READ_ENCODER, &mut data).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RigError>(),
        Some(RigError::Protocol(ProtocolError::Timeout(10)))
    ));
}

#[test]
fn pid_upload_reads_back() {
    let (sim, mut drv) = board();
    let pid = PidUpload {
        p: 600.0,
        i: 0.5,
        d: 2.25,
        max_integral: 200,
        deadzone: 10,
        min_pos: -5000,
        max_pos: 5000,
    };
    drv.update_pid(&pid).unwrap();
    assert_eq!(sim.commands(), vec![61]);
    // Wire order is D, P, I.
    let frame = &sim.frames()[0];
    assert_eq!(&frame[2..6], &2304i32.to_be_bytes());
    assert_eq!(&frame[6..10], &614_400i32.to_be_bytes());

    // Every gain here is an exact multiple of 1/1024.
    assert_eq!(drv.read_pid().unwrap(), pid);
}

#[test]
fn homing_uploads_stiff_pid_then_buffered_move() {
    let (sim, mut drv) = board();
    sim.set_position(180);
    let mut p = profile();
    p.home = -10;
    drv.home(&p).unwrap();
    assert_eq!(sim.commands(), vec![61, 65]);
    let moves = sim.frames();
    // Buffered flag is the last payload byte.
    assert_eq!(moves[1][moves[1].len() - 3], 1);
    assert_eq!(sim.position(), -10);
    assert_eq!(drv.read_pid().unwrap().p, 600.0);
}

#[test]
fn unlock_widens_deadzone_and_softens_gains() {
    let (_sim, mut drv) = board();
    drv.unlock(&profile(), 200).unwrap();
    let read = drv.read_pid().unwrap();
    assert_eq!(read.p, 200.0);
    assert_eq!(read.deadzone, 200);
    assert_eq!(read.d, 0.0);
    assert!((read.i - 0.03).abs() < 1e-3);
    assert_eq!((read.min_pos, read.max_pos), (-5000, 5000));
}

#[test]
fn reset_encoder_zeroes_both_sides() {
    let (sim, mut drv) = board();
    sim.set_position(77);
    drv.read_encoder_value();
    drv.reset_encoder_counter().unwrap();
    assert_eq!(sim.position(), 0);
    assert_eq!(drv.last_good(), 0);
}

#[rstest]
#[case(40, LeverState::PushForward)]
#[case(-40, LeverState::PullBack)]
#[case(10, LeverState::NotActuated)]
fn lever_state_from_board(#[case] pos: i32, #[case] expected: LeverState) {
    let (sim, mut drv) = board();
    sim.set_position(pos);
    assert_eq!(drv.lever_state(25), expected);
}

#[test]
fn single_byte_command_is_framed() {
    let (sim, mut drv) = board();
    drv.send_command(Command(32), 64).unwrap();
    let f = &sim.frames()[0];
    assert_eq!(&f[..3], &[0x80, 32, 64]);
    assert_eq!(u16::from_be_bytes([f[3], f[4]]), crc16(&f[..3]));
}

#[test]
fn corrupted_request_is_rejected_by_board() {
    let mut sim = SimulatedBoard::new();
    sim.write_all(&[0x80, 0x41, 0x00, 0x00]).unwrap();
    assert_eq!(sim.rejected(), 1);
    assert!(sim.frames().is_empty());
}
