//! Test cases for the thunderstorm detector.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use rstest::*;

use storm_detector::{FIRMWARE, MODEL, RangeUnit, StormDetectorProtocol, command::frame};
use wxemu::{
    Device, Dispatcher, Emulator, LoopbackTransport, OutputMode, ParsedMessage, ProtocolError,
    SchedulerOptions, VecFeed,
};

type Detector = Dispatcher<StormDetectorProtocol>;

#[fixture]
fn detector() -> Detector {
    StormDetectorProtocol::dispatcher("T0001234").unwrap()
}

fn send(detector: &mut Detector, payload: &str) -> Vec<u8> {
    detector.dispatch(&frame(payload)).reply
}

fn poll(detector: &mut Detector, feed: &[&str]) -> Vec<u8> {
    for line in feed {
        detector.ingest(&ParsedMessage::parse(line).unwrap());
    }
    let out = detector.dispatch(&frame("POLL"));
    detector.render_measurements(&out.measurements, NaiveDateTime::default())
}

#[rstest]
fn test_status_and_id(mut detector: Detector) {
    assert_eq!(send(&mut detector, "STATUS"), frame("STATUS POLL 60 KM 0"));
    assert_eq!(
        send(&mut detector, "ID"),
        frame(&format!("ID {MODEL} T0001234 {FIRMWARE}"))
    );
}

#[rstest]
#[case("MODE CONT", "ACK MODE", "STATUS CONT 60 KM 0")]
#[case("MODE stop", "ACK MODE", "STATUS STOP 60 KM 0")]
#[case("MODE SLEEP", "NAK PARAM", "STATUS POLL 60 KM 0")]
#[case("INTERVAL 600", "ACK INTERVAL", "STATUS POLL 600 KM 0")]
#[case("INTERVAL 0", "NAK RANGE", "STATUS POLL 60 KM 0")]
#[case("INTERVAL 3601", "NAK RANGE", "STATUS POLL 60 KM 0")]
#[case("INTERVAL ten", "NAK RANGE", "STATUS POLL 60 KM 0")]
#[case("RANGE mi", "ACK RANGE", "STATUS POLL 60 MI 0")]
#[case("RANGE FT", "NAK PARAM", "STATUS POLL 60 KM 0")]
#[case("SQUELCH 15", "ACK SQUELCH", "STATUS POLL 60 KM 15")]
#[case("SQUELCH 16", "NAK RANGE", "STATUS POLL 60 KM 0")]
#[case("MSG Tower 2", "ACK MSG", "STATUS POLL 60 KM 0 Tower 2")]
#[case("MSG 123456789012345678901234567890123", "NAK RANGE", "STATUS POLL 60 KM 0")]
#[case("HELLO", "NAK UNKNOWN", "STATUS POLL 60 KM 0")]
fn test_settings(
    mut detector: Detector,
    #[case] command: &str,
    #[case] reply: &str,
    #[case] status: &str,
) {
    assert_eq!(send(&mut detector, command), frame(reply));
    assert_eq!(send(&mut detector, "STATUS"), frame(status));
}

#[rstest]
fn test_mode_wakes_sender(mut detector: Detector) {
    let out = detector.dispatch(&frame("MODE CONT"));
    assert!(out.wake);
    assert_eq!(
        detector.devices().get(0).unwrap().schedule().mode(),
        OutputMode::Continuous
    );
}

#[rstest]
fn test_bad_crc(mut detector: Detector) {
    let mut raw = frame("MODE CONT");
    raw[6] = b'X';
    let out = detector.dispatch(&raw);
    assert_eq!(out.reply, frame("NAK CRC"));
    assert!(matches!(
        out.errors[..],
        [ProtocolError::ChecksumMismatch { .. }]
    ));
    assert_eq!(
        detector.devices().get(0).unwrap().schedule().mode(),
        OutputMode::Polled
    );
}

#[rstest]
fn test_malformed_dropped(mut detector: Detector) {
    assert!(detector.dispatch(b"\x02POLL\x03").reply.is_empty());
    assert!(detector.dispatch(b"POLL 1234").reply.is_empty());
}

#[rstest]
fn test_poll_and_reset(mut detector: Detector) {
    let feed = ["CG=3 CC=2 DIST=18.2 BRG=45", "CG=1 DIST=30 BRG=200"];
    assert_eq!(poll(&mut detector, &feed), frame("DATA 6 4 2 18.2 045"));

    send(&mut detector, "RANGE NM");
    send(&mut detector, "MSG site A");
    assert_eq!(poll(&mut detector, &[]), frame("DATA 6 4 2 9.8 045 site A"));

    assert_eq!(send(&mut detector, "RESET"), frame("ACK RESET"));
    assert_eq!(poll(&mut detector, &[]), frame("DATA 0 0 0 --- --- site A"));
    assert_eq!(
        detector.devices().get(0).unwrap().range(),
        RangeUnit::NauticalMiles
    );
}

#[rstest]
fn test_emulator_continuous() {
    let line = Arc::new(LoopbackTransport::new());
    let emulator = Emulator::spawn(
        StormDetectorProtocol::dispatcher("T0001234").unwrap(),
        Arc::clone(&line),
        Box::new(VecFeed::cycling(["CG=1 DIST=10 BRG=90"])),
        SchedulerOptions::default(),
    )
    .unwrap();

    let mut commands = frame("INTERVAL 1");
    commands.extend(frame("MODE CONT"));
    line.send_from_host(&commands);

    // every data message counts one more strike
    let second = frame("DATA 2 2 0 10.0 090");
    let out = line.wait_for_output(Duration::from_secs(3), |out| {
        out.windows(second.len()).any(|w| w == second.as_slice())
    });
    let ack_interval = frame("ACK INTERVAL");
    assert!(out.starts_with(&ack_interval), "{out:?}");
    assert!(
        out.windows(second.len()).any(|w| w == second.as_slice()),
        "{out:?}"
    );
    emulator.shutdown().unwrap();
}
