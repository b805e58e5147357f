//! Test cases for the Vaisala PTB330 barometer.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use rstest::*;

use vaisala_ptb330::{Ptb330Protocol, SerialMode};
use wxemu::{
    Device, Dispatcher, Emulator, LoopbackTransport, OutputMode, ParsedMessage, ProtocolError,
    SchedulerOptions, VecFeed, units::altitude_corrected,
};

type Bus = Dispatcher<Ptb330Protocol>;

#[fixture]
fn barometer() -> Bus {
    Ptb330Protocol::dispatcher(1).unwrap()
}

#[fixture]
fn bus() -> Bus {
    Ptb330Protocol::dispatcher(3).unwrap()
}

fn send(bus: &mut Bus, line: &str) -> String {
    String::from_utf8(bus.dispatch(line.as_bytes()).reply).unwrap()
}

/// Feed the samples, send `command`, and return the measurement messages.
fn measure(bus: &mut Bus, command: &str, feed: &[&str]) -> String {
    for line in feed {
        bus.ingest(&ParsedMessage::parse(line).unwrap());
    }
    let out = bus.dispatch(command.as_bytes());
    String::from_utf8(bus.render_measurements(&out.measurements, NaiveDateTime::default())).unwrap()
}

#[rstest]
fn test_default_format(mut barometer: Bus) {
    assert_eq!(
        measure(&mut barometer, "SEND", &["P=1013.25 T=21.5"]),
        "1013.25 hPa\r\n"
    );
}

#[rstest]
fn test_form(mut barometer: Bus) {
    assert_eq!(
        send(&mut barometer, r#"FORM P1 "/" P2 " " U \r\n"#),
        "Output format  : P1 \"/\" P2 \" \" U \\r\\n\r\n"
    );
    assert_eq!(
        measure(&mut barometer, "SEND", &["P1=1000 P2=1000.5"]),
        "1000.00/1000.50 hPa\r\n"
    );

    assert_eq!(
        send(&mut barometer, "FORM /"),
        "Output format  : P \" \" U \\r\\n\r\n"
    );
    assert_eq!(measure(&mut barometer, "SEND", &[]), "1000.25 hPa\r\n");
}

#[rstest]
fn test_form_rejected(mut barometer: Bus) {
    let out = barometer.dispatch(br#"FORM P "unterminated"#);
    assert_eq!(out.reply, b"Invalid parameter\r\n");
    assert_eq!(send(&mut barometer, "FORM"), "Output format  : P \" \" U \\r\\n\r\n");
}

#[rstest]
fn test_units(mut barometer: Bus) {
    assert_eq!(send(&mut barometer, "UNIT P kPa"), "P unit         : kPa\r\n");
    assert_eq!(send(&mut barometer, "UNIT T 'F"), "T unit         : 'F\r\n");
    assert_eq!(
        send(&mut barometer, "UNIT"),
        "P unit         : kPa\r\nT unit         : 'F\r\n"
    );
    send(&mut barometer, r#"FORM P " " U " " TP1 " " U"#);
    assert_eq!(
        measure(&mut barometer, "SEND", &["P=1000 T=100"]),
        " 100.00 kPa  212.00 'F"
    );
}

#[rstest]
fn test_qnh(mut barometer: Bus) {
    assert_eq!(send(&mut barometer, "HQNH 250"), "QNH height     : 250.00 m\r\n");
    send(&mut barometer, r#"FORM 8.2 QNH " " 8.2 QFE"#);
    let qnh = altitude_corrected(1000.0, 250.0);
    assert_eq!(
        measure(&mut barometer, "SEND", &["P=1000"]),
        format!("{qnh:>8.2}  1000.00")
    );
}

#[rstest]
#[case("SMODE RUN", "Serial mode    : RUN")]
#[case("SMODE fast", "Invalid parameter")]
#[case("INTV 10 min", "Output intrv.  : 10 min")]
#[case("INTV", "Output intrv.  : 1 s")]
#[case("INTV 0", "Value out of range")]
#[case("INTV 256 s", "Value out of range")]
#[case("INTV 5 days", "Invalid parameter")]
#[case("UNIT T K", "T unit         : K")]
#[case("UNIT P furlong", "Invalid parameter")]
#[case("SERI 9600 N 8 1", "Baud P D S     : 9600 N 8 1")]
#[case("SERI", "Baud P D S     : 4800 E 7 1")]
#[case("SERI 1234", "Invalid parameter")]
#[case("ECHO maybe", "Invalid parameter")]
#[case("HHCP 12.5", "HCP height     : 12.50 m")]
#[case("HQFE -31", "Value out of range")]
#[case("AVRG 30", "Averaging time : 30.0 s")]
#[case("AVRG 601", "Value out of range")]
#[case("PSTAB 0.2", "Stability limit: 0.20 hPa")]
#[case("SNUM", "Serial number  : P4250000")]
#[case("VERS", "PTB330 / 1.12.0")]
#[case("CALCS", "Unknown command")]
fn test_settings(mut barometer: Bus, #[case] command: &str, #[case] reply: &str) {
    assert_eq!(send(&mut barometer, command), format!("{reply}\r\n"));
}

#[rstest]
fn test_seri_partial(mut barometer: Bus) {
    let out = barometer.dispatch(b"SERI 9600 X 8 3");
    assert_eq!(out.reply, b"Invalid parameter\r\n");
    assert_eq!(out.errors, vec![ProtocolError::InvalidParameter("parity".into())]);
    assert_eq!(send(&mut barometer, "SERI"), "Baud P D S     : 9600 E 8 1\r\n");
}

#[rstest]
fn test_run_and_stop(mut barometer: Bus) {
    let out = barometer.dispatch(b"R");
    assert!(out.wake);
    assert!(out.reply.is_empty());
    assert_eq!(
        barometer.devices().get(0).unwrap().schedule().mode(),
        OutputMode::Continuous
    );

    barometer.dispatch(b"S");
    let device = barometer.devices().get(0).unwrap();
    assert_eq!(device.schedule().mode(), OutputMode::Stopped);
    assert_eq!(device.smode(), SerialMode::Stop);
}

#[rstest]
fn test_smode_run_wakes(mut barometer: Bus) {
    send(&mut barometer, "INTV 2 min");
    let out = barometer.dispatch(b"SMODE RUN");
    assert!(out.wake);
    let schedule = barometer.devices().get(0).unwrap().schedule();
    assert_eq!(schedule.mode(), OutputMode::Continuous);
    assert_eq!(schedule.interval(), Duration::from_secs(120));
}

#[rstest]
fn test_poll_mode(mut bus: Bus) {
    // closed barometers ignore everything but SEND and OPEN with their address
    assert!(send(&mut bus, "VERS").is_empty());
    assert!(send(&mut bus, "SEND").is_empty());
    assert_eq!(measure(&mut bus, "SEND 1", &["P=990"]), " 990.00 hPa\r\n");

    assert_eq!(
        send(&mut bus, "OPEN 2"),
        "PTB330: 2 line opened for operator commands\r\n"
    );
    assert_eq!(send(&mut bus, "VERS"), "PTB330 / 1.12.0\r\n");
    assert_eq!(send(&mut bus, "CLOSE"), "line closed\r\n");
    assert!(send(&mut bus, "VERS").is_empty());
}

#[rstest]
fn test_open_closes_others(mut bus: Bus) {
    send(&mut bus, "OPEN 0");
    send(&mut bus, "OPEN 1");
    assert_eq!(send(&mut bus, "SNUM"), "Serial number  : P4250001\r\n");
}

#[rstest]
fn test_addr(mut barometer: Bus) {
    assert_eq!(send(&mut barometer, "ADDR 5"), "Address        : 5\r\n");
    assert_eq!(barometer.devices().addresses(), vec![5]);
    assert_eq!(send(&mut barometer, "ADDR 256"), "Value out of range\r\n");
    assert_eq!(measure(&mut barometer, "SEND 5", &["P=1000"]), "1000.00 hPa\r\n");
}

#[rstest]
fn test_addr_in_use(mut bus: Bus) {
    send(&mut bus, "OPEN 0");
    let out = bus.dispatch(b"ADDR 1");
    assert_eq!(out.reply, b"Address in use\r\n");
    assert_eq!(out.errors, vec![ProtocolError::AddressInUse(1)]);
    assert_eq!(bus.devices().addresses(), vec![0, 1, 2]);
}

#[rstest]
fn test_echo(mut barometer: Bus) {
    assert_eq!(send(&mut barometer, "ECHO ON"), "ECHO ON\r\nEcho           : ON\r\n");
    assert_eq!(send(&mut barometer, "VERS"), "VERS\r\nPTB330 / 1.12.0\r\n");
    assert_eq!(send(&mut barometer, "NOPE"), "NOPE\r\nUnknown command\r\n");
}

#[rstest]
fn test_info(mut barometer: Bus) {
    let info = send(&mut barometer, "?");
    assert!(info.starts_with("PTB330 / 1.12.0\r\nSerial number  : P4250000\r\n"));
    assert!(info.contains("Serial mode    : STOP\r\n"));
    assert!(info.contains("Baud P D S     : 4800 E 7 1\r\n"));
    assert!(info.ends_with("Stability limit: 0.50 hPa\r\n"));
}

#[rstest]
fn test_errs_and_reset(mut barometer: Bus) {
    assert_eq!(send(&mut barometer, "ERRS"), "Error: no pressure measurement\r\n");
    barometer.ingest(&ParsedMessage::parse("P=1000").unwrap());
    assert_eq!(send(&mut barometer, "ERRS"), "No errors\r\n");

    send(&mut barometer, "R");
    send(&mut barometer, "UNIT P mbar");
    let out = barometer.dispatch(b"RESET");
    assert_eq!(out.reply, b"PTB330 / 1.12.0\r\n");
    assert!(out.wake);

    // settings survive, measurements and the temporary RUN do not
    let device = barometer.devices().get(0).unwrap();
    assert_eq!(device.schedule().mode(), OutputMode::Stopped);
    assert_eq!(device.pressure_unit().label(), "mbar");
    assert_eq!(send(&mut barometer, "ERRS"), "Error: no pressure measurement\r\n");
}

#[rstest]
fn test_emulator_run() {
    let line = Arc::new(LoopbackTransport::new());
    let emulator = Emulator::spawn(
        Ptb330Protocol::dispatcher(1).unwrap(),
        Arc::clone(&line),
        Box::new(VecFeed::cycling(["P=1013.25"])),
        SchedulerOptions::default(),
    )
    .unwrap();

    line.send_from_host("INTV 1 s\rSMODE RUN\r");
    let message = "1013.25 hPa\r\n";
    let out = line.wait_for_output(Duration::from_secs(3), |out| {
        String::from_utf8_lossy(out).matches(message).count() >= 2
    });
    let out = String::from_utf8_lossy(&out);
    assert!(out.starts_with("Output intrv.  : 1 s\r\n"), "{out}");
    assert!(out.contains("Serial mode    : RUN\r\n"), "{out}");
    assert!(out.matches(message).count() >= 2, "{out}");
    emulator.shutdown().unwrap();
}
