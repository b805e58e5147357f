//! Test cases for the LoopbackTransport.

use std::{sync::Arc, thread, time::Duration};

use rstest::*;

use wxemu::{EmulatorError, LoopbackTransport, SerialTransport};

/// Create a loopback line with a short read timeout.
#[fixture]
fn line() -> LoopbackTransport {
    LoopbackTransport::with_read_timeout(Duration::from_millis(5))
}

#[rstest]
fn read_bytes_in_order(line: LoopbackTransport) {
    line.send_from_host("R\r");
    assert_eq!(line.read_byte().unwrap(), Some(b'R'));
    assert_eq!(line.read_byte().unwrap(), Some(b'\r'));
    assert_eq!(line.read_byte().unwrap(), None);
}

#[rstest]
fn read_times_out(line: LoopbackTransport) {
    assert_eq!(line.read_byte().unwrap(), None);
}

#[rstest]
fn read_wakes_on_send() {
    let line = Arc::new(LoopbackTransport::with_read_timeout(Duration::from_secs(5)));
    let host = Arc::clone(&line);
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        host.send_from_host("S");
    });
    assert_eq!(line.read_byte().unwrap(), Some(b'S'));
    handle.join().unwrap();
}

#[rstest]
fn write_and_take(line: LoopbackTransport) {
    line.write(b"1013.25 hPa").unwrap();
    line.write(b"\r\n").unwrap();
    assert_eq!(line.take_output(), b"1013.25 hPa\r\n");
    assert!(line.take_output().is_empty());
}

#[rstest]
fn wait_for_output_times_out(line: LoopbackTransport) {
    line.write(b"partial").unwrap();
    let out = line.wait_for_output(Duration::from_millis(20), |out| out.ends_with(b"\n"));
    assert_eq!(out, b"partial");
}

#[rstest]
fn closed_line(line: LoopbackTransport) {
    line.send_from_host("A");
    line.close();
    assert_eq!(line.read_byte().unwrap(), Some(b'A'));
    assert!(matches!(
        line.read_byte(),
        Err(EmulatorError::TransportClosed)
    ));
}
