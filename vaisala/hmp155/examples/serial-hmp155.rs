use std::{sync::Arc, thread, time::Duration};

use vaisala_hmp155::Hmp155Protocol;
use wxemu::{ElectricalMode, Emulator, EmulatorConfig, FileFeed, SerialPortTransport};

fn main() {
    let port = "/dev/ttyUSB0";

    // Two probes on an RS-485 bus, at addresses 0 and 1. Both start in POLL mode.
    let config =
        EmulatorConfig::try_new(port, 19200, ElectricalMode::Rs485, "humidity.txt", 2).unwrap();
    let feed = FileFeed::open(&config.feed_path).unwrap();
    let serial = SerialPortTransport::open(&config).expect("Failed to open serial port");

    let emulator = Emulator::spawn(
        Hmp155Protocol::dispatcher(config.devices).unwrap(),
        Arc::new(serial),
        Box::new(feed),
        config.scheduler_options(),
    )
    .unwrap();

    // Answer `SEND 0` and `SEND 1` for ten minutes, then stop.
    thread::sleep(Duration::from_secs(600));
    emulator.shutdown().unwrap();
}
