use std::sync::Arc;

use vaisala_ptb330::Ptb330Protocol;
use wxemu::{ElectricalMode, Emulator, EmulatorConfig, FileFeed, SerialPortTransport};

fn main() {
    let port = "/dev/ttyUSB0";
    let baud = 4800;

    // One barometer on an RS-232 line, fed from a file with lines like `P=1013.2 T=21.5`.
    let config =
        EmulatorConfig::try_new(port, baud, ElectricalMode::Rs232, "pressure.txt", 1).unwrap();
    let feed = FileFeed::open(&config.feed_path).unwrap();
    let serial = SerialPortTransport::open(&config).expect("Failed to open serial port");

    let emulator = Emulator::spawn(
        Ptb330Protocol::dispatcher(config.devices).unwrap(),
        Arc::new(serial),
        Box::new(feed),
        config.scheduler_options(),
    )
    .unwrap();
    println!("PTB330 listening on {port}, send `SMODE RUN` to start the output");

    // Runs until the host closes the line.
    emulator.wait().unwrap();
}
