use std::sync::Arc;

use storm_detector::StormDetectorProtocol;
use wxemu::{ElectricalMode, Emulator, EmulatorConfig, FileFeed, SerialPortTransport};

fn main() {
    let port = "/dev/ttyUSB0";
    let baud = 9600;

    // The detector never shares its line. The feed holds strikes, e.g.,
    // `CG=1 DIST=12.5 BRG=270 AMP=9`.
    let config =
        EmulatorConfig::try_new(port, baud, ElectricalMode::Rs232, "strikes.txt", 1).unwrap();
    let feed = FileFeed::open(&config.feed_path).unwrap();
    let serial = SerialPortTransport::open(&config).expect("Failed to open serial port");

    let emulator = Emulator::spawn(
        StormDetectorProtocol::dispatcher("T0000042").unwrap(),
        Arc::new(serial),
        Box::new(feed),
        config.scheduler_options(),
    )
    .unwrap();
    emulator.wait().unwrap();
}
