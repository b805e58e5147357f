use std::sync::Arc;

use line_barometer::LineBarometerProtocol;
use wxemu::{ElectricalMode, Emulator, EmulatorConfig, FileFeed, SerialPortTransport};

fn main() {
    let port = "/dev/ttyUSB1";
    let baud = 9600;
    let devices = 3;

    // Three barometers share the RS-485 bus at addresses 1 to 3. Address them with `01:P`.
    let config =
        EmulatorConfig::try_new(port, baud, ElectricalMode::Rs485, "pressure.txt", devices)
            .unwrap();
    let feed = FileFeed::open(&config.feed_path).unwrap();
    let serial = SerialPortTransport::open(&config).expect("Failed to open serial port");

    let dispatcher = LineBarometerProtocol::dispatcher(devices).unwrap();
    println!("Barometers at addresses {:?}", dispatcher.devices().addresses());

    let emulator = Emulator::spawn(
        dispatcher,
        Arc::new(serial),
        Box::new(feed),
        config.scheduler_options(),
    )
    .unwrap();
    emulator.wait().unwrap();
}
