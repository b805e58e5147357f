use std::sync::Arc;

use present_weather::PresentWeatherProtocol;
use wxemu::{ElectricalMode, Emulator, EmulatorConfig, FileFeed, TcpTransport};

fn main() {
    let address = "127.0.0.1:4001";

    // A single sensor behind a serial-to-Ethernet converter. The host connects to `address`.
    let config =
        EmulatorConfig::try_new(address, 9600, ElectricalMode::Rs232, "weather.txt", 1).unwrap();
    let feed = FileFeed::open(&config.feed_path).unwrap();

    println!("Waiting for the host on {address}");
    let line = TcpTransport::accept(address, config.read_timeout).unwrap();

    let emulator = Emulator::spawn(
        PresentWeatherProtocol::dispatcher(config.devices).unwrap(),
        Arc::new(line),
        Box::new(feed),
        config.scheduler_options(),
    )
    .unwrap();
    emulator.wait().unwrap();
}
