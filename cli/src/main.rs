//! `wxemu`: run one emulated instrument family on a serial port.
//!
//! ```text
//! wxemu --instrument ptb330 --port /dev/ttyUSB0 --baud 4800 --feed weather.txt
//! wxemu --instrument line-baro --electrical rs485 --devices 3 --port /dev/ttyUSB1 --feed p.txt
//! wxemu --instrument storm --listen 127.0.0.1:4001 --feed strikes.txt --run-for 600
//! ```
//!
//! Errors that prevent the emulator from starting, e.g., a missing feed file or a serial port
//! that cannot be opened, are logged and end the program with a non-zero exit code.

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use line_barometer::LineBarometerProtocol;
use present_weather::PresentWeatherProtocol;
use storm_detector::StormDetectorProtocol;
use vaisala_hmp155::Hmp155Protocol;
use vaisala_ptb330::Ptb330Protocol;
use wxemu::{
    Dispatcher, ElectricalMode, Emulator, EmulatorConfig, EmulatorError, FileFeed,
    MeasurementFeed, Protocol, SerialPortTransport, SerialTransport, TcpTransport,
    scheduler::run_for,
};

/// The emulated instrument families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Instrument {
    /// Vaisala PTB330 barometer
    Ptb330,
    /// Vaisala HMP155 humidity probe
    Hmp155,
    /// Barometer with the single-letter line protocol
    LineBaro,
    /// Present weather sensor
    PresentWeather,
    /// Thunderstorm detector
    Storm,
}

#[derive(Parser, Debug)]
#[command(name = "wxemu", version, about = "Emulate serial weather-sensor instruments")]
struct Cli {
    /// Instrument family to emulate.
    #[arg(long, value_enum)]
    instrument: Instrument,

    /// Serial device the host is connected to.
    #[arg(long, env = "WXEMU_PORT", required_unless_present = "listen")]
    port: Option<String>,

    /// Wait for the host on this TCP address instead of a serial port.
    #[arg(long, conflicts_with = "port")]
    listen: Option<String>,

    /// Baud rate of the line.
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Electrical interface: rs232, rs422, rs485, or sdi12.
    #[arg(long, default_value = "rs232")]
    electrical: ElectricalMode,

    /// File with one measurement sample per line, `NAME=value` pairs.
    #[arg(long, env = "WXEMU_FEED")]
    feed: PathBuf,

    /// Number of instruments on the bus.
    #[arg(long, default_value_t = 1)]
    devices: u8,

    /// Serial number of the thunderstorm detector.
    #[arg(long, default_value = "T0000001")]
    serial: String,

    /// Log filter, e.g., `info` or `wxemu=debug`. `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Stop after this many seconds instead of running until the line closes.
    #[arg(long)]
    run_for: Option<u64>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match launch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "emulator failed");
            ExitCode::FAILURE
        }
    }
}

/// Validate the configuration, open the feed and the line, and run the emulator.
fn launch(cli: &Cli) -> Result<(), EmulatorError> {
    let port = cli.port.as_deref().or(cli.listen.as_deref()).unwrap_or_default();
    let config =
        EmulatorConfig::try_new(port, cli.baud, cli.electrical, &cli.feed, cli.devices)?;
    let feed: Box<dyn MeasurementFeed> = Box::new(FileFeed::open(&config.feed_path)?);
    info!(instrument = ?cli.instrument, devices = config.devices, "configuration accepted");

    match &cli.listen {
        Some(address) => {
            let transport = TcpTransport::accept(address.as_str(), config.read_timeout)?;
            with_instrument(cli, &config, Arc::new(transport), feed)
        }
        None => {
            let transport = SerialPortTransport::open(&config)?;
            with_instrument(cli, &config, Arc::new(transport), feed)
        }
    }
}

fn with_instrument<T: SerialTransport + 'static>(
    cli: &Cli,
    config: &EmulatorConfig,
    transport: Arc<T>,
    feed: Box<dyn MeasurementFeed>,
) -> Result<(), EmulatorError> {
    let devices = config.devices;
    match cli.instrument {
        Instrument::Ptb330 => run(
            Ptb330Protocol::dispatcher(devices)?,
            config,
            transport,
            feed,
            cli,
        ),
        Instrument::Hmp155 => run(
            Hmp155Protocol::dispatcher(devices)?,
            config,
            transport,
            feed,
            cli,
        ),
        Instrument::LineBaro => run(
            LineBarometerProtocol::dispatcher(devices)?,
            config,
            transport,
            feed,
            cli,
        ),
        Instrument::PresentWeather => run(
            PresentWeatherProtocol::dispatcher(devices)?,
            config,
            transport,
            feed,
            cli,
        ),
        Instrument::Storm if devices > 1 => Err(EmulatorError::InvalidConfig(
            "the thunderstorm detector does not share its line".into(),
        )),
        Instrument::Storm => run(
            StormDetectorProtocol::dispatcher(&cli.serial)?,
            config,
            transport,
            feed,
            cli,
        ),
    }
}

fn run<P: Protocol, T: SerialTransport + 'static>(
    dispatcher: Dispatcher<P>,
    config: &EmulatorConfig,
    transport: Arc<T>,
    feed: Box<dyn MeasurementFeed>,
    cli: &Cli,
) -> Result<(), EmulatorError> {
    let emulator = Emulator::spawn(dispatcher, transport, feed, config.scheduler_options())?;
    match cli.run_for {
        Some(seconds) => {
            run_for(emulator.context(), Duration::from_secs(seconds));
            emulator.shutdown()
        }
        None => emulator.wait(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(["wxemu"].iter().chain(args))
    }

    #[rstest]
    fn test_command_is_consistent() {
        Cli::command().debug_assert();
    }

    #[rstest]
    fn test_defaults() {
        let cli = parse(&["--instrument", "ptb330", "--port", "/dev/ttyS0", "--feed", "f.txt"])
            .unwrap();
        assert_eq!(cli.instrument, Instrument::Ptb330);
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyS0"));
        assert_eq!(cli.baud, 9600);
        assert_eq!(cli.electrical, ElectricalMode::Rs232);
        assert_eq!(cli.devices, 1);
        assert_eq!(cli.run_for, None);
    }

    #[rstest]
    #[case("line-baro", Instrument::LineBaro)]
    #[case("present-weather", Instrument::PresentWeather)]
    #[case("storm", Instrument::Storm)]
    #[case("hmp155", Instrument::Hmp155)]
    fn test_instrument_names(#[case] name: &str, #[case] exp: Instrument) {
        let cli = parse(&["--instrument", name, "--port", "p", "--feed", "f"]).unwrap();
        assert_eq!(cli.instrument, exp);
    }

    #[rstest]
    fn test_bus_options() {
        let cli = parse(&[
            "--instrument",
            "line-baro",
            "--listen",
            "127.0.0.1:4001",
            "--electrical",
            "RS-485",
            "--devices",
            "3",
            "--feed",
            "f",
            "--run-for",
            "60",
        ])
        .unwrap();
        assert_eq!(cli.listen.as_deref(), Some("127.0.0.1:4001"));
        assert_eq!(cli.electrical, ElectricalMode::Rs485);
        assert_eq!(cli.devices, 3);
        assert_eq!(cli.run_for, Some(60));
    }

    #[rstest]
    #[case(&["--instrument", "ptb330", "--feed", "f"])]
    #[case(&["--instrument", "ptb330", "--port", "p", "--listen", "l", "--feed", "f"])]
    #[case(&["--instrument", "wxt520", "--port", "p", "--feed", "f"])]
    #[case(&["--instrument", "ptb330", "--port", "p", "--feed", "f", "--electrical", "can"])]
    fn test_rejected_arguments(#[case] args: &[&str]) {
        assert!(parse(args).is_err());
    }

    #[rstest]
    fn test_missing_feed_fails_before_the_port_is_opened() {
        let cli = parse(&[
            "--instrument",
            "ptb330",
            "--port",
            "/dev/does-not-exist",
            "--feed",
            "/does/not/exist.txt",
        ])
        .unwrap();
        assert!(matches!(
            launch(&cli),
            Err(EmulatorError::FeedUnavailable { .. })
        ));
    }

    #[rstest]
    fn test_invalid_config() {
        let cli = parse(&[
            "--instrument",
            "hmp155",
            "--port",
            "p",
            "--feed",
            "f",
            "--devices",
            "2",
        ])
        .unwrap();
        assert!(matches!(launch(&cli), Err(EmulatorError::InvalidConfig(_))));
    }
}
