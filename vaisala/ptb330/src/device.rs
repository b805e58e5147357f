//! Register state of one PTB330 barometer.

use std::{collections::VecDeque, fmt::Display, time::Duration};

use chrono::NaiveDateTime;
use wxemu::{
    CompiledFormat, Device, OutputMode, OutputSchedule, ParsedMessage,
    units::{PressureUnit, TemperatureUnit},
};

use crate::variables::{PtbVariable, Reading};

/// Model name.
pub const MODEL: &str = "PTB330";

/// Firmware version reported by `VERS`.
pub const VERSION: &str = "1.12.0";

/// Factory output format.
pub const DEFAULT_FORMAT: &str = r#"P " " U \r\n"#;

/// Allowed number of interval units.
pub const INTERVAL_RANGE: (i64, i64) = (1, 255);

/// Highest bus address.
pub const MAX_ADDRESS: u8 = 255;

/// Baud rates accepted by `SERI`.
pub const BAUD_RATES: [u32; 10] = [
    300, 600, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115_200,
];

/// Allowed range of the HCP and QFE heights in m.
pub const HEIGHT_RANGE: (f64, f64) = (-30.0, 30.0);

/// Allowed range of the QNH station height in m.
pub const QNH_HEIGHT_RANGE: (f64, f64) = (-300.0, 3000.0);

/// Longest averaging time in s.
pub const MAX_AVERAGING: f64 = 600.0;

/// Largest pressure stability limit in hPa.
pub const MAX_STABILITY_LIMIT: f64 = 10.0;

/// Number of pressure modules.
pub const MODULES: usize = 3;

/// The serial mode, set with `SMODE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerialMode {
    /// Output only on `SEND`.
    #[default]
    Stop,
    /// Continuous output every interval.
    Run,
    /// Bus operation: the barometer only listens after `OPEN` or to `SEND <addr>`.
    Poll,
    /// One message after a restart.
    Send,
}

impl SerialMode {
    /// Label as used by `SMODE`.
    pub fn label(&self) -> &'static str {
        match self {
            SerialMode::Stop => "STOP",
            SerialMode::Run => "RUN",
            SerialMode::Poll => "POLL",
            SerialMode::Send => "SEND",
        }
    }

    /// Look up a mode by its label, case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        [
            SerialMode::Stop,
            SerialMode::Run,
            SerialMode::Poll,
            SerialMode::Send,
        ]
        .into_iter()
        .find(|mode| mode.label().eq_ignore_ascii_case(label.trim()))
    }

    /// How the output schedule runs in this mode.
    pub fn output_mode(&self) -> OutputMode {
        match self {
            SerialMode::Run => OutputMode::Continuous,
            SerialMode::Poll => OutputMode::Polled,
            SerialMode::Stop | SerialMode::Send => OutputMode::Stopped,
        }
    }
}

/// Unit of the output interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IntervalUnit {
    /// Seconds
    #[default]
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
}

impl IntervalUnit {
    /// Label as used by `INTV`.
    pub fn label(&self) -> &'static str {
        match self {
            IntervalUnit::Seconds => "s",
            IntervalUnit::Minutes => "min",
            IntervalUnit::Hours => "h",
        }
    }

    /// Look up a unit by label, case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        [
            IntervalUnit::Seconds,
            IntervalUnit::Minutes,
            IntervalUnit::Hours,
        ]
        .into_iter()
        .find(|unit| unit.label().eq_ignore_ascii_case(label.trim()))
    }

    fn seconds(&self) -> u64 {
        match self {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3600,
        }
    }
}

/// Parity of the serial line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Parity {
    /// No parity
    None,
    /// Even parity
    #[default]
    Even,
    /// Odd parity
    Odd,
}

impl Parity {
    /// Look up the parity by its letter, `N`, `E`, or `O`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "N" => Some(Parity::None),
            "E" => Some(Parity::Even),
            "O" => Some(Parity::Odd),
            _ => None,
        }
    }
}

impl Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            Parity::None => "N",
            Parity::Even => "E",
            Parity::Odd => "O",
        };
        write!(f, "{letter}")
    }
}

/// Serial line settings. They are stored and reported, the emulated line itself keeps running
/// with the settings it was started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    /// Baud rate.
    pub baud: u32,
    /// Parity.
    pub parity: Parity,
    /// Data bits, 7 or 8.
    pub data_bits: u8,
    /// Stop bits, 1 or 2.
    pub stop_bits: u8,
}

impl Default for LineSettings {
    fn default() -> Self {
        LineSettings {
            baud: 4800,
            parity: Parity::Even,
            data_bits: 7,
            stop_bits: 1,
        }
    }
}

impl Display for LineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.baud, self.parity, self.data_bits, self.stop_bits
        )
    }
}

/// One PTB330 barometer.
#[derive(Debug, Clone)]
pub struct Ptb330 {
    address: u8,
    serial: String,
    schedule: OutputSchedule,
    pub(crate) smode: SerialMode,
    pub(crate) open: bool,
    interval: (u8, IntervalUnit),
    pub(crate) format: Option<CompiledFormat<PtbVariable>>,
    pub(crate) pressure_unit: PressureUnit,
    pub(crate) temperature_unit: TemperatureUnit,
    pub(crate) line: LineSettings,
    pub(crate) echo: bool,
    pub(crate) hcp_height: f64,
    pub(crate) qfe_height: f64,
    pub(crate) qnh_height: f64,
    pub(crate) averaging: f64,
    pub(crate) stability_limit: f64,
    samples: VecDeque<[Option<f64>; MODULES]>,
    temperatures: [Option<f64>; MODULES],
    tendency: Option<f64>,
    tendency_code: Option<u8>,
}

impl Ptb330 {
    /// Create a new barometer in its factory state, with the given serial mode.
    pub fn new(address: u8, serial: impl Into<String>, smode: SerialMode) -> Self {
        let mut barometer = Ptb330 {
            address,
            serial: serial.into(),
            schedule: OutputSchedule::default(),
            smode,
            open: false,
            interval: (1, IntervalUnit::Seconds),
            format: None,
            pressure_unit: PressureUnit::Hpa,
            temperature_unit: TemperatureUnit::Celsius,
            line: LineSettings::default(),
            echo: false,
            hcp_height: 0.0,
            qfe_height: 0.0,
            qnh_height: 0.0,
            averaging: 1.0,
            stability_limit: 0.5,
            samples: VecDeque::new(),
            temperatures: [None; MODULES],
            tendency: None,
            tendency_code: None,
        };
        barometer.set_interval(1, IntervalUnit::Seconds);
        barometer.set_smode(smode);
        barometer
    }

    /// Serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// The serial mode.
    pub fn smode(&self) -> SerialMode {
        self.smode
    }

    /// Change the serial mode. Leaving or entering POLL mode closes the line.
    pub(crate) fn set_smode(&mut self, smode: SerialMode) {
        self.smode = smode;
        self.open = false;
        self.schedule.set_mode(smode.output_mode());
    }

    /// True if the barometer answers commands: always, except in POLL mode without `OPEN`.
    pub fn is_listening(&self) -> bool {
        self.smode != SerialMode::Poll || self.open
    }

    /// Output interval as number and unit.
    pub fn interval(&self) -> (u8, IntervalUnit) {
        self.interval
    }

    pub(crate) fn set_interval(&mut self, value: u8, unit: IntervalUnit) {
        self.interval = (value, unit);
        self.schedule
            .set_interval(Duration::from_secs(u64::from(value) * unit.seconds()));
    }

    /// Source of the active output format.
    pub fn format_source(&self) -> &str {
        self.format
            .as_ref()
            .map_or(DEFAULT_FORMAT, CompiledFormat::source)
    }

    /// Pressure unit.
    pub fn pressure_unit(&self) -> PressureUnit {
        self.pressure_unit
    }

    /// Temperature unit.
    pub fn temperature_unit(&self) -> TemperatureUnit {
        self.temperature_unit
    }

    /// Serial line settings.
    pub fn line(&self) -> &LineSettings {
        &self.line
    }

    /// Whether commands are echoed.
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Averaging time in s.
    pub fn averaging(&self) -> f64 {
        self.averaging
    }

    /// Restart: settings are kept, the measurement history is lost and the line is closed.
    pub(crate) fn restart(&mut self) {
        self.samples.clear();
        self.temperatures = [None; MODULES];
        self.tendency = None;
        self.tendency_code = None;
        self.set_smode(self.smode);
    }

    /// Averaged pressure of each module in hPa.
    ///
    /// Every feed line counts as one second of measurement, so the averaging time is the number
    /// of samples averaged.
    pub fn module_pressures(&self) -> [Option<f64>; MODULES] {
        let window = (self.averaging.round() as usize).max(1);
        let mut pressures = [None; MODULES];
        for (module, pressure) in pressures.iter_mut().enumerate() {
            let values: Vec<f64> = self
                .samples
                .iter()
                .rev()
                .take(window)
                .filter_map(|sample| sample[module])
                .collect();
            if !values.is_empty() {
                *pressure = Some(values.iter().sum::<f64>() / values.len() as f64);
            }
        }
        pressures
    }

    /// Snapshot for the output format.
    pub(crate) fn reading(&self, timestamp: NaiveDateTime) -> Reading {
        Reading {
            modules: self.module_pressures(),
            temperatures: self.temperatures,
            tendency: self.tendency,
            tendency_code: self.tendency_code,
            pressure_unit: self.pressure_unit,
            temperature_unit: self.temperature_unit,
            hcp_height: self.hcp_height,
            qfe_height: self.qfe_height,
            qnh_height: self.qnh_height,
            stability_limit: self.stability_limit,
            address: self.address,
            serial: self.serial.clone(),
            timestamp,
        }
    }
}

impl Device for Ptb330 {
    fn address(&self) -> u8 {
        self.address
    }

    fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    fn schedule(&self) -> &OutputSchedule {
        &self.schedule
    }

    fn schedule_mut(&mut self) -> &mut OutputSchedule {
        &mut self.schedule
    }

    /// Take one sample: `P1`, `P2`, `P3` module pressures in hPa (`P` stands for `P1`), `TP1` to
    /// `TP3` module temperatures in °C (`T` stands for `TP1`), `P3H` the 3 h pressure tendency in
    /// hPa and `A3H` its WMO characteristic code.
    fn ingest(&mut self, message: &ParsedMessage) {
        let pressures = [
            message.number("P1").or_else(|| message.number("P")),
            message.number("P2"),
            message.number("P3"),
        ];
        if pressures.iter().any(Option::is_some) {
            if self.samples.len() == MAX_AVERAGING as usize {
                self.samples.pop_front();
            }
            self.samples.push_back(pressures);
        }

        let temperatures = [
            message.number("TP1").or_else(|| message.number("T")),
            message.number("TP2"),
            message.number("TP3"),
        ];
        for (current, new) in self.temperatures.iter_mut().zip(temperatures) {
            if new.is_some() {
                *current = new;
            }
        }

        if let Some(tendency) = message.number("P3H") {
            self.tendency = Some(tendency);
        }
        if let Some(code) = message.number("A3H") {
            self.tendency_code = u8::try_from(code as i64).ok().filter(|code| *code <= 8);
        }
    }
}
