//! State of one HMP155 probe.

use std::time::Duration;

use chrono::NaiveDateTime;
use wxemu::{CompiledFormat, Device, OutputMode, OutputSchedule, ParsedMessage};

use crate::variables::{HmpVariable, Reading, STANDARD_PRESSURE};

/// Model name.
pub const MODEL: &str = "HMP155";

/// Firmware version.
pub const VERSION: &str = "1.24";

/// Factory output format.
pub const DEFAULT_FORMAT: &str = r#""RH=" 5.1 RH " " U4 "T=" 5.1 T " " U \r\n"#;

/// Highest bus address.
pub const MAX_ADDRESS: u8 = 99;

/// Highest number of interval units. `INTV 0` sends as fast as the probe measures, once a second.
pub const MAX_INTERVAL: i64 = 255;

/// Ranges of the `XHEAT` limits: RH in %, temperature in °C, time in s.
pub const HEAT_RH_RANGE: (i64, i64) = (0, 100);
/// See [`HEAT_RH_RANGE`].
pub const HEAT_TEMPERATURE_RANGE: (i64, i64) = (0, 200);
/// See [`HEAT_RH_RANGE`].
pub const HEAT_TIME_RANGE: (i64, i64) = (0, 255);

const SERIAL_MODES: [(&str, SerialMode); 4] = [
    ("STOP", SerialMode::Stop),
    ("RUN", SerialMode::Run),
    ("POLL", SerialMode::Poll),
    ("SEND", SerialMode::Send),
];

/// The serial mode, `SMODE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerialMode {
    /// Output on `SEND` only
    #[default]
    Stop,
    /// Continuous output
    Run,
    /// Addressed bus operation
    Poll,
    /// One message after power up
    Send,
}

impl SerialMode {
    /// Label as used by `SMODE`.
    pub fn label(&self) -> &'static str {
        SERIAL_MODES
            .iter()
            .find(|(_, mode)| mode == self)
            .map_or("STOP", |(label, _)| *label)
    }

    /// Look up a mode by label, case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        SERIAL_MODES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label))
            .map(|(_, mode)| *mode)
    }
}

/// Unit of the `INTV` interval.
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
        match label.to_ascii_lowercase().as_str() {
            "s" => Some(IntervalUnit::Seconds),
            "min" => Some(IntervalUnit::Minutes),
            "h" => Some(IntervalUnit::Hours),
            _ => None,
        }
    }

    fn duration(&self, value: u8) -> Duration {
        let factor = match self {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3600,
        };
        if value == 0 {
            return Duration::from_secs(1);
        }
        Duration::from_secs(u64::from(value) * factor)
    }
}

/// Unit system of the output, `UNIT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnitSystem {
    /// °C, g/m³, g/kg
    #[default]
    Metric,
    /// °F, gr/ft³, gr/lb
    NonMetric,
}

impl UnitSystem {
    /// Look up the unit system by its letter, `M` or `N`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "M" | "m" => Some(UnitSystem::Metric),
            "N" | "n" => Some(UnitSystem::NonMetric),
            _ => None,
        }
    }

    /// Name as reported by `UNIT`.
    pub fn name(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::NonMetric => "non metric",
        }
    }
}

/// Settings of the extra heating, `XHEAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraHeat {
    /// Whether the extra heating may run.
    pub enabled: bool,
    /// RH in % at and above which the heating runs.
    pub rh_limit: u8,
    /// Heating temperature in °C.
    pub temperature: u8,
    /// Heating time in s.
    pub time: u8,
}

impl Default for ExtraHeat {
    fn default() -> Self {
        ExtraHeat {
            enabled: false,
            rh_limit: 95,
            temperature: 100,
            time: 30,
        }
    }
}

/// One HMP155 probe.
#[derive(Debug, Clone)]
pub struct Hmp155 {
    address: u8,
    serial: String,
    schedule: OutputSchedule,
    smode: SerialMode,
    pub(crate) open: bool,
    interval: (u8, IntervalUnit),
    pub(crate) format: Option<CompiledFormat<HmpVariable>>,
    pub(crate) units: UnitSystem,
    pub(crate) heat: ExtraHeat,
    humidity: Option<f64>,
    temperature: Option<f64>,
    additional_temperature: Option<f64>,
    pressure: Option<f64>,
}

impl Hmp155 {
    /// A probe with factory settings.
    pub fn new(address: u8, serial: impl Into<String>, smode: SerialMode) -> Self {
        let mut probe = Hmp155 {
            address,
            serial: serial.into(),
            schedule: OutputSchedule::default(),
            smode,
            open: false,
            interval: (1, IntervalUnit::Seconds),
            format: None,
            units: UnitSystem::Metric,
            heat: ExtraHeat::default(),
            humidity: None,
            temperature: None,
            additional_temperature: None,
            pressure: None,
        };
        probe.set_interval(1, IntervalUnit::Seconds);
        probe.set_smode(smode);
        probe
    }

    /// Serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Serial mode.
    pub fn smode(&self) -> SerialMode {
        self.smode
    }

    pub(crate) fn set_smode(&mut self, smode: SerialMode) {
        self.smode = smode;
        self.open = false;
        let mode = match smode {
            SerialMode::Run => OutputMode::Continuous,
            SerialMode::Poll => OutputMode::Polled,
            SerialMode::Stop | SerialMode::Send => OutputMode::Stopped,
        };
        self.schedule.set_mode(mode);
    }

    /// A probe in POLL mode only takes commands after `OPEN`.
    pub fn is_listening(&self) -> bool {
        self.open || self.smode != SerialMode::Poll
    }

    /// Interval as sent with `INTV`.
    pub fn interval(&self) -> (u8, IntervalUnit) {
        self.interval
    }

    pub(crate) fn set_interval(&mut self, value: u8, unit: IntervalUnit) {
        self.interval = (value, unit);
        self.schedule.set_interval(unit.duration(value));
    }

    /// Source of the output format in use.
    pub fn format_source(&self) -> &str {
        self.format
            .as_ref()
            .map_or(DEFAULT_FORMAT, CompiledFormat::source)
    }

    /// Unit system.
    pub fn units(&self) -> UnitSystem {
        self.units
    }

    /// Extra heating settings.
    pub fn heat(&self) -> &ExtraHeat {
        &self.heat
    }

    /// True while the extra heating runs: it is enabled and the humidity reached the RH limit.
    pub fn is_heating(&self) -> bool {
        self.heat.enabled
            && self
                .humidity
                .is_some_and(|rh| rh >= f64::from(self.heat.rh_limit))
    }

    /// Last humidity in %RH.
    pub fn humidity(&self) -> Option<f64> {
        self.humidity
    }

    /// Restart with the stored settings and no measurements.
    pub(crate) fn restart(&mut self) {
        self.humidity = None;
        self.temperature = None;
        self.additional_temperature = None;
        self.pressure = None;
        self.set_smode(self.smode);
    }

    pub(crate) fn reading(&self, timestamp: NaiveDateTime) -> Reading {
        Reading {
            humidity: self.humidity,
            temperature: self.temperature,
            additional_temperature: self.additional_temperature,
            pressure: self.pressure.unwrap_or(STANDARD_PRESSURE),
            units: self.units,
            address: self.address,
            serial: self.serial.clone(),
            timestamp,
        }
    }
}

impl Device for Hmp155 {
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

    /// `RH` in %, `T` and `TA` in °C, `P` in hPa for the mixing ratio. Missing names keep their
    /// last value.
    fn ingest(&mut self, message: &ParsedMessage) {
        let update = |current: &mut Option<f64>, name: &str| {
            if let Some(value) = message.number(name) {
                *current = Some(value);
            }
        };
        update(&mut self.humidity, "RH");
        update(&mut self.temperature, "T");
        update(&mut self.additional_temperature, "TA");
        update(&mut self.pressure, "P");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[fixture]
    fn probe() -> Hmp155 {
        Hmp155::new(0, "H1", SerialMode::Stop)
    }

    #[rstest]
    #[case("run", Some(SerialMode::Run))]
    #[case("SEND", Some(SerialMode::Send))]
    #[case("FAST", None)]
    fn test_serial_mode(#[case] label: &str, #[case] exp: Option<SerialMode>) {
        assert_eq!(SerialMode::from_label(label), exp);
    }

    #[rstest]
    fn test_heating(mut probe: Hmp155) {
        probe.ingest(&ParsedMessage::parse("RH=96 T=5").unwrap());
        assert!(!probe.is_heating());
        probe.heat.enabled = true;
        assert!(probe.is_heating());
        probe.ingest(&ParsedMessage::parse("RH=94.9").unwrap());
        assert!(!probe.is_heating());
    }

    #[rstest]
    fn test_zero_interval_is_fastest(mut probe: Hmp155) {
        probe.set_interval(0, IntervalUnit::Minutes);
        assert_eq!(probe.interval(), (0, IntervalUnit::Minutes));
        assert_eq!(probe.schedule().interval(), Duration::from_secs(1));
        probe.set_interval(2, IntervalUnit::Minutes);
        assert_eq!(probe.schedule().interval(), Duration::from_secs(120));
    }

    #[rstest]
    fn test_restart_keeps_settings(mut probe: Hmp155) {
        probe.ingest(&ParsedMessage::parse("RH=50 T=20 P=990").unwrap());
        probe.units = UnitSystem::NonMetric;
        probe.restart();
        assert_eq!(probe.humidity(), None);
        assert_eq!(probe.units(), UnitSystem::NonMetric);
        assert_eq!(probe.reading(NaiveDateTime::default()).pressure, STANDARD_PRESSURE);
    }
}
