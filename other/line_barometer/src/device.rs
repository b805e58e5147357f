//! Register state of one line barometer.

use std::{collections::VecDeque, time::Duration};

use chrono::NaiveDateTime;
use wxemu::{Device, OutputSchedule, ParsedMessage, units::PressureUnit};

use crate::formats::Reading;

/// Model name reported by `I`.
pub const MODEL: &str = "LB-100";

/// Default PIN for calibration.
pub const DEFAULT_PIN: i64 = 1234;

/// Pressure units by their unit code, as set with `U,<code>`.
pub const UNIT_CODES: [PressureUnit; 6] = [
    PressureUnit::Hpa,
    PressureUnit::Mbar,
    PressureUnit::InHg,
    PressureUnit::MmHg,
    PressureUnit::Kpa,
    PressureUnit::Psi,
];

/// Largest averaging filter.
pub const MAX_FILTER: u8 = 99;

/// Largest auto-send interval in seconds.
pub const MAX_INTERVAL: f64 = 9999.0;

/// Largest absolute calibration offset in hPa.
pub const MAX_OFFSET: f64 = 10.0;

/// Allowed range of the calibration gain.
pub const GAIN_RANGE: (f64, f64) = (0.9, 1.1);

/// One line barometer on the bus.
#[derive(Debug, Clone)]
pub struct LineBarometer {
    address: u8,
    serial: String,
    schedule: OutputSchedule,
    pub(crate) format: u8,
    interval_centis: u32,
    pub(crate) unit_code: u8,
    pub(crate) filter: u8,
    pub(crate) checksum: bool,
    pub(crate) pin: i64,
    pub(crate) offset: f64,
    pub(crate) gain: f64,
    samples: VecDeque<f64>,
    temperature: Option<f64>,
}

impl LineBarometer {
    /// Create a new barometer in its factory state: format 1, no auto-send, hPa, no filter, no
    /// checksums, no calibration.
    pub fn new(address: u8, serial: impl Into<String>) -> Self {
        LineBarometer {
            address,
            serial: serial.into(),
            schedule: OutputSchedule::default(),
            format: 1,
            interval_centis: 0,
            unit_code: 0,
            filter: 0,
            checksum: false,
            pin: DEFAULT_PIN,
            offset: 0.0,
            gain: 1.0,
            samples: VecDeque::with_capacity(usize::from(MAX_FILTER)),
            temperature: None,
        }
    }

    /// Use a different calibration PIN.
    pub fn with_pin(mut self, pin: i64) -> Self {
        self.pin = pin;
        self
    }

    /// Serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Selected output format.
    pub fn format(&self) -> u8 {
        self.format
    }

    /// Auto-send interval in seconds, with a resolution of 10 ms.
    pub fn interval(&self) -> f64 {
        f64::from(self.interval_centis) / 100.0
    }

    /// Set the auto-send interval. A non-zero interval starts the output, 0 stops it.
    pub(crate) fn set_interval(&mut self, seconds: f64) {
        self.interval_centis = (seconds * 100.0).round() as u32;
        self.schedule
            .set_interval(Duration::from_millis(u64::from(self.interval_centis) * 10));
        if self.interval_centis > 0 {
            self.schedule.start();
        } else {
            self.schedule.stop();
        }
    }

    /// The pressure unit.
    pub fn unit(&self) -> PressureUnit {
        UNIT_CODES
            .get(usize::from(self.unit_code))
            .copied()
            .unwrap_or_default()
    }

    /// Number of samples averaged.
    pub fn filter(&self) -> u8 {
        self.filter
    }

    /// Whether replies carry a checksum and commands need one.
    pub fn checksum_enabled(&self) -> bool {
        self.checksum
    }

    /// Calibration offset in hPa.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Calibration gain.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Filtered and calibrated pressure in hPa.
    pub fn pressure(&self) -> Option<f64> {
        let window = usize::from(self.filter.max(1)).min(self.samples.len());
        if window == 0 {
            return None;
        }
        let mean = self.samples.iter().rev().take(window).sum::<f64>() / window as f64;
        Some(mean * self.gain + self.offset)
    }

    /// The auto-send settings as they are reported: `<fmt>,<interval>`.
    pub(crate) fn auto_send(&self) -> String {
        format!("{},{}", self.format, format_interval(self.interval_centis))
    }

    /// Everything the output formats need.
    pub(crate) fn reading(&self, timestamp: NaiveDateTime) -> Reading {
        Reading {
            pressure: self.pressure(),
            temperature: self.temperature,
            unit: self.unit(),
            serial: self.serial.clone(),
            timestamp,
        }
    }
}

impl Device for LineBarometer {
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

    fn ingest(&mut self, message: &ParsedMessage) {
        if let Some(pressure) = message.number("P") {
            if self.samples.len() == usize::from(MAX_FILTER) {
                self.samples.pop_front();
            }
            self.samples.push_back(pressure);
        }
        if let Some(temperature) = message.number("T") {
            self.temperature = Some(temperature);
        }
    }
}

/// Interval in seconds without trailing zeros, e.g., `2`, `2.5`, or `0.05`.
fn format_interval(centis: u32) -> String {
    let (seconds, fraction) = (centis / 100, centis % 100);
    match fraction {
        0 => seconds.to_string(),
        f if f % 10 == 0 => format!("{seconds}.{}", f / 10),
        f => format!("{seconds}.{f:02}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(0, "0")]
    #[case(200, "2")]
    #[case(250, "2.5")]
    #[case(205, "2.05")]
    #[case(999_900, "9999")]
    fn test_format_interval(#[case] centis: u32, #[case] exp: &str) {
        assert_eq!(format_interval(centis), exp);
    }

    #[rstest]
    fn test_filter() {
        let mut baro = LineBarometer::new(0, "B1");
        assert_eq!(baro.pressure(), None);
        for p in [1000.0, 1002.0, 1004.0] {
            baro.ingest(&ParsedMessage::parse(&format!("P={p}")).unwrap());
        }
        assert_eq!(baro.pressure(), Some(1004.0));
        baro.filter = 2;
        assert_eq!(baro.pressure(), Some(1003.0));
        baro.filter = 50;
        assert_eq!(baro.pressure(), Some(1002.0));
    }

    #[rstest]
    fn test_calibration_applied() {
        let mut baro = LineBarometer::new(0, "B1");
        baro.ingest(&ParsedMessage::parse("P=1000").unwrap());
        baro.offset = 1.5;
        baro.gain = 1.01;
        assert_eq!(baro.pressure(), Some(1011.5));
    }

    #[rstest]
    fn test_interval_controls_schedule() {
        let mut baro = LineBarometer::new(0, "B1");
        baro.set_interval(2.0);
        assert_eq!(baro.schedule().mode(), wxemu::OutputMode::Continuous);
        assert_eq!(baro.schedule().interval(), Duration::from_secs(2));
        assert_eq!(baro.auto_send(), "1,2");
        baro.set_interval(0.0);
        assert_eq!(baro.schedule().mode(), wxemu::OutputMode::Stopped);
    }
}
