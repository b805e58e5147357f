//! Register state and strike statistics of the thunderstorm detector.

use std::{fmt::Display, time::Duration};

use measurements::Length;
use wxemu::{Device, OutputMode, OutputSchedule, ParsedMessage};

/// Model name reported by `ID`.
pub const MODEL: &str = "TSD-1";

/// Firmware version reported by `ID`.
pub const FIRMWARE: &str = "2.3.1";

/// Allowed data interval in s.
pub const INTERVAL_RANGE: (i64, i64) = (1, 3600);

/// Highest squelch level.
pub const MAX_SQUELCH: u8 = 15;

/// Longest message text.
pub const MAX_MSG_LEN: usize = 32;

/// Units the strike distance is reported in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RangeUnit {
    /// Kilometers
    #[default]
    Kilometers,
    /// Statute miles
    Miles,
    /// Nautical miles
    NauticalMiles,
}

impl RangeUnit {
    /// Label as used on the wire.
    pub fn label(&self) -> &'static str {
        match self {
            RangeUnit::Kilometers => "KM",
            RangeUnit::Miles => "MI",
            RangeUnit::NauticalMiles => "NM",
        }
    }

    /// Look up a unit by label, case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        [
            RangeUnit::Kilometers,
            RangeUnit::Miles,
            RangeUnit::NauticalMiles,
        ]
        .into_iter()
        .find(|unit| unit.label().eq_ignore_ascii_case(label.trim()))
    }

    /// Convert a distance in km into this unit.
    pub fn from_km(&self, km: f64) -> f64 {
        let distance = Length::from_kilometers(km);
        match self {
            RangeUnit::Kilometers => km,
            RangeUnit::Miles => distance.as_miles(),
            RangeUnit::NauticalMiles => distance.as_meters() / 1852.0, // HACK: not in measurements
        }
    }
}

impl Display for RangeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Strikes counted since the last `RESET`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrikeCount {
    /// Cloud-to-ground strikes.
    pub cloud_ground: u64,
    /// Cloud-to-cloud strikes.
    pub cloud_cloud: u64,
    /// Distance of the nearest strike in km.
    pub nearest: Option<f64>,
    /// Bearing of the nearest strike in degrees.
    pub bearing: Option<f64>,
}

impl StrikeCount {
    /// All strikes.
    pub fn total(&self) -> u64 {
        self.cloud_ground + self.cloud_cloud
    }
}

/// The thunderstorm detector.
#[derive(Debug, Clone)]
pub struct StormDetector {
    address: u8,
    serial: String,
    schedule: OutputSchedule,
    pub(crate) range: RangeUnit,
    pub(crate) squelch: u8,
    pub(crate) message: String,
    pub(crate) strikes: StrikeCount,
}

impl StormDetector {
    /// Create a new detector: polled, 60 s interval, km, squelch 0, no message.
    pub fn new(serial: impl Into<String>) -> Self {
        StormDetector {
            address: 0,
            serial: serial.into(),
            schedule: OutputSchedule::new(OutputMode::Polled, Duration::from_secs(60)),
            range: RangeUnit::Kilometers,
            squelch: 0,
            message: String::new(),
            strikes: StrikeCount::default(),
        }
    }

    /// Serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Unit of the strike distance.
    pub fn range(&self) -> RangeUnit {
        self.range
    }

    /// Squelch level, strikes with a lower amplitude are ignored.
    pub fn squelch(&self) -> u8 {
        self.squelch
    }

    /// The message text appended to data messages.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Strikes counted since the last reset.
    pub fn strikes(&self) -> &StrikeCount {
        &self.strikes
    }

    /// The status line, without the keyword.
    pub(crate) fn status(&self) -> String {
        let mode = match self.schedule.mode() {
            OutputMode::Continuous => "CONT",
            OutputMode::Polled => "POLL",
            OutputMode::Stopped => "STOP",
        };
        let mut status = format!(
            "{mode} {} {} {}",
            self.schedule.interval().as_secs(),
            self.range,
            self.squelch
        );
        if !self.message.is_empty() {
            status.push(' ');
            status.push_str(&self.message);
        }
        status
    }

    /// The data message payload.
    pub(crate) fn data(&self) -> String {
        let strikes = &self.strikes;
        let distance = strikes
            .nearest
            .map_or_else(|| "---".to_string(), |d| format!("{:.1}", self.range.from_km(d)));
        let bearing = strikes
            .bearing
            .map_or_else(|| "---".to_string(), |b| format!("{:03.0}", b.rem_euclid(360.0)));
        let mut data = format!(
            "DATA {} {} {} {distance} {bearing}",
            strikes.total(),
            strikes.cloud_ground,
            strikes.cloud_cloud
        );
        if !self.message.is_empty() {
            data.push(' ');
            data.push_str(&self.message);
        }
        data
    }
}

impl Device for StormDetector {
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

    /// Count the strikes of one feed sample: `CG` and `CC` new strikes, `DIST` distance in km,
    /// `BRG` bearing, and `AMP` the signal amplitude (0-15) that is compared with the squelch.
    fn ingest(&mut self, message: &ParsedMessage) {
        let amplitude = message.number("AMP").unwrap_or(f64::from(MAX_SQUELCH));
        if amplitude < f64::from(self.squelch) {
            return;
        }
        let cloud_ground = message.number("CG").unwrap_or_default().max(0.0) as u64;
        let cloud_cloud = message.number("CC").unwrap_or_default().max(0.0) as u64;
        self.strikes.cloud_ground += cloud_ground;
        self.strikes.cloud_cloud += cloud_cloud;

        if cloud_ground + cloud_cloud == 0 {
            return;
        }
        if let Some(distance) = message.number("DIST") {
            if self.strikes.nearest.is_none_or(|nearest| distance < nearest) {
                self.strikes.nearest = Some(distance);
                self.strikes.bearing = message.number("BRG");
            }
        }
    }
}
