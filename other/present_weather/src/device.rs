//! Settings, observations, and the register state of one present-weather sensor.

use std::{collections::VecDeque, time::Duration};

use measurements::Length;
use wxemu::{Device, OutputMode, OutputSchedule, ParsedMessage, ProtocolError};

use crate::command::{MAX_ID, SettingsUpdate};

/// Default PIN for calibration.
pub const DEFAULT_PIN: i64 = 1234;

/// Longest message interval in s.
pub const MAX_INTERVAL: u16 = 3600;

/// Highest baud rate code.
pub const MAX_BAUD_CODE: u8 = 7;

/// Fields of the custom message, by bit number.
pub const MESSAGE_FIELDS: [&str; 9] = [
    "visibility",
    "weather code",
    "METAR code",
    "temperature",
    "precipitation intensity",
    "precipitation amount",
    "luminance",
    "window contamination",
    "status",
];

/// Bits of the custom message mask that select a field.
pub const MESSAGE_MASK_ALLOWED: u32 = (1 << MESSAGE_FIELDS.len()) - 1;

/// Allowed range of the window contamination zero offset in %.
pub const ZERO_RANGE: (f64, f64) = (-5.0, 5.0);

/// Allowed range of the visibility span factor.
pub const SPAN_RANGE: (f64, f64) = (0.8, 1.2);

/// Visibility units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisibilityUnit {
    /// Meters
    #[default]
    Meters,
    /// Feet
    Feet,
}

/// Layout of the data message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageFormat {
    /// Visibility, weather code, METAR code, temperature.
    #[default]
    Standard,
    /// The fields selected with `MSGSET`.
    Custom,
}

/// The settings as they are read with `GET` and written with `SET`/`SETNC`, without the id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    /// Message interval.
    pub interval: u16,
    /// Message format.
    pub format: MessageFormat,
    /// Output mode, polled or continuous.
    pub mode: OutputMode,
    /// Baud rate code.
    pub baud: u8,
    /// Visibility units.
    pub units: VisibilityUnit,
    /// Averaging time in minutes.
    pub averaging: u8,
    /// Whether frames without valid CRC are refused.
    pub crc_check: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            interval: 60,
            format: MessageFormat::Standard,
            mode: OutputMode::Polled,
            baud: 4,
            units: VisibilityUnit::Meters,
            averaging: 1,
            crc_check: true,
        }
    }
}

impl Settings {
    /// The fields in wire order, behind the given id.
    pub fn render(&self, id: u8) -> String {
        format!(
            "{id}:{}:{}:{}:{}:{}:{}:{}",
            self.interval,
            match self.format {
                MessageFormat::Standard => 0,
                MessageFormat::Custom => 1,
            },
            u8::from(self.mode == OutputMode::Continuous),
            self.baud,
            match self.units {
                VisibilityUnit::Meters => 0,
                VisibilityUnit::Feet => 1,
            },
            self.averaging,
            u8::from(self.crc_check),
        )
    }

    /// Apply the fields of an update that are present and valid.
    ///
    /// Returns the new id, if one was requested and is valid, and the first field that failed its
    /// check. The id itself is not part of the settings, it is the address of the device.
    pub fn update(&mut self, update: &SettingsUpdate) -> (Option<u8>, Option<ProtocolError>) {
        let mut failed = None;

        let id = update
            .id
            .filter(|&id| check(&mut failed, "id", id, 0, MAX_ID.into()))
            .map(|id| id as u8);
        if let Some(interval) = update.interval {
            if check(&mut failed, "interval", interval, 0, MAX_INTERVAL.into()) {
                self.interval = interval as u16;
            }
        }
        if let Some(format) = update.format {
            if check(&mut failed, "format", format, 0, 1) {
                self.format = if format == 0 {
                    MessageFormat::Standard
                } else {
                    MessageFormat::Custom
                };
            }
        }
        if let Some(mode) = update.mode {
            if check(&mut failed, "mode", mode, 0, 1) {
                self.mode = if mode == 0 {
                    OutputMode::Polled
                } else {
                    OutputMode::Continuous
                };
            }
        }
        if let Some(baud) = update.baud {
            if check(&mut failed, "baud", baud, 0, MAX_BAUD_CODE.into()) {
                self.baud = baud as u8;
            }
        }
        if let Some(units) = update.units {
            if check(&mut failed, "units", units, 0, 1) {
                self.units = if units == 0 {
                    VisibilityUnit::Meters
                } else {
                    VisibilityUnit::Feet
                };
            }
        }
        if let Some(averaging) = update.averaging {
            if averaging == 1 || averaging == 10 {
                self.averaging = averaging as u8;
            } else {
                failed.get_or_insert(ProtocolError::InvalidParameter(format!(
                    "averaging must be 1 or 10, got {averaging}"
                )));
            }
        }
        if let Some(crc_check) = update.crc_check {
            if check(&mut failed, "crc", crc_check, 0, 1) {
                self.crc_check = crc_check == 1;
            }
        }
        (id, failed)
    }
}

/// Range check of one settings field. The first failure is kept.
fn check(
    failed: &mut Option<ProtocolError>,
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> bool {
    let ok = (min..=max).contains(&value);
    if !ok {
        failed.get_or_insert(ProtocolError::out_of_range(
            field,
            value as f64,
            min as f64,
            max as f64,
        ));
    }
    ok
}

/// The latest observation from the measurement feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Visibility in m, one sample per feed line.
    pub visibility: VecDeque<f64>,
    /// Present weather code, WMO table 4680.
    pub weather_code: Option<u8>,
    /// METAR present weather group, e.g., `-RA`.
    pub metar: Option<String>,
    /// Air temperature in °C.
    pub temperature: Option<f64>,
    /// Precipitation intensity in mm/h.
    pub intensity: Option<f64>,
    /// Accumulated precipitation in mm.
    pub amount: Option<f64>,
    /// Background luminance in cd/m².
    pub luminance: Option<f64>,
    /// Window contamination in %.
    pub contamination: Option<f64>,
}

/// One present-weather sensor.
#[derive(Debug, Clone)]
pub struct PresentWeather {
    address: u8,
    pub(crate) committed_id: u8,
    pub(crate) committed: Settings,
    pub(crate) active: Settings,
    pub(crate) message_mask: u32,
    pub(crate) pin: i64,
    pub(crate) zero: f64,
    pub(crate) span: f64,
    schedule: OutputSchedule,
    observation: Observation,
}

impl PresentWeather {
    /// Create a new sensor with its factory settings: polled, 60 s interval, standard message,
    /// meters, 1 min averaging, CRC checking enabled.
    pub fn new(id: u8) -> Self {
        let settings = Settings::default();
        let mut sensor = PresentWeather {
            address: id,
            committed_id: id,
            committed: settings,
            active: settings,
            message_mask: 0b1111,
            pin: DEFAULT_PIN,
            zero: 0.0,
            span: 1.0,
            schedule: OutputSchedule::default(),
            observation: Observation::default(),
        };
        sensor.sync_schedule();
        sensor
    }

    /// The active settings.
    pub fn settings(&self) -> &Settings {
        &self.active
    }

    /// The committed settings, restored by `RESET`.
    pub fn committed(&self) -> &Settings {
        &self.committed
    }

    /// The custom message mask.
    pub fn message_mask(&self) -> u32 {
        self.message_mask
    }

    /// Window contamination zero offset in %.
    pub fn zero(&self) -> f64 {
        self.zero
    }

    /// Visibility span factor.
    pub fn span(&self) -> f64 {
        self.span
    }

    /// The latest observation.
    pub fn observation(&self) -> &Observation {
        &self.observation
    }

    /// Bring the output schedule in line with the active settings.
    pub(crate) fn sync_schedule(&mut self) {
        self.schedule
            .set_interval(Duration::from_secs(self.active.interval.into()));
        self.schedule.set_mode(self.active.mode);
    }

    /// Averaged and calibrated visibility in the selected unit.
    pub fn visibility(&self) -> Option<f64> {
        let window = usize::from(self.active.averaging).min(self.observation.visibility.len());
        if window == 0 {
            return None;
        }
        let meters = self.observation.visibility.iter().rev().take(window).sum::<f64>()
            / window as f64
            * self.span;
        Some(match self.active.units {
            VisibilityUnit::Meters => meters,
            VisibilityUnit::Feet => Length::from_meters(meters).as_feet(),
        })
    }

    /// Window contamination with the zero offset applied.
    pub fn contamination(&self) -> Option<f64> {
        self.observation
            .contamination
            .map(|c| (c + self.zero).clamp(0.0, 100.0))
    }
}

impl Device for PresentWeather {
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
        let observation = &mut self.observation;
        if let Some(visibility) = message.number("VIS") {
            // enough for a 10 min average at one sample per minute
            if observation.visibility.len() == 10 {
                observation.visibility.pop_front();
            }
            observation.visibility.push_back(visibility);
        }
        if let Some(code) = message.number("WX") {
            observation.weather_code = Some(code.clamp(0.0, 99.0) as u8);
        }
        if let Some(metar) = message.text("METAR") {
            observation.metar = Some(metar.to_string());
        }
        for (name, slot) in [
            ("T", &mut observation.temperature),
            ("PR", &mut observation.intensity),
            ("PA", &mut observation.amount),
            ("LUM", &mut observation.luminance),
            ("WIN", &mut observation.contamination),
        ] {
            if let Some(value) = message.number(name) {
                *slot = Some(value);
            }
        }
    }
}
