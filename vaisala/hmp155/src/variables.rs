//! Output variables of the HMP155 and the humidity quantities derived from RH and T.
//!
//! Dew point, frost point, absolute humidity, and mixing ratio are calculated from the fed
//! humidity and temperature each time a message is formatted, using the Magnus formula for the
//! saturation vapour pressure.

use chrono::NaiveDateTime;
use wxemu::{FormatVariable, Value, units::TemperatureUnit};

use crate::device::UnitSystem;

/// Pressure in hPa used for the mixing ratio if the feed does not provide one.
pub const STANDARD_PRESSURE: f64 = 1013.25;

/// Magnus coefficients over water, `a` and `b` in °C.
const MAGNUS_WATER: (f64, f64) = (17.62, 243.12);
/// Magnus coefficients over ice.
const MAGNUS_ICE: (f64, f64) = (22.46, 272.62);
/// Saturation vapour pressure at 0 °C in hPa.
const E0: f64 = 6.112;

const GRAINS_PER_CUBIC_FOOT: f64 = 0.437;
const GRAINS_PER_POUND: f64 = 7.0;

/// Saturation vapour pressure over water in hPa at `celsius`.
pub fn saturation_pressure(celsius: f64) -> f64 {
    let (a, b) = MAGNUS_WATER;
    E0 * (a * celsius / (b + celsius)).exp()
}

/// Invert the Magnus formula: the temperature at which `vapour_pressure` saturates.
fn magnus_inverse(vapour_pressure: f64, (a, b): (f64, f64)) -> f64 {
    let gamma = (vapour_pressure / E0).ln();
    b * gamma / (a - gamma)
}

/// Snapshot of one probe for the output format.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Relative humidity in %.
    pub humidity: Option<f64>,
    /// Temperature in °C.
    pub temperature: Option<f64>,
    /// Temperature of the additional probe in °C.
    pub additional_temperature: Option<f64>,
    /// Ambient pressure in hPa.
    pub pressure: f64,
    /// Unit system of the output.
    pub units: UnitSystem,
    /// Bus address.
    pub address: u8,
    /// Serial number.
    pub serial: String,
    /// Time of the message.
    pub timestamp: NaiveDateTime,
}

impl Reading {
    /// Water vapour pressure in hPa.
    pub fn vapour_pressure(&self) -> Option<f64> {
        let rh = self.humidity.filter(|rh| *rh > 0.0)?;
        Some(rh / 100.0 * saturation_pressure(self.temperature?))
    }

    /// Dew point in °C.
    pub fn dew_point(&self) -> Option<f64> {
        Some(magnus_inverse(self.vapour_pressure()?, MAGNUS_WATER))
    }

    /// Dew point in °C, or the frost point if the dew point is below freezing.
    pub fn dew_or_frost_point(&self) -> Option<f64> {
        let dew_point = self.dew_point()?;
        if dew_point < 0.0 {
            Some(magnus_inverse(self.vapour_pressure()?, MAGNUS_ICE))
        } else {
            Some(dew_point)
        }
    }

    /// Absolute humidity in g/m³.
    pub fn absolute_humidity(&self) -> Option<f64> {
        Some(216.7 * self.vapour_pressure()? / (273.15 + self.temperature?))
    }

    /// Mixing ratio in g/kg.
    pub fn mixing_ratio(&self) -> Option<f64> {
        let e = self.vapour_pressure()?;
        (e < self.pressure).then(|| 621.98 * e / (self.pressure - e))
    }

    fn temperature_unit(&self) -> TemperatureUnit {
        match self.units {
            UnitSystem::Metric => TemperatureUnit::Celsius,
            UnitSystem::NonMetric => TemperatureUnit::Fahrenheit,
        }
    }

    fn temperature_value(&self, celsius: Option<f64>) -> Value {
        celsius.map_or(Value::Missing, |t| {
            Value::Number(self.temperature_unit().from_celsius(t))
        })
    }
}

/// Variables of the HMP155 output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmpVariable {
    /// Relative humidity
    Rh,
    /// Temperature
    T,
    /// Dew point
    Td,
    /// Dew point or frost point
    Tdf,
    /// Absolute humidity
    A,
    /// Mixing ratio
    X,
    /// Additional temperature probe
    Ta,
    /// Error flag
    Err,
    /// Bus address
    Addr,
    /// Serial number
    Sn,
    /// Date
    Date,
    /// Time
    Time,
}

const TABLE: [(&str, HmpVariable); 12] = [
    ("RH", HmpVariable::Rh),
    ("T", HmpVariable::T),
    ("TD", HmpVariable::Td),
    ("TDF", HmpVariable::Tdf),
    ("A", HmpVariable::A),
    ("X", HmpVariable::X),
    ("TA", HmpVariable::Ta),
    ("ERR", HmpVariable::Err),
    ("ADDR", HmpVariable::Addr),
    ("SN", HmpVariable::Sn),
    ("DATE", HmpVariable::Date),
    ("TIME", HmpVariable::Time),
];

impl FormatVariable for HmpVariable {
    type Snapshot = Reading;

    fn table() -> &'static [(&'static str, Self)] {
        &TABLE
    }

    fn value(&self, reading: &Reading) -> Value {
        let number = |value: Option<f64>| value.map_or(Value::Missing, Value::Number);
        let metric = reading.units == UnitSystem::Metric;
        match self {
            HmpVariable::Rh => number(reading.humidity),
            HmpVariable::T => reading.temperature_value(reading.temperature),
            HmpVariable::Td => reading.temperature_value(reading.dew_point()),
            HmpVariable::Tdf => reading.temperature_value(reading.dew_or_frost_point()),
            HmpVariable::Ta => reading.temperature_value(reading.additional_temperature),
            HmpVariable::A if metric => number(reading.absolute_humidity()),
            HmpVariable::A => number(reading.absolute_humidity().map(|a| a * GRAINS_PER_CUBIC_FOOT)),
            HmpVariable::X if metric => number(reading.mixing_ratio()),
            HmpVariable::X => number(reading.mixing_ratio().map(|x| x * GRAINS_PER_POUND)),
            HmpVariable::Err => {
                let ok = reading.humidity.is_some() && reading.temperature.is_some();
                Value::Integer(if ok { 0 } else { 1 })
            }
            HmpVariable::Addr => Value::Integer(reading.address.into()),
            HmpVariable::Sn => Value::Text(reading.serial.clone()),
            HmpVariable::Date => Value::Text(reading.timestamp.format("%Y-%m-%d").to_string()),
            HmpVariable::Time => Value::Text(reading.timestamp.format("%H:%M:%S").to_string()),
        }
    }

    fn unit(&self, reading: &Reading) -> Option<String> {
        let metric = reading.units == UnitSystem::Metric;
        let unit = match self {
            HmpVariable::Rh => "%RH",
            HmpVariable::T | HmpVariable::Td | HmpVariable::Tdf | HmpVariable::Ta => {
                reading.temperature_unit().label()
            }
            HmpVariable::A if metric => "g/m3",
            HmpVariable::A => "gr/ft3",
            HmpVariable::X if metric => "g/kg",
            HmpVariable::X => "gr/lb",
            _ => return None,
        };
        Some(unit.to_string())
    }

    fn fallback_unit(_: &Reading) -> String {
        "%RH".to_string()
    }
}
