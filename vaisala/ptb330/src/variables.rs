//! The variables of the PTB330 output format.
//!
//! | Variable            | Value                                                     |
//! |---------------------|-----------------------------------------------------------|
//! | `P`                 | Pressure, mean of all modules                             |
//! | `P1`, `P2`, `P3`    | Pressure of one module                                    |
//! | `DP12`, `DP13`, `DP23` | Difference between two modules                         |
//! | `HCP`               | Height corrected pressure, see `HHCP`                     |
//! | `QFE`               | Pressure at the QFE reference level, see `HQFE`           |
//! | `QNH`               | Pressure reduced to sea level, see `HQNH`                 |
//! | `TP1`, `TP2`, `TP3` | Temperature of one module                                 |
//! | `P3H`               | Pressure tendency over 3 h                                |
//! | `A3H`               | WMO characteristic of the pressure tendency, 0 to 8       |
//! | `PSTAB`             | `OK` if the modules agree within the `PSTAB` limit        |
//! | `ERR`               | 0 if a pressure is available, 1 otherwise                 |
//! | `ADDR`, `SN`        | Address and serial number                                 |
//! | `DATE`, `TIME`      | Date and time of the message                              |
//!
//! Derived values are calculated when the format is evaluated.

use chrono::NaiveDateTime;
use wxemu::{
    FormatVariable, Value,
    units::{PressureUnit, TemperatureUnit, altitude_corrected},
};

use crate::device::MODULES;

/// Everything the output format can show.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Averaged pressure of each module in hPa.
    pub modules: [Option<f64>; MODULES],
    /// Temperature of each module in °C.
    pub temperatures: [Option<f64>; MODULES],
    /// Pressure tendency over 3 h in hPa.
    pub tendency: Option<f64>,
    /// WMO pressure characteristic.
    pub tendency_code: Option<u8>,
    /// Unit of the pressure variables.
    pub pressure_unit: PressureUnit,
    /// Unit of the temperature variables.
    pub temperature_unit: TemperatureUnit,
    /// Height for `HCP` in m.
    pub hcp_height: f64,
    /// Height for `QFE` in m.
    pub qfe_height: f64,
    /// Station height for `QNH` in m.
    pub qnh_height: f64,
    /// Largest difference between modules that still counts as stable, in hPa.
    pub stability_limit: f64,
    /// Bus address.
    pub address: u8,
    /// Serial number.
    pub serial: String,
    /// Time of the message.
    pub timestamp: NaiveDateTime,
}

impl Reading {
    /// Mean pressure of all modules that deliver a value, in hPa.
    pub fn pressure(&self) -> Option<f64> {
        let values: Vec<f64> = self.modules.iter().flatten().copied().collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    fn delta(&self, a: usize, b: usize) -> Option<f64> {
        Some(self.modules[a]? - self.modules[b]?)
    }

    /// True if all pairs of modules agree within the stability limit.
    pub fn is_stable(&self) -> bool {
        [(0, 1), (0, 2), (1, 2)]
            .into_iter()
            .filter_map(|(a, b)| self.delta(a, b))
            .all(|delta| delta.abs() <= self.stability_limit)
    }
}

/// Variables of the PTB330 output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtbVariable {
    /// Mean pressure
    P,
    /// Pressure of one module, 0-based.
    Module(usize),
    /// Difference between two modules, 0-based.
    Delta(usize, usize),
    /// Height corrected pressure
    Hcp,
    /// QFE pressure
    Qfe,
    /// QNH pressure
    Qnh,
    /// Temperature of one module, 0-based.
    Temperature(usize),
    /// 3 h pressure tendency
    P3h,
    /// 3 h pressure characteristic
    A3h,
    /// Pressure stability indicator
    Pstab,
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

const TABLE: [(&str, PtbVariable); 21] = [
    ("P", PtbVariable::P),
    ("P1", PtbVariable::Module(0)),
    ("P2", PtbVariable::Module(1)),
    ("P3", PtbVariable::Module(2)),
    ("DP12", PtbVariable::Delta(0, 1)),
    ("DP13", PtbVariable::Delta(0, 2)),
    ("DP23", PtbVariable::Delta(1, 2)),
    ("HCP", PtbVariable::Hcp),
    ("QFE", PtbVariable::Qfe),
    ("QNH", PtbVariable::Qnh),
    ("TP1", PtbVariable::Temperature(0)),
    ("TP2", PtbVariable::Temperature(1)),
    ("TP3", PtbVariable::Temperature(2)),
    ("P3H", PtbVariable::P3h),
    ("A3H", PtbVariable::A3h),
    ("PSTAB", PtbVariable::Pstab),
    ("ERR", PtbVariable::Err),
    ("ADDR", PtbVariable::Addr),
    ("SN", PtbVariable::Sn),
    ("DATE", PtbVariable::Date),
    ("TIME", PtbVariable::Time),
];

impl FormatVariable for PtbVariable {
    type Snapshot = Reading;

    fn table() -> &'static [(&'static str, Self)] {
        &TABLE
    }

    fn value(&self, reading: &Reading) -> Value {
        let pressure = |hpa: Option<f64>| {
            hpa.map_or(Value::Missing, |hpa| {
                Value::Number(reading.pressure_unit.from_hpa(hpa))
            })
        };
        match *self {
            PtbVariable::P => pressure(reading.pressure()),
            PtbVariable::Module(module) => pressure(reading.modules[module]),
            PtbVariable::Delta(a, b) => pressure(reading.delta(a, b)),
            PtbVariable::Hcp => pressure(
                reading
                    .pressure()
                    .map(|p| altitude_corrected(p, reading.hcp_height)),
            ),
            PtbVariable::Qfe => pressure(
                reading
                    .pressure()
                    .map(|p| altitude_corrected(p, reading.qfe_height)),
            ),
            PtbVariable::Qnh => pressure(
                reading
                    .pressure()
                    .map(|p| altitude_corrected(p, reading.qnh_height)),
            ),
            PtbVariable::Temperature(module) => reading.temperatures[module]
                .map_or(Value::Missing, |t| {
                    Value::Number(reading.temperature_unit.from_celsius(t))
                }),
            PtbVariable::P3h => pressure(reading.tendency),
            PtbVariable::A3h => reading
                .tendency_code
                .map_or(Value::Missing, |code| Value::Integer(code.into())),
            PtbVariable::Pstab => Value::Text(
                if reading.is_stable() { "OK" } else { "UNSTABLE" }.to_string(),
            ),
            PtbVariable::Err => Value::Integer(if reading.pressure().is_some() { 0 } else { 1 }),
            PtbVariable::Addr => Value::Integer(reading.address.into()),
            PtbVariable::Sn => Value::Text(reading.serial.clone()),
            PtbVariable::Date => Value::Text(reading.timestamp.format("%Y-%m-%d").to_string()),
            PtbVariable::Time => Value::Text(reading.timestamp.format("%H:%M:%S").to_string()),
        }
    }

    fn unit(&self, reading: &Reading) -> Option<String> {
        match self {
            PtbVariable::P
            | PtbVariable::Module(_)
            | PtbVariable::Delta(..)
            | PtbVariable::Hcp
            | PtbVariable::Qfe
            | PtbVariable::Qnh
            | PtbVariable::P3h => Some(reading.pressure_unit.label().to_string()),
            PtbVariable::Temperature(_) => Some(reading.temperature_unit.label().to_string()),
            _ => None,
        }
    }

    fn fallback_unit(reading: &Reading) -> String {
        reading.pressure_unit.label().to_string()
    }
}
