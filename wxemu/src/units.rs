//! Units of the emulated instruments and the barometric altitude correction.
//!
//! Conversions go through the [`measurements`] crate where it provides the unit. The units it
//! does not know are converted from pascals by hand.

use std::fmt::Display;

use measurements::{Measurement, Pressure, Temperature};

/// Standard sea level temperature in K.
pub const T0: f64 = 288.15;
/// Standard temperature lapse rate in K/m.
pub const LAPSE_RATE: f64 = 0.0065;
/// Standard gravity in m/s².
pub const GRAVITY: f64 = 9.80665;
/// Specific gas constant of dry air in J/(kg K).
pub const GAS_CONSTANT: f64 = 287.05;

/// Pressure units that the instruments can report in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PressureUnit {
    /// Hectopascal
    #[default]
    Hpa,
    /// Millibar
    Mbar,
    /// Kilopascal
    Kpa,
    /// Pascal
    Pa,
    /// Inch of mercury
    InHg,
    /// Millimeter of mercury
    MmHg,
    /// Torr
    Torr,
    /// Pound per square inch
    Psi,
    /// Millimeter of water
    MmH2O,
    /// Bar
    Bar,
}

impl PressureUnit {
    /// All units, in the order of their labels.
    pub const ALL: [PressureUnit; 10] = [
        PressureUnit::Hpa,
        PressureUnit::Mbar,
        PressureUnit::Kpa,
        PressureUnit::Pa,
        PressureUnit::InHg,
        PressureUnit::MmHg,
        PressureUnit::Torr,
        PressureUnit::Psi,
        PressureUnit::MmH2O,
        PressureUnit::Bar,
    ];

    /// The label as shown by the instrument.
    pub fn label(&self) -> &'static str {
        match self {
            PressureUnit::Hpa => "hPa",
            PressureUnit::Mbar => "mbar",
            PressureUnit::Kpa => "kPa",
            PressureUnit::Pa => "Pa",
            PressureUnit::InHg => "inHg",
            PressureUnit::MmHg => "mmHg",
            PressureUnit::Torr => "torr",
            PressureUnit::Psi => "psi",
            PressureUnit::MmH2O => "mmH2O",
            PressureUnit::Bar => "bar",
        }
    }

    /// Look up a unit by its label, case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|unit| unit.label().eq_ignore_ascii_case(label.trim()))
    }

    /// Convert a pressure into this unit.
    pub fn convert(&self, pressure: Pressure) -> f64 {
        match self {
            PressureUnit::Hpa | PressureUnit::Mbar => pressure.as_hectopascals(),
            PressureUnit::Kpa => pressure.as_hectopascals() / 10.0,
            PressureUnit::Pa => pressure.as_base_units(),
            PressureUnit::InHg => pressure.as_base_units() / 3386.389, // HACK: not in measurements
            PressureUnit::MmHg => pressure.as_base_units() / 133.322_387_415, // HACK: not in measurements
            PressureUnit::Torr => pressure.as_base_units() * 760.0 / 101_325.0, // HACK: not in measurements
            PressureUnit::Psi => pressure.as_base_units() / 6894.757, // HACK: not in measurements
            PressureUnit::MmH2O => pressure.as_base_units() / 9.806_65, // HACK: not in measurements
            PressureUnit::Bar => pressure.as_hectopascals() / 1000.0,
        }
    }

    /// Convert a pressure in hPa into this unit.
    pub fn from_hpa(&self, hpa: f64) -> f64 {
        self.convert(Pressure::from_hectopascals(hpa))
    }
}

impl Display for PressureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Temperature units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemperatureUnit {
    /// Degree Celsius
    #[default]
    Celsius,
    /// Degree Fahrenheit
    Fahrenheit,
    /// Kelvin
    Kelvin,
}

impl TemperatureUnit {
    /// The label as shown by the instrument.
    pub fn label(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "'C",
            TemperatureUnit::Fahrenheit => "'F",
            TemperatureUnit::Kelvin => "K",
        }
    }

    /// Look up a unit by label, `C`, `'C`, `F`, `'F`, or `K`, case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().trim_start_matches('\'').to_ascii_uppercase().as_str() {
            "C" => Some(TemperatureUnit::Celsius),
            "F" => Some(TemperatureUnit::Fahrenheit),
            "K" => Some(TemperatureUnit::Kelvin),
            _ => None,
        }
    }

    /// Convert a temperature in °C into this unit.
    pub fn from_celsius(&self, celsius: f64) -> f64 {
        let temperature = Temperature::from_celsius(celsius);
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => temperature.as_fahrenheit(),
            TemperatureUnit::Kelvin => temperature.as_kelvin(),
        }
    }
}

impl Display for TemperatureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Pressure reduced from station height `height` (m) to the reference level, using the
/// international standard atmosphere.
///
/// A positive height gives a higher pressure, a height of 0 returns the station pressure.
pub fn altitude_corrected(pressure: f64, height: f64) -> f64 {
    let exponent = GRAVITY / (GAS_CONSTANT * LAPSE_RATE);
    pressure / (1.0 - LAPSE_RATE * height / T0).powf(exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use measurements::test_utils::assert_almost_eq;
    use rstest::*;

    #[rstest]
    #[case(PressureUnit::Hpa, 1013.25)]
    #[case(PressureUnit::Mbar, 1013.25)]
    #[case(PressureUnit::Kpa, 101.325)]
    #[case(PressureUnit::Pa, 101_325.0)]
    #[case(PressureUnit::InHg, 29.921)]
    #[case(PressureUnit::MmHg, 760.0)]
    #[case(PressureUnit::Torr, 760.0)]
    #[case(PressureUnit::Psi, 14.696)]
    #[case(PressureUnit::Bar, 1.01325)]
    fn test_standard_atmosphere(#[case] unit: PressureUnit, #[case] exp: f64) {
        let value = unit.from_hpa(1013.25);
        assert!((value - exp).abs() / exp < 1e-3, "{unit}: {value}");
    }

    #[rstest]
    #[case("HPA", Some(PressureUnit::Hpa))]
    #[case("inhg", Some(PressureUnit::InHg))]
    #[case("mmH2O", Some(PressureUnit::MmH2O))]
    #[case("furlongs", None)]
    fn test_pressure_from_label(#[case] label: &str, #[case] exp: Option<PressureUnit>) {
        assert_eq!(PressureUnit::from_label(label), exp);
    }

    #[rstest]
    fn test_temperature() {
        assert_almost_eq(TemperatureUnit::Fahrenheit.from_celsius(100.0), 212.0);
        assert_almost_eq(TemperatureUnit::Kelvin.from_celsius(0.0), 273.15);
        assert_eq!(TemperatureUnit::from_label("'f"), Some(TemperatureUnit::Fahrenheit));
        assert_eq!(TemperatureUnit::from_label("x"), None);
    }

    #[rstest]
    fn test_altitude_corrected() {
        assert_almost_eq(altitude_corrected(1000.0, 0.0), 1000.0);
        // 100 m above sea level adds roughly 12 hPa
        let corrected = altitude_corrected(1000.0, 100.0);
        assert!(corrected > 1011.0 && corrected < 1013.0, "{corrected}");
    }
}
