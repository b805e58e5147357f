//! The preset output formats of the line barometer.
//!
//! The barometer does not accept free format strings. Instead, `A,<fmt>,<interval>` selects one of
//! 13 presets. They are written in the format language of [`wxemu::format`] and evaluated against a
//! [`Reading`]:
//!
//! | Format | Format string                 | Example                          |
//! |--------|-------------------------------|----------------------------------|
//! | 0      | `P`                           | `1013.25`                        |
//! | 1      | `P " " U`                     | `1013.25 hPa`                    |
//! | 2      | `P "," T`                     | `1013.25,  21.50`                |
//! | 3      | `P " " U "," T " " U`         | `1013.25 hPa,  21.50 'C`         |
//! | 4      | `P "," STAT`                  | `1013.25,0`                      |
//! | 5      | `P " " U "," STAT`            | `1013.25 hPa,0`                  |
//! | 6      | `8.3 P`                       | `1013.250`                       |
//! | 7      | `8.3 P " " U`                 | `1013.250 hPa`                   |
//! | 8      | `DATE " " TIME "," P`         | `2024-05-01 12:00:00,1013.25`    |
//! | 9      | `DATE " " TIME "," P " " U`   | `2024-05-01 12:00:00,1013.25 hPa`|
//! | 10     | `SN "," P`                    | `B0004211,1013.25`               |
//! | 11     | `SN "," P "," T`              | `B0004211,1013.25,  21.50`       |
//! | 12     | `SN "," DATE " " TIME "," P " " U "," T " " U` | all of the above |

use chrono::NaiveDateTime;
use wxemu::{
    CompiledFormat, FormatVariable, ProtocolError, Value, format::compile, units::PressureUnit,
};

/// Format strings of the presets, indexed by format number.
pub const PRESETS: [&str; 13] = [
    r#"P"#,
    r#"P " " U"#,
    r#"P "," T"#,
    r#"P " " U "," T " " U"#,
    r#"P "," STAT"#,
    r#"P " " U "," STAT"#,
    r#"8.3 P"#,
    r#"8.3 P " " U"#,
    r#"DATE " " TIME "," P"#,
    r#"DATE " " TIME "," P " " U"#,
    r#"SN "," P"#,
    r#"SN "," P "," T"#,
    r#"SN "," DATE " " TIME "," P " " U "," T " " U"#,
];

/// Highest format number.
pub const MAX_FORMAT: u8 = (PRESETS.len() - 1) as u8;

/// Everything a preset can show.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Calibrated and filtered pressure in hPa, if a sample is available.
    pub pressure: Option<f64>,
    /// Temperature in °C.
    pub temperature: Option<f64>,
    /// Unit to report the pressure in.
    pub unit: PressureUnit,
    /// Serial number.
    pub serial: String,
    /// Time of the reading.
    pub timestamp: NaiveDateTime,
}

/// Variables of the preset formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaroVariable {
    /// Pressure in the selected unit.
    P,
    /// Temperature in °C.
    T,
    /// Status, 0 if a valid pressure is available, 1 otherwise.
    Stat,
    /// Serial number.
    Sn,
    /// Date as `YYYY-MM-DD`.
    Date,
    /// Time as `hh:mm:ss`.
    Time,
}

impl FormatVariable for BaroVariable {
    type Snapshot = Reading;

    fn table() -> &'static [(&'static str, Self)] {
        &[
            ("P", BaroVariable::P),
            ("T", BaroVariable::T),
            ("STAT", BaroVariable::Stat),
            ("SN", BaroVariable::Sn),
            ("DATE", BaroVariable::Date),
            ("TIME", BaroVariable::Time),
        ]
    }

    fn value(&self, reading: &Reading) -> Value {
        match self {
            BaroVariable::P => reading
                .pressure
                .map_or(Value::Missing, |p| Value::Number(reading.unit.from_hpa(p))),
            BaroVariable::T => reading.temperature.map_or(Value::Missing, Value::Number),
            BaroVariable::Stat => Value::Integer(if reading.pressure.is_some() { 0 } else { 1 }),
            BaroVariable::Sn => Value::Text(reading.serial.clone()),
            BaroVariable::Date => Value::Text(reading.timestamp.format("%Y-%m-%d").to_string()),
            BaroVariable::Time => Value::Text(reading.timestamp.format("%H:%M:%S").to_string()),
        }
    }

    fn unit(&self, reading: &Reading) -> Option<String> {
        match self {
            BaroVariable::P => Some(reading.unit.label().to_string()),
            BaroVariable::T => Some("'C".to_string()),
            _ => None,
        }
    }

    fn fallback_unit(reading: &Reading) -> String {
        reading.unit.label().to_string()
    }
}

/// Compile the preset with the given number.
pub fn preset(format: u8) -> Result<CompiledFormat<BaroVariable>, ProtocolError> {
    let source = PRESETS
        .get(usize::from(format))
        .ok_or_else(|| ProtocolError::out_of_range("format", format, 0, MAX_FORMAT))?;
    compile(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::*;

    #[fixture]
    fn reading() -> Reading {
        Reading {
            pressure: Some(1013.25),
            temperature: Some(21.5),
            unit: PressureUnit::Hpa,
            serial: "B0004211".into(),
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .unwrap(),
        }
    }

    #[rstest]
    fn test_all_presets_compile() {
        for format in 0..=MAX_FORMAT {
            assert!(preset(format).is_ok(), "preset {format}");
        }
        assert!(preset(MAX_FORMAT + 1).is_err());
    }

    #[rstest]
    #[case(0, "1013.25")]
    #[case(1, "1013.25 hPa")]
    #[case(2, "1013.25,  21.50")]
    #[case(3, "1013.25 hPa,  21.50 'C")]
    #[case(4, "1013.25,0")]
    #[case(7, "1013.250 hPa")]
    #[case(9, "2024-05-01 12:00:00,1013.25 hPa")]
    #[case(11, "B0004211,1013.25,  21.50")]
    fn test_preset_output(reading: Reading, #[case] format: u8, #[case] exp: &str) {
        assert_eq!(preset(format).unwrap().evaluate(&reading), exp);
    }

    #[rstest]
    fn test_unit_conversion(mut reading: Reading) {
        reading.pressure = Some(1000.0);
        reading.unit = PressureUnit::Kpa;
        assert_eq!(preset(1).unwrap().evaluate(&reading), " 100.00 kPa");
    }

    #[rstest]
    fn test_missing_pressure(mut reading: Reading) {
        reading.pressure = None;
        assert_eq!(preset(4).unwrap().evaluate(&reading), "*******,1");
    }
}
