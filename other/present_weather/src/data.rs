//! The data message.

use crate::device::{MessageFormat, PresentWeather};

const MISSING: &str = "//";

/// Window contamination in % from which the status reports a warning.
pub const CONTAMINATION_WARNING: f64 = 50.0;

fn fixed(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("{v:.precision$}"))
}

/// Text from the feed with the field separator and control characters replaced by `_`.
fn text(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == ':' || c.is_ascii_control() { '_' } else { c })
        .collect()
}

/// Status of the sensor: 0 ok, 1 window contaminated, 2 no visibility data.
pub fn status(sensor: &PresentWeather) -> u8 {
    if sensor.visibility().is_none() {
        2
    } else if sensor
        .contamination()
        .is_some_and(|c| c >= CONTAMINATION_WARNING)
    {
        1
    } else {
        0
    }
}

/// Render one field of the custom message by its bit number.
fn render_field(sensor: &PresentWeather, bit: usize) -> String {
    let observation = sensor.observation();
    match bit {
        0 => fixed(sensor.visibility(), 0),
        1 => observation
            .weather_code
            .map_or_else(|| MISSING.to_string(), |code| format!("{code:02}")),
        2 => observation
            .metar
            .as_deref()
            .map_or_else(|| MISSING.to_string(), text),
        3 => fixed(observation.temperature, 1),
        4 => fixed(observation.intensity, 2),
        5 => fixed(observation.amount, 2),
        6 => fixed(observation.luminance, 0),
        7 => fixed(sensor.contamination(), 0),
        _ => status(sensor).to_string(),
    }
}

/// The payload of the data message, `DATA:id:fields`.
pub fn render(sensor: &PresentWeather, id: u8) -> String {
    let mask = match sensor.settings().format {
        MessageFormat::Standard => 0b1111,
        MessageFormat::Custom => sensor.message_mask(),
    };
    let mut payload = format!("DATA:{id}");
    for bit in (0..u32::BITS as usize).filter(|bit| mask & (1 << bit) != 0) {
        payload.push(':');
        payload.push_str(&render_field(sensor, bit));
    }
    payload
}
