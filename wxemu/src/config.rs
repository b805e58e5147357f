//! Configuration of an emulator, as handed over by the launcher.

use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use crate::{EmulatorError, SchedulerOptions};

/// Baud rates the emulated instruments support.
pub const BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// The largest number of devices on one multi-drop bus.
pub const MAX_DEVICES: u8 = 99;

/// The electrical interface of the emulated instrument.
///
/// Only the line settings depend on it, the protocol is the same for all modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ElectricalMode {
    /// RS-232, point to point.
    #[default]
    Rs232,
    /// RS-422, full duplex.
    Rs422,
    /// RS-485, half duplex multi-drop bus.
    Rs485,
    /// SDI-12 (1200 baud, 7E1).
    Sdi12,
}

impl Display for ElectricalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ElectricalMode::Rs232 => "RS-232",
            ElectricalMode::Rs422 => "RS-422",
            ElectricalMode::Rs485 => "RS-485",
            ElectricalMode::Sdi12 => "SDI-12",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ElectricalMode {
    type Err = EmulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "rs232" => Ok(ElectricalMode::Rs232),
            "rs422" => Ok(ElectricalMode::Rs422),
            "rs485" => Ok(ElectricalMode::Rs485),
            "sdi12" => Ok(ElectricalMode::Sdi12),
            _ => Err(EmulatorError::InvalidConfig(format!(
                "unknown electrical mode: {s}"
            ))),
        }
    }
}

/// Validated configuration of one emulator.
#[derive(Debug, Clone, PartialEq)]
pub struct EmulatorConfig {
    /// Path of the serial device.
    pub port: String,
    /// Baud rate, one of [`BAUD_RATES`].
    pub baud_rate: u32,
    /// Electrical interface.
    pub electrical: ElectricalMode,
    /// Path of the measurement feed.
    pub feed_path: PathBuf,
    /// Number of devices on the bus.
    pub devices: u8,
    /// Read timeout of the transport.
    pub read_timeout: Duration,
}

impl EmulatorConfig {
    /// Validate and create a new configuration.
    ///
    /// # Arguments
    /// * `port`: Path of the serial device, must not be empty.
    /// * `baud_rate`: One of [`BAUD_RATES`]. SDI-12 lines only run at 1200 baud.
    /// * `electrical`: The electrical interface.
    /// * `feed_path`: Path of the measurement feed.
    /// * `devices`: Number of devices, 1 to [`MAX_DEVICES`]. More than one device needs a
    ///   multi-drop interface (RS-485 or SDI-12).
    pub fn try_new(
        port: impl Into<String>,
        baud_rate: u32,
        electrical: ElectricalMode,
        feed_path: impl Into<PathBuf>,
        devices: u8,
    ) -> Result<Self, EmulatorError> {
        let port = port.into();
        if port.trim().is_empty() {
            return Err(EmulatorError::InvalidConfig("serial port is empty".into()));
        }
        if !BAUD_RATES.contains(&baud_rate) {
            return Err(EmulatorError::InvalidConfig(format!(
                "unsupported baud rate {baud_rate}, use one of {BAUD_RATES:?}"
            )));
        }
        if electrical == ElectricalMode::Sdi12 && baud_rate != 1200 {
            return Err(EmulatorError::InvalidConfig(
                "SDI-12 runs at 1200 baud".into(),
            ));
        }
        if devices == 0 || devices > MAX_DEVICES {
            return Err(EmulatorError::InvalidConfig(format!(
                "number of devices must be between 1 and {MAX_DEVICES}"
            )));
        }
        if devices > 1 && !matches!(electrical, ElectricalMode::Rs485 | ElectricalMode::Sdi12) {
            return Err(EmulatorError::InvalidConfig(format!(
                "{electrical} is point to point, multiple devices need RS-485 or SDI-12"
            )));
        }
        Ok(EmulatorConfig {
            port,
            baud_rate,
            electrical,
            feed_path: feed_path.into(),
            devices,
            read_timeout: Duration::from_millis(50),
        })
    }

    /// Set the read timeout of the transport.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Scheduler options matching this configuration.
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions::default()
    }
}
