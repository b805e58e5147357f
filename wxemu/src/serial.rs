//! This module provides the transport for an emulator attached to a physical serial port.
//!
//! It uses the blocking implementation of the `serialport` crate.

use std::{io::Write, sync::Mutex, time::Duration};

use serialport::{DataBits, Parity, SerialPort, SerialPortBuilder, StopBits};
use tracing::info;

use crate::{ElectricalMode, EmulatorConfig, EmulatorError, SerialTransport, transport::read_one};

/// A blocking serial port transport using the `serialport` crate.
///
/// The port is cloned into a reading and a writing half, so the receive thread can wait for
/// input while the send thread writes.
#[derive(Debug)]
pub struct SerialPortTransport {
    reader: Mutex<Box<dyn SerialPort>>,
    writer: Mutex<Box<dyn SerialPort>>,
    toggle_rts: bool,
}

impl SerialPortTransport {
    /// Try to create a new instance of `SerialPortTransport`.
    ///
    /// The timeout of the builder is the read timeout of the transport. It should be short, e.g.,
    /// 50 ms, as the receive thread checks for shutdown whenever a read times out.
    ///
    /// # Arguments
    /// * `spb` - A `SerialPortBuilder` to configure the serial port. See
    ///   [`serialport::SerialPortBuilder`] and the [`serialport::new`] function for more details.
    pub fn try_new(spb: SerialPortBuilder) -> Result<Self, EmulatorError> {
        let port = spb.open()?;
        let reader = port.try_clone()?;
        Ok(SerialPortTransport {
            reader: Mutex::new(reader),
            writer: Mutex::new(port),
            toggle_rts: false,
        })
    }

    /// Open the serial port described by an emulator configuration.
    ///
    /// SDI-12 lines run with 7 data bits and even parity, all others with 8N1. On RS-485 lines,
    /// RTS is raised while sending.
    pub fn open(config: &EmulatorConfig) -> Result<Self, EmulatorError> {
        let (data_bits, parity) = match config.electrical {
            ElectricalMode::Sdi12 => (DataBits::Seven, Parity::Even),
            _ => (DataBits::Eight, Parity::None),
        };
        let spb = serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(StopBits::One)
            .timeout(config.read_timeout);
        let mut transport = SerialPortTransport::try_new(spb)?;
        transport.toggle_rts = config.electrical == ElectricalMode::Rs485;
        info!(
            port = %config.port,
            baud = config.baud_rate,
            electrical = %config.electrical,
            "serial port opened"
        );
        Ok(transport)
    }

    /// Change the read timeout.
    pub fn set_read_timeout(&self, timeout: Duration) -> Result<(), EmulatorError> {
        let mut reader = self.reader.lock().expect("Mutex should not be poisoned");
        reader.set_timeout(timeout)?;
        Ok(())
    }
}

impl SerialTransport for SerialPortTransport {
    fn read_byte(&self) -> Result<Option<u8>, EmulatorError> {
        let mut reader = self.reader.lock().expect("Mutex should not be poisoned");
        read_one(&mut *reader)
    }

    fn write(&self, data: &[u8]) -> Result<(), EmulatorError> {
        let mut writer = self.writer.lock().expect("Mutex should not be poisoned");
        if self.toggle_rts {
            writer.write_request_to_send(true)?;
        }
        writer.write_all(data)?;
        writer.flush()?;
        if self.toggle_rts {
            writer.write_request_to_send(false)?;
        }
        Ok(())
    }
}
