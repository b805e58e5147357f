//! The byte-level contract between the emulator and the line it is attached to.
//!
//! The emulator reads from and writes to the transport from two threads at the same time, so all
//! methods take `&self`. Implementations serialize concurrent writers themselves.

use std::{
    io::{ErrorKind, Read, Write},
    sync::Mutex,
};

use crate::EmulatorError;

/// A serial line as seen by the emulator.
pub trait SerialTransport: Send + Sync {
    /// Read one byte.
    ///
    /// Blocks for at most a short, transport-specific timeout and returns `Ok(None)` if no byte
    /// arrived in the meantime, so that the caller can check for shutdown.
    fn read_byte(&self) -> Result<Option<u8>, EmulatorError>;

    /// Write all bytes and flush. Concurrent writes do not interleave.
    fn write(&self, data: &[u8]) -> Result<(), EmulatorError>;
}

/// A transport that can be built from any pair of [`std::io::Read`] and [`std::io::Write`]
/// halves, e.g., a [`std::net::TcpStream`] and its clone.
///
/// Reading must time out on the reader side, otherwise the emulator cannot shut down while the
/// line is quiet.
///
/// # Example
///
/// ```no_run
/// use std::{net::TcpStream, time::Duration};
///
/// use wxemu::StreamTransport;
///
/// let stream = TcpStream::connect("192.168.10.1:4001").unwrap();
/// stream.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
/// let transport = StreamTransport::new(stream.try_clone().unwrap(), stream);
/// ```
#[derive(Debug)]
pub struct StreamTransport<R: Read + Send, W: Write + Send> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl<R: Read + Send, W: Write + Send> StreamTransport<R, W> {
    /// Create a new transport from a reader and a writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl<R: Read + Send, W: Write + Send> SerialTransport for StreamTransport<R, W> {
    fn read_byte(&self) -> Result<Option<u8>, EmulatorError> {
        let mut reader = self.reader.lock().expect("Mutex should not be poisoned");
        read_one(&mut *reader)
    }

    fn write(&self, data: &[u8]) -> Result<(), EmulatorError> {
        let mut writer = self.writer.lock().expect("Mutex should not be poisoned");
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }
}

/// Read a single byte, mapping timeouts to `None` and end of stream to
/// [`EmulatorError::TransportClosed`].
pub(crate) fn read_one<R: Read + ?Sized>(reader: &mut R) -> Result<Option<u8>, EmulatorError> {
    let mut single_buf = [0u8];
    match reader.read(&mut single_buf) {
        Ok(0) => Err(EmulatorError::TransportClosed),
        Ok(_) => Ok(Some(single_buf[0])),
        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
        Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e.into()),
    }
}
