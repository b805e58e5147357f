//! The loopback module provides an in-memory serial line for testing purposes.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

use crate::{EmulatorError, SerialTransport};

/// An in-memory serial line that allows you to simply write tests for your emulator.
///
/// The test plays the host: it pushes bytes towards the emulator with
/// [`LoopbackTransport::send_from_host`] and inspects what the emulator wrote with
/// [`LoopbackTransport::wait_for_output`] or [`LoopbackTransport::take_output`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use wxemu::{LoopbackTransport, SerialTransport};
///
/// let line = LoopbackTransport::new();
/// line.send_from_host("A,?\r\n");
/// assert_eq!(line.read_byte().unwrap(), Some(b'A'));
///
/// line.write(b"1,2\r\n").unwrap();
/// let out = line.wait_for_output(Duration::from_millis(10), |out| out.ends_with(b"\r\n"));
/// assert_eq!(out, b"1,2\r\n");
/// ```
#[derive(Debug)]
pub struct LoopbackTransport {
    from_host: Mutex<VecDeque<u8>>,
    host_sent: Condvar,
    from_inst: Mutex<Vec<u8>>,
    inst_sent: Condvar,
    read_timeout: Duration,
    closed: Mutex<bool>,
}

impl LoopbackTransport {
    /// Create a new loopback line with a read timeout of 10 ms.
    pub fn new() -> Self {
        LoopbackTransport::with_read_timeout(Duration::from_millis(10))
    }

    /// Create a new loopback line with the given read timeout.
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        LoopbackTransport {
            from_host: Mutex::new(VecDeque::new()),
            host_sent: Condvar::new(),
            from_inst: Mutex::new(Vec::new()),
            inst_sent: Condvar::new(),
            read_timeout,
            closed: Mutex::new(false),
        }
    }

    /// Send bytes from the host towards the instrument.
    pub fn send_from_host(&self, data: impl AsRef<[u8]>) {
        let mut from_host = self.from_host.lock().expect("Mutex should not be poisoned");
        from_host.extend(data.as_ref());
        self.host_sent.notify_all();
    }

    /// Close the line. Once all pending bytes are read, the instrument side sees
    /// [`EmulatorError::TransportClosed`].
    pub fn close(&self) {
        *self.closed.lock().expect("Mutex should not be poisoned") = true;
        let _from_host = self.from_host.lock().expect("Mutex should not be poisoned");
        self.host_sent.notify_all();
    }

    /// Take everything the instrument wrote so far.
    pub fn take_output(&self) -> Vec<u8> {
        let mut from_inst = self.from_inst.lock().expect("Mutex should not be poisoned");
        std::mem::take(&mut *from_inst)
    }

    /// Wait until the output of the instrument fulfills `done`, or the timeout expired.
    ///
    /// The output is taken in both cases, so the next call only sees new output.
    pub fn wait_for_output<F>(&self, timeout: Duration, done: F) -> Vec<u8>
    where
        F: Fn(&[u8]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut from_inst = self.from_inst.lock().expect("Mutex should not be poisoned");
        loop {
            let now = Instant::now();
            if done(&from_inst) || now >= deadline {
                return std::mem::take(&mut *from_inst);
            }
            from_inst = self
                .inst_sent
                .wait_timeout(from_inst, deadline - now)
                .expect("Mutex should not be poisoned")
                .0;
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        LoopbackTransport::new()
    }
}

impl SerialTransport for LoopbackTransport {
    fn read_byte(&self) -> Result<Option<u8>, EmulatorError> {
        let mut from_host = self.from_host.lock().expect("Mutex should not be poisoned");
        if from_host.is_empty() {
            if *self.closed.lock().expect("Mutex should not be poisoned") {
                return Err(EmulatorError::TransportClosed);
            }
            from_host = self
                .host_sent
                .wait_timeout(from_host, self.read_timeout)
                .expect("Mutex should not be poisoned")
                .0;
        }
        Ok(from_host.pop_front())
    }

    fn write(&self, data: &[u8]) -> Result<(), EmulatorError> {
        let mut from_inst = self.from_inst.lock().expect("Mutex should not be poisoned");
        from_inst.extend_from_slice(data);
        self.inst_sent.notify_all();
        Ok(())
    }
}
