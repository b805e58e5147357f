//! The dispatcher: resolve, check, apply, reply.

use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::{
    AddressTable, ChecksumStatus, Device, ParsedMessage, Protocol, ProtocolError, Reply, Request,
    Target,
};

/// Everything that came out of dispatching one frame.
#[derive(Debug, Default, PartialEq)]
pub struct Dispatched {
    /// Encoded replies, ready for the wire.
    pub reply: Vec<u8>,
    /// Addresses of devices that answer with a measurement message. These need a fresh sample
    /// from the measurement feed before they are rendered.
    pub measurements: Vec<u8>,
    /// Mode or interval of a device changed.
    pub wake: bool,
    /// All errors that occurred, for logging and tests.
    pub errors: Vec<ProtocolError>,
}

/// Owns the devices of an emulator and runs frames of one family against them.
pub struct Dispatcher<P: Protocol> {
    protocol: P,
    devices: AddressTable<P::Device>,
}

impl<P: Protocol> Dispatcher<P> {
    /// Create a new dispatcher.
    pub fn new(protocol: P, devices: AddressTable<P::Device>) -> Self {
        Dispatcher { protocol, devices }
    }

    /// The protocol of the family.
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// The device table.
    pub fn devices(&self) -> &AddressTable<P::Device> {
        &self.devices
    }

    /// The device table, mutably.
    pub fn devices_mut(&mut self) -> &mut AddressTable<P::Device> {
        &mut self.devices
    }

    /// Dispatch one frame.
    ///
    /// Unknown addresses are ignored. A request for all devices is run against every device in
    /// address order and the replies are concatenated.
    pub fn dispatch(&mut self, frame: &[u8]) -> Dispatched {
        let mut out = Dispatched::default();
        let family = self.protocol.name();

        let request = match self.protocol.parse(frame) {
            Ok(request) => request,
            Err(error) => {
                warn!(family, %error, frame = %String::from_utf8_lossy(frame), "rejected frame");
                if let Some(bytes) = self.protocol.encode_error(None, None, &error) {
                    out.reply = bytes;
                }
                out.errors.push(error);
                return out;
            }
        };
        debug!(family, target = ?request.target, command = ?request.command, "dispatching");

        let targets = match self.resolve(request.target) {
            Ok(targets) => targets,
            Err(error) => {
                debug!(family, %error, "command ignored");
                out.errors.push(error);
                return out;
            }
        };

        for address in targets {
            self.dispatch_to(address, &request, &mut out);
        }
        out
    }

    fn resolve(&self, target: Target) -> Result<Vec<u8>, ProtocolError> {
        match target {
            Target::Address(address) if self.devices.contains(address) => Ok(vec![address]),
            Target::Address(address) => Err(ProtocolError::AddressOutOfRange(address.into())),
            Target::All => Ok(self.devices.addresses()),
            Target::Default => Ok(self.devices.first_address().into_iter().collect()),
        }
    }

    fn dispatch_to(&mut self, address: u8, request: &Request<P::Command>, out: &mut Dispatched) {
        let family = self.protocol.name();
        let Some(device) = self.devices.get(address) else {
            return;
        };

        let checked = match request.checksum {
            ChecksumStatus::Valid => Ok(()),
            ChecksumStatus::Invalid {
                received,
                calculated,
            } => Err(ProtocolError::ChecksumMismatch {
                received: Some(received),
                calculated: Some(calculated),
            }),
            ChecksumStatus::Absent if self.protocol.checksum_required(device) => {
                Err(ProtocolError::ChecksumMismatch {
                    received: None,
                    calculated: None,
                })
            }
            ChecksumStatus::Absent => Ok(()),
        };
        let checked = checked.and_then(|_| {
            match self.protocol.requested_address(device, request) {
                Some(new) if new != address && self.devices.contains(new) => {
                    Err(ProtocolError::AddressInUse(new))
                }
                _ => Ok(()),
            }
        });

        let Some(device) = self.devices.get_mut(address) else {
            return;
        };
        let outcome = match checked.and_then(|_| self.protocol.apply(device, request)) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(family, address, %error, command = ?request.command, "command failed");
                // valid fields of a partially applied command may have changed the schedule
                out.wake = true;
                if let Some(bytes) = self.protocol.encode_error(Some(&*device), Some(request), &error)
                {
                    out.reply.extend(bytes);
                }
                out.errors.push(error);
                return;
            }
        };
        out.wake |= outcome.wake;

        let mut current = address;
        if let Some(new) = outcome.readdress {
            match self.devices.reassign(address, new) {
                Ok(()) => {
                    info!(family, old = address, new, "device readdressed");
                    current = new;
                }
                Err(error) => {
                    warn!(family, address, %error, "address change refused");
                    let device = self.devices.get(address);
                    if let Some(bytes) = self.protocol.encode_error(device, Some(request), &error) {
                        out.reply.extend(bytes);
                    }
                    out.errors.push(error);
                    return;
                }
            }
        }

        let Some(device) = self.devices.get(current) else {
            return;
        };
        match outcome.reply {
            Reply::None => {}
            Reply::Text(body) => out
                .reply
                .extend(self.protocol.encode_reply(device, request, &body)),
            Reply::Measurement => out.measurements.push(current),
        }
    }

    /// Update the live measurement of all devices.
    pub fn ingest(&mut self, message: &ParsedMessage) {
        for device in self.devices.iter_mut() {
            device.ingest(message);
        }
    }

    /// The earliest time any device is due for continuous output.
    pub fn next_due(&self, now: Instant) -> Option<Instant> {
        self.devices
            .iter()
            .filter_map(|device| device.schedule().next_due(now))
            .min()
    }

    /// Addresses of all devices that are due at `now`.
    pub fn due_devices(&self, now: Instant) -> Vec<u8> {
        self.devices
            .iter()
            .filter(|device| device.schedule().is_due(now))
            .map(Device::address)
            .collect()
    }

    /// Render the measurement messages of the given devices, in the given order.
    pub fn render_measurements(&self, addresses: &[u8], timestamp: NaiveDateTime) -> Vec<u8> {
        addresses
            .iter()
            .filter_map(|&address| self.devices.get(address))
            .flat_map(|device| self.protocol.render_measurement(device, timestamp))
            .collect()
    }

    /// Record a transmission for the given devices.
    pub fn mark_sent(&mut self, addresses: &[u8], at: Instant) {
        for &address in addresses {
            if let Some(device) = self.devices.get_mut(address) {
                device.schedule_mut().mark_sent(at);
            }
        }
    }
}
