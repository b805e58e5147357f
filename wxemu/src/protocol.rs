//! The traits an instrument family implements, and the types passed between a family and the
//! [`Dispatcher`](crate::Dispatcher).
//!
//! A family provides its grammar through [`Protocol`]: how to parse a frame into a typed
//! [`Request`], how to apply the request to one device, and how to encode replies. The
//! dispatcher resolves targets, checks checksums, and executes address changes, so none of this
//! has to be written again for every family.

use std::fmt;

use chrono::NaiveDateTime;

use crate::{OutputSchedule, ParsedMessage, ProtocolError, framing::Framing};

/// The per-address register state of an emulated instrument.
pub trait Device: Send + 'static {
    /// The current bus address.
    fn address(&self) -> u8;

    /// Set the bus address. Only called by the [`AddressTable`](crate::AddressTable).
    fn set_address(&mut self, address: u8);

    /// The output schedule of this device.
    fn schedule(&self) -> &OutputSchedule;

    /// Mutable access to the output schedule.
    fn schedule_mut(&mut self) -> &mut OutputSchedule;

    /// Update the live measurement snapshot from a line of the measurement feed.
    fn ingest(&mut self, message: &ParsedMessage);
}

/// Whom a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// One specific bus address.
    Address(u8),
    /// Every device on the bus, in address order.
    All,
    /// The first (or only) device.
    Default,
}

/// Result of the checksum check that a family performed while parsing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// The frame carried no checksum.
    Absent,
    /// The frame carried a checksum and it matched.
    Valid,
    /// The frame carried a checksum that did not match.
    Invalid {
        /// Checksum as received.
        received: u16,
        /// Checksum as calculated.
        calculated: u16,
    },
}

/// A parsed frame: target, checksum status, and the typed command of the family.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<C> {
    /// Whom the request is for.
    pub target: Target,
    /// Checksum status of the frame.
    pub checksum: ChecksumStatus,
    /// The command.
    pub command: C,
    /// The frame text without framing characters.
    pub text: String,
}

impl<C> Request<C> {
    /// Create a new request without checksum.
    pub fn new(target: Target, command: C, text: impl Into<String>) -> Self {
        Request {
            target,
            checksum: ChecksumStatus::Absent,
            command,
            text: text.into(),
        }
    }

    /// Set the checksum status.
    pub fn with_checksum(mut self, checksum: ChecksumStatus) -> Self {
        self.checksum = checksum;
        self
    }
}

/// What a device answers to a command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reply {
    /// Nothing is sent back.
    #[default]
    None,
    /// A reply body, framed by [`Protocol::encode_reply`].
    Text(String),
    /// A measurement message with a fresh sample from the feed.
    Measurement,
}

/// The result of applying a command to one device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    /// The reply.
    pub reply: Reply,
    /// Move the device to this address. Executed by the dispatcher.
    pub readdress: Option<u8>,
    /// Mode or interval changed: the sender has to re-evaluate its wait.
    pub wake: bool,
}

impl Outcome {
    /// An outcome without reply.
    pub fn silent() -> Self {
        Outcome::default()
    }

    /// An outcome with a text reply.
    pub fn text(body: impl Into<String>) -> Self {
        Outcome {
            reply: Reply::Text(body.into()),
            ..Default::default()
        }
    }

    /// An outcome that answers with a measurement message.
    pub fn measurement() -> Self {
        Outcome {
            reply: Reply::Measurement,
            ..Default::default()
        }
    }

    /// Signal the sender.
    pub fn with_wake(mut self) -> Self {
        self.wake = true;
        self
    }

    /// Request an address change.
    pub fn with_readdress(mut self, address: u8) -> Self {
        self.readdress = Some(address);
        self
    }
}

/// The grammar of one instrument family.
pub trait Protocol: Send + 'static {
    /// The closed set of commands of this family.
    type Command: fmt::Debug + Send;
    /// The register state of one instrument of this family.
    type Device: Device;

    /// Short name of the family, used in log messages.
    fn name(&self) -> &'static str;

    /// How the byte stream is cut into frames.
    fn framing(&self) -> Framing;

    /// Parse one frame into a request.
    ///
    /// Checksums are verified here, the result is reported in [`Request::checksum`]. Only
    /// structurally invalid frames fail.
    fn parse(&self, frame: &[u8]) -> Result<Request<Self::Command>, ProtocolError>;

    /// Whether the device only accepts frames with a valid checksum.
    fn checksum_required(&self, _device: &Self::Device) -> bool {
        false
    }

    /// The address the request moves the device to, if it readdresses it at all.
    ///
    /// The dispatcher refuses the request with [`ProtocolError::AddressInUse`] before
    /// [`Protocol::apply`] runs if another device sits at this address, so nothing of the request
    /// is applied.
    fn requested_address(
        &self,
        _device: &Self::Device,
        _request: &Request<Self::Command>,
    ) -> Option<u8> {
        None
    }

    /// Apply a request to one device.
    ///
    /// Set-class commands validate every field on its own: fields that fail their check keep their
    /// value while all others are applied, and the first failure is returned after the valid
    /// fields were applied. Bitmasks are applied as a whole or not at all.
    fn apply(
        &self,
        device: &mut Self::Device,
        request: &Request<Self::Command>,
    ) -> Result<Outcome, ProtocolError>;

    /// Frame a reply body for the wire.
    fn encode_reply(
        &self,
        device: &Self::Device,
        request: &Request<Self::Command>,
        body: &str,
    ) -> Vec<u8>;

    /// Encode the error reply of the family, `None` if the family drops this error silently.
    fn encode_error(
        &self,
        device: Option<&Self::Device>,
        request: Option<&Request<Self::Command>>,
        error: &ProtocolError,
    ) -> Option<Vec<u8>>;

    /// Render a complete measurement message of the device, framing included.
    fn render_measurement(&self, device: &Self::Device, timestamp: NaiveDateTime) -> Vec<u8>;
}
