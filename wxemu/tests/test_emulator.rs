//! Test cases for the dispatcher and the scheduler, using a small line protocol.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::NaiveDateTime;
use rstest::*;

use wxemu::{
    AddressTable, ChecksumStatus, Device, Dispatcher, Emulator, EmulatorError, LoopbackTransport,
    Outcome, OutputMode, OutputSchedule, ParsedMessage, Protocol, ProtocolError, Reply, Request,
    SchedulerOptions, Target, VecFeed,
    checksum::{parse_hex_u8, xor_checksum},
    framing::{Framing, split_address_prefix, split_line_checksum},
    tokenizer::{KeywordTable, field, split_params},
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kw {
    Ping,
    Start,
    Stop,
    Poll,
    Addr,
    Intv,
    Set,
}

const KEYWORDS: KeywordTable<Kw> = KeywordTable::new(&[
    ("PING", Kw::Ping),
    ("START", Kw::Start),
    ("STOP", Kw::Stop),
    ("POLL", Kw::Poll),
    ("ADDR", Kw::Addr),
    ("INTV", Kw::Intv),
    ("SET", Kw::Set),
]);

#[derive(Debug, Clone, PartialEq)]
enum Cmd {
    Ping,
    Start,
    Stop,
    Poll,
    Addr(u8),
    Intv(u64),
    Set(Vec<String>),
}

#[derive(Debug, Default)]
struct Toy {
    address: u8,
    schedule: OutputSchedule,
    pressure: f64,
    a: u8,
    b: u8,
    addr_changes: u32,
    checksum_required: bool,
}

impl Toy {
    fn at(address: u8) -> Self {
        Toy {
            address,
            ..Default::default()
        }
    }
}

impl Device for Toy {
    fn address(&self) -> u8 {
        self.address
    }
    fn set_address(&mut self, address: u8) {
        self.address = address;
    }
    fn schedule(&self) -> &OutputSchedule {
        &self.schedule
    }
    fn schedule_mut(&mut self) -> &mut OutputSchedule {
        &mut self.schedule
    }
    fn ingest(&mut self, message: &ParsedMessage) {
        if let Some(p) = message.number("P") {
            self.pressure = p;
        }
    }
}

struct ToyProtocol;

impl Protocol for ToyProtocol {
    type Command = Cmd;
    type Device = Toy;

    fn name(&self) -> &'static str {
        "toy"
    }

    fn framing(&self) -> Framing {
        Framing::Line
    }

    fn parse(&self, frame: &[u8]) -> Result<Request<Cmd>, ProtocolError> {
        let line = std::str::from_utf8(frame)
            .map_err(|_| ProtocolError::MalformedFrame("not text".into()))?;
        let (body, checksum_field) = split_line_checksum(line, '*');
        let checksum = match checksum_field {
            None => ChecksumStatus::Absent,
            Some(field) => {
                let received = parse_hex_u8(field)
                    .ok_or_else(|| ProtocolError::MalformedFrame("bad checksum".into()))?;
                let calculated = xor_checksum(body.as_bytes());
                if received == calculated {
                    ChecksumStatus::Valid
                } else {
                    ChecksumStatus::Invalid {
                        received: received.into(),
                        calculated: calculated.into(),
                    }
                }
            }
        };
        let (address, rest) = split_address_prefix(body)?;
        let target = match address {
            Some(a) => Target::Address(
                u8::try_from(a).map_err(|_| ProtocolError::AddressOutOfRange(a))?,
            ),
            None => Target::All,
        };
        let (kw, tail) = KEYWORDS
            .lookup(rest)
            .ok_or_else(|| ProtocolError::UnknownCommand(rest.to_string()))?;
        let params = split_params(tail, ' ');
        let command = match kw {
            Kw::Ping => Cmd::Ping,
            Kw::Start => Cmd::Start,
            Kw::Stop => Cmd::Stop,
            Kw::Poll => Cmd::Poll,
            Kw::Addr => Cmd::Addr(field(&params, 0).unwrap_or(0)),
            Kw::Intv => Cmd::Intv(field(&params, 0).unwrap_or(0)),
            Kw::Set => Cmd::Set(params.iter().map(|s| s.to_string()).collect()),
        };
        Ok(Request::new(target, command, line).with_checksum(checksum))
    }

    fn checksum_required(&self, device: &Toy) -> bool {
        device.checksum_required
    }

    fn requested_address(&self, _device: &Toy, request: &Request<Cmd>) -> Option<u8> {
        match request.command {
            Cmd::Addr(new) => Some(new),
            _ => None,
        }
    }

    fn apply(&self, device: &mut Toy, request: &Request<Cmd>) -> Result<Outcome, ProtocolError> {
        match &request.command {
            Cmd::Ping => Ok(Outcome::text("PONG")),
            Cmd::Start => {
                device.schedule.start();
                Ok(Outcome::silent().with_wake())
            }
            Cmd::Stop => {
                device.schedule.stop();
                Ok(Outcome::silent().with_wake())
            }
            Cmd::Poll => Ok(Outcome::measurement()),
            Cmd::Addr(new) => {
                device.addr_changes += 1;
                Ok(Outcome::text(format!("ADDR {new}")).with_readdress(*new))
            }
            Cmd::Intv(ms) => {
                device.schedule.set_interval(Duration::from_millis(*ms));
                Ok(Outcome::text("OK").with_wake())
            }
            Cmd::Set(fields) => {
                let mut first_error = None;
                match fields.first().and_then(|f| f.parse::<u8>().ok()) {
                    Some(a) if a <= 9 => device.a = a,
                    Some(a) => first_error = Some(ProtocolError::out_of_range("a", a, 0, 9)),
                    None => {}
                }
                match fields.get(1).and_then(|f| f.parse::<u8>().ok()) {
                    Some(b) if b <= 99 => device.b = b,
                    Some(b) => {
                        first_error.get_or_insert(ProtocolError::out_of_range("b", b, 0, 99));
                    }
                    None => {}
                }
                match first_error {
                    Some(e) => Err(e),
                    None => Ok(Outcome::text(format!("{} {}", device.a, device.b))),
                }
            }
        }
    }

    fn encode_reply(&self, device: &Toy, _request: &Request<Cmd>, body: &str) -> Vec<u8> {
        format!("{:02}:{body}\r\n", device.address).into_bytes()
    }

    fn encode_error(
        &self,
        device: Option<&Toy>,
        _request: Option<&Request<Cmd>>,
        error: &ProtocolError,
    ) -> Option<Vec<u8>> {
        match (device, error) {
            (_, ProtocolError::MalformedFrame(_)) => None,
            (Some(_), ProtocolError::ChecksumMismatch { .. }) => Some(b"CSERR\r\n".to_vec()),
            (Some(d), _) => Some(format!("{:02}:ERR\r\n", d.address).into_bytes()),
            (None, _) => Some(b"ERR\r\n".to_vec()),
        }
    }

    fn render_measurement(&self, device: &Toy, _timestamp: NaiveDateTime) -> Vec<u8> {
        format!("{:02}:P={:.2}\r\n", device.address, device.pressure).into_bytes()
    }
}

fn crt_dispatcher(addresses: &[u8]) -> Dispatcher<ToyProtocol> {
    let mut table = AddressTable::new(98);
    for &address in addresses {
        table.insert(Toy::at(address)).unwrap();
    }
    Dispatcher::new(ToyProtocol, table)
}

#[fixture]
fn bus() -> Dispatcher<ToyProtocol> {
    crt_dispatcher(&[1, 2, 5])
}

// Dispatcher

#[rstest]
fn dispatch_addressed(mut bus: Dispatcher<ToyProtocol>) {
    let out = bus.dispatch(b"02:PING");
    assert_eq!(out.reply, b"02:PONG\r\n");
    assert!(out.errors.is_empty());
}

#[rstest]
fn dispatch_broadcast_in_address_order(mut bus: Dispatcher<ToyProtocol>) {
    let out = bus.dispatch(b"PING");
    assert_eq!(out.reply, b"01:PONG\r\n02:PONG\r\n05:PONG\r\n");
}

#[rstest]
fn dispatch_unknown_address_ignored(mut bus: Dispatcher<ToyProtocol>) {
    let out = bus.dispatch(b"07:PING");
    assert!(out.reply.is_empty());
    assert_eq!(out.errors, vec![ProtocolError::AddressOutOfRange(7)]);
}

#[rstest]
fn dispatch_unknown_command(mut bus: Dispatcher<ToyProtocol>) {
    let out = bus.dispatch(b"01:JUMP");
    assert_eq!(out.reply, b"ERR\r\n");
    assert!(matches!(out.errors[0], ProtocolError::UnknownCommand(_)));
}

#[rstest]
fn dispatch_checksum(mut bus: Dispatcher<ToyProtocol>) {
    let body = "01:PING";
    let cs = xor_checksum(body.as_bytes());
    let out = bus.dispatch(format!("{body}*{cs:02X}").as_bytes());
    assert_eq!(out.reply, b"01:PONG\r\n");

    let out = bus.dispatch(format!("{body}*{:02X}", cs ^ 0xFF).as_bytes());
    assert_eq!(out.reply, b"CSERR\r\n");
    assert!(matches!(
        out.errors[0],
        ProtocolError::ChecksumMismatch { .. }
    ));
}

#[rstest]
fn dispatch_checksum_required(mut bus: Dispatcher<ToyProtocol>) {
    bus.devices_mut().get_mut(1).unwrap().checksum_required = true;
    let out = bus.dispatch(b"01:PING");
    assert_eq!(out.reply, b"CSERR\r\n");
    assert_eq!(
        out.errors,
        vec![ProtocolError::ChecksumMismatch {
            received: None,
            calculated: None
        }]
    );
}

#[rstest]
fn dispatch_readdress(mut bus: Dispatcher<ToyProtocol>) {
    let out = bus.dispatch(b"05:ADDR 7");
    assert_eq!(out.reply, b"07:ADDR 7\r\n");
    assert_eq!(bus.devices().addresses(), vec![1, 2, 7]);
    assert_eq!(bus.devices().get(7).unwrap().address(), 7);
}

#[rstest]
fn dispatch_readdress_refused(mut bus: Dispatcher<ToyProtocol>) {
    let out = bus.dispatch(b"05:ADDR 1");
    assert_eq!(out.reply, b"05:ERR\r\n");
    assert_eq!(out.errors, vec![ProtocolError::AddressInUse(1)]);
    assert_eq!(bus.devices().addresses(), vec![1, 2, 5]);
    // refused before it reached the device
    assert_eq!(bus.devices().get(5).unwrap().addr_changes, 0);

    bus.dispatch(b"05:ADDR 7");
    assert_eq!(bus.devices().get(7).unwrap().addr_changes, 1);
}

#[rstest]
fn dispatch_partial_set(mut bus: Dispatcher<ToyProtocol>) {
    let out = bus.dispatch(b"01:SET 12 42");
    assert_eq!(out.reply, b"01:ERR\r\n");
    let device = bus.devices().get(1).unwrap();
    assert_eq!((device.a, device.b), (0, 42));
}

#[rstest]
fn dispatch_mode_wakes_sender(mut bus: Dispatcher<ToyProtocol>) {
    let out = bus.dispatch(b"02:START");
    assert!(out.wake);
    assert!(out.reply.is_empty());
    assert_eq!(
        bus.devices().get(2).unwrap().schedule().mode(),
        OutputMode::Continuous
    );
    assert_eq!(bus.due_devices(Instant::now()), vec![2]);
}

#[rstest]
fn dispatch_poll_requests_measurement(mut bus: Dispatcher<ToyProtocol>) {
    let out = bus.dispatch(b"05:POLL");
    assert_eq!(out.measurements, vec![5]);
    bus.ingest(&ParsedMessage::parse("P=1013.25").unwrap());
    let timestamp = NaiveDateTime::default();
    assert_eq!(
        bus.render_measurements(&out.measurements, timestamp),
        b"05:P=1013.25\r\n"
    );
}

#[rstest]
fn next_due_and_mark_sent(mut bus: Dispatcher<ToyProtocol>) {
    let now = Instant::now();
    assert_eq!(bus.next_due(now), None);
    bus.dispatch(b"01:INTV 1000");
    bus.dispatch(b"01:START");
    assert_eq!(bus.next_due(now), Some(now));
    bus.mark_sent(&[1], now);
    assert_eq!(bus.next_due(now), Some(now + Duration::from_secs(1)));
    assert!(bus.due_devices(now).is_empty());
}

// Scheduler

const WAIT: Duration = Duration::from_secs(2);

fn crt_emulator(
    addresses: &[u8],
    feed: VecFeed,
) -> (Emulator<ToyProtocol>, Arc<LoopbackTransport>) {
    let line = Arc::new(LoopbackTransport::new());
    let emulator = Emulator::spawn(
        crt_dispatcher(addresses),
        Arc::clone(&line),
        Box::new(feed),
        SchedulerOptions::default(),
    )
    .unwrap();
    (emulator, line)
}

#[rstest]
fn emulator_replies() {
    let (emulator, line) = crt_emulator(&[1], VecFeed::default());
    line.send_from_host("01:PING\r\n");
    let out = line.wait_for_output(WAIT, |out| out.ends_with(b"\r\n"));
    assert_eq!(out, b"01:PONG\r\n");
    emulator.shutdown().unwrap();
}

#[rstest]
fn emulator_poll_uses_feed() {
    let (emulator, line) = crt_emulator(&[1], VecFeed::new(["P=1000.5"]));
    line.send_from_host("01:POLL\r\n");
    let out = line.wait_for_output(WAIT, |out| out.ends_with(b"\r\n"));
    assert_eq!(out, b"01:P=1000.50\r\n");
    emulator.shutdown().unwrap();
}

#[rstest]
fn emulator_continuous_output() {
    let (emulator, line) = crt_emulator(&[1], VecFeed::cycling(["P=1000", "P=1001"]));
    line.send_from_host("01:INTV 20\r\n01:START\r\n");
    let out = line.wait_for_output(WAIT, |out| {
        out.windows(4).filter(|w| *w == b"P=10").count() >= 3
    });
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("01:OK\r\n"), "{text}");
    assert!(text.contains("01:P=1000.00\r\n"), "{text}");
    assert!(text.contains("01:P=1001.00\r\n"), "{text}");

    // stopping ends the output
    line.send_from_host("01:STOP\r\n");
    std::thread::sleep(Duration::from_millis(100));
    line.take_output();
    std::thread::sleep(Duration::from_millis(100));
    assert!(line.take_output().is_empty());
    emulator.shutdown().unwrap();
}

#[rstest]
fn emulator_shutdown_while_idle() {
    let (emulator, _line) = crt_emulator(&[1, 2], VecFeed::default());
    emulator.shutdown().unwrap();
}

#[rstest]
fn emulator_closed_line_is_fatal() {
    let (emulator, line) = crt_emulator(&[1], VecFeed::default());
    line.close();
    assert!(matches!(
        emulator.wait(),
        Err(EmulatorError::TransportClosed)
    ));
}

#[rstest]
fn emulator_state_visible_through_context() {
    let (emulator, line) = crt_emulator(&[1], VecFeed::default());
    line.send_from_host("01:ADDR 9\r\n");
    line.wait_for_output(WAIT, |out| out.ends_with(b"\r\n"));
    assert_eq!(emulator.context().lock().devices().addresses(), vec![9]);
    emulator.shutdown().unwrap();
}

#[rstest]
fn outcome_builders() {
    assert_eq!(Outcome::silent().reply, Reply::None);
    let outcome = Outcome::text("OK").with_wake().with_readdress(3);
    assert_eq!(outcome.reply, Reply::Text("OK".into()));
    assert!(outcome.wake);
    assert_eq!(outcome.readdress, Some(3));
}
