//! Running an emulator: one receive thread, one send thread, and the state they share.
//!
//! Both threads work on the same [`Dispatcher`] behind one mutex:
//!
//! - The receive thread reads single bytes from the transport, assembles frames, and dispatches
//!   them while holding the lock. Replies are written after the lock was released.
//! - The send thread waits on the send-ready condition variable, either until the next device is
//!   due or, if no device is in continuous mode, until it is signaled. When a device is due, it
//!   fetches the next line of the measurement feed, renders all due devices under the lock,
//!   releases the lock to write, and takes it again to record the transmission.
//!
//! Every dispatch that changes a mode or an interval signals the send thread, as does shutdown.
//! Cancellation is cooperative: [`Emulator::shutdown`] raises a flag that both threads check
//! before every blocking operation.

use std::{
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use chrono::{Local, NaiveDateTime};
use tracing::{error, info, trace, warn};

use crate::{
    Dispatcher, EmulatorError, MeasurementFeed, ParsedMessage, Protocol, SerialTransport,
    framing::FrameAssembler,
};

type SharedFeed = Arc<Mutex<Box<dyn MeasurementFeed>>>;

/// Tuning of the emulator threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Maximum length of one frame. Longer frames are discarded.
    pub max_frame_len: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions { max_frame_len: 512 }
    }
}

/// The state shared by the receive and the send thread.
pub struct EmulatorContext<P: Protocol> {
    dispatcher: Mutex<Dispatcher<P>>,
    send_ready: Condvar,
    shutdown: AtomicBool,
}

impl<P: Protocol> EmulatorContext<P> {
    /// Create a new context around a dispatcher.
    pub fn new(dispatcher: Dispatcher<P>) -> Self {
        EmulatorContext {
            dispatcher: Mutex::new(dispatcher),
            send_ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Lock the dispatcher.
    pub fn lock(&self) -> MutexGuard<'_, Dispatcher<P>> {
        self.dispatcher.lock().expect("Mutex should not be poisoned")
    }

    /// Signal the send thread. Call while holding the lock, otherwise the signal may get lost.
    pub fn notify_sender(&self) {
        self.send_ready.notify_all();
    }

    /// Raise the shutdown flag and wake the send thread.
    pub fn request_shutdown(&self) {
        let _guard = self.lock();
        self.shutdown.store(true, Ordering::SeqCst);
        self.send_ready.notify_all();
    }

    /// True once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// A running emulator.
///
/// # Example
///
/// ```no_run
/// # fn run<P: wxemu::Protocol>(dispatcher: wxemu::Dispatcher<P>) -> Result<(), wxemu::EmulatorError> {
/// use std::sync::Arc;
///
/// use wxemu::{Emulator, FileFeed, LoopbackTransport, SchedulerOptions};
///
/// let line = Arc::new(LoopbackTransport::new());
/// let feed = FileFeed::open("feed.txt")?;
/// let emulator = Emulator::spawn(dispatcher, line, Box::new(feed), SchedulerOptions::default())?;
/// emulator.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct Emulator<P: Protocol> {
    context: Arc<EmulatorContext<P>>,
    receiver: JoinHandle<Result<(), EmulatorError>>,
    sender: JoinHandle<Result<(), EmulatorError>>,
}

impl<P: Protocol> Emulator<P> {
    /// Start the receive and the send thread.
    ///
    /// # Arguments
    /// * `dispatcher`: The dispatcher with all devices.
    /// * `transport`: The line the emulator is attached to.
    /// * `feed`: Source of the live measurements.
    /// * `options`: Tuning of the threads.
    pub fn spawn<T: SerialTransport + 'static>(
        dispatcher: Dispatcher<P>,
        transport: Arc<T>,
        feed: Box<dyn MeasurementFeed>,
        options: SchedulerOptions,
    ) -> Result<Self, EmulatorError> {
        let family = dispatcher.protocol().name();
        let context = Arc::new(EmulatorContext::new(dispatcher));
        let feed: SharedFeed = Arc::new(Mutex::new(feed));

        let receiver = {
            let context = Arc::clone(&context);
            let transport = Arc::clone(&transport);
            let feed = Arc::clone(&feed);
            thread::Builder::new()
                .name(format!("{family}-receive"))
                .spawn(move || {
                    guarded(&context, "receive", || {
                        receive_loop(&context, transport.as_ref(), &feed, options)
                    })
                })?
        };

        let sender = {
            let context = Arc::clone(&context);
            thread::Builder::new()
                .name(format!("{family}-send"))
                .spawn(move || {
                    guarded(&context, "send", || {
                        send_loop(&context, transport.as_ref(), &feed)
                    })
                })
        };
        let sender = match sender {
            Ok(sender) => sender,
            Err(e) => {
                context.request_shutdown();
                let _ = receiver.join();
                return Err(e.into());
            }
        };

        info!(family, "emulator started");
        Ok(Emulator {
            context,
            receiver,
            sender,
        })
    }

    /// The shared state, e.g., to inspect devices while the emulator runs.
    pub fn context(&self) -> &Arc<EmulatorContext<P>> {
        &self.context
    }

    /// Request shutdown and wait for both threads to finish.
    pub fn shutdown(self) -> Result<(), EmulatorError> {
        self.context.request_shutdown();
        self.wait()
    }

    /// Wait for both threads to finish, i.e., until shutdown was requested or a fatal error
    /// occurred. The first error of the two threads is returned.
    pub fn wait(self) -> Result<(), EmulatorError> {
        let received = self
            .receiver
            .join()
            .map_err(|_| EmulatorError::ThreadPanicked("receive"))
            .and_then(|result| result);
        let sent = self
            .sender
            .join()
            .map_err(|_| EmulatorError::ThreadPanicked("send"))
            .and_then(|result| result);
        info!("emulator stopped");
        received.and(sent)
    }
}

/// Run one emulator thread. A fatal error shuts down the other thread as well.
fn guarded<P, F>(context: &EmulatorContext<P>, path: &'static str, run: F) -> Result<(), EmulatorError>
where
    P: Protocol,
    F: FnOnce() -> Result<(), EmulatorError>,
{
    let result = run();
    if let Err(e) = &result {
        error!(path, error = %e, "emulator thread failed");
        context.request_shutdown();
    }
    result
}

fn receive_loop<P: Protocol, T: SerialTransport + ?Sized>(
    context: &EmulatorContext<P>,
    transport: &T,
    feed: &SharedFeed,
    options: SchedulerOptions,
) -> Result<(), EmulatorError> {
    let framing = context.lock().protocol().framing();
    let mut assembler = FrameAssembler::new(framing, options.max_frame_len);

    while !context.is_shutdown() {
        let Some(byte) = transport.read_byte()? else {
            continue;
        };
        let Some(frame) = assembler.push(byte) else {
            continue;
        };

        let dispatched = {
            let mut dispatcher = context.lock();
            let dispatched = dispatcher.dispatch(&frame);
            if dispatched.wake {
                context.notify_sender();
            }
            dispatched
        };

        if !dispatched.reply.is_empty() {
            transport.write(&dispatched.reply)?;
        }
        if !dispatched.measurements.is_empty() {
            let message = next_message(feed);
            let bytes = {
                let mut dispatcher = context.lock();
                if let Some(message) = &message {
                    dispatcher.ingest(message);
                }
                dispatcher.render_measurements(&dispatched.measurements, timestamp())
            };
            transport.write(&bytes)?;
        }
    }
    Ok(())
}

fn send_loop<P: Protocol, T: SerialTransport + ?Sized>(
    context: &EmulatorContext<P>,
    transport: &T,
    feed: &SharedFeed,
) -> Result<(), EmulatorError> {
    let mut dispatcher = context.lock();
    loop {
        if context.is_shutdown() {
            return Ok(());
        }
        let now = Instant::now();
        match dispatcher.next_due(now) {
            Some(due) if due <= now => {}
            Some(due) => {
                dispatcher = context
                    .send_ready
                    .wait_timeout(dispatcher, due - now)
                    .expect("Mutex should not be poisoned")
                    .0;
                continue;
            }
            None => {
                dispatcher = context
                    .send_ready
                    .wait(dispatcher)
                    .expect("Mutex should not be poisoned");
                continue;
            }
        }

        // Something is due: fetch the measurement without holding the lock.
        drop(dispatcher);
        let message = next_message(feed);
        let sent_at = Instant::now();
        let (due, bytes) = {
            let mut dispatcher = context.lock();
            if let Some(message) = &message {
                dispatcher.ingest(message);
            }
            let due = dispatcher.due_devices(sent_at);
            let bytes = dispatcher.render_measurements(&due, timestamp());
            (due, bytes)
        };
        if !bytes.is_empty() {
            trace!(devices = ?due, len = bytes.len(), "sending measurements");
            transport.write(&bytes)?;
        }

        dispatcher = context.lock();
        dispatcher.mark_sent(&due, sent_at);
    }
}

fn next_message(feed: &SharedFeed) -> Option<ParsedMessage> {
    let line = feed
        .lock()
        .expect("Mutex should not be poisoned")
        .next_line()?;
    let message = ParsedMessage::parse(&line);
    if message.is_none() {
        warn!(line = %line, "measurement line without fields");
    }
    message
}

fn timestamp() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Sleep that returns early when shutdown is requested, for launchers that run an emulator for a
/// fixed time.
pub fn run_for<P: Protocol>(context: &EmulatorContext<P>, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !context.is_shutdown() {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}
