//! This module provides a transport for an emulator that is reached via TCP/IP, e.g., through a
//! serial device server or a virtual null-modem.
//!
//! It includes a blocking implementation using the [`std::net::TcpStream`] struct.

use std::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    time::Duration,
};

use tracing::info;

use crate::{EmulatorError, StreamTransport};

/// A blocking TCP/IP transport using the [`std::net::TcpStream`] struct.
#[derive(Debug)]
pub struct TcpTransport {}

impl TcpTransport {
    /// Listen on the given address and accept exactly one connection.
    ///
    /// The read timeout of the stream is set to `read_timeout`, the write timeout to three
    /// seconds. We do not want a write to a stuck peer to block the emulator forever.
    ///
    /// # Arguments
    /// * `sock_addr` - Socket address to listen on.
    /// * `read_timeout` - Read timeout, should be short.
    pub fn accept<A: ToSocketAddrs>(
        sock_addr: A,
        read_timeout: Duration,
    ) -> Result<StreamTransport<TcpStream, TcpStream>, EmulatorError> {
        let listener = TcpListener::bind(sock_addr)?;
        let (stream, peer) = listener.accept()?;
        info!(%peer, "host connected");
        TcpTransport::from_stream(stream, read_timeout)
    }

    /// Build a transport from an already connected stream.
    pub fn from_stream(
        stream: TcpStream,
        read_timeout: Duration,
    ) -> Result<StreamTransport<TcpStream, TcpStream>, EmulatorError> {
        stream.set_write_timeout(Some(Duration::from_secs(3)))?;
        stream.set_read_timeout(Some(read_timeout))?;
        let reader = stream.try_clone()?;
        Ok(StreamTransport::new(reader, stream))
    }
}
