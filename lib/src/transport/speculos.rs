// Copyright (c) 2024 The ledger-ergo-rs Authors

//! TCP transport for the [Speculos](https://github.com/LedgerHQ/speculos)
//! emulator
//!
//! Requests are the encoded APDU prefixed with a four-byte big-endian
//! length. Responses are a four-byte big-endian payload length followed
//! by the payload and the two-byte status word; the length does not
//! count the status word.

use std::{
    io::{Read, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream},
    sync::Mutex,
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ledger_ergo_apdu::{ApduCommand, ApduResponse};
use log::trace;

use super::{Connection, Exchange, TransportError};

/// Default speculos APDU port
pub const DEFAULT_SPECULOS_PORT: u16 = 1237;

/// Speculos connection options
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TcpOptions {
    pub addr: IpAddr,
    pub port: u16,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_SPECULOS_PORT,
        }
    }
}

impl TcpOptions {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

/// TCP transport for a speculos emulator instance
pub struct SpeculosTransport {
    opts: TcpOptions,
    state: Mutex<Connection<TcpStream>>,
}

impl SpeculosTransport {
    /// Create a transport for the given emulator address.
    /// No connection is made until [Exchange::open].
    pub fn new(opts: TcpOptions) -> Self {
        Self {
            opts,
            state: Mutex::new(Connection::Unopened),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Connection<TcpStream>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Exchange for SpeculosTransport {
    fn open(&self) -> Result<(), TransportError> {
        let mut state = self.lock_state();
        match *state {
            Connection::Unopened => (),
            Connection::Open(_) => return Err(TransportError::AlreadyOpen),
            Connection::Closed => return Err(TransportError::Closed),
        }

        let stream = TcpStream::connect(self.opts.socket_addr())?;
        *state = Connection::Open(stream);

        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut state = self.lock_state();
        state.get()?;
        *state = Connection::Closed;
        Ok(())
    }

    fn exchange(&self, command: &ApduCommand) -> Result<ApduResponse, TransportError> {
        // Lock spans the write and the matching read so exchanges
        // from other threads cannot interleave
        let state = self.lock_state();
        let mut stream = state.get()?;

        let request = command.encode();
        trace!("speculos write: {}", hex::encode(&request));

        stream.write_u32::<BigEndian>(request.len() as u32)?;
        stream.write_all(&request)?;
        stream.flush()?;

        // Length counts the payload only, the status word follows it
        let len = stream.read_u32::<BigEndian>()? as usize;
        let mut raw = vec![0u8; len + 2];
        stream.read_exact(&mut raw)?;

        trace!("speculos read: {}", hex::encode(&raw));

        Ok(ApduResponse::decode(raw)?)
    }
}
