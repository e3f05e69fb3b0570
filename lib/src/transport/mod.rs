// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Transport abstraction for command/response exchange with a device
//!
//! A transport owns exactly one connection, moved through the
//! unopened / open / closed lifecycle by [Exchange::open] and
//! [Exchange::close]. Each [Exchange::exchange] call is one complete
//! APDU round trip; interior locking keeps the write and the matching
//! read atomic with respect to other callers.

use ledger_ergo_apdu::{ApduCommand, ApduError, ApduResponse};
use strum::Display;

#[cfg(feature = "transport_hid")]
pub mod hid;
#[cfg(feature = "transport_hid")]
pub use hid::HidTransport;

#[cfg(feature = "transport_tcp")]
pub mod speculos;
#[cfg(feature = "transport_tcp")]
pub use speculos::{SpeculosTransport, TcpOptions};

/// Transport errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Exchange attempted before `open`
    #[error("transport not open")]
    NotOpen,

    /// `open` called on an already open transport
    #[error("transport already open")]
    AlreadyOpen,

    /// Exchange attempted after `close`
    #[error("transport closed")]
    Closed,

    /// Response packet carries a foreign channel id.
    /// Channel 0 is what a locked device reports.
    #[error("HID channel mismatch (expected {expected:#06x}, got {actual:#06x})")]
    ChannelMismatch { expected: u16, actual: u16 },

    /// Response packet tag is not the APDU tag (0x05)
    #[error("bad HID packet tag {0:#04x}")]
    BadTag(u8),

    /// Response packet out of sequence
    #[error("bad HID sequence index (expected {expected}, got {actual})")]
    BadSequence { expected: u16, actual: u16 },

    /// Response packet shorter than its header
    #[error("short HID packet ({0} bytes)")]
    ShortPacket(usize),

    /// Underlying HID error
    #[cfg(feature = "transport_hid")]
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Underlying socket error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed APDU payload
    #[error("APDU error: {0}")]
    Apdu(#[from] ApduError),
}

/// Command/response exchange with a device over some transport
pub trait Exchange {
    /// Open the transport's connection
    fn open(&self) -> Result<(), TransportError>;

    /// Close the transport's connection.
    /// A closed transport cannot be reopened.
    fn close(&self) -> Result<(), TransportError>;

    /// Perform one full APDU exchange
    fn exchange(&self, command: &ApduCommand) -> Result<ApduResponse, TransportError>;
}

/// Connection lifecycle state for a transport
pub(crate) enum Connection<T> {
    Unopened,
    Open(T),
    Closed,
}

impl<T> Connection<T> {
    /// Fetch the live connection, mapping lifecycle states to errors
    pub fn get(&self) -> Result<&T, TransportError> {
        match self {
            Connection::Unopened => Err(TransportError::NotOpen),
            Connection::Open(t) => Ok(t),
            Connection::Closed => Err(TransportError::Closed),
        }
    }
}

/// Generic ledger transport (abstract over transport types)
#[derive(Display)]
#[non_exhaustive]
pub enum GenericTransport {
    #[cfg(feature = "transport_hid")]
    Hid(HidTransport),
    #[cfg(feature = "transport_tcp")]
    Speculos(SpeculosTransport),
}

#[cfg(feature = "transport_hid")]
impl From<HidTransport> for GenericTransport {
    fn from(t: HidTransport) -> Self {
        Self::Hid(t)
    }
}

#[cfg(feature = "transport_tcp")]
impl From<SpeculosTransport> for GenericTransport {
    fn from(t: SpeculosTransport) -> Self {
        Self::Speculos(t)
    }
}

impl Exchange for GenericTransport {
    fn open(&self) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.open(),
            #[cfg(feature = "transport_tcp")]
            Self::Speculos(t) => t.open(),
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.close(),
            #[cfg(feature = "transport_tcp")]
            Self::Speculos(t) => t.close(),
        }
    }

    fn exchange(&self, command: &ApduCommand) -> Result<ApduResponse, TransportError> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.exchange(command),
            #[cfg(feature = "transport_tcp")]
            Self::Speculos(t) => t.exchange(command),
        }
    }
}
