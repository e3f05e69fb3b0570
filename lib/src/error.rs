// Copyright (c) 2024 The ledger-ergo-rs Authors

use ledger_ergo_apdu::{ApduError, DeviceError, RequestError};

use crate::transport::TransportError;

/// Ergo Ledger API error type
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Request rejected client-side before any exchange
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    /// Device returned a non-success status word
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Response payload did not parse as the expected answer
    #[error("bad response: {0}")]
    Response(#[from] ApduError),
}
