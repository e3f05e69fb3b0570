// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Protocol / APDU definitions for Ergo app communication
//!
//! This crate provides the wire-level command set for the
//! [Ledger Ergo application](https://github.com/LedgerHQ/app-ergo),
//! independent of any transport: the APDU command/response codec, the
//! status-word taxonomy, the protocol value types and a typed request
//! builder for every operation, including the multi-step box attestation
//! and transaction signing flows.
//!
//! Requests validate their arguments on construction so that a violation
//! of a protocol limit (chunk sizes, token counts, path lengths) fails
//! before any byte reaches a device.
//!
//! All multi-byte fields are big-endian on the wire.

use num_enum::TryFromPrimitive;
use strum::Display;

pub mod app_info;
pub mod attest;
pub mod command;
pub mod derive_address;
pub mod ext_pub_key;
pub mod response;
pub mod sign_tx;
pub mod status;
pub mod types;

mod helpers;

pub use command::ApduCommand;
pub use response::ApduResponse;
pub use status::{DeviceError, StatusWord};

/// Ergo application APDU class
pub const ERGO_APDU_CLA: u8 = 0xE0;

/// Ergo application APDU instruction codes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// Fetch application version
    GetAppVersion = 0x01,

    /// Fetch application name (must be "Ergo")
    GetAppName = 0x02,

    /// Derive an extended public key for a BIP32 path
    GetExtendedPublicKey = 0x10,

    /// Derive (and return or display) an address
    DeriveAddress = 0x11,

    /// Box attestation flow, sub-operation selected via P1
    AttestBox = 0x20,

    /// Transaction signing flow, sub-operation selected via P1
    SignTransaction = 0x21,
}

/// APDU encode / decode errors
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApduError {
    /// Command data exceeds the single-APDU ceiling
    #[error("APDU data length {0} exceeds 255 bytes")]
    DataTooLong(usize),

    /// Raw command shorter than the 4-byte header
    #[error("APDU command too short ({0} bytes)")]
    CommandTooShort(usize),

    /// Nc byte disagrees with the actual data length
    #[error("APDU length field mismatch (Nc {nc}, {actual} data bytes)")]
    LengthMismatch { nc: u8, actual: usize },

    /// Raw response shorter than the 2-byte status word
    #[error("APDU response too short ({0} bytes)")]
    ResponseTooShort(usize),

    /// Response payload has the wrong shape for the expected answer
    #[error("unexpected response payload length {0}")]
    UnexpectedLength(usize),

    /// Response payload has bytes left over after parsing
    #[error("trailing response data ({0} bytes)")]
    TrailingData(usize),
}

/// Client-side request validation errors, raised before any exchange
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Chunk payload exceeds the 255-byte APDU data ceiling
    #[error("chunk length {0} exceeds 255 bytes")]
    ChunkTooLong(usize),

    /// Derivation path length outside the legal range for the operation
    #[error("derivation path length {len} outside {min}..={max}")]
    PathLength { len: usize, min: usize, max: usize },

    /// Too many tokens for a single attestation call
    #[error("too many tokens: {0} (max {1})")]
    TooManyTokens(usize, usize),

    /// Too many distinct token ids for a single call
    #[error("too many token ids: {0} (max {1})")]
    TooManyTokenIds(usize, usize),

    /// Too many data input ids for a single call
    #[error("too many data inputs: {0} (max {1})")]
    TooManyDataInputs(usize, usize),

    /// Output token list does not fit a single APDU
    #[error("too many output tokens: {0} (max {1})")]
    TooManyOutputTokens(usize, usize),

    /// Fixed-length field constructed from a slice of the wrong size
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
