// Copyright (c) 2024 The ledger-ergo-rs Authors

//! APDU command encoding
//!
//! Wire layout: `CLA(1) INS(1) P1(1) P2(1) [Nc(1) DATA(Nc)]`.
//!
//! The Nc byte is optional: a command built with [`ApduCommand::new`] is a
//! bare 4-byte header, while [`ApduCommand::empty`] emits an explicit
//! `Nc = 0`. Some instructions require the zero-valued length byte to be
//! present (the Ergo app does not follow the ISO 7816 reading of `Nc = 0`
//! as 256 bytes), so the distinction is preserved rather than normalised.

use crate::ApduError;

/// Maximum data length carried by a single APDU
pub const MAX_APDU_DATA: usize = 255;

/// An APDU command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApduCommand {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// First parameter byte
    pub p1: u8,
    /// Second parameter byte
    pub p2: u8,
    /// `None` = no Nc byte, `Some(d)` = `Nc = d.len()` followed by data
    data: Option<Vec<u8>>,
}

impl ApduCommand {
    /// Create a command with no data field (4-byte encoding, no Nc byte)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
        }
    }

    /// Create a command with an explicit zero-valued Nc byte and no data
    pub fn empty(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(Vec::new()),
        }
    }

    /// Create a command carrying up to [`MAX_APDU_DATA`] data bytes
    pub fn with_data(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: impl Into<Vec<u8>>,
    ) -> Result<Self, ApduError> {
        let data = data.into();
        if data.len() > MAX_APDU_DATA {
            return Err(ApduError::DataTooLong(data.len()));
        }
        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data),
        })
    }

    /// Crate-internal constructor for pre-validated data.
    ///
    /// Callers must guarantee `data.len() <= MAX_APDU_DATA`; request
    /// builders enforce this through their own argument validation.
    pub(crate) fn with_data_unchecked(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= MAX_APDU_DATA);
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data),
        }
    }

    /// Command data bytes (empty when absent)
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Value of the Nc length field
    pub fn nc(&self) -> usize {
        self.data().len()
    }

    /// Whether the encoding carries an Nc byte at all
    pub fn has_length_byte(&self) -> bool {
        self.data.is_some()
    }

    /// Encode into the APDU wire format
    pub fn encode(&self) -> Vec<u8> {
        match &self.data {
            None => vec![self.cla, self.ins, self.p1, self.p2],
            Some(d) => {
                let mut raw = Vec::with_capacity(5 + d.len());
                raw.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2, d.len() as u8]);
                raw.extend_from_slice(d);
                raw
            }
        }
    }

    /// Decode a command from raw APDU bytes
    pub fn decode(raw: &[u8]) -> Result<Self, ApduError> {
        if raw.len() < 4 {
            return Err(ApduError::CommandTooShort(raw.len()));
        }
        let (cla, ins, p1, p2) = (raw[0], raw[1], raw[2], raw[3]);
        let data = match raw.len() {
            4 => None,
            _ => {
                let nc = raw[4];
                let data = &raw[5..];
                if nc as usize != data.len() {
                    return Err(ApduError::LengthMismatch {
                        nc,
                        actual: data.len(),
                    });
                }
                Some(data.to_vec())
            }
        };
        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data,
        })
    }
}
