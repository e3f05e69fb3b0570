// Copyright (c) 2024 The ledger-ergo-rs Authors

//! APDU response decoding
//!
//! Wire layout: `DATA(n) SW1(1) SW2(1)`. Anything shorter than the status
//! word is a hard decode failure, not a protocol error.

use crate::ApduError;

/// An APDU response: payload bytes followed by a 2-byte status word
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApduResponse {
    raw: Vec<u8>,
}

impl ApduResponse {
    /// Decode a response from raw bytes, requiring at least the status word
    pub fn decode(raw: impl Into<Vec<u8>>) -> Result<Self, ApduError> {
        let raw = raw.into();
        if raw.len() < 2 {
            return Err(ApduError::ResponseTooShort(raw.len()));
        }
        Ok(Self { raw })
    }

    /// Build a response from payload and status word (mock / test peers)
    pub fn from_parts(data: &[u8], sw: u16) -> Self {
        let mut raw = Vec::with_capacity(data.len() + 2);
        raw.extend_from_slice(data);
        raw.extend_from_slice(&sw.to_be_bytes());
        Self { raw }
    }

    /// Status word, big-endian from the trailing two bytes
    pub fn sw(&self) -> u16 {
        u16::from_be_bytes([self.raw[self.raw.len() - 2], self.raw[self.raw.len() - 1]])
    }

    /// Payload bytes preceding the status word
    pub fn data(&self) -> &[u8] {
        &self.raw[..self.raw.len() - 2]
    }

    /// Full raw response including the status word
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_short_response() {
        assert_eq!(
            ApduResponse::decode(vec![0x90]),
            Err(ApduError::ResponseTooShort(1))
        );
        assert_eq!(
            ApduResponse::decode(Vec::new()),
            Err(ApduError::ResponseTooShort(0))
        );
    }

    #[test]
    fn status_word_only() {
        let resp = ApduResponse::decode(vec![0x90, 0x00]).unwrap();
        assert_eq!(resp.sw(), 0x9000);
        assert!(resp.data().is_empty());
    }

    #[test]
    fn data_precedes_status_word() {
        let resp = ApduResponse::decode(vec![0x01, 0x02, 0x03, 0x69, 0x85]).unwrap();
        assert_eq!(resp.sw(), 0x6985);
        assert_eq!(resp.data(), &[0x01, 0x02, 0x03]);
        assert_eq!(resp.raw().len(), 5);
    }

    #[test]
    fn from_parts_round_trip() {
        let resp = ApduResponse::from_parts(&[0xaa, 0xbb], 0x9000);
        assert_eq!(
            ApduResponse::decode(resp.raw().to_vec()).unwrap(),
            resp
        );
    }
}
