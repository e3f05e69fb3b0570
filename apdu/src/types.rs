// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Protocol value types
//!
//! All byte-array fields are copied on construction; the types are
//! immutable after that and accessors hand out borrows only.

use core::fmt;

use num_enum::TryFromPrimitive;
use strum::Display;

use crate::{ApduError, RequestError};

/// Bit marking a derivation index as hardened
pub const HARDENED: u32 = 0x8000_0000;

/// Minimum derivation path length accepted by the app
pub const MIN_PATH_LEN: usize = 2;
/// Maximum derivation path length accepted by the app
pub const MAX_PATH_LEN: usize = 10;
/// Minimum path length for address-level operations
pub const MIN_ADDRESS_PATH_LEN: usize = 5;

/// Ergo network type byte
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, TryFromPrimitive)]
#[repr(u8)]
pub enum NetworkType {
    Mainnet = 0x00,
    Testnet = 0x10,
}

/// Opaque per-flow session handle returned by the device.
///
/// Echoed as P2 on every follow-up command of the flow that created it.
/// Any error during the flow invalidates the handle; the flow must then be
/// restarted from its `...Start` command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SessionId(u8);

impl SessionId {
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for SessionId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

macro_rules! id32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $name([u8; 32]);

        impl $name {
            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = RequestError;

            fn try_from(bytes: &[u8]) -> Result<Self, RequestError> {
                let arr: [u8; 32] =
                    bytes
                        .try_into()
                        .map_err(|_| RequestError::InvalidLength {
                            expected: 32,
                            actual: bytes.len(),
                        })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }
    };
}

id32!(
    /// 32-byte token identifier
    TokenId
);
id32!(
    /// 32-byte box identifier
    BoxId
);
id32!(
    /// 32-byte transaction identifier
    TxId
);

/// A token id paired with an unsigned 64-bit amount
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TokenValue {
    pub id: TokenId,
    pub value: u64,
}

impl TokenValue {
    pub fn new(id: TokenId, value: u64) -> Self {
        Self { id, value }
    }
}

/// An index into a previously registered token-id vocabulary, paired with
/// an amount (used for outputs, avoiding re-sending 32-byte ids)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TokenIndexValue {
    pub index: u32,
    pub value: u64,
}

impl TokenIndexValue {
    pub fn new(index: u32, value: u64) -> Self {
        Self { index, value }
    }
}

/// A validated BIP32 derivation path of 2-10 unsigned 32-bit indices
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bip32Path(Vec<u32>);

impl Bip32Path {
    /// Build a path, requiring 2-10 indices
    pub fn new(indices: impl Into<Vec<u32>>) -> Result<Self, RequestError> {
        let indices = indices.into();
        if indices.len() < MIN_PATH_LEN || indices.len() > MAX_PATH_LEN {
            return Err(RequestError::PathLength {
                len: indices.len(),
                min: MIN_PATH_LEN,
                max: MAX_PATH_LEN,
            });
        }
        Ok(Self(indices))
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the path is deep enough for address-level operations (>= 5)
    pub fn is_address_path(&self) -> bool {
        self.0.len() >= MIN_ADDRESS_PATH_LEN
    }

    /// Check the 5-10 requirement of address-level operations
    pub(crate) fn require_address_path(&self) -> Result<(), RequestError> {
        if !self.is_address_path() {
            return Err(RequestError::PathLength {
                len: self.0.len(),
                min: MIN_ADDRESS_PATH_LEN,
                max: MAX_PATH_LEN,
            });
        }
        Ok(())
    }

    /// Encoded size: length byte plus four bytes per index
    pub(crate) fn encoded_len(&self) -> usize {
        1 + self.0.len() * 4
    }

    /// Append `len(1) || index(4,BE)*len`
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.push(self.0.len() as u8);
        for index in &self.0 {
            buf.extend_from_slice(&index.to_be_bytes());
        }
    }
}

impl fmt::Display for Bip32Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for index in &self.0 {
            match index & HARDENED {
                0 => write!(f, "/{index}")?,
                _ => write!(f, "/{}'", index & !HARDENED)?,
            }
        }
        Ok(())
    }
}

/// Extended public key: 33-byte compressed public key plus 32-byte chain code
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    public_key: [u8; 33],
    chain_code: [u8; 32],
}

impl ExtendedPublicKey {
    /// Parse the 65-byte get-extended-public-key response payload
    pub fn parse(data: &[u8]) -> Result<Self, ApduError> {
        if data.len() != 65 {
            return Err(ApduError::UnexpectedLength(data.len()));
        }
        let mut public_key = [0u8; 33];
        let mut chain_code = [0u8; 32];
        public_key.copy_from_slice(&data[..33]);
        chain_code.copy_from_slice(&data[33..]);
        Ok(Self {
            public_key,
            chain_code,
        })
    }

    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }
}

impl fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPublicKey")
            .field("public_key", &hex::encode(self.public_key))
            .field("chain_code", &hex::encode(self.chain_code))
            .finish()
    }
}

/// Application version reported by the get-version command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AppVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    /// Set when the app is a debug build (flag byte 0x01)
    pub debug: bool,
}

impl AppVersion {
    /// Parse the 4-byte get-version response payload
    pub fn parse(data: &[u8]) -> Result<Self, ApduError> {
        if data.len() < 4 {
            return Err(ApduError::UnexpectedLength(data.len()));
        }
        Ok(Self {
            major: data[0],
            minor: data[1],
            patch: data[2],
            debug: data[3] == 0x01,
        })
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.debug {
            f.write_str("-debug")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_length_limits() {
        assert!(Bip32Path::new(vec![44]).is_err());
        assert!(Bip32Path::new(vec![0u32; 11]).is_err());
        assert!(Bip32Path::new(vec![44, 429]).is_ok());
        assert!(Bip32Path::new(vec![0u32; 10]).is_ok());
    }

    #[test]
    fn address_path_requires_five_indices() {
        let short = Bip32Path::new(vec![44 | HARDENED, 429 | HARDENED]).unwrap();
        assert!(!short.is_address_path());
        assert_eq!(
            short.require_address_path(),
            Err(RequestError::PathLength {
                len: 2,
                min: 5,
                max: 10
            })
        );

        let full =
            Bip32Path::new(vec![44 | HARDENED, 429 | HARDENED, HARDENED, 0, 0]).unwrap();
        assert!(full.is_address_path());
        assert_eq!(full.require_address_path(), Ok(()));
    }

    #[test]
    fn path_encoding() {
        let path = Bip32Path::new(vec![44 | HARDENED, 2]).unwrap();
        let mut buf = Vec::new();
        path.write(&mut buf);
        assert_eq!(buf, &[0x02, 0x80, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(buf.len(), path.encoded_len());
    }

    #[test]
    fn path_display() {
        let path = Bip32Path::new(vec![44 | HARDENED, 429 | HARDENED, HARDENED, 0, 1]).unwrap();
        assert_eq!(path.to_string(), "m/44'/429'/0'/0/1");
    }

    #[test]
    fn token_id_from_slice() {
        assert!(TokenId::try_from(&[0u8; 32][..]).is_ok());
        assert_eq!(
            TokenId::try_from(&[0u8; 31][..]),
            Err(RequestError::InvalidLength {
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn extended_public_key_parse() {
        let mut data = [0u8; 65];
        data[0] = 0x02;
        data[64] = 0xff;
        let k = ExtendedPublicKey::parse(&data).unwrap();
        assert_eq!(k.public_key()[0], 0x02);
        assert_eq!(k.chain_code()[31], 0xff);

        assert_eq!(
            ExtendedPublicKey::parse(&data[..64]),
            Err(ApduError::UnexpectedLength(64))
        );
    }

    #[test]
    fn app_version_parse() {
        let v = AppVersion::parse(&[0, 1, 2, 1]).unwrap();
        assert_eq!(
            v,
            AppVersion {
                major: 0,
                minor: 1,
                patch: 2,
                debug: true
            }
        );
        assert_eq!(v.to_string(), "0.1.2-debug");
        assert_eq!(
            AppVersion::parse(&[1, 2]),
            Err(ApduError::UnexpectedLength(2))
        );
    }

    #[test]
    fn network_type_bytes() {
        assert_eq!(NetworkType::Mainnet as u8, 0x00);
        assert_eq!(NetworkType::Testnet as u8, 0x10);
        assert_eq!(NetworkType::try_from(0x10), Ok(NetworkType::Testnet));
        assert!(NetworkType::try_from(0x01).is_err());
    }
}
