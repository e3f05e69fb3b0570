// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Status words of the Ergo application
//!
//! The value-to-name mapping is a compiled `#[repr(u16)]` enum; unknown
//! status words are carried through [`DeviceError`] numerically.

use core::fmt;

use num_enum::TryFromPrimitive;
use strum::{Display, IntoStaticStr};

/// Status word reported on success
pub const SW_OK: u16 = StatusWord::Ok as u16;

/// Named status words reported by the Ergo application
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoStaticStr, TryFromPrimitive)]
#[repr(u16)]
pub enum StatusWord {
    /// Success
    Ok = 0x9000,
    /// Denied by user
    Denied = 0x6985,
    /// Incorrect P1 or P2
    WrongP1P2 = 0x6A86,
    /// Wrong Nc, or command shorter than 5 bytes
    WrongApduDataLength = 0x6A87,
    /// Unknown instruction
    InsNotSupported = 0x6D00,
    /// Wrong command class
    ClaNotSupported = 0x6E00,
    /// Device busy
    Busy = 0xB000,
    /// Response buffer too small or too big
    WrongResponseLength = 0xB001,
    BadSessionId = 0xB002,
    WrongSubcommand = 0xB003,
    ScreensBufferOverflow = 0xB004,
    /// Device-side flow state does not allow this command
    BadState = 0xB0FF,
    BadTokenId = 0xE001,
    BadTokenValue = 0xE002,
    BadContextExtensionSize = 0xE003,
    BadDataInput = 0xE004,
    BadBoxId = 0xE005,
    BadTokenIndex = 0xE006,
    BadFrameIndex = 0xE007,
    BadInputCount = 0xE008,
    BadOutputCount = 0xE009,
    TooManyTokens = 0xE00A,
    TooManyInputs = 0xE00B,
    TooManyDataInputs = 0xE00C,
    TooManyInputFrames = 0xE00D,
    TooManyOutputs = 0xE00E,
    HasherError = 0xE00F,
    BufferError = 0xE010,
    U64Overflow = 0xE011,
    Bip32BadPath = 0xE012,
    InternalCryptoError = 0xE013,
    NotEnoughData = 0xE014,
    TooMuchData = 0xE015,
    AddressGenerationFailed = 0xE016,
    SchnorrSigningFailed = 0xE017,
    BadFrameSignature = 0xE018,
    BadNetTypeValue = 0xE019,
    SmallChunk = 0xE01A,
    Bip32FormattingFailed = 0xE101,
    AddressFormattingFailed = 0xE102,
}

impl StatusWord {
    /// Look up the name for a raw status word, if known
    pub fn name(sw: u16) -> Option<&'static str> {
        StatusWord::try_from(sw).ok().map(|s| s.into())
    }
}

/// Error reported by the device via a non-success status word
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceError {
    sw: u16,
}

impl DeviceError {
    pub fn new(sw: u16) -> Self {
        Self { sw }
    }

    /// Turn a response status word into a result
    pub fn check(sw: u16) -> Result<(), DeviceError> {
        if sw == SW_OK {
            Ok(())
        } else {
            Err(DeviceError::new(sw))
        }
    }

    /// Raw status word
    pub fn sw(&self) -> u16 {
        self.sw
    }

    /// Named status, when the value is part of the known taxonomy
    pub fn status(&self) -> Option<StatusWord> {
        StatusWord::try_from(self.sw).ok()
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match StatusWord::name(self.sw) {
            Some(name) => write!(f, "device status {:#06x} ({})", self.sw, name),
            None => write!(f, "device status {:#06x} (unknown)", self.sw),
        }
    }
}

impl std::error::Error for DeviceError {}
