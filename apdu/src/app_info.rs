// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Application information APDUs

use crate::{ApduCommand, Instruction, ERGO_APDU_CLA};

/// Fetch application version APDU.
///
/// Carries an explicit zero-valued Nc byte; the app rejects the 4-byte
/// header-only form.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct AppVersionReq;

impl AppVersionReq {
    pub fn apdu(&self) -> ApduCommand {
        ApduCommand::empty(ERGO_APDU_CLA, Instruction::GetAppVersion as u8, 0x00, 0x00)
    }
}

/// Fetch application name APDU (the Ergo app answers "Ergo")
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct AppNameReq;

impl AppNameReq {
    pub fn apdu(&self) -> ApduCommand {
        ApduCommand::empty(ERGO_APDU_CLA, Instruction::GetAppName as u8, 0x00, 0x00)
    }
}
