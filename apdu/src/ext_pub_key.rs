// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Extended public key APDU
//!
//! ## Encoding
//! ```text
//! P1 = 0x01 (no auth token) / 0x02 (auth token present), P2 = 0x00
//! DATA = path_len(1) || index(4,BE) * path_len || [auth_token(4,BE)]
//! ```
//! The response payload is 65 bytes: a 33-byte compressed public key
//! followed by a 32-byte chain code.

use crate::{
    helpers::{auth_token_flag, write_auth_token},
    types::Bip32Path,
    ApduCommand, Instruction, ERGO_APDU_CLA,
};

/// Derive an extended public key for a 2-10 index path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtPubKeyReq {
    pub path: Bip32Path,
    pub auth_token: Option<u32>,
}

impl ExtPubKeyReq {
    pub fn new(path: Bip32Path, auth_token: Option<u32>) -> Self {
        Self { path, auth_token }
    }

    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(self.path.encoded_len() + 4);
        self.path.write(&mut data);
        write_auth_token(&mut data, self.auth_token);
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::GetExtendedPublicKey as u8,
            auth_token_flag(self.auth_token),
            0x00,
            data,
        )
    }
}
