// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Address derivation APDU
//!
//! ## Encoding
//! ```text
//! P1 = action (0x01 return / 0x02 display)
//! P2 = 0x01 (no auth token) / 0x02 (auth token present)
//! DATA = network(1) || path_len(1) || index(4,BE) * path_len || [auth_token(4,BE)]
//! ```
//! With the return action the response payload is the 38-byte address;
//! with the display action the device shows the address on screen and the
//! payload is empty.

use crate::{
    helpers::{auth_token_flag, write_auth_token},
    types::{Bip32Path, NetworkType},
    ApduCommand, Instruction, RequestError, ERGO_APDU_CLA,
};

/// Length of a returned P2PK address
pub const ADDRESS_LEN: usize = 38;

/// What the device does with the derived address
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DerivationAction {
    /// Return the address bytes to the host
    Return = 0x01,
    /// Show the address on the device screen, return nothing
    Display = 0x02,
}

/// Derive an address for a 5-10 index path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeriveAddressReq {
    pub action: DerivationAction,
    pub network: NetworkType,
    pub path: Bip32Path,
    pub auth_token: Option<u32>,
}

impl DeriveAddressReq {
    pub fn new(
        action: DerivationAction,
        network: NetworkType,
        path: Bip32Path,
        auth_token: Option<u32>,
    ) -> Result<Self, RequestError> {
        path.require_address_path()?;
        Ok(Self {
            action,
            network,
            path,
            auth_token,
        })
    }

    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(1 + self.path.encoded_len() + 4);
        data.push(self.network as u8);
        self.path.write(&mut data);
        write_auth_token(&mut data, self.auth_token);
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::DeriveAddress as u8,
            self.action as u8,
            auth_token_flag(self.auth_token),
            data,
        )
    }
}
