// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Transaction signing APDUs (instruction `0x21`)
//!
//! The device builds the transaction incrementally: the flow declares its
//! cardinalities up front (`StartTransaction`), registers the distinct
//! token-id vocabulary, replays attested input frames, then describes the
//! outputs one by one before the on-device confirmation. The sub-operation
//! is selected via P1; every call after `StartP2pkSigning` carries the
//! session id in P2.

use crate::{
    attest::{check_chunk, AttestedBoxFrame},
    helpers::{auth_token_flag, write_auth_token},
    types::{Bip32Path, BoxId, NetworkType, SessionId, TokenId, TokenIndexValue},
    ApduCommand, Instruction, RequestError, ERGO_APDU_CLA,
};

/// Maximum distinct token ids per `AddTokenIds` call
pub const MAX_TOKEN_IDS: usize = 7;
/// Maximum data input ids per `AddDataInputs` call
pub const MAX_DATA_INPUTS: usize = 7;
/// Maximum index/value token entries per `AddOutputBoxTokens` call
/// (12 bytes each, bounded by the 255-byte APDU data ceiling)
pub const MAX_OUTPUT_TOKENS: usize = 21;

/// Signing sub-operations (P1 values)
mod p1 {
    pub const START_P2PK_SIGNING: u8 = 0x01;
    pub const START_TRANSACTION: u8 = 0x10;
    pub const ADD_TOKEN_IDS: u8 = 0x11;
    pub const ADD_INPUT_BOX_FRAME: u8 = 0x12;
    pub const ADD_INPUT_BOX_CONTEXT_EXTENSION_CHUNK: u8 = 0x13;
    pub const ADD_DATA_INPUTS: u8 = 0x14;
    pub const ADD_OUTPUT_BOX_START: u8 = 0x15;
    pub const ADD_OUTPUT_BOX_ERGO_TREE_CHUNK: u8 = 0x16;
    pub const ADD_OUTPUT_BOX_MINER_FEE_TREE: u8 = 0x17;
    pub const ADD_OUTPUT_BOX_CHANGE_TREE: u8 = 0x18;
    pub const ADD_OUTPUT_BOX_TOKENS: u8 = 0x19;
    pub const ADD_OUTPUT_BOX_REGISTERS_CHUNK: u8 = 0x1A;
    pub const CONFIRM_AND_SIGN: u8 = 0x20;
}

/// Start a P2PK signing flow for a 5-10 index path.
///
/// `DATA = network(1) || path_len(1) || index(4,BE)*len || [auth_token(4,BE)]`
///
/// The response payload is the one-byte session id for the flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartP2pkSigning {
    pub network: NetworkType,
    pub path: Bip32Path,
    pub auth_token: Option<u32>,
}

impl StartP2pkSigning {
    pub fn new(
        network: NetworkType,
        path: Bip32Path,
        auth_token: Option<u32>,
    ) -> Result<Self, RequestError> {
        path.require_address_path()?;
        Ok(Self {
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
            Instruction::SignTransaction as u8,
            p1::START_P2PK_SIGNING,
            auth_token_flag(self.auth_token),
            data,
        )
    }
}

/// Declare the transaction cardinalities.
///
/// All subsequent add-calls must match these counts exactly or the device
/// rejects the final confirmation.
///
/// `DATA = inputs(2,BE) || data_inputs(2,BE) || distinct_token_ids(1) || outputs(2,BE)`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StartTransaction {
    pub session: SessionId,
    pub inputs: u16,
    pub data_inputs: u16,
    pub distinct_token_ids: u8,
    pub outputs: u16,
}

impl StartTransaction {
    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(7);
        data.extend_from_slice(&self.inputs.to_be_bytes());
        data.extend_from_slice(&self.data_inputs.to_be_bytes());
        data.push(self.distinct_token_ids);
        data.extend_from_slice(&self.outputs.to_be_bytes());
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::START_TRANSACTION,
            self.session.value(),
            data,
        )
    }
}

/// Register the distinct token ids later referenced by index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddTokenIds {
    session: SessionId,
    ids: Vec<TokenId>,
}

impl AddTokenIds {
    pub fn new(session: SessionId, ids: &[TokenId]) -> Result<Self, RequestError> {
        if ids.len() > MAX_TOKEN_IDS {
            return Err(RequestError::TooManyTokenIds(ids.len(), MAX_TOKEN_IDS));
        }
        Ok(Self {
            session,
            ids: ids.to_vec(),
        })
    }

    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(self.ids.len() * 32);
        for id in &self.ids {
            data.extend_from_slice(id.as_bytes());
        }
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_TOKEN_IDS,
            self.session.value(),
            data,
        )
    }
}

/// Replay an attested input frame.
///
/// Frame bytes are sent exactly as the device returned them; the 4-byte
/// context extension length is appended only on frame index 0 of a box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddInputBoxFrame<'a> {
    pub session: SessionId,
    pub frame: &'a AttestedBoxFrame,
    pub content_extension_len: u32,
}

impl<'a> AddInputBoxFrame<'a> {
    pub fn new(session: SessionId, frame: &'a AttestedBoxFrame, content_extension_len: u32) -> Self {
        Self {
            session,
            frame,
            content_extension_len,
        }
    }

    pub fn apdu(&self) -> ApduCommand {
        let raw = self.frame.raw();
        let data = match self.frame.frame_index() {
            0 => {
                let mut data = Vec::with_capacity(raw.len() + 4);
                data.extend_from_slice(raw);
                data.extend_from_slice(&self.content_extension_len.to_be_bytes());
                data
            }
            _ => raw.to_vec(),
        };
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_INPUT_BOX_FRAME,
            self.session.value(),
            data,
        )
    }
}

/// Stream a chunk of an input box's context extension (<= 255 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddInputBoxContextExtensionChunk {
    session: SessionId,
    chunk: Vec<u8>,
}

impl AddInputBoxContextExtensionChunk {
    pub fn new(session: SessionId, chunk: &[u8]) -> Result<Self, RequestError> {
        check_chunk(chunk)?;
        Ok(Self {
            session,
            chunk: chunk.to_vec(),
        })
    }

    pub fn apdu(&self) -> ApduCommand {
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_INPUT_BOX_CONTEXT_EXTENSION_CHUNK,
            self.session.value(),
            self.chunk.clone(),
        )
    }
}

/// Register the transaction's data input box ids
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddDataInputs {
    session: SessionId,
    box_ids: Vec<BoxId>,
}

impl AddDataInputs {
    pub fn new(session: SessionId, box_ids: &[BoxId]) -> Result<Self, RequestError> {
        if box_ids.len() > MAX_DATA_INPUTS {
            return Err(RequestError::TooManyDataInputs(
                box_ids.len(),
                MAX_DATA_INPUTS,
            ));
        }
        Ok(Self {
            session,
            box_ids: box_ids.to_vec(),
        })
    }

    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(self.box_ids.len() * 32);
        for id in &self.box_ids {
            data.extend_from_slice(id.as_bytes());
        }
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_DATA_INPUTS,
            self.session.value(),
            data,
        )
    }
}

/// Begin an output box.
///
/// `DATA = value(8,BE) || ergo_tree_size(4,BE) || creation_height(4,BE)
///     || token_count(1) || registers_size(4,BE)`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddOutputBoxStart {
    pub session: SessionId,
    pub value: u64,
    pub ergo_tree_size: u32,
    pub creation_height: u32,
    pub token_count: u8,
    pub registers_size: u32,
}

impl AddOutputBoxStart {
    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(21);
        data.extend_from_slice(&self.value.to_be_bytes());
        data.extend_from_slice(&self.ergo_tree_size.to_be_bytes());
        data.extend_from_slice(&self.creation_height.to_be_bytes());
        data.push(self.token_count);
        data.extend_from_slice(&self.registers_size.to_be_bytes());
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_OUTPUT_BOX_START,
            self.session.value(),
            data,
        )
    }
}

/// Stream a chunk of an output's serialized ergo tree (<= 255 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddOutputBoxErgoTreeChunk {
    session: SessionId,
    chunk: Vec<u8>,
}

impl AddOutputBoxErgoTreeChunk {
    pub fn new(session: SessionId, chunk: &[u8]) -> Result<Self, RequestError> {
        check_chunk(chunk)?;
        Ok(Self {
            session,
            chunk: chunk.to_vec(),
        })
    }

    pub fn apdu(&self) -> ApduCommand {
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_OUTPUT_BOX_ERGO_TREE_CHUNK,
            self.session.value(),
            self.chunk.clone(),
        )
    }
}

/// Use the standard miner-fee tree for the current output
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddOutputBoxMinerFeeTree {
    pub session: SessionId,
}

impl AddOutputBoxMinerFeeTree {
    pub fn apdu(&self) -> ApduCommand {
        ApduCommand::empty(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_OUTPUT_BOX_MINER_FEE_TREE,
            self.session.value(),
        )
    }
}

/// Use a change tree derived from a 2-10 index path for the current output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddOutputBoxChangeTree {
    pub session: SessionId,
    pub path: Bip32Path,
}

impl AddOutputBoxChangeTree {
    pub fn new(session: SessionId, path: Bip32Path) -> Self {
        Self { session, path }
    }

    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(self.path.encoded_len());
        self.path.write(&mut data);
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_OUTPUT_BOX_CHANGE_TREE,
            self.session.value(),
            data,
        )
    }
}

/// Attach tokens to the current output, referencing the registered
/// vocabulary by index.
///
/// `DATA = (token_index(4,BE) || value(8,BE)) * n`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddOutputBoxTokens {
    session: SessionId,
    tokens: Vec<TokenIndexValue>,
}

impl AddOutputBoxTokens {
    pub fn new(session: SessionId, tokens: &[TokenIndexValue]) -> Result<Self, RequestError> {
        if tokens.len() > MAX_OUTPUT_TOKENS {
            return Err(RequestError::TooManyOutputTokens(
                tokens.len(),
                MAX_OUTPUT_TOKENS,
            ));
        }
        Ok(Self {
            session,
            tokens: tokens.to_vec(),
        })
    }

    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(self.tokens.len() * 12);
        for token in &self.tokens {
            data.extend_from_slice(&token.index.to_be_bytes());
            data.extend_from_slice(&token.value.to_be_bytes());
        }
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_OUTPUT_BOX_TOKENS,
            self.session.value(),
            data,
        )
    }
}

/// Stream a chunk of the current output's registers (<= 255 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddOutputBoxRegistersChunk {
    session: SessionId,
    chunk: Vec<u8>,
}

impl AddOutputBoxRegistersChunk {
    pub fn new(session: SessionId, chunk: &[u8]) -> Result<Self, RequestError> {
        check_chunk(chunk)?;
        Ok(Self {
            session,
            chunk: chunk.to_vec(),
        })
    }

    pub fn apdu(&self) -> ApduCommand {
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::ADD_OUTPUT_BOX_REGISTERS_CHUNK,
            self.session.value(),
            self.chunk.clone(),
        )
    }
}

/// Trigger on-device confirmation and signing.
///
/// The response payload is the opaque signature (56 bytes for P2PK). The
/// exchange blocks until the user approves or denies on the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConfirmAndSign {
    pub session: SessionId,
}

impl ConfirmAndSign {
    pub fn apdu(&self) -> ApduCommand {
        ApduCommand::empty(
            ERGO_APDU_CLA,
            Instruction::SignTransaction as u8,
            p1::CONFIRM_AND_SIGN,
            self.session.value(),
        )
    }
}
