// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Box attestation APDUs (instruction `0x20`)
//!
//! The device cannot hold a full box in memory, so the box is streamed in
//! (start, ergo tree chunks, tokens, register chunks — in box serialization
//! order) and handed back as attested frames that are later replayed
//! verbatim when signing. The sub-operation is selected via P1 and every
//! call after `Start` carries the session id in P2.

use byteorder::{BigEndian, ByteOrder};

use crate::{
    command::MAX_APDU_DATA,
    helpers::{auth_token_flag, write_auth_token},
    types::{BoxId, SessionId, TokenId, TokenValue, TxId},
    ApduCommand, ApduError, Instruction, RequestError, ERGO_APDU_CLA,
};

/// Maximum tokens per `AttestAddTokens` call
pub const MAX_ATTEST_TOKENS: usize = 6;
/// Maximum tokens carried by a single attested frame
pub const MAX_FRAME_TOKENS: usize = 4;
/// Length of the frame attestation tag
pub const ATTESTATION_LEN: usize = 16;

/// Attestation sub-operations (P1 values)
mod p1 {
    pub const START: u8 = 0x01;
    pub const ADD_ERGO_TREE_CHUNK: u8 = 0x02;
    pub const ADD_TOKENS: u8 = 0x03;
    pub const ADD_REGISTERS_CHUNK: u8 = 0x04;
    pub const GET_FRAME: u8 = 0x05;
}

/// Start attesting an input box.
///
/// ## Encoding
/// ```text
/// DATA = tx_id(32) || box_index(2,BE) || value(8,BE) || ergo_tree_size(4,BE)
///     || creation_height(4,BE) || token_count(1) || registers_size(4,BE)
///     || [auth_token(4,BE)]
/// ```
/// The response payload is the one-byte session id for the flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestBoxStart {
    pub tx_id: TxId,
    pub box_index: u16,
    pub value: u64,
    pub ergo_tree_size: u32,
    pub creation_height: u32,
    pub token_count: u8,
    pub registers_size: u32,
    pub auth_token: Option<u32>,
}

impl AttestBoxStart {
    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(59);
        data.extend_from_slice(self.tx_id.as_bytes());
        data.extend_from_slice(&self.box_index.to_be_bytes());
        data.extend_from_slice(&self.value.to_be_bytes());
        data.extend_from_slice(&self.ergo_tree_size.to_be_bytes());
        data.extend_from_slice(&self.creation_height.to_be_bytes());
        data.push(self.token_count);
        data.extend_from_slice(&self.registers_size.to_be_bytes());
        write_auth_token(&mut data, self.auth_token);
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::AttestBox as u8,
            p1::START,
            auth_token_flag(self.auth_token),
            data,
        )
    }
}

/// Stream a chunk of the box's serialized ergo tree (<= 255 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestAddErgoTreeChunk {
    session: SessionId,
    chunk: Vec<u8>,
}

impl AttestAddErgoTreeChunk {
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
            Instruction::AttestBox as u8,
            p1::ADD_ERGO_TREE_CHUNK,
            self.session.value(),
            self.chunk.clone(),
        )
    }
}

/// Register the box's tokens, up to [`MAX_ATTEST_TOKENS`] per call.
///
/// `DATA = (token_id(32) || value(8,BE)) * n`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestAddTokens {
    session: SessionId,
    tokens: Vec<TokenValue>,
}

impl AttestAddTokens {
    pub fn new(session: SessionId, tokens: &[TokenValue]) -> Result<Self, RequestError> {
        if tokens.len() > MAX_ATTEST_TOKENS {
            return Err(RequestError::TooManyTokens(tokens.len(), MAX_ATTEST_TOKENS));
        }
        Ok(Self {
            session,
            tokens: tokens.to_vec(),
        })
    }

    pub fn apdu(&self) -> ApduCommand {
        let mut data = Vec::with_capacity(self.tokens.len() * 40);
        for token in &self.tokens {
            data.extend_from_slice(token.id.as_bytes());
            data.extend_from_slice(&token.value.to_be_bytes());
        }
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::AttestBox as u8,
            p1::ADD_TOKENS,
            self.session.value(),
            data,
        )
    }
}

/// Stream a chunk of the box's serialized registers (<= 255 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestAddRegistersChunk {
    session: SessionId,
    chunk: Vec<u8>,
}

impl AttestAddRegistersChunk {
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
            Instruction::AttestBox as u8,
            p1::ADD_REGISTERS_CHUNK,
            self.session.value(),
            self.chunk.clone(),
        )
    }
}

/// Fetch one attested frame of a completed box
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GetAttestedBoxFrame {
    pub session: SessionId,
    pub frame_index: u8,
}

impl GetAttestedBoxFrame {
    pub fn new(session: SessionId, frame_index: u8) -> Self {
        Self {
            session,
            frame_index,
        }
    }

    pub fn apdu(&self) -> ApduCommand {
        ApduCommand::with_data_unchecked(
            ERGO_APDU_CLA,
            Instruction::AttestBox as u8,
            p1::GET_FRAME,
            self.session.value(),
            vec![self.frame_index],
        )
    }
}

pub(crate) fn check_chunk(chunk: &[u8]) -> Result<(), RequestError> {
    if chunk.len() > MAX_APDU_DATA {
        return Err(RequestError::ChunkTooLong(chunk.len()));
    }
    Ok(())
}

/// One frame of an attested box.
///
/// Produced by the device as proof that it validated the box contents.
/// The raw frame bytes are kept alongside the parsed fields: signing
/// replays them to the device unchanged via
/// [`AddInputBoxFrame`](crate::sign_tx::AddInputBoxFrame).
///
/// ## Layout
/// ```text
/// box_id(32) || frame_count(1) || frame_index(1) || value(8,BE)
/// || token_count(1) || (token_id(32) || value(8,BE)) * token_count
/// || attestation(16)
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestedBoxFrame {
    box_id: BoxId,
    frame_count: u8,
    frame_index: u8,
    value: u64,
    tokens: Vec<TokenValue>,
    attestation: [u8; ATTESTATION_LEN],
    raw: Vec<u8>,
}

impl AttestedBoxFrame {
    /// Parse a frame from a `GetAttestedBoxFrame` response payload.
    ///
    /// The payload must be consumed exactly; leftover bytes are an error.
    pub fn parse(data: &[u8]) -> Result<Self, ApduError> {
        const FIXED: usize = 32 + 1 + 1 + 8 + 1 + ATTESTATION_LEN;
        if data.len() < FIXED {
            return Err(ApduError::UnexpectedLength(data.len()));
        }

        let mut box_id = [0u8; 32];
        box_id.copy_from_slice(&data[..32]);
        let frame_count = data[32];
        let frame_index = data[33];
        let value = BigEndian::read_u64(&data[34..42]);
        let token_count = data[42] as usize;
        if token_count > MAX_FRAME_TOKENS {
            return Err(ApduError::UnexpectedLength(data.len()));
        }

        let expected = FIXED + token_count * 40;
        if data.len() > expected {
            return Err(ApduError::TrailingData(data.len() - expected));
        }
        if data.len() < expected {
            return Err(ApduError::UnexpectedLength(data.len()));
        }

        let mut tokens = Vec::with_capacity(token_count);
        let mut offset = 43;
        for _ in 0..token_count {
            let mut id = [0u8; 32];
            id.copy_from_slice(&data[offset..offset + 32]);
            let value = BigEndian::read_u64(&data[offset + 32..offset + 40]);
            tokens.push(TokenValue::new(TokenId::new(id), value));
            offset += 40;
        }

        let mut attestation = [0u8; ATTESTATION_LEN];
        attestation.copy_from_slice(&data[offset..offset + ATTESTATION_LEN]);

        Ok(Self {
            box_id: BoxId::new(box_id),
            frame_count,
            frame_index,
            value,
            tokens,
            attestation,
            raw: data.to_vec(),
        })
    }

    pub fn box_id(&self) -> &BoxId {
        &self.box_id
    }

    /// Total frames making up this box
    pub fn frame_count(&self) -> u8 {
        self.frame_count
    }

    /// Index of this frame within `0..frame_count`
    pub fn frame_index(&self) -> u8 {
        self.frame_index
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn tokens(&self) -> &[TokenValue] {
        &self.tokens
    }

    pub fn attestation(&self) -> &[u8; ATTESTATION_LEN] {
        &self.attestation
    }

    /// Raw frame bytes exactly as returned by the device
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}
