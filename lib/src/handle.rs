// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Handle for connected ledger devices
//!
//! [DeviceHandle] wraps a transport and exposes one typed method per
//! Ergo app operation, parsing responses and turning non-success status
//! words into errors. The attestation and signing flows are sequences of
//! these methods keyed by a device-issued session id; any error within a
//! flow invalidates the session on the device, so callers restart from
//! the corresponding start call.

use log::{debug, trace};

use ledger_ergo_apdu::{
    app_info::{AppNameReq, AppVersionReq},
    attest::{
        AttestAddErgoTreeChunk, AttestAddRegistersChunk, AttestAddTokens, AttestBoxStart,
        AttestedBoxFrame, GetAttestedBoxFrame,
    },
    derive_address::{DerivationAction, DeriveAddressReq, ADDRESS_LEN},
    ext_pub_key::ExtPubKeyReq,
    sign_tx::{
        AddDataInputs, AddInputBoxContextExtensionChunk, AddInputBoxFrame, AddOutputBoxChangeTree,
        AddOutputBoxErgoTreeChunk, AddOutputBoxMinerFeeTree, AddOutputBoxRegistersChunk,
        AddOutputBoxStart, AddOutputBoxTokens, AddTokenIds, ConfirmAndSign, StartP2pkSigning,
        StartTransaction,
    },
    types::{
        AppVersion, Bip32Path, BoxId, ExtendedPublicKey, NetworkType, SessionId, TokenId,
        TokenIndexValue, TokenValue,
    },
    ApduCommand, ApduError, ApduResponse, DeviceError, Instruction,
};

use crate::{transport::Exchange, Error};

/// Ergo handle for a connected ledger device.
///
/// Generic over [Exchange] to support different underlying transports.
pub struct DeviceHandle<T: Exchange> {
    t: T,
}

/// Create a [DeviceHandle] wrapper from a type implementing [Exchange]
impl<T: Exchange> From<T> for DeviceHandle<T> {
    fn from(t: T) -> Self {
        Self { t }
    }
}

impl<T: Exchange> DeviceHandle<T> {
    /// Access the underlying transport
    pub fn transport(&self) -> &T {
        &self.t
    }

    /// Perform one exchange, mapping error status words to [Error]
    fn exchange(&self, command: &ApduCommand) -> Result<ApduResponse, Error> {
        match Instruction::try_from(command.ins) {
            Ok(ins) => trace!("exchange {ins} (p1 {:#04x}, p2 {:#04x})", command.p1, command.p2),
            Err(_) => trace!("exchange ins {:#04x}", command.ins),
        }

        let resp = self.t.exchange(command)?;
        DeviceError::check(resp.sw())?;
        Ok(resp)
    }

    /// Fetch the app version
    pub fn app_version(&self) -> Result<AppVersion, Error> {
        debug!("Requesting app version");

        let resp = self.exchange(&AppVersionReq.apdu())?;
        Ok(AppVersion::parse(resp.data())?)
    }

    /// Fetch the app name (the Ergo app answers "Ergo")
    pub fn app_name(&self) -> Result<String, Error> {
        debug!("Requesting app name");

        let resp = self.exchange(&AppNameReq.apdu())?;
        Ok(String::from_utf8_lossy(resp.data()).into_owned())
    }

    /// Derive the extended public key for a 2-10 index path.
    /// Without an auth token the device asks the user to confirm.
    pub fn extended_public_key(
        &self,
        path: Bip32Path,
        auth_token: Option<u32>,
    ) -> Result<ExtendedPublicKey, Error> {
        debug!("Requesting extended public key for {path}");

        let resp = self.exchange(&ExtPubKeyReq::new(path, auth_token).apdu())?;
        Ok(ExtendedPublicKey::parse(resp.data())?)
    }

    /// Derive an address for a 5-10 index path and return its bytes
    pub fn derive_address(
        &self,
        network: NetworkType,
        path: Bip32Path,
        auth_token: Option<u32>,
    ) -> Result<Vec<u8>, Error> {
        debug!("Deriving {network:?} address for {path}");

        let req = DeriveAddressReq::new(DerivationAction::Return, network, path, auth_token)?;
        let resp = self.exchange(&req.apdu())?;

        if resp.data().len() != ADDRESS_LEN {
            return Err(ApduError::UnexpectedLength(resp.data().len()).into());
        }

        Ok(resp.data().to_vec())
    }

    /// Derive an address for a 5-10 index path and show it on the
    /// device screen. Blocks until the user confirms or rejects.
    pub fn show_address(
        &self,
        network: NetworkType,
        path: Bip32Path,
        auth_token: Option<u32>,
    ) -> Result<(), Error> {
        debug!("Showing {network:?} address for {path}");

        let req = DeriveAddressReq::new(DerivationAction::Display, network, path, auth_token)?;
        self.exchange(&req.apdu())?;

        Ok(())
    }

    /// Start attesting an input box, returning the session id for the
    /// rest of the flow
    pub fn attest_box_start(&self, req: &AttestBoxStart) -> Result<SessionId, Error> {
        debug!("Starting box attestation");

        let resp = self.exchange(&req.apdu())?;
        Ok(SessionId::new(single_byte(resp.data())?))
    }

    /// Stream one ergo tree chunk to an attestation session.
    /// Returns the frame count once the device has the whole box.
    pub fn attest_add_ergo_tree_chunk(
        &self,
        session: SessionId,
        chunk: &[u8],
    ) -> Result<Option<u8>, Error> {
        debug!("Attest session {session}: ergo tree chunk ({} bytes)", chunk.len());

        let resp = self.exchange(&AttestAddErgoTreeChunk::new(session, chunk)?.apdu())?;
        empty_or_frame_count(resp.data())
    }

    /// Register tokens with an attestation session.
    /// Returns the frame count once the device has the whole box.
    pub fn attest_add_tokens(
        &self,
        session: SessionId,
        tokens: &[TokenValue],
    ) -> Result<Option<u8>, Error> {
        debug!("Attest session {session}: {} tokens", tokens.len());

        let resp = self.exchange(&AttestAddTokens::new(session, tokens)?.apdu())?;
        empty_or_frame_count(resp.data())
    }

    /// Stream one registers chunk to an attestation session.
    /// Returns the frame count once the device has the whole box.
    pub fn attest_add_registers_chunk(
        &self,
        session: SessionId,
        chunk: &[u8],
    ) -> Result<Option<u8>, Error> {
        debug!("Attest session {session}: registers chunk ({} bytes)", chunk.len());

        let resp = self.exchange(&AttestAddRegistersChunk::new(session, chunk)?.apdu())?;
        empty_or_frame_count(resp.data())
    }

    /// Fetch one attested frame of a completed box
    pub fn get_attested_box_frame(
        &self,
        session: SessionId,
        frame_index: u8,
    ) -> Result<AttestedBoxFrame, Error> {
        debug!("Attest session {session}: fetching frame {frame_index}");

        let resp = self.exchange(&GetAttestedBoxFrame::new(session, frame_index).apdu())?;
        Ok(AttestedBoxFrame::parse(resp.data())?)
    }

    /// Start a P2PK signing flow, returning the session id for the
    /// rest of the flow
    pub fn start_p2pk_signing(
        &self,
        network: NetworkType,
        path: Bip32Path,
        auth_token: Option<u32>,
    ) -> Result<SessionId, Error> {
        debug!("Starting P2PK signing for {path}");

        let req = StartP2pkSigning::new(network, path, auth_token)?;
        let resp = self.exchange(&req.apdu())?;
        Ok(SessionId::new(single_byte(resp.data())?))
    }

    /// Declare the transaction cardinalities for a signing session
    pub fn start_transaction(
        &self,
        session: SessionId,
        inputs: u16,
        data_inputs: u16,
        distinct_token_ids: u8,
        outputs: u16,
    ) -> Result<(), Error> {
        debug!(
            "Sign session {session}: {inputs} inputs, {data_inputs} data inputs, \
             {distinct_token_ids} token ids, {outputs} outputs"
        );

        let req = StartTransaction {
            session,
            inputs,
            data_inputs,
            distinct_token_ids,
            outputs,
        };
        self.exchange(&req.apdu())?;

        Ok(())
    }

    /// Register distinct token ids with a signing session, up to seven
    /// per call
    pub fn add_token_ids(&self, session: SessionId, ids: &[TokenId]) -> Result<(), Error> {
        debug!("Sign session {session}: {} token ids", ids.len());

        self.exchange(&AddTokenIds::new(session, ids)?.apdu())?;
        Ok(())
    }

    /// Replay one attested input frame into a signing session.
    /// The context extension length rides along with frame index 0.
    pub fn add_input_box_frame(
        &self,
        session: SessionId,
        frame: &AttestedBoxFrame,
        content_extension_len: u32,
    ) -> Result<(), Error> {
        debug!(
            "Sign session {session}: input frame {}/{}",
            frame.frame_index(),
            frame.frame_count()
        );

        let req = AddInputBoxFrame::new(session, frame, content_extension_len);
        self.exchange(&req.apdu())?;

        Ok(())
    }

    /// Stream one context extension chunk for the current input
    pub fn add_input_box_context_extension_chunk(
        &self,
        session: SessionId,
        chunk: &[u8],
    ) -> Result<(), Error> {
        debug!(
            "Sign session {session}: context extension chunk ({} bytes)",
            chunk.len()
        );

        let req = AddInputBoxContextExtensionChunk::new(session, chunk)?;
        self.exchange(&req.apdu())?;

        Ok(())
    }

    /// Register data input box ids with a signing session, up to seven
    /// per call
    pub fn add_data_inputs(&self, session: SessionId, box_ids: &[BoxId]) -> Result<(), Error> {
        debug!("Sign session {session}: {} data inputs", box_ids.len());

        self.exchange(&AddDataInputs::new(session, box_ids)?.apdu())?;
        Ok(())
    }

    /// Begin an output box in a signing session
    pub fn add_output_box_start(
        &self,
        session: SessionId,
        value: u64,
        ergo_tree_size: u32,
        creation_height: u32,
        token_count: u8,
        registers_size: u32,
    ) -> Result<(), Error> {
        debug!("Sign session {session}: output box (value {value})");

        let req = AddOutputBoxStart {
            session,
            value,
            ergo_tree_size,
            creation_height,
            token_count,
            registers_size,
        };
        self.exchange(&req.apdu())?;

        Ok(())
    }

    /// Stream one ergo tree chunk for the current output
    pub fn add_output_box_ergo_tree_chunk(
        &self,
        session: SessionId,
        chunk: &[u8],
    ) -> Result<(), Error> {
        debug!("Sign session {session}: output tree chunk ({} bytes)", chunk.len());

        let req = AddOutputBoxErgoTreeChunk::new(session, chunk)?;
        self.exchange(&req.apdu())?;

        Ok(())
    }

    /// Use the standard miner-fee tree for the current output
    pub fn add_output_box_miner_fee_tree(&self, session: SessionId) -> Result<(), Error> {
        debug!("Sign session {session}: miner fee output");

        self.exchange(&AddOutputBoxMinerFeeTree { session }.apdu())?;
        Ok(())
    }

    /// Use a change tree derived from a 2-10 index path for the
    /// current output
    pub fn add_output_box_change_tree(
        &self,
        session: SessionId,
        path: Bip32Path,
    ) -> Result<(), Error> {
        debug!("Sign session {session}: change output for {path}");

        self.exchange(&AddOutputBoxChangeTree::new(session, path).apdu())?;
        Ok(())
    }

    /// Attach tokens to the current output by vocabulary index
    pub fn add_output_box_tokens(
        &self,
        session: SessionId,
        tokens: &[TokenIndexValue],
    ) -> Result<(), Error> {
        debug!("Sign session {session}: {} output tokens", tokens.len());

        self.exchange(&AddOutputBoxTokens::new(session, tokens)?.apdu())?;
        Ok(())
    }

    /// Stream one registers chunk for the current output
    pub fn add_output_box_registers_chunk(
        &self,
        session: SessionId,
        chunk: &[u8],
    ) -> Result<(), Error> {
        debug!(
            "Sign session {session}: output registers chunk ({} bytes)",
            chunk.len()
        );

        let req = AddOutputBoxRegistersChunk::new(session, chunk)?;
        self.exchange(&req.apdu())?;

        Ok(())
    }

    /// Trigger on-device confirmation and return the signature bytes.
    /// Blocks until the user approves or rejects on the device.
    pub fn confirm_and_sign(&self, session: SessionId) -> Result<Vec<u8>, Error> {
        debug!("Sign session {session}: confirm and sign");

        let resp = self.exchange(&ConfirmAndSign { session }.apdu())?;
        Ok(resp.data().to_vec())
    }
}

/// Parse a response that must be exactly one byte
fn single_byte(data: &[u8]) -> Result<u8, Error> {
    match data {
        [b] => Ok(*b),
        _ => Err(ApduError::UnexpectedLength(data.len()).into()),
    }
}

/// Parse the streaming-call response convention: empty while the device
/// expects more data, one byte (the frame count) once the box is complete
fn empty_or_frame_count(data: &[u8]) -> Result<Option<u8>, Error> {
    match data {
        [] => Ok(None),
        [count] => Ok(Some(*count)),
        _ => Err(ApduError::UnexpectedLength(data.len()).into()),
    }
}
