// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Protocol tests against a scripted transport
//!
//! Each test drives [DeviceHandle] over a mock transport loaded with
//! expected request bytes and canned responses, checking both the exact
//! wire encoding and the response handling.

use std::{
    collections::VecDeque,
    sync::{Mutex, Once},
};

use ledger_ergo::{
    apdu::{
        attest::{AttestBoxStart, AttestedBoxFrame},
        types::{Bip32Path, NetworkType, SessionId, TokenId, TxId, HARDENED},
        ApduCommand, ApduResponse, RequestError, StatusWord,
    },
    transport::{Exchange, TransportError},
    DeviceHandle, Error,
};

static LOG_INIT: Once = Once::new();

fn setup() {
    LOG_INIT.call_once(|| {
        let _ = simplelog::SimpleLogger::init(
            simplelog::LevelFilter::Debug,
            simplelog::Config::default(),
        );
    });
}

/// Transport scripted with (expected request, raw response) pairs
struct MockTransport {
    script: Mutex<VecDeque<(Vec<u8>, Vec<u8>)>>,
}

impl MockTransport {
    fn new(script: &[(&[u8], &[u8])]) -> Self {
        Self {
            script: Mutex::new(
                script
                    .iter()
                    .map(|(req, resp)| (req.to_vec(), resp.to_vec()))
                    .collect(),
            ),
        }
    }

    fn finished(&self) {
        assert!(self.script.lock().unwrap().is_empty(), "unconsumed exchanges");
    }
}

impl Exchange for MockTransport {
    fn open(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn exchange(&self, command: &ApduCommand) -> Result<ApduResponse, TransportError> {
        let (expected, response) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected exchange");
        assert_eq!(
            hex::encode(command.encode()),
            hex::encode(&expected),
            "request bytes mismatch"
        );
        Ok(ApduResponse::decode(response)?)
    }
}

fn handle(script: &[(&[u8], &[u8])]) -> DeviceHandle<MockTransport> {
    setup();
    DeviceHandle::from(MockTransport::new(script))
}

fn address_path() -> Bip32Path {
    Bip32Path::new(vec![44 | HARDENED, 429 | HARDENED, HARDENED, 0, 0]).unwrap()
}

/// Raw bytes of a minimal attested frame (no tokens)
fn frame_bytes(frame_count: u8, frame_index: u8) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(&[0x11; 32]); // box id
    raw.push(frame_count);
    raw.push(frame_index);
    raw.extend_from_slice(&1_000_000u64.to_be_bytes());
    raw.push(0); // token count
    raw.extend_from_slice(&[0x22; 16]); // attestation
    raw
}

#[test]
fn app_version() {
    let d = handle(&[(
        &[0xE0, 0x01, 0x00, 0x00, 0x00],
        &[0x00, 0x04, 0x01, 0x00, 0x90, 0x00],
    )]);

    let v = d.app_version().unwrap();
    assert_eq!((v.major, v.minor, v.patch, v.debug), (0, 4, 1, false));
    assert_eq!(v.to_string(), "0.4.1");

    d.transport().finished();
}

#[test]
fn app_name() {
    let d = handle(&[(
        &[0xE0, 0x02, 0x00, 0x00, 0x00],
        &[b'E', b'r', b'g', b'o', 0x90, 0x00],
    )]);

    assert_eq!(d.app_name().unwrap(), "Ergo");
    d.transport().finished();
}

#[test]
fn extended_public_key() {
    let mut request = vec![0xE0, 0x10, 0x01, 0x00, 0x09, 0x02];
    request.extend_from_slice(&(44 | HARDENED).to_be_bytes());
    request.extend_from_slice(&(429 | HARDENED).to_be_bytes());

    let mut response = vec![0x02; 33];
    response.extend_from_slice(&[0x03; 32]);
    response.extend_from_slice(&[0x90, 0x00]);

    let d = handle(&[(&request, &response)]);

    let path = Bip32Path::new(vec![44 | HARDENED, 429 | HARDENED]).unwrap();
    let k = d.extended_public_key(path, None).unwrap();
    assert_eq!(k.public_key(), &[0x02; 33]);
    assert_eq!(k.chain_code(), &[0x03; 32]);

    d.transport().finished();
}

#[test]
fn derive_address_checks_length() {
    let mut request = vec![0xE0, 0x11, 0x01, 0x01, 0x16, 0x00, 0x05];
    for i in [44 | HARDENED, 429 | HARDENED, HARDENED, 0, 0] {
        request.extend_from_slice(&i.to_be_bytes());
    }

    // 38-byte address accepted
    let mut good = vec![0xAB; 38];
    good.extend_from_slice(&[0x90, 0x00]);
    let d = handle(&[(&request, &good)]);
    let addr = d
        .derive_address(NetworkType::Mainnet, address_path(), None)
        .unwrap();
    assert_eq!(addr, vec![0xAB; 38]);
    d.transport().finished();

    // truncated address rejected
    let mut bad = vec![0xAB; 20];
    bad.extend_from_slice(&[0x90, 0x00]);
    let d = handle(&[(&request, &bad)]);
    let e = d
        .derive_address(NetworkType::Mainnet, address_path(), None)
        .unwrap_err();
    assert!(matches!(e, Error::Response(_)));
}

#[test]
fn error_status_word_is_reported() {
    let d = handle(&[(&[0xE0, 0x01, 0x00, 0x00, 0x00], &[0x69, 0x85])]);

    match d.app_version().unwrap_err() {
        Error::Device(e) => {
            assert_eq!(e.sw(), 0x6985);
            assert_eq!(e.status(), Some(StatusWord::Denied));
        }
        e => panic!("unexpected error {e}"),
    }
}

#[test]
fn oversized_chunk_fails_before_exchange() {
    // Empty script: a client-side rejection must not touch the transport
    let d = handle(&[]);

    let e = d
        .attest_add_ergo_tree_chunk(SessionId::new(1), &[0u8; 300])
        .unwrap_err();
    match e {
        Error::Request(r) => assert_eq!(r, RequestError::ChunkTooLong(300)),
        e => panic!("unexpected error {e}"),
    }

    d.transport().finished();
}

#[test]
fn attestation_flow() {
    let session = 0x21;

    let mut start_req = vec![0xE0, 0x20, 0x01, 0x01, 0x37];
    start_req.extend_from_slice(&[0x44; 32]); // tx id
    start_req.extend_from_slice(&3u16.to_be_bytes());
    start_req.extend_from_slice(&1_000_000u64.to_be_bytes());
    start_req.extend_from_slice(&10u32.to_be_bytes());
    start_req.extend_from_slice(&800_000u32.to_be_bytes());
    start_req.push(0);
    start_req.extend_from_slice(&0u32.to_be_bytes());

    let mut tree_req = vec![0xE0, 0x20, 0x02, session, 0x0A];
    tree_req.extend_from_slice(&[0x55; 10]);

    let frame = frame_bytes(1, 0);
    let mut frame_resp = frame.clone();
    frame_resp.extend_from_slice(&[0x90, 0x00]);

    let d = handle(&[
        (&start_req, &[session, 0x90, 0x00]),
        (&tree_req, &[0x01, 0x90, 0x00]),
        (&[0xE0, 0x20, 0x05, session, 0x01, 0x00], &frame_resp),
    ]);

    let req = AttestBoxStart {
        tx_id: TxId::new([0x44; 32]),
        box_index: 3,
        value: 1_000_000,
        ergo_tree_size: 10,
        creation_height: 800_000,
        token_count: 0,
        registers_size: 0,
        auth_token: None,
    };
    let s = d.attest_box_start(&req).unwrap();
    assert_eq!(s.value(), session);

    // Final chunk completes the box and yields the frame count
    let count = d.attest_add_ergo_tree_chunk(s, &[0x55; 10]).unwrap();
    assert_eq!(count, Some(1));

    let f = d.get_attested_box_frame(s, 0).unwrap();
    assert_eq!(f.frame_count(), 1);
    assert_eq!(f.frame_index(), 0);
    assert_eq!(f.value(), 1_000_000);
    assert_eq!(f.raw(), &frame[..]);

    d.transport().finished();
}

#[test]
fn chunk_response_convention() {
    let session = 0x07;
    let req = vec![0xE0, 0x20, 0x02, session, 0x01, 0xFF];

    // Empty response means the device expects more data
    let d = handle(&[(&req, &[0x90, 0x00])]);
    let s = SessionId::new(session);
    assert_eq!(d.attest_add_ergo_tree_chunk(s, &[0xFF]).unwrap(), None);
    d.transport().finished();

    // Two payload bytes fit neither convention
    let d = handle(&[(&req, &[0x01, 0x02, 0x90, 0x00])]);
    let e = d.attest_add_ergo_tree_chunk(s, &[0xFF]).unwrap_err();
    assert!(matches!(e, Error::Response(_)));
}

#[test]
fn input_frame_replay() {
    let session = 0x09;
    let s = SessionId::new(session);

    // Frame 0 carries the context extension length suffix
    let first = AttestedBoxFrame::parse(&frame_bytes(2, 0)).unwrap();
    let mut req = vec![0xE0, 0x21, 0x12, session, (first.raw().len() + 4) as u8];
    req.extend_from_slice(first.raw());
    req.extend_from_slice(&7u32.to_be_bytes());

    let d = handle(&[(&req, &[0x90, 0x00])]);
    d.add_input_box_frame(s, &first, 7).unwrap();
    d.transport().finished();

    // Later frames replay raw bytes only
    let second = AttestedBoxFrame::parse(&frame_bytes(2, 1)).unwrap();
    let mut req = vec![0xE0, 0x21, 0x12, session, second.raw().len() as u8];
    req.extend_from_slice(second.raw());

    let d = handle(&[(&req, &[0x90, 0x00])]);
    d.add_input_box_frame(s, &second, 7).unwrap();
    d.transport().finished();
}

#[test]
fn signing_flow() {
    let session = 0x0C;
    let s = SessionId::new(session);
    let signature = [0x77u8; 56];

    let mut start_req = vec![0xE0, 0x21, 0x01, 0x01, 0x16, 0x00, 0x05];
    for i in [44 | HARDENED, 429 | HARDENED, HARDENED, 0, 0] {
        start_req.extend_from_slice(&i.to_be_bytes());
    }

    let tx_req = vec![
        0xE0, 0x21, 0x10, session, 0x07, 0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x02,
    ];

    let mut ids_req = vec![0xE0, 0x21, 0x11, session, 0x20];
    ids_req.extend_from_slice(&[0x66; 32]);

    let frame = AttestedBoxFrame::parse(&frame_bytes(1, 0)).unwrap();
    let mut frame_req = vec![0xE0, 0x21, 0x12, session, (frame.raw().len() + 4) as u8];
    frame_req.extend_from_slice(frame.raw());
    frame_req.extend_from_slice(&0u32.to_be_bytes());

    let mut out_req = vec![0xE0, 0x21, 0x15, session, 0x15];
    out_req.extend_from_slice(&900_000u64.to_be_bytes());
    out_req.extend_from_slice(&10u32.to_be_bytes());
    out_req.extend_from_slice(&800_000u32.to_be_bytes());
    out_req.push(0);
    out_req.extend_from_slice(&0u32.to_be_bytes());

    let mut out_tree_req = vec![0xE0, 0x21, 0x16, session, 0x0A];
    out_tree_req.extend_from_slice(&[0x55; 10]);

    let mut sig_resp = signature.to_vec();
    sig_resp.extend_from_slice(&[0x90, 0x00]);

    let d = handle(&[
        (&start_req, &[session, 0x90, 0x00]),
        (&tx_req, &[0x90, 0x00]),
        (&ids_req, &[0x90, 0x00]),
        (&frame_req, &[0x90, 0x00]),
        (&out_req, &[0x90, 0x00]),
        (&out_tree_req, &[0x90, 0x00]),
        (&[0xE0, 0x21, 0x17, session, 0x00], &[0x90, 0x00]),
        (&[0xE0, 0x21, 0x20, session, 0x00], &sig_resp),
    ]);

    let got = d
        .start_p2pk_signing(NetworkType::Mainnet, address_path(), None)
        .unwrap();
    assert_eq!(got, s);

    d.start_transaction(s, 1, 0, 1, 2).unwrap();
    d.add_token_ids(s, &[TokenId::new([0x66; 32])]).unwrap();
    d.add_input_box_frame(s, &frame, 0).unwrap();
    d.add_output_box_start(s, 900_000, 10, 800_000, 0, 0).unwrap();
    d.add_output_box_ergo_tree_chunk(s, &[0x55; 10]).unwrap();
    d.add_output_box_miner_fee_tree(s).unwrap();

    assert_eq!(d.confirm_and_sign(s).unwrap(), signature);

    d.transport().finished();
}
