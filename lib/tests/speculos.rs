// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Speculos TCP transport tests against an in-process socket peer

use std::{
    io::{Read, Write},
    net::{IpAddr, Ipv4Addr, TcpListener},
    thread,
};

use ledger_ergo::{
    apdu::{app_info::AppVersionReq, ApduCommand},
    transport::{Exchange, SpeculosTransport, TcpOptions, TransportError},
};

/// Bind a listener on an ephemeral port and serve one scripted
/// request/response exchange on a background thread
fn scripted_peer(expect: Vec<u8>, respond: Vec<u8>) -> (TcpOptions, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let port = listener.local_addr().expect("no local addr").port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept failed");

        let mut len = [0u8; 4];
        stream.read_exact(&mut len).expect("read length failed");
        let len = u32::from_be_bytes(len) as usize;
        assert_eq!(len, expect.len());

        let mut request = vec![0u8; len];
        stream.read_exact(&mut request).expect("read request failed");
        assert_eq!(request, expect);

        // Length prefix counts the payload only, not the status word
        let payload_len = (respond.len() - 2) as u32;
        stream
            .write_all(&payload_len.to_be_bytes())
            .expect("write length failed");
        stream.write_all(&respond).expect("write response failed");
    });

    let opts = TcpOptions {
        addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port,
    };
    (opts, handle)
}

#[test]
fn exchange_round_trip() {
    let request = AppVersionReq.apdu();
    let (opts, peer) = scripted_peer(request.encode(), vec![0x00, 0x04, 0x01, 0x00, 0x90, 0x00]);

    let t = SpeculosTransport::new(opts);
    t.open().expect("open failed");

    let resp = t.exchange(&request).expect("exchange failed");
    assert_eq!(resp.sw(), 0x9000);
    assert_eq!(resp.data(), &[0x00, 0x04, 0x01, 0x00]);

    peer.join().expect("peer panicked");
}

#[test]
fn lifecycle_enforced() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let opts = TcpOptions {
        addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: listener.local_addr().expect("no local addr").port(),
    };

    let cmd = ApduCommand::empty(0xE0, 0x01, 0x00, 0x00);
    let t = SpeculosTransport::new(opts);

    // Exchange and close before open
    assert!(matches!(
        t.exchange(&cmd),
        Err(TransportError::NotOpen)
    ));
    assert!(matches!(t.close(), Err(TransportError::NotOpen)));

    t.open().expect("open failed");

    // Double open
    assert!(matches!(t.open(), Err(TransportError::AlreadyOpen)));

    t.close().expect("close failed");

    // Exchange, reopen and re-close after close
    assert!(matches!(t.exchange(&cmd), Err(TransportError::Closed)));
    assert!(matches!(t.open(), Err(TransportError::Closed)));
    assert!(matches!(t.close(), Err(TransportError::Closed)));
}
