// Copyright (c) 2024 The ledger-ergo-rs Authors

//! USB HID transport for physical Ledger devices
//!
//! APDUs are carried over 64-byte HID reports:
//!
//! `channel(2,BE) || tag(1) || sequence(2,BE) || [length(2,BE)] || payload`
//!
//! The two-byte total length appears only in the first packet of a
//! message (sequence 0). Packets are zero padded to 64 bytes, and each
//! write is prefixed with the 0x00 report id for a 65-byte buffer. The
//! channel id is chosen at random per transport instance so concurrent
//! clients can tell their traffic apart.

use std::{
    ffi::CString,
    sync::{Arc, Mutex},
};

use hidapi::{HidApi, HidDevice};
use ledger_ergo_apdu::{ApduCommand, ApduResponse};
use log::trace;
use rand::random;

use super::{Connection, Exchange, TransportError};

/// HID packet size
pub const HID_PACKET_SIZE: usize = 64;

/// Tag for APDU packets
const TAG_APDU: u8 = 0x05;

/// Payload bytes in continuation packets (first packet carries two fewer)
const NEXT_PACKET_PAYLOAD: usize = HID_PACKET_SIZE - 5;

/// Pick a per-instance channel id, never 0: a locked device answers on
/// channel 0, which must stay distinguishable as a mismatch
fn random_channel() -> u16 {
    random::<u16>().max(1)
}

/// Split a message into HID packets for the given channel.
///
/// Always emits at least one packet so zero-length messages still
/// produce a sequence-0 packet carrying the length field.
fn frame_packets(channel: u16, payload: &[u8]) -> Vec<[u8; HID_PACKET_SIZE]> {
    let mut packets = Vec::with_capacity(1 + payload.len() / NEXT_PACKET_PAYLOAD);
    let mut offset = 0;
    let mut seq = 0u16;

    loop {
        let mut packet = [0u8; HID_PACKET_SIZE];
        packet[..2].copy_from_slice(&channel.to_be_bytes());
        packet[2] = TAG_APDU;
        packet[3..5].copy_from_slice(&seq.to_be_bytes());

        let body = if seq == 0 {
            packet[5..7].copy_from_slice(&(payload.len() as u16).to_be_bytes());
            &mut packet[7..]
        } else {
            &mut packet[5..]
        };

        let n = body.len().min(payload.len() - offset);
        body[..n].copy_from_slice(&payload[offset..offset + n]);
        offset += n;

        packets.push(packet);

        if offset == payload.len() {
            break;
        }
        seq += 1;
    }

    packets
}

/// Incremental reassembly of a framed response.
///
/// Feed packets in arrival order; completion yields the message bytes.
struct Reassembler {
    channel: u16,
    expected_seq: u16,
    total: usize,
    buf: Vec<u8>,
}

impl Reassembler {
    fn new(channel: u16) -> Self {
        Self {
            channel,
            expected_seq: 0,
            total: 0,
            buf: Vec::new(),
        }
    }

    /// Consume one packet, returning the full message once complete
    fn push(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        if packet.len() < 5 {
            return Err(TransportError::ShortPacket(packet.len()));
        }

        let channel = u16::from_be_bytes([packet[0], packet[1]]);
        if channel != self.channel {
            return Err(TransportError::ChannelMismatch {
                expected: self.channel,
                actual: channel,
            });
        }

        if packet[2] != TAG_APDU {
            return Err(TransportError::BadTag(packet[2]));
        }

        let seq = u16::from_be_bytes([packet[3], packet[4]]);
        if seq != self.expected_seq {
            return Err(TransportError::BadSequence {
                expected: self.expected_seq,
                actual: seq,
            });
        }

        let body = if seq == 0 {
            if packet.len() < 7 {
                return Err(TransportError::ShortPacket(packet.len()));
            }
            self.total = u16::from_be_bytes([packet[5], packet[6]]) as usize;
            &packet[7..]
        } else {
            &packet[5..]
        };

        let n = body.len().min(self.total - self.buf.len());
        self.buf.extend_from_slice(&body[..n]);
        self.expected_seq += 1;

        if self.buf.len() == self.total {
            Ok(Some(std::mem::take(&mut self.buf)))
        } else {
            Ok(None)
        }
    }
}

/// USB HID transport for a single Ledger device
pub struct HidTransport {
    api: Arc<Mutex<HidApi>>,
    path: CString,
    channel: u16,
    state: Mutex<Connection<HidDevice>>,
}

impl HidTransport {
    /// Create a transport for the device at the given HID path.
    /// No connection is made until [Exchange::open].
    pub(crate) fn new(api: Arc<Mutex<HidApi>>, path: CString) -> Self {
        Self {
            api,
            path,
            channel: random_channel(),
            state: Mutex::new(Connection::Unopened),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Connection<HidDevice>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Exchange for HidTransport {
    fn open(&self) -> Result<(), TransportError> {
        let mut state = self.lock_state();
        match *state {
            Connection::Unopened => (),
            Connection::Open(_) => return Err(TransportError::AlreadyOpen),
            Connection::Closed => return Err(TransportError::Closed),
        }

        let api = self.api.lock().unwrap_or_else(|e| e.into_inner());
        let device = api.open_path(&self.path)?;
        *state = Connection::Open(device);

        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut state = self.lock_state();
        state.get()?;
        *state = Connection::Closed;
        Ok(())
    }

    fn exchange(&self, command: &ApduCommand) -> Result<ApduResponse, TransportError> {
        // Lock spans the write and the matching read so exchanges
        // from other threads cannot interleave
        let state = self.lock_state();
        let device = state.get()?;

        let request = command.encode();
        trace!("HID write: {}", hex::encode(&request));

        // Report id 0x00 precedes each 64-byte packet
        let mut report = [0u8; HID_PACKET_SIZE + 1];
        for packet in frame_packets(self.channel, &request) {
            report[1..].copy_from_slice(&packet);
            device.write(&report)?;
        }

        let mut reassembler = Reassembler::new(self.channel);
        let mut packet = [0u8; HID_PACKET_SIZE];
        let raw = loop {
            let n = device.read(&mut packet)?;
            if let Some(raw) = reassembler.push(&packet[..n])? {
                break raw;
            }
        };

        trace!("HID read: {}", hex::encode(&raw));

        Ok(ApduResponse::decode(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL: u16 = 0x0101;

    fn reassemble(packets: &[[u8; HID_PACKET_SIZE]]) -> Vec<u8> {
        let mut r = Reassembler::new(CHANNEL);
        for (i, packet) in packets.iter().enumerate() {
            match r.push(packet).expect("push failed") {
                Some(message) => {
                    assert_eq!(i, packets.len() - 1);
                    return message;
                }
                None => assert!(i < packets.len() - 1),
            }
        }
        panic!("message never completed");
    }

    #[test]
    fn packet_counts() {
        for (len, expected) in [
            (0usize, 1usize),
            (1, 1),
            (57, 1),
            (58, 2),
            (64, 2),
            (116, 2),
            (117, 3),
            (255, 5),
            (500, 9),
        ] {
            let packets = frame_packets(CHANNEL, &vec![0xAA; len]);
            assert_eq!(packets.len(), expected, "payload length {len}");
        }
    }

    #[test]
    fn first_packet_layout() {
        let packets = frame_packets(0xBEEF, &[0x01, 0x02, 0x03]);
        assert_eq!(packets.len(), 1);
        assert_eq!(
            &packets[0][..10],
            &[0xBE, 0xEF, 0x05, 0x00, 0x00, 0x00, 0x03, 0x01, 0x02, 0x03]
        );
        assert!(packets[0][10..].iter().all(|b| *b == 0));
    }

    #[test]
    fn empty_message_round_trip() {
        let packets = frame_packets(CHANNEL, &[]);
        assert_eq!(packets.len(), 1);
        assert_eq!(reassemble(&packets), Vec::<u8>::new());
    }

    #[test]
    fn framing_round_trip() {
        for len in [1usize, 57, 58, 64, 117, 255, 300, 500, 1000] {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let packets = frame_packets(CHANNEL, &payload);
            assert_eq!(reassemble(&packets), payload, "payload length {len}");
        }
    }

    #[test]
    fn continuation_sequence_numbers() {
        let packets = frame_packets(CHANNEL, &[0u8; 300]);
        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(u16::from_be_bytes([packet[3], packet[4]]), i as u16);
        }
    }

    #[test]
    fn channel_is_never_the_locked_device_sentinel() {
        for _ in 0..10_000 {
            assert_ne!(random_channel(), 0);
        }
    }

    #[test]
    fn channel_mismatch_is_distinct() {
        let packets = frame_packets(0x0000, &[0x01]);
        let mut r = Reassembler::new(CHANNEL);
        assert!(matches!(
            r.push(&packets[0]),
            Err(TransportError::ChannelMismatch {
                expected: CHANNEL,
                actual: 0x0000,
            })
        ));
    }

    #[test]
    fn bad_tag_rejected() {
        let mut packets = frame_packets(CHANNEL, &[0x01]);
        packets[0][2] = 0x06;
        let mut r = Reassembler::new(CHANNEL);
        assert!(matches!(r.push(&packets[0]), Err(TransportError::BadTag(0x06))));
    }

    #[test]
    fn bad_sequence_rejected() {
        let packets = frame_packets(CHANNEL, &[0u8; 300]);
        let mut r = Reassembler::new(CHANNEL);
        assert_eq!(r.push(&packets[0]).expect("push failed"), None);
        assert!(matches!(
            r.push(&packets[2]),
            Err(TransportError::BadSequence {
                expected: 1,
                actual: 2,
            })
        ));
    }

    #[test]
    fn short_packet_rejected() {
        let mut r = Reassembler::new(CHANNEL);
        assert!(matches!(
            r.push(&[0x01, 0x01, 0x05]),
            Err(TransportError::ShortPacket(3))
        ));
    }
}
