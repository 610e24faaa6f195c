use std::sync::{Arc, Weak};
use std::time::Duration;

use super::*;
use crate::connection::{
    ChannelId, ChannelTarget, ConnectionSession, EncryptionMode, GroupId, VoiceConnection,
};
use crate::error::CastError;
use crate::protocol::crypto::{SecretBox, SecretNonce};
use crate::testing::{GatewayCall, MockGateway, test_session};
use crate::types::ConnectionConfig;

const KEY: [u8; 32] = [0x11; 32];
const FRAME: &[u8] = b"opus frame bytes";

fn session(mode: EncryptionMode) -> ConnectionSession {
    ConnectionSession::with_counters(KEY, mode, 0xCAFE_BABE, 100, 48_000, 7)
}

#[test]
fn test_lite_layout_and_nonce() {
    let mut transport = PacketTransport::new();
    let mut session = session(EncryptionMode::Lite);

    let first = transport.encode_frame(&mut session, FRAME, 960).unwrap().to_vec();
    let second = transport.encode_frame(&mut session, FRAME, 960).unwrap().to_vec();

    assert_eq!(first.len(), 12 + 16 + FRAME.len() + 4);
    assert_eq!(&first[first.len() - 4..], &8u32.to_be_bytes());
    assert_eq!(&second[second.len() - 4..], &9u32.to_be_bytes());
    assert_eq!(session.nonce(), 9);

    // Header fields
    assert_eq!(&first[..2], &[0x80, 0x78]);
    assert_eq!(&first[2..4], &101u16.to_be_bytes());
    assert_eq!(&first[4..8], &48_960u32.to_be_bytes());
    assert_eq!(&first[8..12], &0xCAFE_BABEu32.to_be_bytes());
    assert_eq!(&second[2..4], &102u16.to_be_bytes());

    // Ciphertext follows the header and opens with the counter nonce
    let cipher = SecretBox::new(&KEY).unwrap();
    let body = &first[12..first.len() - 4];
    assert_eq!(cipher.open(&SecretNonce::from_counter(8), body).unwrap(), FRAME);
}

#[test]
fn test_suffix_layout() {
    let mut transport = PacketTransport::new();
    let mut session = session(EncryptionMode::Suffix);

    let first = transport.encode_frame(&mut session, FRAME, 960).unwrap().to_vec();
    let second = transport.encode_frame(&mut session, FRAME, 960).unwrap().to_vec();

    assert_eq!(first.len(), 12 + 16 + FRAME.len() + 24);
    assert_ne!(&first[first.len() - 24..], &second[second.len() - 24..]);
    assert_eq!(session.nonce(), 7);

    let nonce = SecretNonce::from_bytes(&first[first.len() - 24..]).unwrap();
    let body = &first[12..first.len() - 24];
    assert_eq!(SecretBox::new(&KEY).unwrap().open(&nonce, body).unwrap(), FRAME);
}

#[test]
fn test_normal_layout() {
    let mut transport = PacketTransport::new();
    let mut session = session(EncryptionMode::Normal);

    let datagram = transport.encode_frame(&mut session, FRAME, 960).unwrap().to_vec();

    assert_eq!(datagram.len(), 12 + 16 + FRAME.len());
    let nonce = SecretNonce::padded(&datagram[..12]);
    let opened = SecretBox::new(&KEY).unwrap().open(&nonce, &datagram[12..]).unwrap();
    assert_eq!(opened, FRAME);
}

#[test]
fn test_open_datagram_all_modes() {
    for mode in [EncryptionMode::Normal, EncryptionMode::Suffix, EncryptionMode::Lite] {
        let mut transport = PacketTransport::new();
        let mut session = session(mode);
        let datagram = transport.encode_frame(&mut session, FRAME, 960).unwrap().to_vec();

        let (header, payload) = open_datagram(&KEY, mode, &datagram).unwrap();
        assert_eq!(header.sequence, 101, "{mode}");
        assert_eq!(header.ssrc, 0xCAFE_BABE, "{mode}");
        assert_eq!(payload, FRAME, "{mode}");
    }
}

#[test]
fn test_open_datagram_rejects_tampering() {
    let mut transport = PacketTransport::new();
    let mut session = session(EncryptionMode::Lite);
    let mut datagram = transport.encode_frame(&mut session, FRAME, 960).unwrap().to_vec();

    datagram[20] ^= 0xFF;
    assert!(matches!(
        open_datagram(&KEY, EncryptionMode::Lite, &datagram),
        Err(CastError::Crypto(_))
    ));
    assert!(matches!(
        open_datagram(&KEY, EncryptionMode::Lite, &datagram[..20]),
        Err(CastError::Packet(_))
    ));
}

#[test]
fn test_counters_wrap() {
    let mut transport = PacketTransport::new();
    let mut session =
        ConnectionSession::with_counters(KEY, EncryptionMode::Lite, 1, u16::MAX, u32::MAX, u32::MAX);

    let datagram = transport.encode_frame(&mut session, FRAME, 1).unwrap().to_vec();

    assert_eq!(&datagram[2..4], &[0, 0]);
    assert_eq!(&datagram[4..8], &[0, 0, 0, 0]);
    assert_eq!(&datagram[datagram.len() - 4..], &[0, 0, 0, 0]);
}

#[test]
fn test_frame_too_large_keeps_counters() {
    let mut transport = PacketTransport::new();
    let mut session = session(EncryptionMode::Suffix);
    let max = PacketTransport::max_frame_len(EncryptionMode::Suffix);
    assert_eq!(max, MAX_DATAGRAM - 12 - 16 - 24);

    let frame = vec![0u8; max + 1];
    let result = transport.encode_frame(&mut session, &frame, 960);
    assert!(matches!(result, Err(CastError::FrameTooLarge { size, .. }) if size == max + 1));
    assert_eq!(session.sequence(), 100);
    assert_eq!(session.timestamp(), 48_000);

    let frame = vec![0u8; max];
    let datagram = transport.encode_frame(&mut session, &frame, 960).unwrap();
    assert_eq!(datagram.len(), MAX_DATAGRAM);
}

#[test]
fn test_transports_do_not_share_buffers() {
    let mut a = PacketTransport::new();
    let mut b = PacketTransport::new();
    let mut session_a = session(EncryptionMode::Normal);
    let mut session_b =
        ConnectionSession::with_counters([0x22; 32], EncryptionMode::Normal, 0xCAFE_BABE, 100, 48_000, 7);

    let from_a = a.encode_frame(&mut session_a, FRAME, 960).unwrap();
    let from_b = b.encode_frame(&mut session_b, FRAME, 960).unwrap();

    assert_eq!(from_a[..12], from_b[..12]);
    assert_ne!(from_a[12..], from_b[12..]);
}

#[test]
fn test_cipher_follows_session() {
    let mut transport = PacketTransport::new();
    let mut first = session(EncryptionMode::Normal);
    transport.encode_frame(&mut first, FRAME, 960).unwrap();

    let other_key = [0x33; 32];
    let mut second = ConnectionSession::with_counters(other_key, EncryptionMode::Normal, 5, 0, 0, 0);
    let datagram = transport.encode_frame(&mut second, FRAME, 960).unwrap().to_vec();

    let (_, payload) = open_datagram(&other_key, EncryptionMode::Normal, &datagram).unwrap();
    assert_eq!(payload, FRAME);
}

fn connection() -> (Arc<MockGateway>, Arc<VoiceConnection>) {
    let (gateway, link) = MockGateway::new();
    let target = ChannelTarget::new(GroupId(3), ChannelId(4));
    let conn = VoiceConnection::new(target, link, ConnectionConfig::default(), Weak::new());
    (gateway, conn)
}

#[tokio::test(start_paused = true)]
async fn test_send_frame_skips_unready_connection() {
    let (gateway, conn) = connection();
    let mut transport = PacketTransport::new();

    assert!(!transport.send_frame(&conn, FRAME, 960).await.unwrap());
    assert!(gateway.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_frame_marks_speaking_first() {
    let (gateway, conn) = connection();
    gateway.make_ready(test_session(KEY, EncryptionMode::Lite, 77));
    tokio::time::sleep(Duration::from_millis(1)).await;
    gateway.clear();

    let mut transport = PacketTransport::new();
    assert!(transport.send_frame(&conn, FRAME, 960).await.unwrap());
    assert!(transport.send_frame(&conn, FRAME, 960).await.unwrap());

    let calls = gateway.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], GatewayCall::SetSpeaking(true));
    assert!(matches!(calls[1], GatewayCall::Send(_)));

    let sent = gateway.sent();
    let first = u32::from_be_bytes(sent[0][sent[0].len() - 4..].try_into().unwrap());
    let second = u32::from_be_bytes(sent[1][sent[1].len() - 4..].try_into().unwrap());
    assert_eq!(second, first.wrapping_add(1));

    let stats = conn.stats().await;
    assert_eq!(stats.packets_sent, 2);
}
