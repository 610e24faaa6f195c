//! Datagram layout checks through the public transport API

use trackcast::connection::{ConnectionSession, EncryptionMode};
use trackcast::transport::{MAX_DATAGRAM, PacketTransport, SILENCE_FRAME, open_datagram};

const KEY: [u8; 32] = [0x42; 32];

fn session(mode: EncryptionMode) -> ConnectionSession {
    ConnectionSession::with_counters(KEY, mode, 0x0102_0304, 65_530, u32::MAX - 1_920, 0)
}

#[test]
fn test_long_run_keeps_counters_consistent() {
    for mode in [EncryptionMode::Normal, EncryptionMode::Suffix, EncryptionMode::Lite] {
        let mut transport = PacketTransport::new();
        let mut session = session(mode);

        let mut expected_sequence = 65_530u16;
        let mut expected_timestamp = u32::MAX - 1_920;
        for i in 0u32..50 {
            let frame = i.to_le_bytes();
            let datagram = transport.encode_frame(&mut session, &frame, 960).unwrap().to_vec();

            expected_sequence = expected_sequence.wrapping_add(1);
            expected_timestamp = expected_timestamp.wrapping_add(960);

            let (header, payload) = open_datagram(&KEY, mode, &datagram).unwrap();
            assert_eq!(header.sequence, expected_sequence, "{mode} frame {i}");
            assert_eq!(header.timestamp, expected_timestamp, "{mode} frame {i}");
            assert_eq!(header.ssrc, 0x0102_0304);
            assert_eq!(payload, frame);
        }

        let expected_nonce = if mode == EncryptionMode::Lite { 50 } else { 0 };
        assert_eq!(session.nonce(), expected_nonce, "{mode}");
    }
}

#[test]
fn test_silence_frame_datagram_sizes() {
    let cases = [
        (EncryptionMode::Normal, 12 + 16 + 3),
        (EncryptionMode::Suffix, 12 + 16 + 3 + 24),
        (EncryptionMode::Lite, 12 + 16 + 3 + 4),
    ];

    for (mode, expected) in cases {
        let mut transport = PacketTransport::new();
        let mut session = session(mode);
        let datagram = transport
            .encode_frame(&mut session, &SILENCE_FRAME, 960)
            .unwrap();
        assert_eq!(datagram.len(), expected, "{mode}");
        assert!(datagram.len() <= MAX_DATAGRAM);
    }
}

#[test]
fn test_mode_names() {
    for (name, mode) in [
        ("xsalsa20_poly1305", EncryptionMode::Normal),
        ("xsalsa20_poly1305_suffix", EncryptionMode::Suffix),
        ("xsalsa20_poly1305_lite", EncryptionMode::Lite),
    ] {
        assert_eq!(name.parse::<EncryptionMode>().unwrap(), mode);
        assert_eq!(mode.to_string(), name);
    }
    assert!("aead_aes256_gcm".parse::<EncryptionMode>().is_err());
}
