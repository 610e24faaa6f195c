use super::*;

#[test]
fn test_header_encode_layout() {
    let header = RtpHeader::new(0x1234, 0x5678_9ABC, 0xDEAD_BEEF);
    let bytes = header.encode();

    assert_eq!(bytes[0], 0x80);
    assert_eq!(bytes[1], 0x78);
    assert_eq!(&bytes[2..4], &[0x12, 0x34]);
    assert_eq!(&bytes[4..8], &[0x56, 0x78, 0x9A, 0xBC]);
    assert_eq!(&bytes[8..12], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn test_header_decode() {
    let bytes = [0x80, 0x78, 0, 7, 0, 0, 3, 0xC0, 0, 0, 0, 42];
    let header = RtpHeader::decode(&bytes).unwrap();

    assert_eq!(header.sequence, 7);
    assert_eq!(header.timestamp, 960);
    assert_eq!(header.ssrc, 42);
}

#[test]
fn test_header_decode_too_small() {
    let result = RtpHeader::decode(&[0x80, 0x78, 0]);
    assert!(matches!(
        result,
        Err(RtpDecodeError::BufferTooSmall {
            needed: 12,
            have: 3
        })
    ));
}

#[test]
fn test_header_decode_wrong_marker() {
    let mut bytes = RtpHeader::new(1, 2, 3).encode();
    bytes[0] = 0x90;
    assert!(matches!(
        RtpHeader::decode(&bytes),
        Err(RtpDecodeError::InvalidVersion(0x90))
    ));

    let mut bytes = RtpHeader::new(1, 2, 3).encode();
    bytes[1] = 0x60;
    assert!(matches!(
        RtpHeader::decode(&bytes),
        Err(RtpDecodeError::UnknownPayloadType(0x60))
    ));
}

#[test]
fn test_write_to_larger_buffer() {
    let mut buf = [0xFFu8; 20];
    RtpHeader::new(1, 2, 3).write_to(&mut buf);

    assert_eq!(&buf[..12], &RtpHeader::new(1, 2, 3).encode());
    assert!(buf[12..].iter().all(|&b| b == 0xFF));
}
