//! Property tests for the varint reader.

use proptest::prelude::*;

use sereal::varint::decode_varint;

fn encode(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    while value >= 0x80 {
        out.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
    out
}

proptest! {
    #[test]
    fn roundtrip(value in any::<u64>()) {
        let bytes = encode(value);
        let (decoded, consumed) = decode_varint(&bytes).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn truncated_encodings_fail(value in any::<u64>()) {
        let bytes = encode(value);
        for len in 0..bytes.len() {
            prop_assert!(decode_varint(&bytes[..len]).is_err());
        }
    }

    #[test]
    fn decoder_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..24)) {
        let _ = decode_varint(&bytes);
    }
}
