//! Body decompression dispatch.
//!
//! The document-type nibble selects a codec; the protocol version gates
//! which codecs are legal. Decompression replaces the body bytes while the
//! header region stays in place, so absolute offsets encoded in the stream
//! keep resolving.

use std::io::Read;

use crate::constants::MAX_SIZE;
use crate::error::{Result, SerealError};
use crate::header::{DocumentType, Header};
use crate::varint::decode_varint;

/// Decompresses `body` according to the header, or returns `None` when the
/// body is stored raw.
pub fn decompress_body(header: &Header, body: &[u8]) -> Result<Option<Vec<u8>>> {
    match header.doctype {
        DocumentType::Raw => Ok(None),
        DocumentType::Snappy => {
            if header.version != 1 {
                return Err(SerealError::WrongDocTypeForVersion {
                    codec: "snappy",
                    version: header.version,
                });
            }
            snappy_raw(body).map(Some)
        }
        DocumentType::SnappyIncremental => snappy_incremental(body).map(Some),
        DocumentType::Zlib => {
            if header.version < 3 {
                return Err(SerealError::WrongDocTypeForVersion {
                    codec: "zlib",
                    version: header.version,
                });
            }
            zlib(body).map(Some)
        }
    }
}

/// v1 snappy: the whole body is one Snappy block.
fn snappy_raw(body: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(|e| SerealError::Decompress(e.to_string()))
}

/// v2 incremental snappy: `<varint compressed-len> <snappy block>`.
fn snappy_incremental(body: &[u8]) -> Result<Vec<u8>> {
    let (compressed_len, varint_size) = decode_varint(body)?;
    if compressed_len > MAX_SIZE {
        return Err(SerealError::BadSize);
    }
    let compressed_len = compressed_len as usize;
    let end = varint_size
        .checked_add(compressed_len)
        .ok_or(SerealError::BadSize)?;
    if end > body.len() {
        return Err(SerealError::TruncatedDocument);
    }
    snappy_raw(&body[varint_size..end])
}

/// v3 zlib: `<varint uncompressed-len> <varint compressed-len> <zlib stream>`.
fn zlib(body: &[u8]) -> Result<Vec<u8>> {
    let (uncompressed_len, n) = decode_varint(body)?;
    let (compressed_len, m) = decode_varint(&body[n..])?;
    if uncompressed_len > MAX_SIZE || compressed_len > MAX_SIZE {
        return Err(SerealError::BadSize);
    }
    let start = n + m;
    let end = start
        .checked_add(compressed_len as usize)
        .ok_or(SerealError::BadSize)?;
    if end > body.len() {
        return Err(SerealError::TruncatedDocument);
    }

    let mut plain = Vec::with_capacity(uncompressed_len as usize);
    flate2::read::ZlibDecoder::new(&body[start..end])
        .read_to_end(&mut plain)
        .map_err(|e| SerealError::Decompress(e.to_string()))?;
    if plain.len() as u64 != uncompressed_len {
        return Err(SerealError::Decompress(
            "uncompressed length mismatch".to_string(),
        ));
    }
    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn header(doctype: DocumentType, version: u8) -> Header {
        Header {
            doctype,
            version,
            suffix_start: 6,
            suffix_size: 1,
        }
    }

    fn varint(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        while value >= 0x80 {
            out.push((value & 0x7f) as u8 | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
        out
    }

    #[test]
    fn raw_passthrough() {
        let h = header(DocumentType::Raw, 1);
        assert!(decompress_body(&h, b"\x20\x2a").unwrap().is_none());
    }

    #[test]
    fn snappy_only_v1() {
        let h = header(DocumentType::Snappy, 2);
        assert!(matches!(
            decompress_body(&h, b""),
            Err(SerealError::WrongDocTypeForVersion {
                codec: "snappy",
                version: 2
            })
        ));
    }

    #[test]
    fn zlib_needs_v3() {
        let h = header(DocumentType::Zlib, 2);
        assert!(matches!(
            decompress_body(&h, b""),
            Err(SerealError::WrongDocTypeForVersion {
                codec: "zlib",
                version: 2
            })
        ));
    }

    #[test]
    fn snappy_block_roundtrip() {
        let plain = b"\x20\x2a".to_vec();
        let compressed = snap::raw::Encoder::new().compress_vec(&plain).unwrap();
        let h = header(DocumentType::Snappy, 1);
        assert_eq!(decompress_body(&h, &compressed).unwrap().unwrap(), plain);
    }

    #[test]
    fn snappy_incremental_framing() {
        let plain = b"\x42\x00\x01".to_vec();
        let compressed = snap::raw::Encoder::new().compress_vec(&plain).unwrap();
        let mut body = varint(compressed.len() as u64);
        body.extend_from_slice(&compressed);
        let h = header(DocumentType::SnappyIncremental, 2);
        assert_eq!(decompress_body(&h, &body).unwrap().unwrap(), plain);

        // compressed-length varint pointing past the buffer
        let mut short = varint(compressed.len() as u64 + 9);
        short.extend_from_slice(&compressed);
        assert!(matches!(
            decompress_body(&h, &short),
            Err(SerealError::TruncatedDocument)
        ));
    }

    #[test]
    fn zlib_framing() {
        let plain = b"\x20\x2a".to_vec();
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut body = varint(plain.len() as u64);
        body.extend_from_slice(&varint(compressed.len() as u64));
        body.extend_from_slice(&compressed);

        let h = header(DocumentType::Zlib, 3);
        assert_eq!(decompress_body(&h, &body).unwrap().unwrap(), plain);
    }

    #[test]
    fn zlib_length_mismatch() {
        let plain = b"\x20\x2a".to_vec();
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut body = varint(plain.len() as u64 + 1);
        body.extend_from_slice(&varint(compressed.len() as u64));
        body.extend_from_slice(&compressed);

        let h = header(DocumentType::Zlib, 3);
        assert!(matches!(
            decompress_body(&h, &body),
            Err(SerealError::Decompress(_))
        ));
    }
}
