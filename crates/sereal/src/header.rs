//! Document framing: magic, protocol version, document type, user-header
//! suffix arithmetic.

use crate::constants::{
    DOC_RAW, DOC_SNAPPY, DOC_SNAPPY_INCREMENTAL, DOC_ZLIB, HEADER_SIZE, MAGIC, MAGIC_HIGH_BIT,
    MAGIC_HIGH_BIT_UTF8,
};
use crate::error::{Result, SerealError};
use crate::varint::decode_varint;

/// How the body bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Raw,
    Snappy,
    SnappyIncremental,
    Zlib,
}

/// Parsed framing prefix of a Sereal document.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub doctype: DocumentType,
    pub version: u8,
    /// Byte offset of the first suffix byte (the flag byte, if any).
    pub suffix_start: usize,
    /// Length of the suffix region including its leading varint.
    pub suffix_size: usize,
}

impl Header {
    /// Offset of the first body byte.
    pub fn body_start(&self) -> usize {
        HEADER_SIZE + self.suffix_size
    }
}

/// Validates the five framing bytes and the user-header length varint.
pub fn read_header(doc: &[u8]) -> Result<Header> {
    if doc.len() < HEADER_SIZE + 1 {
        return Err(SerealError::TruncatedDocument);
    }

    let magic = u32::from_le_bytes([doc[0], doc[1], doc[2], doc[3]]);
    let doctype_nibble = doc[4] >> 4;
    let version = doc[4] & 0x0f;

    match magic {
        MAGIC if (1..=2).contains(&version) => {}
        MAGIC_HIGH_BIT if version >= 3 => {}
        MAGIC_HIGH_BIT_UTF8 => return Err(SerealError::Utf8ContaminatedHeader),
        _ => return Err(SerealError::BadHeader),
    }

    // the decoder only speaks protocol 1 through 3
    if version > 3 {
        return Err(SerealError::UnsupportedVersion(version));
    }

    let doctype = match doctype_nibble {
        DOC_RAW => DocumentType::Raw,
        DOC_SNAPPY => DocumentType::Snappy,
        DOC_SNAPPY_INCREMENTAL => DocumentType::SnappyIncremental,
        DOC_ZLIB => DocumentType::Zlib,
        other => return Err(SerealError::UnsupportedDocType(other)),
    };

    let (suffix_len, varint_size) = decode_varint(&doc[HEADER_SIZE..])?;
    let suffix_len = usize::try_from(suffix_len).map_err(|_| SerealError::BadSize)?;

    Ok(Header {
        doctype,
        version,
        suffix_start: HEADER_SIZE + varint_size,
        suffix_size: suffix_len + varint_size,
    })
}
