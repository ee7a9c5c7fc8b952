//! Wire constants for the Sereal format.

/// Little-endian `=srl` magic (protocol v1 and v2).
pub const MAGIC: u32 = 0x6c72_733d;
/// Little-endian `=\xF3rl` magic (protocol v3 and up).
pub const MAGIC_HIGH_BIT: u32 = 0x6c72_f33d;
/// First four bytes of a v3 magic that went through a UTF-8 re-encode.
pub const MAGIC_HIGH_BIT_UTF8: u32 = 0x72b3_c33d;

/// Fixed framing prefix: 4 magic bytes + 1 type/version byte.
pub const HEADER_SIZE: usize = 5;

// Document type nibble (high nibble of byte 4).
pub const DOC_RAW: u8 = 0;
pub const DOC_SNAPPY: u8 = 1;
pub const DOC_SNAPPY_INCREMENTAL: u8 = 2;
pub const DOC_ZLIB: u8 = 3;

/// High bit of a tag byte: remember this token's start offset.
pub const TRACK_FLAG: u8 = 0x80;

// Tag bytes (low 7 bits). POS/NEG/ARRAYREF/HASHREF/SHORT_BINARY are range
// bases; the low nibble (low 5 bits for SHORT_BINARY) carries the payload.
pub const TAG_POS_0: u8 = 0x00; // ..0x0f
pub const TAG_NEG_16: u8 = 0x10; // ..0x1f
pub const TAG_VARINT: u8 = 0x20;
pub const TAG_ZIGZAG: u8 = 0x21;
pub const TAG_FLOAT: u8 = 0x22;
pub const TAG_DOUBLE: u8 = 0x23;
pub const TAG_LONG_DOUBLE: u8 = 0x24;
pub const TAG_UNDEF: u8 = 0x25;
pub const TAG_BINARY: u8 = 0x26;
pub const TAG_STR_UTF8: u8 = 0x27;
pub const TAG_REFN: u8 = 0x28;
pub const TAG_REFP: u8 = 0x29;
pub const TAG_HASH: u8 = 0x2a;
pub const TAG_ARRAY: u8 = 0x2b;
pub const TAG_OBJECT: u8 = 0x2c;
pub const TAG_OBJECTV: u8 = 0x2d;
pub const TAG_ALIAS: u8 = 0x2e;
pub const TAG_COPY: u8 = 0x2f;
pub const TAG_WEAKEN: u8 = 0x30;
pub const TAG_REGEXP: u8 = 0x31;
pub const TAG_OBJECT_FREEZE: u8 = 0x32;
pub const TAG_OBJECTV_FREEZE: u8 = 0x33;
pub const TAG_CANONICAL_UNDEF: u8 = 0x3a;
pub const TAG_TRUE: u8 = 0x3b;
pub const TAG_FALSE: u8 = 0x3c;
pub const TAG_PAD: u8 = 0x3f;
pub const TAG_ARRAYREF_0: u8 = 0x40; // ..0x4f
pub const TAG_HASHREF_0: u8 = 0x50; // ..0x5f
pub const TAG_SHORT_BINARY_0: u8 = 0x60; // ..0x7f

/// Largest size (string, array, hash, decompressed body) the decoder accepts.
pub const MAX_SIZE: u64 = i32::MAX as u64;

/// Recursion cap shared by the tag interpreter and the destination binder.
pub const MAX_DEPTH: usize = 1_000;

/// How many COPY hops `is_stringish` follows before giving up.
pub const MAX_COPY_HOPS: usize = 128;
