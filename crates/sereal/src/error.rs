//! Error type for Sereal decoding.

use thiserror::Error;

/// Everything that can go wrong while decoding a Sereal document.
#[derive(Debug, Error)]
pub enum SerealError {
    #[error("bad header: not a valid Sereal document")]
    BadHeader,
    #[error("bad header: it seems your document was accidentally UTF-8 encoded")]
    Utf8ContaminatedHeader,
    #[error("document version '{0}' not yet supported")]
    UnsupportedVersion(u8),
    #[error("document type '{0}' not yet supported")]
    UnsupportedDocType(u8),
    #[error("{codec} compression not valid for v{version} documents")]
    WrongDocTypeForVersion { codec: &'static str, version: u8 },
    #[error("truncated document")]
    TruncatedDocument,
    #[error("bad varint")]
    BadVarint,
    #[error("bad size")]
    BadSize,
    #[error("bad offset {0}")]
    BadOffset(u64),
    #[error("untracked offset {0}")]
    UntrackedOffset(usize),
    #[error("expected stringish token")]
    ExpectedStringish,
    #[error("unknown tag byte {0:#04x}")]
    UnknownTag(u8),
    #[error("bad destination type: {0}")]
    BadDestination(&'static str),
    #[error("nested copy target is not stringish")]
    NestedCopyNotStringish,
    #[error("no unmarshaler for frozen class '{0}'")]
    UnmarshalerMissing(String),
    #[error("unmarshaler for class '{class}' failed: {reason}")]
    UnmarshalerFailed { class: String, reason: String },
    #[error("recursion depth limit exceeded")]
    DepthLimit,
    #[error("decompression failed: {0}")]
    Decompress(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SerealError>;
