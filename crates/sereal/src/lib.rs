//! Decoder for the Sereal binary serialization format (protocol v1-v3).
//!
//! A Sereal document is a framed byte buffer: a 5-byte magic/version prefix,
//! an optional user-header suffix, and a tag-driven body that may be Snappy-
//! or Zlib-compressed. The decoder materializes the body into either a
//! dynamic [`Value`] graph or a caller-typed destination implementing
//! [`Bind`], preserving the format's offset-based aliasing semantics
//! (COPY/REFP/ALIAS/OBJECTV back-references).
//!
//! ```
//! let doc = [0x3d, 0x73, 0x72, 0x6c, 0x01, 0x00, 0x42, 0x01, 0x02];
//! let mut items: Vec<i64> = Vec::new();
//! sereal::decode(&doc, &mut items).unwrap();
//! assert_eq!(items, [1, 2]);
//! ```

#![deny(unsafe_code)]

pub mod bind;
pub mod compress;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod header;
pub mod registry;
pub mod value;
pub mod varint;

pub use bind::{bind_record, Bind, FieldDef, Record, Val};
pub use decoder::Decoder;
pub use error::{Result, SerealError};
pub use registry::{register_class, ClassRegistry, FreezeUnmarshal};
pub use value::{shared, FrozenValue, Regexp, SharedValue, Value};

/// Decodes the body of `doc` into `body` with a default-configured
/// [`Decoder`].
pub fn decode<B: Bind>(doc: &[u8], body: &mut B) -> Result<()> {
    Decoder::new().decode(doc, body)
}
