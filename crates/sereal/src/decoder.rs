//! The tag-driven body interpreter and the top-level decode entry points.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::bind::{bind_root, Bind};
use crate::compress::decompress_body;
use crate::constants::{
    MAX_COPY_HOPS, MAX_DEPTH, TAG_ALIAS, TAG_ARRAY, TAG_ARRAYREF_0, TAG_BINARY,
    TAG_CANONICAL_UNDEF, TAG_COPY, TAG_DOUBLE, TAG_FALSE, TAG_FLOAT, TAG_HASH, TAG_HASHREF_0,
    TAG_OBJECT, TAG_OBJECTV, TAG_OBJECTV_FREEZE, TAG_OBJECT_FREEZE, TAG_PAD, TAG_REFN, TAG_REFP,
    TAG_REGEXP, TAG_SHORT_BINARY_0, TAG_STR_UTF8, TAG_TRUE, TAG_UNDEF, TAG_VARINT, TAG_WEAKEN,
    TAG_ZIGZAG, TRACK_FLAG,
};
use crate::error::{Result, SerealError};
use crate::header::read_header;
use crate::registry::ClassRegistry;
use crate::value::{shared, FrozenValue, Regexp, SharedValue, Value};
use crate::varint::{decode_varint, unzigzag};

/// A Sereal decoder.
///
/// The decoder itself is a plain configuration value; all per-call state
/// (tracking table, copy depth) lives on the stack of a single decode call.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    /// Preserve reference, weak-reference, undef, and object distinctions as
    /// wrapper values instead of flattening them.
    pub compat_mode: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the document body into `body`.
    pub fn decode<B: Bind>(&self, doc: &[u8], body: &mut B) -> Result<()> {
        self.run(doc, None, Some(body as &mut dyn Bind))
    }

    /// Decodes the user-header suffix into `header`.
    ///
    /// A document without a user header (or whose suffix flag byte has the
    /// low bit clear) leaves `header` untouched.
    pub fn decode_header<H: Bind>(&self, doc: &[u8], header: &mut H) -> Result<()> {
        self.run(doc, Some(header as &mut dyn Bind), None)
    }

    /// Decodes both the user-header suffix and the body in one pass.
    pub fn decode_header_and_body<H: Bind, B: Bind>(
        &self,
        doc: &[u8],
        header: &mut H,
        body: &mut B,
    ) -> Result<()> {
        self.run(
            doc,
            Some(header as &mut dyn Bind),
            Some(body as &mut dyn Bind),
        )
    }

    fn run(
        &self,
        doc: &[u8],
        header_dest: Option<&mut dyn Bind>,
        body_dest: Option<&mut dyn Bind>,
    ) -> Result<()> {
        let header = read_header(doc)?;
        let body_start = header.body_start();
        if body_start > doc.len() {
            return Err(SerealError::TruncatedDocument);
        }

        // Decompression replaces the body while the header region stays put,
        // so absolute offsets in the stream keep resolving.
        let buf: Cow<'_, [u8]> = match decompress_body(&header, &doc[body_start..])? {
            Some(plain) => {
                let mut full = Vec::with_capacity(body_start + plain.len());
                full.extend_from_slice(&doc[..body_start]);
                full.extend_from_slice(&plain);
                Cow::Owned(full)
            }
            None => Cow::Borrowed(doc),
        };

        if let Some(dest) = header_dest {
            if header.suffix_size != 1 && header.suffix_start < body_start {
                let flags = buf[header.suffix_start];
                if flags & 1 == 1 {
                    let suffix = &buf[header.suffix_start + 1..body_start];
                    let root = Interp::new(self.compat_mode).decode_document(suffix, 0)?;
                    bind_root(dest, &root)?;
                }
            }
        }

        if let Some(dest) = body_dest {
            let root = if header.version == 1 {
                Interp::new(self.compat_mode).decode_document(&buf, body_start)?
            } else {
                // v2+ bodies use 1-based offsets relative to the byte just
                // before the body
                Interp::new(self.compat_mode).decode_document(&buf[body_start - 1..], 1)?
            };
            bind_root(dest, &root)?;
        }

        Ok(())
    }
}

/// Per-call interpreter state.
struct Interp {
    compat: bool,
    tracked: HashMap<usize, SharedValue>,
    copy_depth: usize,
    depth: usize,
}

impl Interp {
    fn new(compat: bool) -> Self {
        Self {
            compat,
            tracked: HashMap::new(),
            copy_depth: 0,
            depth: 0,
        }
    }

    fn decode_document(mut self, b: &[u8], idx: usize) -> Result<SharedValue> {
        let (root, _) = self.decode_node(b, idx)?;
        Ok(root)
    }

    /// Decodes one token starting at `idx`, returning the produced cell and
    /// the number of bytes consumed (including any leading PAD bytes).
    fn decode_node(&mut self, b: &[u8], idx: usize) -> Result<(SharedValue, usize)> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.depth -= 1;
            return Err(SerealError::DepthLimit);
        }
        let result = self.decode_node_inner(b, idx);
        self.depth -= 1;
        result
    }

    fn decode_node_inner(&mut self, b: &[u8], mut idx: usize) -> Result<(SharedValue, usize)> {
        if idx >= b.len() {
            return Err(SerealError::TruncatedDocument);
        }

        let start = idx;
        let mut tag = b[idx];

        while tag == TAG_PAD || tag == TAG_PAD | TRACK_FLAG {
            idx += 1;
            if idx >= b.len() {
                return Err(SerealError::TruncatedDocument);
            }
            tag = b[idx];
        }

        let track_me = tag & TRACK_FLAG != 0;
        let tag = tag & !TRACK_FLAG;

        let cell = match tag {
            // POS_0..POS_15 / NEG_16..NEG_1
            t @ 0x00..=0x1f => {
                idx += 1;
                let mut v = t as i64;
                if t & 0x10 != 0 {
                    v -= 32;
                }
                shared(Value::Int(v))
            }

            TAG_VARINT => {
                idx += 1;
                let (u, sz) = decode_varint(&b[idx..])?;
                idx += sz;
                if u > i64::MAX as u64 {
                    shared(Value::UInt(u))
                } else {
                    shared(Value::Int(u as i64))
                }
            }

            TAG_ZIGZAG => {
                idx += 1;
                let (u, sz) = decode_varint(&b[idx..])?;
                idx += sz;
                shared(Value::Int(unzigzag(u)))
            }

            TAG_FLOAT => {
                idx += 1;
                if idx + 4 > b.len() {
                    return Err(SerealError::TruncatedDocument);
                }
                let bits = [b[idx], b[idx + 1], b[idx + 2], b[idx + 3]];
                idx += 4;
                shared(Value::Float(f32::from_le_bytes(bits)))
            }

            TAG_DOUBLE => {
                idx += 1;
                if idx + 8 > b.len() {
                    return Err(SerealError::TruncatedDocument);
                }
                let bits = [
                    b[idx],
                    b[idx + 1],
                    b[idx + 2],
                    b[idx + 3],
                    b[idx + 4],
                    b[idx + 5],
                    b[idx + 6],
                    b[idx + 7],
                ];
                idx += 8;
                shared(Value::Double(f64::from_le_bytes(bits)))
            }

            TAG_UNDEF => {
                idx += 1;
                shared(Value::Undef)
            }

            TAG_CANONICAL_UNDEF => {
                idx += 1;
                if self.compat {
                    shared(Value::CanonicalUndef)
                } else {
                    shared(Value::Undef)
                }
            }

            TAG_BINARY => {
                idx += 1;
                let len = self.read_size(b, &mut idx)?;
                if idx + len > b.len() {
                    return Err(SerealError::TruncatedDocument);
                }
                let bytes = b[idx..idx + len].to_vec();
                idx += len;
                shared(Value::Bytes(bytes))
            }

            TAG_STR_UTF8 => {
                idx += 1;
                let len = self.read_size(b, &mut idx)?;
                if idx + len > b.len() {
                    return Err(SerealError::TruncatedDocument);
                }
                let s = String::from_utf8_lossy(&b[idx..idx + len]).into_owned();
                idx += len;
                shared(Value::Str(s))
            }

            // SHORT_BINARY_0..31
            t @ TAG_SHORT_BINARY_0..=0x7f => {
                idx += 1;
                let len = (t & 0x1f) as usize;
                if idx + len > b.len() {
                    return Err(SerealError::TruncatedDocument);
                }
                let bytes = b[idx..idx + len].to_vec();
                idx += len;
                shared(Value::Bytes(bytes))
            }

            TAG_REFN => {
                idx += 1;
                if self.compat {
                    // Register the outer cell before recursing so a child
                    // REFP targeting this token's offset resolves.
                    let outer = shared(Value::Undef);
                    if track_me {
                        self.tracked.insert(start, outer.clone());
                    }
                    let (child, sz) = self.decode_node(b, idx)?;
                    idx += sz;
                    *outer.borrow_mut() = Value::Ref(child);
                    outer
                } else {
                    // references are flattened
                    let (child, sz) = self.decode_node(b, idx)?;
                    idx += sz;
                    child
                }
            }

            TAG_REFP => {
                idx += 1;
                let offs = self.read_offset(b, &mut idx)?;
                let target = self
                    .tracked
                    .get(&offs)
                    .ok_or(SerealError::UntrackedOffset(offs))?
                    .clone();
                shared(Value::Ref(target))
            }

            TAG_HASH => {
                idx += 1;
                let n = self.read_size(b, &mut idx)?;
                if 2 * n > b.len() - idx {
                    return Err(SerealError::TruncatedDocument);
                }
                let cell = shared(Value::Map(Vec::with_capacity(n)));
                if track_me {
                    self.tracked.insert(start, cell.clone());
                }
                self.decode_pairs(b, &mut idx, n, &cell)?;
                cell
            }

            TAG_ARRAY => {
                idx += 1;
                let n = self.read_size(b, &mut idx)?;
                if n > b.len() - idx {
                    return Err(SerealError::TruncatedDocument);
                }
                let cell = shared(Value::Array(Vec::with_capacity(n)));
                if track_me {
                    self.tracked.insert(start, cell.clone());
                }
                self.decode_elems(b, &mut idx, n, &cell)?;
                cell
            }

            // ARRAYREF_0..15
            t @ TAG_ARRAYREF_0..=0x4f => {
                idx += 1;
                let n = (t & 0x0f) as usize;
                let inner = shared(Value::Array(Vec::with_capacity(n)));
                let cell = if self.compat {
                    shared(Value::Ref(inner.clone()))
                } else {
                    inner.clone()
                };
                if track_me {
                    self.tracked.insert(start, cell.clone());
                }
                self.decode_elems(b, &mut idx, n, &inner)?;
                cell
            }

            // HASHREF_0..15
            t @ TAG_HASHREF_0..=0x5f => {
                idx += 1;
                let n = (t & 0x0f) as usize;
                let inner = shared(Value::Map(Vec::with_capacity(n)));
                let cell = if self.compat {
                    shared(Value::Ref(inner.clone()))
                } else {
                    inner.clone()
                };
                if track_me {
                    self.tracked.insert(start, cell.clone());
                }
                self.decode_pairs(b, &mut idx, n, &inner)?;
                cell
            }

            TAG_OBJECT => {
                idx += 1;
                let class = self.decode_class_name(b, &mut idx)?;
                let (payload, sz) = self.decode_node(b, idx)?;
                idx += sz;
                if self.compat {
                    shared(Value::Object {
                        class,
                        value: payload,
                    })
                } else {
                    // the class name is decoded, validated, and dropped
                    payload
                }
            }

            TAG_OBJECTV => {
                idx += 1;
                let offs = self.read_offset(b, &mut idx)?;
                let class = self.decode_class_name_at(b, offs)?;
                let (payload, sz) = self.decode_node(b, idx)?;
                idx += sz;
                if self.compat {
                    shared(Value::Object {
                        class,
                        value: payload,
                    })
                } else {
                    payload
                }
            }

            TAG_ALIAS => {
                idx += 1;
                let offs = self.read_offset(b, &mut idx)?;
                // the tracked cell itself: shared identity, not a copy
                self.tracked
                    .get(&offs)
                    .ok_or(SerealError::UntrackedOffset(offs))?
                    .clone()
            }

            TAG_COPY => {
                idx += 1;
                let offs = self.read_offset(b, &mut idx)?;
                if self.copy_depth > 0 && !is_stringish(b, offs) {
                    return Err(SerealError::NestedCopyNotStringish);
                }
                self.copy_depth += 1;
                let copied = self.decode_node(b, offs);
                self.copy_depth -= 1;
                // the cursor stays just past the varint; COPY splices in the
                // token at the target offset
                copied?.0
            }

            TAG_WEAKEN => {
                idx += 1;
                let (child, sz) = self.decode_node(b, idx)?;
                idx += sz;
                if self.compat {
                    shared(Value::Weak(child))
                } else {
                    child
                }
            }

            TAG_REGEXP => {
                idx += 1;
                let (pat, sz) = self.decode_node(b, idx)?;
                idx += sz;
                let pattern = stringish_to_string(&pat)?;
                let (modifiers, sz) = self.decode_node(b, idx)?;
                idx += sz;
                let modifiers = stringish_to_bytes(&modifiers)?;
                shared(Value::Regexp(Regexp { pattern, modifiers }))
            }

            TAG_OBJECT_FREEZE => {
                idx += 1;
                let class = self.decode_class_name(b, &mut idx)?;
                let (payload, sz) = self.decode_node(b, idx)?;
                idx += sz;
                let payload = stringish_to_bytes(&payload)?;
                self.freeze_value(class, payload)?
            }

            TAG_OBJECTV_FREEZE => {
                idx += 1;
                let offs = self.read_offset(b, &mut idx)?;
                let class = self.decode_class_name_at(b, offs)?;
                let (payload, sz) = self.decode_node(b, idx)?;
                idx += sz;
                let payload = stringish_to_bytes(&payload)?;
                self.freeze_value(class, payload)?
            }

            TAG_TRUE => {
                idx += 1;
                shared(Value::Bool(true))
            }

            TAG_FALSE => {
                idx += 1;
                shared(Value::Bool(false))
            }

            other => return Err(SerealError::UnknownTag(other)),
        };

        if track_me {
            self.tracked.entry(start).or_insert_with(|| cell.clone());
        }

        Ok((cell, idx - start))
    }

    fn decode_elems(
        &mut self,
        b: &[u8],
        idx: &mut usize,
        n: usize,
        array: &SharedValue,
    ) -> Result<()> {
        for _ in 0..n {
            let (elem, sz) = self.decode_node(b, *idx)?;
            *idx += sz;
            if let Value::Array(elems) = &mut *array.borrow_mut() {
                elems.push(elem);
            }
        }
        Ok(())
    }

    fn decode_pairs(
        &mut self,
        b: &[u8],
        idx: &mut usize,
        n: usize,
        map: &SharedValue,
    ) -> Result<()> {
        for _ in 0..n {
            let (key_cell, sz) = self.decode_node(b, *idx)?;
            *idx += sz;
            let key = stringish_to_string(&key_cell)?;
            let (val, sz) = self.decode_node(b, *idx)?;
            *idx += sz;
            if let Value::Map(pairs) = &mut *map.borrow_mut() {
                pairs.push((key, val));
            }
        }
        Ok(())
    }

    /// Decodes a class name token at the cursor, advancing it.
    fn decode_class_name(&mut self, b: &[u8], idx: &mut usize) -> Result<String> {
        if !is_stringish(b, *idx) {
            return Err(SerealError::ExpectedStringish);
        }
        let (cell, sz) = self.decode_node(b, *idx)?;
        *idx += sz;
        stringish_to_string(&cell)
    }

    /// Decodes a class name token at an explicit offset (OBJECTV dedup).
    fn decode_class_name_at(&mut self, b: &[u8], offs: usize) -> Result<String> {
        if !is_stringish(b, offs) {
            return Err(SerealError::ExpectedStringish);
        }
        let (cell, _) = self.decode_node(b, offs)?;
        stringish_to_string(&cell)
    }

    fn freeze_value(&self, class: String, payload: Vec<u8>) -> Result<SharedValue> {
        if !self.compat {
            if let Some(result) = ClassRegistry::global().instantiate(&class, &payload) {
                let instance = result?;
                return Ok(shared(Value::Frozen(FrozenValue {
                    class,
                    payload,
                    instance,
                })));
            }
        }
        Ok(shared(Value::Freeze { class, payload }))
    }

    fn read_size(&self, b: &[u8], idx: &mut usize) -> Result<usize> {
        let (u, sz) = decode_varint(&b[*idx..])?;
        *idx += sz;
        if u > crate::constants::MAX_SIZE {
            return Err(SerealError::BadSize);
        }
        Ok(u as usize)
    }

    fn read_offset(&self, b: &[u8], idx: &mut usize) -> Result<usize> {
        let (u, sz) = decode_varint(&b[*idx..])?;
        *idx += sz;
        if u >= b.len() as u64 {
            return Err(SerealError::BadOffset(u));
        }
        Ok(u as usize)
    }
}

fn stringish_to_string(cell: &SharedValue) -> Result<String> {
    match &*cell.borrow() {
        Value::Str(s) => Ok(s.clone()),
        Value::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        _ => Err(SerealError::ExpectedStringish),
    }
}

fn stringish_to_bytes(cell: &SharedValue) -> Result<Vec<u8>> {
    match &*cell.borrow() {
        Value::Bytes(b) => Ok(b.clone()),
        Value::Str(s) => Ok(s.clone().into_bytes()),
        _ => Err(SerealError::ExpectedStringish),
    }
}

/// True iff the token at `idx` ultimately produces a string or byte value:
/// BINARY, STR_UTF8, SHORT_BINARY, or a COPY chain ending in one of those.
/// Bounds problems yield `false`, never an error.
pub(crate) fn is_stringish(b: &[u8], mut idx: usize) -> bool {
    let mut hops = 0usize;
    loop {
        if idx >= b.len() {
            return false;
        }
        let mut tag = b[idx];
        while tag == TAG_PAD || tag == TAG_PAD | TRACK_FLAG {
            idx += 1;
            if idx >= b.len() {
                return false;
            }
            tag = b[idx];
        }
        let tag = tag & !TRACK_FLAG;

        if tag == TAG_COPY {
            hops += 1;
            if hops > MAX_COPY_HOPS {
                return false;
            }
            let Ok((offs, _)) = decode_varint(&b[idx + 1..]) else {
                return false;
            };
            if offs >= b.len() as u64 {
                return false;
            }
            idx = offs as usize;
            continue;
        }

        return tag == TAG_BINARY
            || tag == TAG_STR_UTF8
            || (TAG_SHORT_BINARY_0..=0x7f).contains(&tag);
    }
}
