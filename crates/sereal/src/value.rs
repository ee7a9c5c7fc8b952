//! Dynamic value graph produced by the decoder.
//!
//! Containers hold shared cells rather than owned children so that ALIAS and
//! REFP back-references resolve to the *same* node — mutating a value through
//! one alias is observable through the others, and cyclic documents decode
//! into genuinely cyclic graphs.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// A shared cell in the decoded graph.
pub type SharedValue = Rc<RefCell<Value>>;

/// Wraps a value into a fresh shared cell.
pub fn shared(value: Value) -> SharedValue {
    Rc::new(RefCell::new(value))
}

/// A decoded regular expression: pattern plus the modifier bytes that
/// followed it on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regexp {
    pub pattern: String,
    pub modifiers: Vec<u8>,
}

/// A FREEZE payload that went through a registered unmarshaler.
///
/// Keeps the class name and raw payload alongside the materialized instance
/// so typed destinations can still run their own unmarshaler. Equality
/// ignores the instance and compares the wire data.
#[derive(Clone)]
pub struct FrozenValue {
    pub class: String,
    pub payload: Vec<u8>,
    pub instance: Arc<dyn Any + Send + Sync>,
}

impl FrozenValue {
    /// Downcasts the materialized instance.
    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.instance.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for FrozenValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrozenValue")
            .field("class", &self.class)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

impl PartialEq for FrozenValue {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.payload == other.payload
    }
}

/// A dynamically typed Sereal value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value. In compat mode the wire's UNDEF tag.
    #[default]
    Undef,
    /// The shared canonical undef singleton (compat mode only).
    CanonicalUndef,
    Bool(bool),
    Int(i64),
    /// A varint too large for `i64`.
    UInt(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Str(String),
    Array(Vec<SharedValue>),
    /// Key/value pairs in wire order.
    Map(Vec<(String, SharedValue)>),
    /// A reference to another node (REFP, or REFN in compat mode).
    Ref(SharedValue),
    /// A weakened reference (compat mode). Holds the referent strongly; the
    /// wrapper itself is the weakness marker.
    Weak(SharedValue),
    Regexp(Regexp),
    /// A blessed value (compat mode).
    Object {
        class: String,
        value: SharedValue,
    },
    /// A FREEZE payload with no unmarshaler.
    Freeze {
        class: String,
        payload: Vec<u8>,
    },
    /// A FREEZE payload consumed by a registered unmarshaler.
    Frozen(FrozenValue),
}

impl Value {
    /// Moves this value into a fresh shared cell.
    pub fn into_shared(self) -> SharedValue {
        shared(self)
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef | Value::CanonicalUndef)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
