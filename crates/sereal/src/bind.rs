//! Binding decoded values into caller-typed destinations.
//!
//! The interpreter produces a dynamic graph; this module adapts it to
//! whatever shape the caller handed in: scalars with numeric widening,
//! sequences, mappings, records with wire-name field resolution, or a
//! dynamic [`Value`] slot that takes anything.

use std::any::{Any, TypeId};
use std::cell::Ref;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use crate::constants::MAX_DEPTH;
use crate::error::{Result, SerealError};
use crate::value::{SharedValue, Value};

/// A handle to one node of the decoded graph.
#[derive(Clone)]
pub struct Val {
    cell: SharedValue,
    depth: usize,
}

impl Val {
    pub(crate) fn root(cell: &SharedValue) -> Self {
        Self {
            cell: cell.clone(),
            depth: 0,
        }
    }

    /// Borrows the node's value.
    pub fn get(&self) -> Ref<'_, Value> {
        self.cell.borrow()
    }

    /// A handle to a child node, one level deeper.
    fn child(&self, cell: &SharedValue) -> Result<Val> {
        if self.depth >= MAX_DEPTH {
            return Err(SerealError::DepthLimit);
        }
        Ok(Val {
            cell: cell.clone(),
            depth: self.depth + 1,
        })
    }

    /// Follows reference and weak-reference wrappers to the referent.
    fn resolved(&self) -> Result<Val> {
        let mut v = self.clone();
        loop {
            let __guard = v.get();
            let inner = match &*__guard {
                Value::Ref(inner) | Value::Weak(inner) => inner.clone(),
                _ => break,
            };
            drop(__guard);
            v = v.child(&inner)?;
        }
        Ok(v)
    }
}

/// A typed destination for decoded values.
pub trait Bind {
    /// Installs the decoded value into this destination.
    fn bind(&mut self, v: &Val) -> Result<()>;

    /// Hook for FREEZE payloads. Destinations with a custom frozen wire
    /// format consume the payload and return `Ok(true)`.
    fn bind_frozen(&mut self, class: &str, payload: &[u8]) -> Result<bool> {
        let _ = (class, payload);
        Ok(false)
    }
}

/// Routes a node into a destination, giving the destination's frozen hook
/// first refusal on FREEZE payloads.
pub(crate) fn bind_value(dest: &mut dyn Bind, v: &Val) -> Result<()> {
    let __guard = v.get();
    let frozen = match &*__guard {
        Value::Freeze { class, payload } => Some((class.clone(), payload.clone())),
        Value::Frozen(f) => Some((f.class.clone(), f.payload.clone())),
        _ => None,
    };
    drop(__guard);
    if let Some((class, payload)) = frozen {
        if dest.bind_frozen(&class, &payload)? {
            return Ok(());
        }
        return dest.bind(v).map_err(|e| match e {
            SerealError::BadDestination(_) => SerealError::UnmarshalerMissing(class),
            other => other,
        });
    }
    dest.bind(v)
}

pub(crate) fn bind_root(dest: &mut dyn Bind, cell: &SharedValue) -> Result<()> {
    bind_value(dest, &Val::root(cell))
}

impl Bind for Value {
    fn bind(&mut self, v: &Val) -> Result<()> {
        *self = v.get().clone();
        Ok(())
    }
}

macro_rules! bind_integer {
    ($($ty:ty),* $(,)?) => {$(
        impl Bind for $ty {
            fn bind(&mut self, v: &Val) -> Result<()> {
                let v = v.resolved()?;
                let __guard = v.get();
        match &*__guard {
                    Value::Int(i) => {
                        *self = <$ty>::try_from(*i).map_err(|_| {
                            SerealError::BadDestination(concat!(
                                "integer out of range for ",
                                stringify!($ty)
                            ))
                        })?;
                        Ok(())
                    }
                    Value::UInt(u) => {
                        *self = <$ty>::try_from(*u).map_err(|_| {
                            SerealError::BadDestination(concat!(
                                "integer out of range for ",
                                stringify!($ty)
                            ))
                        })?;
                        Ok(())
                    }
                    // scalar slots keep their value on undef
                    Value::Undef | Value::CanonicalUndef => Ok(()),
                    _ => Err(SerealError::BadDestination(concat!(
                        "expected integer for ",
                        stringify!($ty)
                    ))),
                }
            }
        }
    )*};
}

bind_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl Bind for f32 {
    fn bind(&mut self, v: &Val) -> Result<()> {
        let v = v.resolved()?;
        let __guard = v.get();
        match &*__guard {
            Value::Float(f) => {
                *self = *f;
                Ok(())
            }
            Value::Undef | Value::CanonicalUndef => Ok(()),
            _ => Err(SerealError::BadDestination("expected float32")),
        }
    }
}

impl Bind for f64 {
    fn bind(&mut self, v: &Val) -> Result<()> {
        let v = v.resolved()?;
        let __guard = v.get();
        match &*__guard {
            Value::Float(f) => {
                *self = f64::from(*f);
                Ok(())
            }
            Value::Double(d) => {
                *self = *d;
                Ok(())
            }
            Value::Undef | Value::CanonicalUndef => Ok(()),
            _ => Err(SerealError::BadDestination("expected float")),
        }
    }
}

impl Bind for bool {
    fn bind(&mut self, v: &Val) -> Result<()> {
        let v = v.resolved()?;
        let __guard = v.get();
        match &*__guard {
            Value::Bool(b) => {
                *self = *b;
                Ok(())
            }
            Value::Undef | Value::CanonicalUndef => Ok(()),
            _ => Err(SerealError::BadDestination("expected bool")),
        }
    }
}

impl Bind for String {
    fn bind(&mut self, v: &Val) -> Result<()> {
        let v = v.resolved()?;
        let __guard = v.get();
        match &*__guard {
            Value::Str(s) => {
                *self = s.clone();
                Ok(())
            }
            Value::Bytes(b) => {
                *self = String::from_utf8_lossy(b).into_owned();
                Ok(())
            }
            Value::Undef | Value::CanonicalUndef => Ok(()),
            _ => Err(SerealError::BadDestination("expected string")),
        }
    }
}

impl<T: Bind + Default> Bind for Option<T> {
    fn bind(&mut self, v: &Val) -> Result<()> {
        let v = v.resolved()?;
        if v.get().is_undef() {
            *self = None;
            return Ok(());
        }
        let mut inner = self.take().unwrap_or_default();
        bind_value(&mut inner, &v)?;
        *self = Some(inner);
        Ok(())
    }
}

impl<T: Bind + Default + 'static> Bind for Vec<T> {
    fn bind(&mut self, v: &Val) -> Result<()> {
        let v = v.resolved()?;

        // byte destinations take string/binary payloads directly
        if let Some(bytes) = (self as &mut dyn Any).downcast_mut::<Vec<u8>>() {
            let __guard = v.get();
            match &*__guard {
                Value::Bytes(b) => {
                    *bytes = b.clone();
                    return Ok(());
                }
                Value::Str(s) => {
                    *bytes = s.clone().into_bytes();
                    return Ok(());
                }
                Value::Freeze { payload, .. } => {
                    *bytes = payload.clone();
                    return Ok(());
                }
                Value::Frozen(f) => {
                    *bytes = f.payload.clone();
                    return Ok(());
                }
                _ => {}
            }
        }

        let __guard = v.get();
        match &*__guard {
            Value::Array(elems) => {
                // an empty destination is allocated to the decoded length; a
                // pre-sized one keeps its length and discards the excess
                if self.is_empty() {
                    self.resize_with(elems.len(), T::default);
                }
                for (slot, elem) in self.iter_mut().zip(elems) {
                    bind_value(slot, &v.child(elem)?)?;
                }
                Ok(())
            }
            Value::Undef | Value::CanonicalUndef => {
                self.clear();
                Ok(())
            }
            _ => Err(SerealError::BadDestination("expected array")),
        }
    }
}

impl<T: Bind + 'static, const N: usize> Bind for [T; N] {
    fn bind(&mut self, v: &Val) -> Result<()> {
        let v = v.resolved()?;

        if let Some(bytes) = (self as &mut dyn Any).downcast_mut::<[u8; N]>() {
            let __guard = v.get();
            match &*__guard {
                Value::Bytes(b) => {
                    for (slot, byte) in bytes.iter_mut().zip(b) {
                        *slot = *byte;
                    }
                    return Ok(());
                }
                Value::Str(s) => {
                    for (slot, byte) in bytes.iter_mut().zip(s.as_bytes()) {
                        *slot = *byte;
                    }
                    return Ok(());
                }
                _ => {}
            }
        }

        let __guard = v.get();
        match &*__guard {
            Value::Array(elems) => {
                for (slot, elem) in self.iter_mut().zip(elems) {
                    bind_value(slot, &v.child(elem)?)?;
                }
                Ok(())
            }
            Value::Undef | Value::CanonicalUndef => Ok(()),
            _ => Err(SerealError::BadDestination("expected array")),
        }
    }
}

impl<T: Bind + Default> Bind for HashMap<String, T> {
    fn bind(&mut self, v: &Val) -> Result<()> {
        let v = v.resolved()?;
        let __guard = v.get();
        match &*__guard {
            Value::Map(pairs) => {
                for (key, cell) in pairs {
                    let mut slot = T::default();
                    bind_value(&mut slot, &v.child(cell)?)?;
                    self.insert(key.clone(), slot);
                }
                Ok(())
            }
            Value::Undef | Value::CanonicalUndef => {
                self.clear();
                Ok(())
            }
            _ => Err(SerealError::BadDestination("expected map")),
        }
    }
}

impl<T: Bind + Default> Bind for BTreeMap<String, T> {
    fn bind(&mut self, v: &Val) -> Result<()> {
        let v = v.resolved()?;
        let __guard = v.get();
        match &*__guard {
            Value::Map(pairs) => {
                for (key, cell) in pairs {
                    let mut slot = T::default();
                    bind_value(&mut slot, &v.child(cell)?)?;
                    self.insert(key.clone(), slot);
                }
                Ok(())
            }
            Value::Undef | Value::CanonicalUndef => {
                self.clear();
                Ok(())
            }
            _ => Err(SerealError::BadDestination("expected map")),
        }
    }
}

/// One field of a [`Record`], named as it appears on the wire.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
}

/// A struct destination with named fields.
///
/// Usually implemented through the [`record!`](crate::record) macro, which
/// also wires up [`Bind`] via [`bind_record`].
pub trait Record: 'static {
    /// The wire names of the fields, in declaration order.
    fn fields() -> &'static [FieldDef];
    /// Mutable access to the field at `index` in [`fields`](Record::fields)
    /// order.
    fn field_mut(&mut self, index: usize) -> Option<&mut dyn Bind>;
}

struct FieldMap {
    exact: HashMap<&'static str, usize>,
    folded: HashMap<String, usize>,
}

impl FieldMap {
    fn build(fields: &'static [FieldDef]) -> Self {
        let mut exact = HashMap::with_capacity(fields.len());
        let mut folded = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            exact.entry(field.name).or_insert(index);
            folded
                .entry(field.name.to_ascii_lowercase())
                .or_insert(index);
        }
        Self { exact, folded }
    }

    /// Exact wire-name match first, then ASCII case-insensitive.
    fn resolve(&self, key: &str) -> Option<usize> {
        self.exact
            .get(key)
            .copied()
            .or_else(|| self.folded.get(&key.to_ascii_lowercase()).copied())
    }
}

// One entry per record type ever bound, so the map only grows by O(types).
fn field_map<T: Record>() -> Arc<FieldMap> {
    static CACHE: OnceLock<Mutex<HashMap<TypeId, Arc<FieldMap>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock().unwrap();
    cache
        .entry(TypeId::of::<T>())
        .or_insert_with(|| Arc::new(FieldMap::build(T::fields())))
        .clone()
}

/// Binds a mapping value into a record destination. Keys with no matching
/// field are dropped; a record with no fields ignores the mapping entirely.
pub fn bind_record<T: Record>(dest: &mut T, v: &Val) -> Result<()> {
    let v = v.resolved()?;
    if v.get().is_undef() {
        return Ok(());
    }
    if T::fields().is_empty() {
        let __guard = v.get();
        return match &*__guard {
            Value::Map(_) => Ok(()),
            _ => Err(SerealError::BadDestination("expected map for record")),
        };
    }
    let map = field_map::<T>();
    let __guard = v.get();
    match &*__guard {
        Value::Map(pairs) => {
            for (key, cell) in pairs {
                if let Some(index) = map.resolve(key) {
                    if let Some(slot) = dest.field_mut(index) {
                        bind_value(slot, &v.child(cell)?)?;
                    }
                }
            }
            Ok(())
        }
        _ => Err(SerealError::BadDestination("expected map for record")),
    }
}

/// Implements [`Record`] and [`Bind`] for a struct, mapping wire keys to
/// fields.
///
/// ```
/// #[derive(Default)]
/// struct Point {
///     x: i64,
///     y: i64,
/// }
///
/// sereal::record!(Point {
///     "x" => x,
///     "y" => y,
/// });
/// ```
#[macro_export]
macro_rules! record {
    ($ty:ty { $($name:literal => $field:ident),+ $(,)? }) => {
        impl $crate::Record for $ty {
            fn fields() -> &'static [$crate::FieldDef] {
                const FIELDS: &[$crate::FieldDef] = &[
                    $( $crate::FieldDef { name: $name } ),+
                ];
                FIELDS
            }

            fn field_mut(&mut self, index: usize) -> Option<&mut dyn $crate::Bind> {
                let mut i = 0usize;
                $(
                    if index == i {
                        return Some(&mut self.$field as &mut dyn $crate::Bind);
                    }
                    i += 1;
                )+
                let _ = i;
                None
            }
        }

        impl $crate::Bind for $ty {
            fn bind(&mut self, v: &$crate::Val) -> $crate::Result<()> {
                $crate::bind_record(self, v)
            }
        }
    };
    ($ty:ty {}) => {
        impl $crate::Record for $ty {
            fn fields() -> &'static [$crate::FieldDef] {
                &[]
            }

            fn field_mut(&mut self, _index: usize) -> Option<&mut dyn $crate::Bind> {
                None
            }
        }

        impl $crate::Bind for $ty {
            fn bind(&mut self, v: &$crate::Val) -> $crate::Result<()> {
                $crate::bind_record(self, v)
            }
        }
    };
}
