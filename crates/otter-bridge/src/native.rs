//! Host-side values
//!
//! [`NativeValue`] is the closed set of shapes the bridge knows how to hand
//! to a script. Host types get in and out through [`IntoNative`] and
//! [`FromNative`]; containers that scripts should mutate in place are held in
//! the aliasing handles [`NativeSlice`] and [`NativeMap`] (and [`Shared`] for
//! records).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{BridgeError, BridgeResult};
use crate::func::NativeFunc;
use crate::record::{Record, Shared, StructAccess};
use crate::value::Value;

/// A host value as seen by the bridge
#[derive(Clone, Default)]
pub enum NativeValue {
    /// Absent value (`None`, null pointer, empty interface)
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    Uint(u64),
    /// Float
    Float(f64),
    /// Integer that fits neither `i64` nor `u64`
    BigInt(BigInt),
    /// String
    Str(String),
    /// Owned copy of a script list
    List(Vec<NativeValue>),
    /// Owned copy of a script tuple
    Tuple(Vec<NativeValue>),
    /// Owned copy of a script dict, in insertion order
    Dict(Vec<(NativeValue, NativeValue)>),
    /// Shared aggregate
    Struct(Arc<dyn StructAccess>),
    /// Shared associative container
    Map(Arc<dyn MapAccess>),
    /// Shared sequence
    Slice(Arc<dyn SliceAccess>),
    /// Host callable
    Func(NativeFunc),
    /// Host value exposed only through methods and accessors
    Opaque(Arc<dyn OpaqueAccess>),
    /// Script value with no native counterpart, passed through untouched
    Script(Value),
    /// Host value that cannot cross the bridge, by type name
    Unsupported(String),
}

impl NativeValue {
    /// Wrap a host value exposed through [`OpaqueAccess`]
    pub fn opaque(value: impl OpaqueAccess) -> Self {
        NativeValue::Opaque(Arc::new(value))
    }

    /// Short name of the shape, for error messages
    pub fn kind_name(&self) -> String {
        match self {
            NativeValue::Nil => "nil".to_string(),
            NativeValue::Bool(_) => "bool".to_string(),
            NativeValue::Int(_) => "int".to_string(),
            NativeValue::Uint(_) => "uint".to_string(),
            NativeValue::Float(_) => "float".to_string(),
            NativeValue::BigInt(_) => "bigint".to_string(),
            NativeValue::Str(_) => "string".to_string(),
            NativeValue::List(_) => "list".to_string(),
            NativeValue::Tuple(_) => "tuple".to_string(),
            NativeValue::Dict(_) => "dict".to_string(),
            NativeValue::Struct(s) => s.type_name().to_string(),
            NativeValue::Map(m) => m.type_name(),
            NativeValue::Slice(s) => s.type_name(),
            NativeValue::Func(f) => format!("func {}", f.name()),
            NativeValue::Opaque(o) => o.type_name(),
            NativeValue::Script(v) => v.type_name(),
            NativeValue::Unsupported(name) => name.clone(),
        }
    }

    /// Check for [`NativeValue::Nil`]
    pub fn is_nil(&self) -> bool {
        matches!(self, NativeValue::Nil)
    }

    /// Signed integer payload, accepting any integer that fits
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NativeValue::Int(i) => Some(*i),
            NativeValue::Uint(u) => i64::try_from(*u).ok(),
            NativeValue::BigInt(b) => b.to_i64(),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        use NativeValue::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) | (Tuple(a), Tuple(b)) => a == b,
            (Dict(a), Dict(b)) => a == b,
            (Struct(a), Struct(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Map(a), Map(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Slice(a), Slice(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Opaque(a), Opaque(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Func(a), Func(b)) => a.ptr_eq(b),
            (Script(a), Script(b)) => a.equals(b),
            (Unsupported(a), Unsupported(b)) => a == b,
            (a, b) => match (int_value(a), int_value(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

fn int_value(value: &NativeValue) -> Option<BigInt> {
    match value {
        NativeValue::Int(i) => Some(BigInt::from(*i)),
        NativeValue::Uint(u) => Some(BigInt::from(*u)),
        NativeValue::BigInt(b) => Some(b.clone()),
        _ => None,
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Nil => write!(f, "Nil"),
            NativeValue::Bool(b) => write!(f, "Bool({b})"),
            NativeValue::Int(i) => write!(f, "Int({i})"),
            NativeValue::Uint(u) => write!(f, "Uint({u})"),
            NativeValue::Float(x) => write!(f, "Float({x})"),
            NativeValue::BigInt(b) => write!(f, "BigInt({b})"),
            NativeValue::Str(s) => write!(f, "Str({s:?})"),
            NativeValue::List(items) => f.debug_tuple("List").field(items).finish(),
            NativeValue::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            NativeValue::Dict(items) => f.debug_tuple("Dict").field(items).finish(),
            NativeValue::Struct(s) => write!(f, "Struct({})", s.type_name()),
            NativeValue::Map(m) => write!(f, "Map({})", m.type_name()),
            NativeValue::Slice(s) => write!(f, "Slice({})", s.type_name()),
            NativeValue::Func(func) => write!(f, "Func({})", func.name()),
            NativeValue::Opaque(o) => write!(f, "Opaque({})", o.type_name()),
            NativeValue::Script(v) => write!(f, "Script({v})"),
            NativeValue::Unsupported(name) => write!(f, "Unsupported({name})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion traits
// ---------------------------------------------------------------------------

/// Conversion of a host value into a [`NativeValue`]
pub trait IntoNative {
    /// Convert, consuming the value
    fn into_native(self) -> NativeValue;
}

/// Conversion of a [`NativeValue`] into a concrete host type.
///
/// Numeric conversions are checked: narrowing fails when the value does not
/// fit, integers widen to floats, floats never truncate to integers.
pub trait FromNative: Sized {
    /// Convert, failing on a type mismatch
    fn from_native(value: NativeValue) -> BridgeResult<Self>;
}

/// Element type usable in a [`NativeSlice`] or as a [`NativeMap`] value
pub trait Element: IntoNative + FromNative + Clone + Send + Sync + 'static {}

impl<T> Element for T where T: IntoNative + FromNative + Clone + Send + Sync + 'static {}

/// Key type usable in a [`NativeMap`]
pub trait Key: Element + Hash + Eq {}

impl<T> Key for T where T: Element + Hash + Eq {}

fn mismatch<T>(value: &NativeValue) -> BridgeError {
    BridgeError::mismatch(std::any::type_name::<T>(), value.kind_name())
}

fn out_of_range<T>(value: &NativeValue) -> BridgeError {
    BridgeError::Conversion(format!(
        "value {value:?} out of range for {}",
        std::any::type_name::<T>()
    ))
}

impl IntoNative for NativeValue {
    fn into_native(self) -> NativeValue {
        self
    }
}

impl FromNative for NativeValue {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        Ok(value)
    }
}

impl IntoNative for Value {
    fn into_native(self) -> NativeValue {
        NativeValue::Script(self)
    }
}

impl FromNative for Value {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        crate::convert::Converter::default().to_script(value)
    }
}

impl IntoNative for bool {
    fn into_native(self) -> NativeValue {
        NativeValue::Bool(self)
    }
}

impl FromNative for bool {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        match value {
            NativeValue::Bool(b) => Ok(b),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

macro_rules! impl_int {
    ($variant:ident as $wide:ty; $($ty:ty),*) => {$(
        impl IntoNative for $ty {
            fn into_native(self) -> NativeValue {
                NativeValue::$variant(self as $wide)
            }
        }

        impl FromNative for $ty {
            fn from_native(value: NativeValue) -> BridgeResult<Self> {
                let converted = match &value {
                    NativeValue::Int(i) => <$ty>::try_from(*i).ok(),
                    NativeValue::Uint(u) => <$ty>::try_from(*u).ok(),
                    NativeValue::BigInt(b) => <$ty>::try_from(b).ok(),
                    _ => return Err(mismatch::<Self>(&value)),
                };
                converted.ok_or_else(|| out_of_range::<Self>(&value))
            }
        }
    )*};
}

impl_int!(Int as i64; i8, i16, i32, i64, isize);
impl_int!(Uint as u64; u8, u16, u32, u64, usize);

impl IntoNative for f64 {
    fn into_native(self) -> NativeValue {
        NativeValue::Float(self)
    }
}

impl FromNative for f64 {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        match value {
            NativeValue::Float(f) => Ok(f),
            NativeValue::Int(i) => Ok(i as f64),
            NativeValue::Uint(u) => Ok(u as f64),
            NativeValue::BigInt(ref b) => b.to_f64().ok_or_else(|| out_of_range::<Self>(&value)),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl IntoNative for f32 {
    fn into_native(self) -> NativeValue {
        NativeValue::Float(f64::from(self))
    }
}

impl FromNative for f32 {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        f64::from_native(value).map(|f| f as f32)
    }
}

impl IntoNative for BigInt {
    fn into_native(self) -> NativeValue {
        if let Some(i) = self.to_i64() {
            NativeValue::Int(i)
        } else if let Some(u) = self.to_u64() {
            NativeValue::Uint(u)
        } else {
            NativeValue::BigInt(self)
        }
    }
}

impl FromNative for BigInt {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        int_value(&value).ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl IntoNative for String {
    fn into_native(self) -> NativeValue {
        NativeValue::Str(self)
    }
}

impl IntoNative for &str {
    fn into_native(self) -> NativeValue {
        NativeValue::Str(self.to_string())
    }
}

impl FromNative for String {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        match value {
            NativeValue::Str(s) => Ok(s),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: IntoNative> IntoNative for Option<T> {
    fn into_native(self) -> NativeValue {
        match self {
            Some(value) => value.into_native(),
            None => NativeValue::Nil,
        }
    }
}

impl<T: FromNative> FromNative for Option<T> {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        match value {
            NativeValue::Nil => Ok(None),
            other => T::from_native(other).map(Some),
        }
    }
}

impl<T: IntoNative> IntoNative for Box<T> {
    fn into_native(self) -> NativeValue {
        (*self).into_native()
    }
}

impl<T: FromNative> FromNative for Box<T> {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        T::from_native(value).map(Box::new)
    }
}

impl IntoNative for NativeFunc {
    fn into_native(self) -> NativeValue {
        NativeValue::Func(self)
    }
}

impl FromNative for NativeFunc {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        match value {
            NativeValue::Func(f) => Ok(f),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: Record> IntoNative for Shared<T> {
    fn into_native(self) -> NativeValue {
        NativeValue::Struct(Arc::new(self))
    }
}

impl<T: Record> FromNative for Shared<T> {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        if let NativeValue::Struct(access) = &value {
            if let Some(shared) = access.as_any().downcast_ref::<Shared<T>>() {
                return Ok(shared.clone());
            }
        }
        Err(mismatch::<Self>(&value))
    }
}

macro_rules! impl_unsupported {
    ($($path:ident)::+) => {
        impl<T> IntoNative for $($path)::+<T> {
            fn into_native(self) -> NativeValue {
                NativeValue::Unsupported(std::any::type_name::<Self>().to_string())
            }
        }
    };
}

impl_unsupported!(crossbeam_channel::Sender);
impl_unsupported!(crossbeam_channel::Receiver);
impl_unsupported!(std::sync::mpsc::Sender);
impl_unsupported!(std::sync::mpsc::Receiver);

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

/// Type-erased access to a shared sequence
pub trait SliceAccess: Send + Sync + 'static {
    /// Native type name
    fn type_name(&self) -> String;
    /// Current length
    fn len(&self) -> usize;
    /// Whether there are no elements
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Element at `index`
    fn get(&self, index: usize) -> Option<NativeValue>;
    /// Replace the element at `index`
    fn set(&self, index: usize, value: NativeValue) -> BridgeResult<()>;
    /// Append one element
    fn push(&self, value: NativeValue) -> BridgeResult<()>;
    /// Append many elements; nothing is appended if any conversion fails
    fn extend(&self, values: Vec<NativeValue>) -> BridgeResult<()>;
    /// Insert at `index` (`index <= len`)
    fn insert(&self, index: usize, value: NativeValue) -> BridgeResult<()>;
    /// Remove and return the element at `index`
    fn remove(&self, index: usize) -> Option<NativeValue>;
    /// First position in `start..end` equal to `value`
    fn position(&self, value: NativeValue, start: usize, end: usize) -> Option<usize>;
    /// Remove every element
    fn clear(&self);
    /// New independent sequence holding the elements at `indices`
    fn select(&self, indices: &[usize]) -> Arc<dyn SliceAccess>;
    /// Copy of all elements
    fn to_vec(&self) -> Vec<NativeValue>;
    /// Address of the shared storage; equal for every handle aliasing it
    fn identity(&self) -> usize;
    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn SliceAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Shared, growable sequence. Cloning the handle aliases the elements.
pub struct NativeSlice<T>(Arc<RwLock<Vec<T>>>);

impl<T> NativeSlice<T> {
    /// Wrap a vector
    pub fn new(items: Vec<T>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    /// Read access
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.0.read()
    }

    /// Write access
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.0.write()
    }

    /// Current length
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the sequence is empty
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Whether two handles alias the same elements
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> NativeSlice<T> {
    /// Copy of the elements
    pub fn snapshot(&self) -> Vec<T> {
        self.0.read().clone()
    }
}

impl<T> Clone for NativeSlice<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for NativeSlice<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: fmt::Debug> fmt::Debug for NativeSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeSlice").field(&*self.0.read()).finish()
    }
}

impl<T> From<Vec<T>> for NativeSlice<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

fn convert_all<T: FromNative>(values: Vec<NativeValue>) -> BridgeResult<Vec<T>> {
    values.into_iter().map(T::from_native).collect()
}

impl<T: Element + PartialEq> SliceAccess for NativeSlice<T> {
    fn type_name(&self) -> String {
        format!("[]{}", std::any::type_name::<T>())
    }

    fn len(&self) -> usize {
        NativeSlice::len(self)
    }

    fn get(&self, index: usize) -> Option<NativeValue> {
        self.read().get(index).cloned().map(IntoNative::into_native)
    }

    fn set(&self, index: usize, value: NativeValue) -> BridgeResult<()> {
        let value = T::from_native(value)?;
        let mut items = self.write();
        let len = items.len();
        let slot = items.get_mut(index).ok_or(BridgeError::IndexOutOfRange {
            index: index as i64,
            len,
        })?;
        *slot = value;
        Ok(())
    }

    fn push(&self, value: NativeValue) -> BridgeResult<()> {
        let value = T::from_native(value)?;
        self.write().push(value);
        Ok(())
    }

    fn extend(&self, values: Vec<NativeValue>) -> BridgeResult<()> {
        let values = convert_all::<T>(values)?;
        self.write().extend(values);
        Ok(())
    }

    fn insert(&self, index: usize, value: NativeValue) -> BridgeResult<()> {
        let value = T::from_native(value)?;
        let mut items = self.write();
        let index = index.min(items.len());
        items.insert(index, value);
        Ok(())
    }

    fn remove(&self, index: usize) -> Option<NativeValue> {
        let mut items = self.write();
        (index < items.len()).then(|| items.remove(index).into_native())
    }

    fn position(&self, value: NativeValue, start: usize, end: usize) -> Option<usize> {
        // A value of the wrong type is never equal to an element.
        let target = T::from_native(value).ok()?;
        let items = self.read();
        let end = end.min(items.len());
        if start >= end {
            return None;
        }
        items[start..end]
            .iter()
            .position(|item| *item == target)
            .map(|offset| start + offset)
    }

    fn clear(&self) {
        self.write().clear();
    }

    fn select(&self, indices: &[usize]) -> Arc<dyn SliceAccess> {
        let items = self.read();
        let picked = indices
            .iter()
            .filter_map(|&i| items.get(i).cloned())
            .collect();
        Arc::new(NativeSlice::<T>::new(picked))
    }

    fn to_vec(&self) -> Vec<NativeValue> {
        self.snapshot().into_iter().map(IntoNative::into_native).collect()
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: Element + PartialEq> IntoNative for NativeSlice<T> {
    fn into_native(self) -> NativeValue {
        NativeValue::Slice(Arc::new(self))
    }
}

impl<T: Element + PartialEq> FromNative for NativeSlice<T> {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        match value {
            NativeValue::Slice(access) => match access.as_any().downcast_ref::<NativeSlice<T>>() {
                Some(same) => Ok(same.clone()),
                None => convert_all(access.to_vec()).map(NativeSlice::new),
            },
            NativeValue::List(items) | NativeValue::Tuple(items) => {
                convert_all(items).map(NativeSlice::new)
            }
            NativeValue::Nil => Ok(NativeSlice::new(Vec::new())),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: Element + PartialEq> IntoNative for Vec<T> {
    fn into_native(self) -> NativeValue {
        NativeSlice::new(self).into_native()
    }
}

impl<T: FromNative> FromNative for Vec<T> {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        match value {
            NativeValue::List(items) | NativeValue::Tuple(items) => convert_all(items),
            NativeValue::Slice(access) => convert_all(access.to_vec()),
            NativeValue::Nil => Ok(Vec::new()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

/// Type-erased access to a shared associative container
pub trait MapAccess: Send + Sync + 'static {
    /// Native type name
    fn type_name(&self) -> String;
    /// Number of entries
    fn len(&self) -> usize;
    /// Whether there are no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Value for `key`; a key of the wrong type is simply absent
    fn get(&self, key: NativeValue) -> Option<NativeValue>;
    /// Insert or replace; nothing changes if either conversion fails
    fn insert(&self, key: NativeValue, value: NativeValue) -> BridgeResult<()>;
    /// Insert or replace many entries; nothing changes if any conversion fails
    fn extend(&self, entries: Vec<(NativeValue, NativeValue)>) -> BridgeResult<()>;
    /// Remove and return the value for `key`
    fn remove(&self, key: NativeValue) -> Option<NativeValue>;
    /// Remove and return the first entry
    fn pop_first(&self) -> Option<(NativeValue, NativeValue)>;
    /// Snapshot of the keys
    fn keys(&self) -> Vec<NativeValue>;
    /// Snapshot of the entries
    fn items(&self) -> Vec<(NativeValue, NativeValue)>;
    /// Remove every entry
    fn clear(&self);
    /// Address of the shared storage; equal for every handle aliasing it
    fn identity(&self) -> usize;
    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn MapAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Shared, insertion-ordered map. Cloning the handle aliases the entries.
pub struct NativeMap<K, V>(Arc<RwLock<IndexMap<K, V>>>);

impl<K, V> NativeMap<K, V> {
    /// Wrap a map
    pub fn new(entries: IndexMap<K, V>) -> Self {
        Self(Arc::new(RwLock::new(entries)))
    }

    /// Read access
    pub fn read(&self) -> RwLockReadGuard<'_, IndexMap<K, V>> {
        self.0.read()
    }

    /// Write access
    pub fn write(&self) -> RwLockWriteGuard<'_, IndexMap<K, V>> {
        self.0.write()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Whether two handles alias the same entries
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<K: Clone, V: Clone> NativeMap<K, V> {
    /// Copy of the entries
    pub fn snapshot(&self) -> IndexMap<K, V> {
        self.0.read().clone()
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for NativeMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<K, V> Clone for NativeMap<K, V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<K, V> PartialEq for NativeMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for NativeMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeMap").field(&*self.0.read()).finish()
    }
}

impl<K: Key, V: Element> MapAccess for NativeMap<K, V> {
    fn type_name(&self) -> String {
        format!(
            "map[{}]{}",
            std::any::type_name::<K>(),
            std::any::type_name::<V>()
        )
    }

    fn len(&self) -> usize {
        NativeMap::len(self)
    }

    fn get(&self, key: NativeValue) -> Option<NativeValue> {
        let key = K::from_native(key).ok()?;
        self.read().get(&key).cloned().map(IntoNative::into_native)
    }

    fn insert(&self, key: NativeValue, value: NativeValue) -> BridgeResult<()> {
        let key = K::from_native(key)?;
        let value = V::from_native(value)?;
        self.write().insert(key, value);
        Ok(())
    }

    fn extend(&self, entries: Vec<(NativeValue, NativeValue)>) -> BridgeResult<()> {
        let entries = convert_pairs::<K, V, Vec<_>>(entries)?;
        self.write().extend(entries);
        Ok(())
    }

    fn remove(&self, key: NativeValue) -> Option<NativeValue> {
        let key = K::from_native(key).ok()?;
        self.write().shift_remove(&key).map(IntoNative::into_native)
    }

    fn pop_first(&self) -> Option<(NativeValue, NativeValue)> {
        self.write()
            .shift_remove_index(0)
            .map(|(k, v)| (k.into_native(), v.into_native()))
    }

    fn keys(&self) -> Vec<NativeValue> {
        self.read().keys().cloned().map(IntoNative::into_native).collect()
    }

    fn items(&self) -> Vec<(NativeValue, NativeValue)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone().into_native(), v.clone().into_native()))
            .collect()
    }

    fn clear(&self) {
        self.write().clear();
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<K: Key, V: Element> IntoNative for NativeMap<K, V> {
    fn into_native(self) -> NativeValue {
        NativeValue::Map(Arc::new(self))
    }
}

fn convert_pairs<K: FromNative, V: FromNative, C: FromIterator<(K, V)>>(
    pairs: Vec<(NativeValue, NativeValue)>,
) -> BridgeResult<C> {
    pairs
        .into_iter()
        .map(|(k, v)| Ok((K::from_native(k)?, V::from_native(v)?)))
        .collect()
}

fn pairs_of<C>(value: NativeValue) -> BridgeResult<Vec<(NativeValue, NativeValue)>> {
    match value {
        NativeValue::Dict(pairs) => Ok(pairs),
        NativeValue::Map(access) => Ok(access.items()),
        NativeValue::Nil => Ok(Vec::new()),
        other => Err(mismatch::<C>(&other)),
    }
}

impl<K: Key, V: Element> FromNative for NativeMap<K, V> {
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        if let NativeValue::Map(access) = &value {
            if let Some(same) = access.as_any().downcast_ref::<NativeMap<K, V>>() {
                return Ok(same.clone());
            }
        }
        convert_pairs::<K, V, IndexMap<K, V>>(pairs_of::<Self>(value)?).map(NativeMap::new)
    }
}

impl<K: Key, V: Element, S: BuildHasher> IntoNative for HashMap<K, V, S> {
    fn into_native(self) -> NativeValue {
        self.into_iter().collect::<NativeMap<K, V>>().into_native()
    }
}

impl<K, V, S> FromNative for HashMap<K, V, S>
where
    K: FromNative + Hash + Eq,
    V: FromNative,
    S: BuildHasher + Default,
{
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        convert_pairs(pairs_of::<Self>(value)?)
    }
}

impl<K: Key, V: Element, S: BuildHasher> IntoNative for IndexMap<K, V, S> {
    fn into_native(self) -> NativeValue {
        self.into_iter().collect::<NativeMap<K, V>>().into_native()
    }
}

impl<K, V, S> FromNative for IndexMap<K, V, S>
where
    K: FromNative + Hash + Eq,
    V: FromNative,
    S: BuildHasher + Default,
{
    fn from_native(value: NativeValue) -> BridgeResult<Self> {
        convert_pairs(pairs_of::<Self>(value)?)
    }
}

// ---------------------------------------------------------------------------
// Opaque values
// ---------------------------------------------------------------------------

/// Primitive payload underneath an opaque value
#[derive(Debug, Clone, PartialEq)]
pub enum Underlying {
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    Uint(u64),
    /// Float
    Float(f64),
    /// String
    Str(String),
    /// Pointer-like handle
    Handle {
        /// Whether the handle is null
        is_null: bool,
    },
    /// Anything else
    Other,
}

/// Host value that scripts see only through methods and typed accessors
pub trait OpaqueAccess: Send + Sync + 'static {
    /// Native type name
    fn type_name(&self) -> String;

    /// Primitive payload, used for truthiness and the `to*` accessors
    fn underlying(&self) -> Underlying {
        Underlying::Other
    }

    /// Bind a method by name
    fn method(&self, _name: &str) -> Option<NativeFunc> {
        None
    }

    /// Method names
    fn method_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Printable representation
    fn repr(&self) -> String {
        match self.underlying() {
            Underlying::Bool(b) => b.to_string(),
            Underlying::Int(i) => i.to_string(),
            Underlying::Uint(u) => u.to_string(),
            Underlying::Float(f) => f.to_string(),
            Underlying::Str(s) => format!("{s:?}"),
            Underlying::Handle { .. } | Underlying::Other => format!("<{}>", self.type_name()),
        }
    }

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}
