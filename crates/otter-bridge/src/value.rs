//! Script-side value protocol
//!
//! This is the surface of the embedded engine's value model that the bridge
//! produces and consumes. Scalars and script-native containers are plain
//! data; everything the bridge wraps (views, native callables, bound
//! methods) is an [`Object`](Value::Object) implementing [`ScriptObject`].
//!
//! Script-native `list`, `tuple` and `dict` values cross the bridge as
//! shared, immutable snapshots.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use rustc_hash::FxHasher;

use crate::error::{BridgeError, BridgeResult};

/// A script namespace: global name to value, in definition order
pub type Globals = IndexMap<String, Value>;

/// Iterator handed out by iterable script values.
///
/// Dropping the iterator ends the iteration; views use this to release
/// their iteration guard.
pub type ScriptIter = Box<dyn Iterator<Item = BridgeResult<Value>> + Send>;

/// A value in the embedded engine
#[derive(Clone, Default)]
pub enum Value {
    /// `None`
    #[default]
    None,
    /// `True` / `False`
    Bool(bool),
    /// Arbitrary precision integer
    Int(BigInt),
    /// 64-bit float
    Float(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Script list snapshot
    List(Arc<[Value]>),
    /// Script tuple
    Tuple(Arc<[Value]>),
    /// Script dict snapshot, in insertion order
    Dict(Arc<[(Value, Value)]>),
    /// Host-provided object (views, callables)
    Object(Arc<dyn ScriptObject>),
}

/// Behaviour of a host-provided script object.
///
/// Every capability beyond the core `type_name`/`truthy`/`freeze`/`hash`
/// quartet has a default that reports the operation as unsupported, so an
/// implementation only overrides what its shape supports.
pub trait ScriptObject: Send + Sync + 'static {
    /// Short type name shown to scripts
    fn type_name(&self) -> String;

    /// Printable representation
    fn repr(&self) -> String {
        format!("<{}>", self.type_name())
    }

    /// Truth value
    fn truthy(&self) -> bool {
        true
    }

    /// Make the object permanently immutable from script
    fn freeze(&self) {}

    /// Hash for use as a dict key
    fn hash(&self) -> BridgeResult<u32> {
        Err(BridgeError::Unhashable(self.type_name()))
    }

    /// Look up an attribute or method. `Ok(None)` means no such attribute.
    fn attr(&self, _name: &str) -> BridgeResult<Option<Value>> {
        Ok(None)
    }

    /// Names of all attributes and methods
    fn attr_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Assign an attribute
    fn set_attr(&self, _name: &str, _value: &Value) -> BridgeResult<()> {
        Err(BridgeError::not_supported(
            self.type_name(),
            "attribute assignment",
        ))
    }

    /// Mapping lookup. `Ok(None)` means the key is absent.
    fn get(&self, _key: &Value) -> BridgeResult<Option<Value>> {
        Err(BridgeError::not_supported(self.type_name(), "key lookup"))
    }

    /// Mapping assignment
    fn set_key(&self, _key: &Value, _value: &Value) -> BridgeResult<()> {
        Err(BridgeError::not_supported(self.type_name(), "key assignment"))
    }

    /// Number of elements, for sized values
    fn len(&self) -> Option<usize> {
        None
    }

    /// Indexed read; negative indices count from the end
    fn index(&self, _index: i64) -> BridgeResult<Value> {
        Err(BridgeError::not_supported(self.type_name(), "indexing"))
    }

    /// Indexed assignment; negative indices count from the end
    fn set_index(&self, _index: i64, _value: &Value) -> BridgeResult<()> {
        Err(BridgeError::not_supported(
            self.type_name(),
            "index assignment",
        ))
    }

    /// `x[start:end:step]`
    fn slice(
        &self,
        _start: Option<i64>,
        _end: Option<i64>,
        _step: Option<i64>,
    ) -> BridgeResult<Value> {
        Err(BridgeError::not_supported(self.type_name(), "slicing"))
    }

    /// Start iterating
    fn iterate(&self) -> BridgeResult<ScriptIter> {
        Err(BridgeError::not_supported(self.type_name(), "iteration"))
    }

    /// Call with positional and named arguments
    fn call(&self, _args: &[Value], _kwargs: &[(String, Value)]) -> BridgeResult<Value> {
        Err(BridgeError::not_supported(self.type_name(), "calling"))
    }

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

impl Value {
    /// Integer value
    pub fn int(n: impl Into<BigInt>) -> Self {
        Self::Int(n.into())
    }

    /// String value
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Arc::from(s.as_ref()))
    }

    /// List value
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Arc::from(items))
    }

    /// Tuple value
    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Arc::from(items))
    }

    /// Dict value
    pub fn dict(items: Vec<(Value, Value)>) -> Self {
        Self::Dict(Arc::from(items))
    }

    /// Wrap a host object
    pub fn object(obj: impl ScriptObject) -> Self {
        Self::Object(Arc::new(obj))
    }

    /// Script type name
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Tuple(_) => "tuple".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Object(obj) => obj.type_name(),
        }
    }

    /// Truth value
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => !n.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(items) => !items.is_empty(),
            Value::Object(obj) => obj.truthy(),
        }
    }

    /// Freeze this value and the objects directly held by a snapshot container
    pub fn freeze(&self) {
        match self {
            Value::List(items) | Value::Tuple(items) => items.iter().for_each(Value::freeze),
            Value::Dict(items) => items.iter().for_each(|(k, v)| {
                k.freeze();
                v.freeze();
            }),
            Value::Object(obj) => obj.freeze(),
            _ => {}
        }
    }

    /// Hash such that `a.equals(b)` implies equal hashes
    pub fn hash(&self) -> BridgeResult<u32> {
        let mut hasher = FxHasher::default();
        match self {
            Value::None => 0u8.hash(&mut hasher),
            Value::Bool(b) => b.hash(&mut hasher),
            Value::Int(n) => n.hash(&mut hasher),
            Value::Float(f) => {
                // Integral floats hash like the equal int.
                if f.fract() == 0.0 && f.abs() < 1e38 {
                    BigInt::from(*f as i128).hash(&mut hasher);
                } else {
                    f.to_bits().hash(&mut hasher);
                }
            }
            Value::Str(s) => s.hash(&mut hasher),
            Value::Tuple(items) => {
                for item in items.iter() {
                    item.hash()?.hash(&mut hasher);
                }
            }
            Value::List(_) | Value::Dict(_) => {
                return Err(BridgeError::Unhashable(self.type_name()));
            }
            Value::Object(obj) => return obj.hash(),
        }
        Ok(hasher.finish() as u32)
    }

    /// Structural equality; objects compare by identity
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                a.to_f64().is_some_and(|a| a == *b)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .find(|(k2, _)| k.equals(k2))
                            .is_some_and(|(_, v2)| v.equals(v2))
                    })
            }
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// Check for `None`
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    /// Integer payload, if it fits in an `i64`
    pub fn as_i64(&self) -> Option<i64> {
        self.as_int().and_then(ToPrimitive::to_i64)
    }

    /// Float payload
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Object payload
    pub fn as_object(&self) -> Option<&Arc<dyn ScriptObject>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Downcast an object payload to a concrete host type
    pub fn downcast_ref<T: ScriptObject>(&self) -> Option<&T> {
        self.as_object()?.as_any().downcast_ref::<T>()
    }

    /// Number of elements, for sized values
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.len()),
            Value::List(items) | Value::Tuple(items) => Some(items.len()),
            Value::Dict(items) => Some(items.len()),
            Value::Object(obj) => obj.len(),
            _ => None,
        }
    }

    /// Iterate a list, tuple, dict (keys) or iterable object
    pub fn iterate(&self) -> BridgeResult<ScriptIter> {
        match self {
            Value::List(items) | Value::Tuple(items) => {
                let items = Arc::clone(items);
                Ok(Box::new((0..items.len()).map(move |i| Ok(items[i].clone()))))
            }
            Value::Dict(items) => {
                let items = Arc::clone(items);
                Ok(Box::new(
                    (0..items.len()).map(move |i| Ok(items[i].0.clone())),
                ))
            }
            Value::Object(obj) => obj.iterate(),
            _ => Err(BridgeError::Conversion(format!(
                "got {}, want iterable",
                self.type_name()
            ))),
        }
    }

    /// `x.name`
    pub fn attr(&self, name: &str) -> BridgeResult<Value> {
        let found = match self {
            Value::Object(obj) => obj.attr(name)?,
            _ => None,
        };
        found.ok_or_else(|| BridgeError::NoAttribute {
            type_name: self.type_name(),
            name: name.to_string(),
        })
    }

    /// `x.name = value`
    pub fn set_attr(&self, name: &str, value: &Value) -> BridgeResult<()> {
        match self {
            Value::Object(obj) => obj.set_attr(name, value),
            _ => Err(BridgeError::not_supported(
                self.type_name(),
                "attribute assignment",
            )),
        }
    }

    /// `x[key]`, with `Ok(None)` for an absent key
    pub fn get(&self, key: &Value) -> BridgeResult<Option<Value>> {
        match self {
            Value::Dict(items) => Ok(items
                .iter()
                .find(|(k, _)| k.equals(key))
                .map(|(_, v)| v.clone())),
            Value::Object(obj) => obj.get(key),
            _ => Err(BridgeError::not_supported(self.type_name(), "key lookup")),
        }
    }

    /// Call with positional and named arguments
    pub fn call(&self, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
        match self {
            Value::Object(obj) => obj.call(args, kwargs),
            _ => Err(BridgeError::not_supported(self.type_name(), "calling")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{:?}", &**s),
            Value::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Dict(items) => {
                write!(f, "{{")?;
                for (i, (k, v)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Object(obj) => write!(f, "{}", obj.repr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}
