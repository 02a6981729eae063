//! Conversion between host and script values
//!
//! [`Converter::to_script`] follows a fixed decision order: script values
//! pass through, scalars are copied, callables are adapted, aggregates and
//! containers become aliasing views, remaining host values with methods
//! become opaque views, and anything left over is rejected.
//! [`Converter::from_script`] is the reverse mapping: views hand back the
//! native handle they alias, script containers are copied element by
//! element, and values with no native counterpart pass through unchanged.

use std::sync::Arc;

use indexmap::IndexMap;
use num_traits::ToPrimitive;
use tracing::trace;

use crate::classify::classify;
use crate::error::{BridgeError, BridgeResult};
use crate::func::NativeFunc;
use crate::native::{IntoNative, MapAccess, NativeValue, SliceAccess};
use crate::value::{Globals, Value};
use crate::views::{MapView, OpaqueView, SliceView, StructView};

/// Host-side namespace: global name to native value
pub type NativeGlobals = IndexMap<String, NativeValue>;

/// A named argument passed to a native callable
#[derive(Debug, Clone, PartialEq)]
pub struct Kwarg {
    /// Argument name
    pub name: String,
    /// Argument value
    pub value: NativeValue,
}

impl Kwarg {
    /// Create a named argument
    pub fn new(name: impl Into<String>, value: impl IntoNative) -> Self {
        Self {
            name: name.into(),
            value: value.into_native(),
        }
    }
}

/// Converts values across the bridge.
///
/// The only knob is the struct tag scheme used to name aggregate fields;
/// views created by a converter keep a copy of it for nested conversions.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    tag: Option<Arc<str>>,
}

impl Converter {
    /// Converter without a tag scheme
    pub fn new() -> Self {
        Self::default()
    }

    /// Converter that names aggregate fields by the given tag scheme
    pub fn with_tag(tag: impl AsRef<str>) -> Self {
        Self {
            tag: Some(Arc::from(tag.as_ref())),
        }
    }

    /// Configured tag scheme
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Convert a host value into a script value
    pub fn to_script(&self, value: NativeValue) -> BridgeResult<Value> {
        trace!(kind = classify(&value).name(), "converting to script");
        Ok(match value {
            NativeValue::Script(v) => v,
            NativeValue::Nil => Value::None,
            NativeValue::Bool(b) => Value::Bool(b),
            NativeValue::Int(i) => Value::int(i),
            NativeValue::Uint(u) => Value::int(u),
            NativeValue::Float(f) => Value::Float(f),
            NativeValue::BigInt(b) => Value::Int(b),
            NativeValue::Str(s) => Value::from(s),
            NativeValue::List(items) => Value::list(self.to_script_all(items)?),
            NativeValue::Tuple(items) => Value::tuple(self.to_script_all(items)?),
            NativeValue::Dict(pairs) => Value::dict(self.to_script_pairs(pairs)?),
            NativeValue::Func(f) => Value::object(f.with_converter(self.clone())),
            NativeValue::Struct(access) => Value::object(StructView::new(access, self.clone())),
            NativeValue::Map(access) => Value::object(MapView::new(access, self.clone())),
            NativeValue::Slice(access) => Value::object(SliceView::new(access, self.clone())),
            NativeValue::Opaque(access) => Value::object(OpaqueView::new(access, self.clone())),
            NativeValue::Unsupported(type_name) => {
                return Err(BridgeError::Unsupported(type_name));
            }
        })
    }

    fn to_script_all(&self, items: Vec<NativeValue>) -> BridgeResult<Vec<Value>> {
        items.into_iter().map(|v| self.to_script(v)).collect()
    }

    fn to_script_pairs(&self, pairs: Vec<(NativeValue, NativeValue)>) -> BridgeResult<Vec<(Value, Value)>> {
        pairs
            .into_iter()
            .map(|(k, v)| Ok((self.to_script(k)?, self.to_script(v)?)))
            .collect()
    }

    /// Convert a script value into a host value.
    ///
    /// Never fails: values without a native form come back as
    /// [`NativeValue::Script`].
    pub fn from_script(&self, value: &Value) -> NativeValue {
        match value {
            Value::None => NativeValue::Nil,
            Value::Bool(b) => NativeValue::Bool(*b),
            Value::Int(n) => {
                if let Some(i) = n.to_i64() {
                    NativeValue::Int(i)
                } else if let Some(u) = n.to_u64() {
                    NativeValue::Uint(u)
                } else {
                    NativeValue::BigInt(n.clone())
                }
            }
            Value::Float(f) => NativeValue::Float(*f),
            Value::Str(s) => NativeValue::Str(s.to_string()),
            Value::List(items) => NativeValue::List(items.iter().map(|v| self.from_script(v)).collect()),
            Value::Tuple(items) => NativeValue::Tuple(items.iter().map(|v| self.from_script(v)).collect()),
            Value::Dict(pairs) => NativeValue::Dict(
                pairs
                    .iter()
                    .map(|(k, v)| (self.from_script(k), self.from_script(v)))
                    .collect(),
            ),
            Value::Object(_) => {
                if let Some(view) = value.downcast_ref::<StructView>() {
                    NativeValue::Struct(Arc::clone(view.access()))
                } else if let Some(view) = value.downcast_ref::<MapView>() {
                    NativeValue::Map(Arc::clone(view.access()))
                } else if let Some(view) = value.downcast_ref::<SliceView>() {
                    NativeValue::Slice(Arc::clone(view.access()))
                } else if let Some(view) = value.downcast_ref::<OpaqueView>() {
                    NativeValue::Opaque(Arc::clone(view.access()))
                } else if let Some(func) = value.downcast_ref::<NativeFunc>() {
                    NativeValue::Func(func.clone())
                } else {
                    NativeValue::Script(value.clone())
                }
            }
        }
    }

    /// Convert a host namespace into script globals
    pub fn make_globals<K, I>(&self, globals: I) -> BridgeResult<Globals>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, NativeValue)>,
    {
        globals
            .into_iter()
            .map(|(name, value)| Ok((name.into(), self.to_script(value)?)))
            .collect()
    }

    /// Convert script globals back into a host namespace.
    ///
    /// Values with no native counterpart (for example functions defined by
    /// the script) are left out.
    pub fn from_globals(&self, globals: &Globals) -> NativeGlobals {
        globals
            .iter()
            .filter_map(|(name, value)| match self.from_script(value) {
                NativeValue::Script(_) => {
                    trace!(name = %name, "skipping global without native form");
                    None
                }
                native => Some((name.clone(), native)),
            })
            .collect()
    }

    /// Eagerly copy a host map into a script-native dict.
    ///
    /// Unlike a map view, later changes on either side are not shared.
    pub fn make_dict(&self, map: &dyn MapAccess) -> BridgeResult<Value> {
        Ok(Value::dict(self.to_script_pairs(map.items())?))
    }

    /// Eagerly copy a host sequence into a script-native list
    pub fn make_list(&self, slice: &dyn SliceAccess) -> BridgeResult<Value> {
        Ok(Value::list(self.to_script_all(slice.to_vec())?))
    }

    /// Convert script keyword arguments
    pub fn from_kwargs(&self, kwargs: &[(String, Value)]) -> Vec<Kwarg> {
        kwargs
            .iter()
            .map(|(name, value)| Kwarg {
                name: name.clone(),
                value: self.from_script(value),
            })
            .collect()
    }
}

/// Convert a host value with the default converter
pub fn to_script(value: impl IntoNative) -> BridgeResult<Value> {
    Converter::default().to_script(value.into_native())
}

/// Convert a script value with the default converter
pub fn from_script(value: &Value) -> NativeValue {
    Converter::default().from_script(value)
}
