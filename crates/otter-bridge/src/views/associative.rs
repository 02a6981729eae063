//! Script view over a shared host map

use std::any::Any;
use std::sync::Arc;

use crate::convert::Converter;
use crate::error::{BridgeError, BridgeResult};
use crate::native::{MapAccess, NativeValue};
use crate::value::{ScriptIter, ScriptObject, Value};

use super::method::{BoundMethod, MethodEntry, expect_args, names, no_kwargs};
use super::{IterationGuard, ReprGuard, ViewState};

const CONTAINER: &str = "map";

const METHODS: &[MethodEntry<MapView>] = &[
    ("clear", map_clear),
    ("get", map_get),
    ("items", map_items),
    ("keys", map_keys),
    ("pop", map_pop),
    ("popitem", map_popitem),
    ("setdefault", map_setdefault),
    ("update", map_update),
    ("values", map_values),
];

/// Dict-like view over a host map.
///
/// Iteration snapshots the key set; inserting, deleting or clearing while an
/// iterator is live fails, as does any mutation after `freeze`.
#[derive(Clone)]
pub struct MapView {
    access: Arc<dyn MapAccess>,
    state: Arc<ViewState>,
    converter: Converter,
}

impl MapView {
    /// Wrap a host map
    pub fn new(access: Arc<dyn MapAccess>, converter: Converter) -> Self {
        Self {
            access,
            state: Arc::default(),
            converter,
        }
    }

    /// The aliased host map
    pub fn access(&self) -> &Arc<dyn MapAccess> {
        &self.access
    }

    /// Whether the view has been frozen
    pub fn is_frozen(&self) -> bool {
        self.state.is_frozen()
    }

    fn native(&self, value: &Value) -> NativeValue {
        self.converter.from_script(value)
    }

    /// Value for `key`, or `None` when absent
    pub fn lookup(&self, key: &Value) -> BridgeResult<Option<Value>> {
        self.access
            .get(self.native(key))
            .map(|v| self.converter.to_script(v))
            .transpose()
    }

    /// Insert or replace an entry
    pub fn insert(&self, key: &Value, value: &Value) -> BridgeResult<()> {
        self.state.check_mutable("insert into", CONTAINER)?;
        self.access.insert(self.native(key), self.native(value))
    }

    /// Remove an entry, returning its value
    pub fn delete(&self, key: &Value) -> BridgeResult<Option<Value>> {
        self.state.check_mutable("delete from", CONTAINER)?;
        self.access
            .remove(self.native(key))
            .map(|v| self.converter.to_script(v))
            .transpose()
    }

    /// Remove every entry
    pub fn clear(&self) -> BridgeResult<()> {
        self.state.check_mutable("clear", CONTAINER)?;
        self.access.clear();
        Ok(())
    }

    /// Keys, in map order
    pub fn keys(&self) -> BridgeResult<Vec<Value>> {
        self.access
            .keys()
            .into_iter()
            .map(|k| self.converter.to_script(k))
            .collect()
    }

    /// Values, in map order
    pub fn values(&self) -> BridgeResult<Vec<Value>> {
        self.access
            .items()
            .into_iter()
            .map(|(_, v)| self.converter.to_script(v))
            .collect()
    }

    /// `(key, value)` pairs, in map order
    pub fn items(&self) -> BridgeResult<Vec<(Value, Value)>> {
        self.access
            .items()
            .into_iter()
            .map(|(k, v)| Ok((self.converter.to_script(k)?, self.converter.to_script(v)?)))
            .collect()
    }
}

impl ScriptObject for MapView {
    fn type_name(&self) -> String {
        format!("native_map<{}>", self.access.type_name())
    }

    fn repr(&self) -> String {
        let Some(_printing) = ReprGuard::enter(self.access.identity()) else {
            return "{...}".to_string();
        };
        let entries = match self.items() {
            Ok(items) => items
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", "),
            Err(e) => format!("<error: {e}>"),
        };
        format!("{{{entries}}}")
    }

    fn truthy(&self) -> bool {
        self.access.len() > 0
    }

    fn freeze(&self) {
        self.state.freeze();
    }

    fn attr(&self, name: &str) -> BridgeResult<Option<Value>> {
        Ok(BoundMethod::lookup(METHODS, self, name))
    }

    fn attr_names(&self) -> Vec<String> {
        names(METHODS).collect()
    }

    fn get(&self, key: &Value) -> BridgeResult<Option<Value>> {
        self.lookup(key)
    }

    fn set_key(&self, key: &Value, value: &Value) -> BridgeResult<()> {
        self.insert(key, value)
    }

    fn len(&self) -> Option<usize> {
        Some(self.access.len())
    }

    fn iterate(&self) -> BridgeResult<ScriptIter> {
        let guard = self.state.begin_iteration();
        Ok(Box::new(KeyIter {
            keys: self.access.keys().into_iter(),
            converter: self.converter.clone(),
            _guard: guard,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct KeyIter {
    keys: std::vec::IntoIter<NativeValue>,
    converter: Converter,
    _guard: IterationGuard,
}

impl Iterator for KeyIter {
    type Item = BridgeResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.keys.next().map(|k| self.converter.to_script(k))
    }
}

fn map_clear(map: &MapView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("clear", args, 0, 0)?;
    no_kwargs("clear", kwargs)?;
    map.clear()?;
    Ok(Value::None)
}

fn map_get(map: &MapView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("get", args, 1, 2)?;
    no_kwargs("get", kwargs)?;
    match map.lookup(&args[0])? {
        Some(value) => Ok(value),
        None => Ok(args.get(1).cloned().unwrap_or_default()),
    }
}

fn map_items(map: &MapView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("items", args, 0, 0)?;
    no_kwargs("items", kwargs)?;
    let items = map
        .items()?
        .into_iter()
        .map(|(k, v)| Value::tuple(vec![k, v]))
        .collect();
    Ok(Value::list(items))
}

fn map_keys(map: &MapView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("keys", args, 0, 0)?;
    no_kwargs("keys", kwargs)?;
    Ok(Value::list(map.keys()?))
}

fn map_values(map: &MapView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("values", args, 0, 0)?;
    no_kwargs("values", kwargs)?;
    Ok(Value::list(map.values()?))
}

fn map_pop(map: &MapView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("pop", args, 1, 2)?;
    no_kwargs("pop", kwargs)?;
    match (map.delete(&args[0])?, args.get(1)) {
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(BridgeError::MissingKey),
    }
}

fn map_popitem(map: &MapView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("popitem", args, 0, 0)?;
    no_kwargs("popitem", kwargs)?;
    map.state.check_mutable("delete from", CONTAINER)?;
    let (key, value) = map.access.pop_first().ok_or(BridgeError::EmptyDict)?;
    Ok(Value::tuple(vec![
        map.converter.to_script(key)?,
        map.converter.to_script(value)?,
    ]))
}

fn map_setdefault(map: &MapView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("setdefault", args, 1, 2)?;
    no_kwargs("setdefault", kwargs)?;
    if let Some(value) = map.lookup(&args[0])? {
        return Ok(value);
    }
    let default = args.get(1).cloned().unwrap_or_default();
    map.insert(&args[0], &default)?;
    Ok(default)
}

fn map_update(map: &MapView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("update", args, 0, 1)?;
    let mut entries = match args.first() {
        Some(other) => update_pairs(other)?
            .iter()
            .map(|(key, value)| (map.native(key), map.native(value)))
            .collect(),
        None => Vec::new(),
    };
    entries.extend(
        kwargs
            .iter()
            .map(|(name, value)| (NativeValue::Str(name.clone()), map.native(value))),
    );
    map.state.check_mutable("insert into", CONTAINER)?;
    map.access.extend(entries)?;
    Ok(Value::None)
}

/// Entries of an `update` argument: a dict, a map view, or a sequence of
/// two-element sequences
fn update_pairs(other: &Value) -> BridgeResult<Vec<(Value, Value)>> {
    if let Value::Dict(pairs) = other {
        return Ok(pairs.to_vec());
    }
    if let Some(view) = other.downcast_ref::<MapView>() {
        return view.items();
    }
    let mut pairs = Vec::new();
    for (i, item) in other.iterate()?.enumerate() {
        let item = item?;
        let elems: Vec<Value> = match item.iterate() {
            Ok(iter) => iter.collect::<BridgeResult<_>>()?,
            Err(_) => {
                return Err(BridgeError::Conversion(format!(
                    "update: dictionary update sequence element #{i} is not iterable ({})",
                    item.type_name()
                )));
            }
        };
        let [key, value]: [Value; 2] = elems.try_into().map_err(|elems: Vec<Value>| {
            BridgeError::Conversion(format!(
                "update: dictionary update sequence element #{i} has length {}, want 2",
                elems.len()
            ))
        })?;
        pairs.push((key, value));
    }
    Ok(pairs)
}
