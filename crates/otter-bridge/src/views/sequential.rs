//! Script view over a shared host sequence

use std::any::Any;
use std::sync::Arc;

use crate::convert::Converter;
use crate::error::{BridgeError, BridgeResult};
use crate::native::{NativeValue, SliceAccess};
use crate::value::{ScriptIter, ScriptObject, Value};

use super::method::{BoundMethod, MethodEntry, expect_args, int_arg, names, no_kwargs};
use super::{IterationGuard, ReprGuard, ViewState, resolve_index};

const CONTAINER: &str = "slice";

const METHODS: &[MethodEntry<SliceView>] = &[
    ("append", slice_append),
    ("clear", slice_clear),
    ("extend", slice_extend),
    ("index", slice_index),
    ("insert", slice_insert),
    ("pop", slice_pop),
    ("remove", slice_remove),
];

/// List-like view over a host sequence.
///
/// Element assignment and every structural mutation fail while the view is
/// frozen or an iterator is live. Slicing produces an independent copy.
#[derive(Clone)]
pub struct SliceView {
    access: Arc<dyn SliceAccess>,
    state: Arc<ViewState>,
    converter: Converter,
}

impl SliceView {
    /// Wrap a host sequence
    pub fn new(access: Arc<dyn SliceAccess>, converter: Converter) -> Self {
        Self {
            access,
            state: Arc::default(),
            converter,
        }
    }

    /// The aliased host sequence
    pub fn access(&self) -> &Arc<dyn SliceAccess> {
        &self.access
    }

    /// Whether the view has been frozen
    pub fn is_frozen(&self) -> bool {
        self.state.is_frozen()
    }

    fn native(&self, value: &Value) -> NativeValue {
        self.converter.from_script(value)
    }

    fn element(&self, index: usize) -> BridgeResult<Value> {
        let len = self.access.len();
        let value = self.access.get(index).ok_or(BridgeError::IndexOutOfRange {
            index: index as i64,
            len,
        })?;
        self.converter.to_script(value)
    }

    /// Append one element
    pub fn append(&self, value: &Value) -> BridgeResult<()> {
        self.state.check_mutable("append to", CONTAINER)?;
        self.access.push(self.native(value))
    }

    /// Position of the first element equal to `value` within `start..end`
    pub fn position(&self, value: &Value, start: Option<i64>, end: Option<i64>) -> Option<usize> {
        let len = self.access.len();
        let start = clamp_bound(start, len).unwrap_or(0);
        let end = clamp_bound(end, len).unwrap_or(len);
        self.access.position(self.native(value), start, end)
    }
}

/// Normalize a negative bound and clamp it to `[0, len]`
fn clamp_bound(bound: Option<i64>, len: usize) -> Option<usize> {
    bound.map(|b| {
        let b = if b < 0 { b + len as i64 } else { b };
        b.clamp(0, len as i64) as usize
    })
}

/// Indices selected by `[start:end:step]` on a sequence of `len` elements
fn slice_indices(start: Option<i64>, end: Option<i64>, step: i64, len: usize) -> Vec<usize> {
    let len = len as i64;
    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let bound = |value: Option<i64>, default: i64| match value {
        None => default,
        Some(v) if v < 0 => (v + len).max(lower),
        Some(v) => v.min(upper),
    };
    let start = bound(start, if step > 0 { lower } else { upper });
    let end = bound(end, if step > 0 { upper } else { lower });

    let mut indices = Vec::new();
    let mut next = Some(start);
    while let Some(i) = next {
        if (step > 0 && i >= end) || (step < 0 && i <= end) {
            break;
        }
        indices.push(i as usize);
        next = i.checked_add(step);
    }
    indices
}

impl ScriptObject for SliceView {
    fn type_name(&self) -> String {
        format!("native_slice<{}>", self.access.type_name())
    }

    fn repr(&self) -> String {
        let Some(_printing) = ReprGuard::enter(self.access.identity()) else {
            return "[...]".to_string();
        };
        let items = self
            .access
            .to_vec()
            .into_iter()
            .map(|v| match self.converter.to_script(v) {
                Ok(v) => v.to_string(),
                Err(e) => format!("<error: {e}>"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{items}]")
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

    fn len(&self) -> Option<usize> {
        Some(self.access.len())
    }

    fn index(&self, index: i64) -> BridgeResult<Value> {
        let i = resolve_index(index, self.access.len())?;
        self.element(i)
    }

    fn set_index(&self, index: i64, value: &Value) -> BridgeResult<()> {
        self.state.check_mutable("assign to", CONTAINER)?;
        let i = resolve_index(index, self.access.len())?;
        self.access.set(i, self.native(value))
    }

    fn slice(&self, start: Option<i64>, end: Option<i64>, step: Option<i64>) -> BridgeResult<Value> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(BridgeError::conversion("slice step cannot be zero"));
        }
        let indices = slice_indices(start, end, step, self.access.len());
        let copy = self.access.select(&indices);
        Ok(Value::object(SliceView::new(copy, self.converter.clone())))
    }

    fn iterate(&self) -> BridgeResult<ScriptIter> {
        let guard = self.state.begin_iteration();
        Ok(Box::new(ElementIter {
            view: self.clone(),
            next: 0,
            _guard: guard,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Walks the live sequence, so host-side changes are observed
struct ElementIter {
    view: SliceView,
    next: usize,
    _guard: IterationGuard,
}

impl Iterator for ElementIter {
    type Item = BridgeResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.view.access.get(self.next)?;
        self.next += 1;
        Some(self.view.converter.to_script(value))
    }
}

fn slice_append(slice: &SliceView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("append", args, 1, 1)?;
    no_kwargs("append", kwargs)?;
    slice.append(&args[0])?;
    Ok(Value::None)
}

fn slice_clear(slice: &SliceView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("clear", args, 0, 0)?;
    no_kwargs("clear", kwargs)?;
    slice.state.check_mutable("clear", CONTAINER)?;
    slice.access.clear();
    Ok(Value::None)
}

fn slice_extend(slice: &SliceView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("extend", args, 1, 1)?;
    no_kwargs("extend", kwargs)?;
    slice.state.check_mutable("extend", CONTAINER)?;
    // Collect first: extending a view with itself holds its own iterator.
    let items = args[0]
        .iterate()?
        .map(|item| item.map(|v| slice.native(&v)))
        .collect::<BridgeResult<Vec<_>>>()?;
    slice.access.extend(items)?;
    Ok(Value::None)
}

fn slice_index(slice: &SliceView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("index", args, 1, 3)?;
    no_kwargs("index", kwargs)?;
    let start = args.get(1).map(|v| int_arg("index", v)).transpose()?.flatten();
    let end = args.get(2).map(|v| int_arg("index", v)).transpose()?.flatten();
    match slice.position(&args[0], start, end) {
        Some(i) => Ok(Value::int(i as i64)),
        None => Err(BridgeError::NotFound(format!(
            "index: value {} not in list",
            args[0]
        ))),
    }
}

fn slice_insert(slice: &SliceView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("insert", args, 2, 2)?;
    no_kwargs("insert", kwargs)?;
    slice.state.check_mutable("insert into", CONTAINER)?;
    let index = int_arg("insert", &args[0])?.unwrap_or(0);
    let len = slice.access.len();
    let at = clamp_bound(Some(index), len).unwrap_or(len);
    slice.access.insert(at, slice.native(&args[1]))?;
    Ok(Value::None)
}

fn slice_pop(slice: &SliceView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("pop", args, 0, 1)?;
    no_kwargs("pop", kwargs)?;
    slice.state.check_mutable("pop from", CONTAINER)?;
    let len = slice.access.len();
    let index = match args.first() {
        Some(arg) => int_arg("pop", arg)?.unwrap_or(len as i64 - 1),
        None => len as i64 - 1,
    };
    let i = resolve_index(index, len)?;
    let removed = slice
        .access
        .remove(i)
        .ok_or(BridgeError::IndexOutOfRange { index, len })?;
    slice.converter.to_script(removed)
}

fn slice_remove(slice: &SliceView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
    expect_args("remove", args, 1, 1)?;
    no_kwargs("remove", kwargs)?;
    slice.state.check_mutable("remove from", CONTAINER)?;
    let i = slice.position(&args[0], None, None).ok_or_else(|| {
        BridgeError::NotFound(format!("remove: element {} not found", args[0]))
    })?;
    slice.access.remove(i);
    Ok(Value::None)
}
