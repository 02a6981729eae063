//! Built-in methods bound to a view

use std::any::Any;

use crate::error::{BridgeError, BridgeResult};
use crate::value::{ScriptObject, Value};

/// Implementation of a built-in method
pub(crate) type MethodFn<V> = fn(&V, &[Value], &[(String, Value)]) -> BridgeResult<Value>;

/// Method table entry; tables are kept sorted by name
pub(crate) type MethodEntry<V> = (&'static str, MethodFn<V>);

/// A method looked up on a receiver, callable later
pub(crate) struct BoundMethod<V> {
    name: &'static str,
    receiver: V,
    method: MethodFn<V>,
}

impl<V: ScriptObject + Clone> BoundMethod<V> {
    /// Look `name` up in `table` and bind it to `receiver`
    pub(crate) fn lookup(table: &[MethodEntry<V>], receiver: &V, name: &str) -> Option<Value> {
        table
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(name, method)| {
                Value::object(BoundMethod {
                    name,
                    receiver: receiver.clone(),
                    method,
                })
            })
    }
}

impl<V: ScriptObject + Clone> ScriptObject for BoundMethod<V> {
    fn type_name(&self) -> String {
        "builtin_function_or_method".to_string()
    }

    fn repr(&self) -> String {
        format!(
            "<built-in method {} of {} value>",
            self.name,
            self.receiver.type_name()
        )
    }

    fn call(&self, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
        (self.method)(&self.receiver, args, kwargs)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Names in a method table
pub(crate) fn names<V>(table: &[MethodEntry<V>]) -> impl Iterator<Item = String> + '_ {
    table.iter().map(|(name, _)| name.to_string())
}

/// Check the positional count against `min..=max`
pub(crate) fn expect_args(func: &str, args: &[Value], min: usize, max: usize) -> BridgeResult<()> {
    let got = args.len();
    if (min..=max).contains(&got) {
        return Ok(());
    }
    let want = match (min, max) {
        (min, max) if min == max => format!("{min}"),
        (0, max) => format!("at most {max}"),
        (min, max) => format!("{min} to {max}"),
    };
    Err(BridgeError::Arity {
        func: func.to_string(),
        message: format!("got {got} arguments, want {want}"),
    })
}

/// Reject keyword arguments
pub(crate) fn no_kwargs(func: &str, kwargs: &[(String, Value)]) -> BridgeResult<()> {
    match kwargs.first() {
        None => Ok(()),
        Some((name, _)) => Err(BridgeError::Arity {
            func: func.to_string(),
            message: format!("unexpected keyword argument {name:?}"),
        }),
    }
}

/// Integer argument, or `None` when the argument is `None`
pub(crate) fn int_arg(func: &str, value: &Value) -> BridgeResult<Option<i64>> {
    match value {
        Value::None => Ok(None),
        Value::Int(_) => value.as_i64().map(Some).ok_or_else(|| {
            BridgeError::Conversion(format!("{func}: index {value} out of range"))
        }),
        other => Err(BridgeError::Conversion(format!(
            "{func}: got {}, want int",
            other.type_name()
        ))),
    }
}
