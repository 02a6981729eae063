//! Script view over a host value reachable only through its methods

use std::any::Any;
use std::sync::Arc;

use crate::convert::Converter;
use crate::error::{BridgeError, BridgeResult};
use crate::native::{NativeValue, OpaqueAccess, Underlying};
use crate::value::{ScriptObject, Value};

use super::method::{BoundMethod, MethodEntry, expect_args, names, no_kwargs};

const ACCESSORS: &[MethodEntry<OpaqueView>] = &[
    ("toBool", opaque_to_bool),
    ("toFloat", opaque_to_float),
    ("toInt", opaque_to_int),
    ("toString", opaque_to_string),
    ("toUint", opaque_to_uint),
];

macro_rules! accessor {
    ($fn_name:ident, $script_name:literal, $method:ident) => {
        fn $fn_name(view: &OpaqueView, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
            expect_args($script_name, args, 0, 0)?;
            no_kwargs($script_name, kwargs)?;
            view.$method()
        }
    };
}

accessor!(opaque_to_bool, "toBool", to_bool);
accessor!(opaque_to_float, "toFloat", to_float);
accessor!(opaque_to_int, "toInt", to_int);
accessor!(opaque_to_string, "toString", to_str);
accessor!(opaque_to_uint, "toUint", to_uint);

/// View over a host value with methods but no structure scripts can see.
///
/// Truthiness follows the underlying primitive; the `to*` accessors convert
/// it when the kind matches.
#[derive(Clone)]
pub struct OpaqueView {
    access: Arc<dyn OpaqueAccess>,
    converter: Converter,
}

impl OpaqueView {
    /// Wrap a host value
    pub fn new(access: Arc<dyn OpaqueAccess>, converter: Converter) -> Self {
        Self { access, converter }
    }

    /// The aliased host value
    pub fn access(&self) -> &Arc<dyn OpaqueAccess> {
        &self.access
    }

    fn cannot_convert(&self, to: &str) -> BridgeError {
        BridgeError::Conversion(format!(
            "cannot convert {} to {to}",
            self.access.type_name()
        ))
    }

    /// Underlying signed or unsigned integer
    pub fn to_int(&self) -> BridgeResult<Value> {
        match self.access.underlying() {
            Underlying::Int(i) => Ok(Value::int(i)),
            Underlying::Uint(u) => Ok(Value::int(u)),
            _ => Err(self.cannot_convert("int")),
        }
    }

    /// Underlying unsigned integer
    pub fn to_uint(&self) -> BridgeResult<Value> {
        match self.access.underlying() {
            Underlying::Uint(u) => Ok(Value::int(u)),
            _ => Err(self.cannot_convert("uint")),
        }
    }

    /// Underlying float
    pub fn to_float(&self) -> BridgeResult<Value> {
        match self.access.underlying() {
            Underlying::Float(f) => Ok(Value::Float(f)),
            _ => Err(self.cannot_convert("float")),
        }
    }

    /// Underlying string
    pub fn to_str(&self) -> BridgeResult<Value> {
        match self.access.underlying() {
            Underlying::Str(s) => Ok(Value::from(s)),
            _ => Err(self.cannot_convert("string")),
        }
    }

    /// Underlying boolean
    pub fn to_bool(&self) -> BridgeResult<Value> {
        match self.access.underlying() {
            Underlying::Bool(b) => Ok(Value::Bool(b)),
            _ => Err(self.cannot_convert("bool")),
        }
    }
}

impl ScriptObject for OpaqueView {
    fn type_name(&self) -> String {
        format!("native_opaque<{}>", self.access.type_name())
    }

    fn repr(&self) -> String {
        self.access.repr()
    }

    fn truthy(&self) -> bool {
        match self.access.underlying() {
            Underlying::Bool(b) => b,
            Underlying::Int(i) => i != 0,
            Underlying::Uint(u) => u != 0,
            Underlying::Float(f) => f != 0.0,
            Underlying::Str(s) => !s.is_empty(),
            Underlying::Handle { is_null } => !is_null,
            Underlying::Other => true,
        }
    }

    fn attr(&self, name: &str) -> BridgeResult<Option<Value>> {
        if let Some(method) = self.access.method(name) {
            return self.converter.to_script(NativeValue::Func(method)).map(Some);
        }
        Ok(BoundMethod::lookup(ACCESSORS, self, name))
    }

    fn attr_names(&self) -> Vec<String> {
        let mut all = self.access.method_names();
        all.extend(names(ACCESSORS));
        all
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::NativeFunc;

    struct Celsius(f64);

    impl OpaqueAccess for Celsius {
        fn type_name(&self) -> String {
            "Celsius".to_string()
        }

        fn underlying(&self) -> Underlying {
            Underlying::Float(self.0)
        }

        fn method(&self, name: &str) -> Option<NativeFunc> {
            let c = self.0;
            (name == "Fahrenheit").then(|| NativeFunc::new("Fahrenheit", move || c * 9.0 / 5.0 + 32.0))
        }

        fn method_names(&self) -> Vec<String> {
            vec!["Fahrenheit".to_string()]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Handle(Option<u32>);

    impl OpaqueAccess for Handle {
        fn type_name(&self) -> String {
            "Handle".to_string()
        }

        fn underlying(&self) -> Underlying {
            Underlying::Handle {
                is_null: self.0.is_none(),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn view(access: impl OpaqueAccess) -> OpaqueView {
        OpaqueView::new(Arc::new(access), Converter::new())
    }

    #[test]
    fn test_accessors_follow_underlying_kind() {
        let temp = view(Celsius(100.0));
        let f = temp.attr("toFloat").unwrap().unwrap().call(&[], &[]).unwrap();
        assert!(f.equals(&Value::Float(100.0)));
        let err = temp.attr("toInt").unwrap().unwrap().call(&[], &[]).unwrap_err();
        assert_eq!(err.to_string(), "cannot convert Celsius to int");
        assert!(temp.to_str().is_err());
    }

    #[test]
    fn test_methods_take_precedence() {
        let temp = view(Celsius(100.0));
        let out = temp.attr("Fahrenheit").unwrap().unwrap().call(&[], &[]).unwrap();
        assert!(out.equals(&Value::Float(212.0)));
        assert!(temp.attr_names().contains(&"Fahrenheit".to_string()));
        assert!(temp.attr("missing").unwrap().is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(view(Celsius(1.5)).truthy());
        assert!(!view(Celsius(0.0)).truthy());
        assert!(!view(Handle(None)).truthy());
        assert!(view(Handle(Some(3))).truthy());
        assert_eq!(view(Handle(None)).repr(), "<Handle>");
    }
}
