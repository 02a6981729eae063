//! Script view over a shared host record

use std::any::Any;
use std::sync::Arc;

use crate::convert::Converter;
use crate::error::{BridgeError, BridgeResult};
use crate::native::NativeValue;
use crate::record::{Field, StructAccess};
use crate::value::{ScriptObject, Value};

/// Attribute view over a host record.
///
/// Methods shadow fields of the same name. Field names follow the
/// converter's tag scheme.
#[derive(Clone)]
pub struct StructView {
    access: Arc<dyn StructAccess>,
    converter: Converter,
}

impl StructView {
    /// Wrap a host record
    pub fn new(access: Arc<dyn StructAccess>, converter: Converter) -> Self {
        Self { access, converter }
    }

    /// The aliased host record
    pub fn access(&self) -> &Arc<dyn StructAccess> {
        &self.access
    }

    fn exposed(&self, name: &str) -> Option<&'static Field> {
        self.access
            .fields()
            .iter()
            .find(|f| f.exposed_name(self.converter.tag()) == Some(name))
    }

    fn exposed_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.access
            .fields()
            .iter()
            .filter_map(|f| f.exposed_name(self.converter.tag()))
    }
}

impl ScriptObject for StructView {
    fn type_name(&self) -> String {
        format!("native_struct<{}>", self.access.type_name())
    }

    fn repr(&self) -> String {
        let fields = self
            .exposed_names()
            .filter_map(|name| {
                let value = self.attr(name).ok().flatten()?;
                Some(format!("{name}={value}"))
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({fields})", short_name(self.access.type_name()))
    }

    fn attr(&self, name: &str) -> BridgeResult<Option<Value>> {
        if let Some(method) = self.access.method(name) {
            return self.converter.to_script(NativeValue::Func(method)).map(Some);
        }
        let Some(field) = self.exposed(name) else {
            return Ok(None);
        };
        match self.access.field(field.name) {
            Some(value) => self.converter.to_script(value).map(Some),
            None => Ok(None),
        }
    }

    fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .access
            .method_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        for name in self.exposed_names() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    fn set_attr(&self, name: &str, value: &Value) -> BridgeResult<()> {
        let field = self
            .exposed(name)
            .ok_or_else(|| BridgeError::NotSettable(name.to_string()))?;
        self.access
            .set_field(field.name, self.converter.from_script(value))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Last path segment of a Rust type name
fn short_name(type_name: &str) -> &str {
    type_name.rsplit("::").next().unwrap_or(type_name)
}
