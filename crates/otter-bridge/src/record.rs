//! Aggregate (record) description
//!
//! Rust has no runtime reflection, so a host type opts into the struct
//! bridge by implementing [`Record`]: a static field table plus by-name
//! accessors. The value is shared with scripts through a [`Shared`] handle,
//! which is what makes script-side assignments visible to the host.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{BridgeError, BridgeResult};
use crate::func::NativeFunc;
use crate::native::NativeValue;

/// One field of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Native field name
    pub name: &'static str,
    /// Whether scripts may see and assign the field
    pub exported: bool,
    /// Declarative tags as `(scheme, value)` pairs
    pub tags: &'static [(&'static str, &'static str)],
}

impl Field {
    /// An exported field without tags
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            exported: true,
            tags: &[],
        }
    }

    /// An exported field with tags
    pub const fn tagged(name: &'static str, tags: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            name,
            exported: true,
            tags,
        }
    }

    /// A field that is never exposed
    pub const fn private(name: &'static str) -> Self {
        Self {
            name,
            exported: false,
            tags: &[],
        }
    }

    /// Name under which scripts see this field, if at all.
    ///
    /// With a tag scheme configured, a tag of that scheme renames the field
    /// and the tag value `-` hides it. Without a matching tag the native name
    /// is used.
    pub fn exposed_name(&self, scheme: Option<&str>) -> Option<&'static str> {
        if !self.exported {
            return None;
        }
        let tag = scheme.and_then(|scheme| {
            self.tags
                .iter()
                .find(|(key, _)| *key == scheme)
                .map(|(_, value)| *value)
        });
        match tag {
            Some("-") => None,
            Some(renamed) => Some(renamed),
            None => Some(self.name),
        }
    }
}

/// A host struct that scripts can read, assign and call methods on.
///
/// # Example
///
/// ```ignore
/// struct Person { name: String, age: i64 }
///
/// impl Record for Person {
///     const FIELDS: &'static [Field] = &[Field::new("Name"), Field::new("Age")];
///
///     fn field(&self, name: &str) -> Option<NativeValue> {
///         match name {
///             "Name" => Some(self.name.clone().into_native()),
///             "Age" => Some(self.age.into_native()),
///             _ => None,
///         }
///     }
///
///     fn set_field(&mut self, name: &str, value: NativeValue) -> BridgeResult<()> {
///         match name {
///             "Name" => self.name = String::from_native(value)?,
///             "Age" => self.age = i64::from_native(value)?,
///             _ => return Err(BridgeError::NotSettable(name.to_string())),
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Record: Send + Sync + 'static {
    /// Field table, in declaration order
    const FIELDS: &'static [Field];

    /// Read a field by native name
    fn field(&self, name: &str) -> Option<NativeValue>;

    /// Assign a field by native name, converting to the field's type
    fn set_field(&mut self, name: &str, value: NativeValue) -> BridgeResult<()>;

    /// Names of the methods [`Record::method`] can bind
    fn method_names() -> &'static [&'static str] {
        &[]
    }

    /// Bind a method to the shared value.
    ///
    /// The returned function holds a clone of `this`, so methods that take
    /// the write lock mutate the host's value.
    fn method(_this: &Shared<Self>, _name: &str) -> Option<NativeFunc>
    where
        Self: Sized,
    {
        None
    }
}

/// Shared, lockable handle to a host value.
///
/// Cloning the handle aliases the value.
pub struct Shared<T>(Arc<RwLock<T>>);

impl<T> Shared<T> {
    /// Wrap a value
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Read access
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// Write access
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Whether two handles alias the same value
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Shared<T> {
    /// Copy of the current value
    pub fn get(&self) -> T {
        self.0.read().clone()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&*self.0.read()).finish()
    }
}

/// Type-erased access to an aggregate
pub trait StructAccess: Send + Sync + 'static {
    /// Native type name
    fn type_name(&self) -> &'static str;
    /// Field table
    fn fields(&self) -> &'static [Field];
    /// Read a field by native name
    fn field(&self, name: &str) -> Option<NativeValue>;
    /// Assign a field by native name
    fn set_field(&self, name: &str, value: NativeValue) -> BridgeResult<()>;
    /// Bind a method by name
    fn method(&self, name: &str) -> Option<NativeFunc>;
    /// Method names
    fn method_names(&self) -> &'static [&'static str];
    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

impl<T: Record> StructAccess for Shared<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn fields(&self) -> &'static [Field] {
        T::FIELDS
    }

    fn field(&self, name: &str) -> Option<NativeValue> {
        self.read().field(name)
    }

    fn set_field(&self, name: &str, value: NativeValue) -> BridgeResult<()> {
        if !T::FIELDS.iter().any(|f| f.name == name && f.exported) {
            return Err(BridgeError::NotSettable(name.to_string()));
        }
        self.write().set_field(name, value)
    }

    fn method(&self, name: &str) -> Option<NativeFunc> {
        T::method(self, name)
    }

    fn method_names(&self) -> &'static [&'static str] {
        T::method_names()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
