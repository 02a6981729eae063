//! Native callables
//!
//! A [`NativeFunc`] adapts a Rust closure to the script calling convention:
//! positional arguments are converted to the closure's parameter types, the
//! return value is unpacked (a trailing error is split off, zero values
//! become `None`, several become a tuple), and a panic inside the closure is
//! caught and reported as an ordinary call failure.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use num_bigint::BigInt;
use rustc_hash::FxHasher;
use tracing::warn;

use crate::convert::{Converter, Kwarg};
use crate::error::{BridgeError, BridgeResult};
use crate::native::{Element, FromNative, IntoNative, Key, NativeMap, NativeSlice, NativeValue};
use crate::record::{Record, Shared};
use crate::value::{ScriptObject, Value};

/// Number of positional parameters a callable accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many
    Fixed(usize),
    /// At least `fixed`; the rest are collected
    Variadic {
        /// Number of leading fixed parameters
        fixed: usize,
    },
}

type Invoke = dyn Fn(Vec<NativeValue>, Vec<Kwarg>) -> BridgeResult<Vec<NativeValue>> + Send + Sync;

/// A host function callable from scripts
#[derive(Clone)]
pub struct NativeFunc {
    name: Arc<str>,
    arity: Arity,
    invoke: Arc<Invoke>,
    converter: Converter,
}

impl NativeFunc {
    /// Wrap a closure with a fixed parameter list.
    ///
    /// ```ignore
    /// let add = NativeFunc::new("add", |a: i64, b: i64| a + b);
    /// ```
    pub fn new<Args, H>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<Args>,
    {
        let name: Arc<str> = Arc::from(name.into());
        let fname = Arc::clone(&name);
        Self {
            name,
            arity: Arity::Fixed(H::ARITY),
            invoke: Arc::new(move |args, _kwargs| handler.call(&fname, args)),
            converter: Converter::default(),
        }
    }

    /// Wrap a closure whose last parameter is a `Vec<T>` collecting the
    /// remaining positional arguments.
    pub fn variadic<Args, H>(name: impl Into<String>, handler: H) -> Self
    where
        H: VariadicHandler<Args>,
    {
        let name: Arc<str> = Arc::from(name.into());
        let fname = Arc::clone(&name);
        Self {
            name,
            arity: Arity::Variadic { fixed: H::FIXED },
            invoke: Arc::new(move |args, _kwargs| handler.call(&fname, args)),
            converter: Converter::default(),
        }
    }

    /// Wrap a closure that receives the raw arguments, including keyword
    /// arguments.
    pub fn raw<F, R>(name: impl Into<String>, arity: Arity, f: F) -> Self
    where
        F: Fn(Vec<NativeValue>, Vec<Kwarg>) -> R + Send + Sync + 'static,
        R: IntoReturn,
    {
        Self {
            name: Arc::from(name.into()),
            arity,
            invoke: Arc::new(move |args, kwargs| f(args, kwargs).into_return()),
            converter: Converter::default(),
        }
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted positional arity
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Whether two handles wrap the same closure
    pub fn ptr_eq(&self, other: &NativeFunc) -> bool {
        Arc::ptr_eq(&self.invoke, &other.invoke)
    }

    pub(crate) fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    fn check_arity(&self, got: usize) -> BridgeResult<()> {
        let message = match self.arity {
            Arity::Fixed(want) if got != want => format!("expected {want} args but got {got}"),
            Arity::Variadic { fixed } if got < fixed => {
                format!("expected at least {fixed} args but got {got}")
            }
            _ => return Ok(()),
        };
        Err(BridgeError::Arity {
            func: self.name.to_string(),
            message,
        })
    }

    /// Invoke with native arguments, returning the unpacked results
    pub fn invoke(&self, args: Vec<NativeValue>, kwargs: Vec<Kwarg>) -> BridgeResult<Vec<NativeValue>> {
        self.check_arity(args.len())?;
        match catch_unwind(AssertUnwindSafe(|| (self.invoke)(args, kwargs))) {
            Ok(result) => result,
            Err(payload) => {
                let message = if let Some(s) = payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                warn!(func = %self.name, "native function panicked: {message}");
                Err(BridgeError::Panic {
                    func: self.name.to_string(),
                    message,
                })
            }
        }
    }
}

impl fmt::Debug for NativeFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunc")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl ScriptObject for NativeFunc {
    fn type_name(&self) -> String {
        "builtin_function_or_method".to_string()
    }

    fn repr(&self) -> String {
        format!("<built-in function {}>", self.name)
    }

    fn hash(&self) -> BridgeResult<u32> {
        let mut hasher = FxHasher::default();
        (Arc::as_ptr(&self.invoke) as *const () as usize).hash(&mut hasher);
        Ok(hasher.finish() as u32)
    }

    fn call(&self, args: &[Value], kwargs: &[(String, Value)]) -> BridgeResult<Value> {
        let args = args.iter().map(|a| self.converter.from_script(a)).collect();
        let kwargs = self.converter.from_kwargs(kwargs);
        let results = self.invoke(args, kwargs)?;
        let mut results = results.into_iter();
        match (results.next(), results.len()) {
            (None, _) => Ok(Value::None),
            (Some(only), 0) => self.converter.to_script(only),
            (Some(first), _) => {
                let items = std::iter::once(first)
                    .chain(results)
                    .map(|v| self.converter.to_script(v))
                    .collect::<BridgeResult<Vec<_>>>()?;
                Ok(Value::tuple(items))
            }
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn convert_arg<T: FromNative>(func: &str, index: usize, value: Option<NativeValue>) -> BridgeResult<T> {
    T::from_native(value.unwrap_or_default()).map_err(|e| BridgeError::Argument {
        func: func.to_string(),
        index,
        message: e.to_string(),
    })
}

/// Closure with a fixed parameter list, callable through [`NativeFunc::new`]
pub trait Handler<Args>: Send + Sync + 'static {
    /// Number of parameters
    const ARITY: usize;

    /// Convert arguments, call, and unpack the result
    fn call(&self, func: &str, args: Vec<NativeValue>) -> BridgeResult<Vec<NativeValue>>;
}

/// Closure whose last parameter collects the remaining arguments
pub trait VariadicHandler<Args>: Send + Sync + 'static {
    /// Number of leading fixed parameters
    const FIXED: usize;

    /// Convert arguments, call, and unpack the result
    fn call(&self, func: &str, args: Vec<NativeValue>) -> BridgeResult<Vec<NativeValue>>;
}

macro_rules! impl_handler {
    ($count:expr; $(($ty:ident, $var:ident, $idx:expr)),*) => {
        impl<Func, Ret, $($ty,)*> Handler<($($ty,)*)> for Func
        where
            Func: Fn($($ty),*) -> Ret + Send + Sync + 'static,
            Ret: IntoReturn,
            $($ty: FromNative,)*
        {
            const ARITY: usize = $count;

            #[allow(unused_mut, unused_variables)]
            fn call(&self, func: &str, args: Vec<NativeValue>) -> BridgeResult<Vec<NativeValue>> {
                let mut args = args.into_iter();
                $(let $var = convert_arg::<$ty>(func, $idx, args.next())?;)*
                (self)($($var),*).into_return()
            }
        }

        impl<Func, Ret, Rest, $($ty,)*> VariadicHandler<($($ty,)* Vec<Rest>,)> for Func
        where
            Func: Fn($($ty,)* Vec<Rest>) -> Ret + Send + Sync + 'static,
            Ret: IntoReturn,
            Rest: FromNative,
            $($ty: FromNative,)*
        {
            const FIXED: usize = $count;

            #[allow(unused_mut)]
            fn call(&self, func: &str, args: Vec<NativeValue>) -> BridgeResult<Vec<NativeValue>> {
                let mut args = args.into_iter();
                $(let $var = convert_arg::<$ty>(func, $idx, args.next())?;)*
                let rest = args
                    .enumerate()
                    .map(|(i, v)| convert_arg::<Rest>(func, $count + i, Some(v)))
                    .collect::<BridgeResult<Vec<_>>>()?;
                (self)($($var,)* rest).into_return()
            }
        }
    };
}

impl_handler!(0;);
impl_handler!(1; (A1, a1, 0));
impl_handler!(2; (A1, a1, 0), (A2, a2, 1));
impl_handler!(3; (A1, a1, 0), (A2, a2, 1), (A3, a3, 2));
impl_handler!(4; (A1, a1, 0), (A2, a2, 1), (A3, a3, 2), (A4, a4, 3));
impl_handler!(5; (A1, a1, 0), (A2, a2, 1), (A3, a3, 2), (A4, a4, 3), (A5, a5, 4));
impl_handler!(6; (A1, a1, 0), (A2, a2, 1), (A3, a3, 2), (A4, a4, 3), (A5, a5, 4), (A6, a6, 5));

/// Return value of a native callable
pub trait IntoReturn {
    /// Unpack into zero or more native values
    fn into_return(self) -> BridgeResult<Vec<NativeValue>>;
}

impl IntoReturn for () {
    fn into_return(self) -> BridgeResult<Vec<NativeValue>> {
        Ok(Vec::new())
    }
}

macro_rules! impl_single_return {
    ($($ty:ty),*) => {$(
        impl IntoReturn for $ty {
            fn into_return(self) -> BridgeResult<Vec<NativeValue>> {
                Ok(vec![self.into_native()])
            }
        }
    )*};
}

impl_single_return!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, &'static str,
    BigInt, NativeValue, Value, NativeFunc
);

impl<T: IntoNative> IntoReturn for Option<T> {
    fn into_return(self) -> BridgeResult<Vec<NativeValue>> {
        Ok(vec![self.into_native()])
    }
}

impl<T: Element + PartialEq> IntoReturn for Vec<T> {
    fn into_return(self) -> BridgeResult<Vec<NativeValue>> {
        Ok(vec![self.into_native()])
    }
}

impl<T: Element + PartialEq> IntoReturn for NativeSlice<T> {
    fn into_return(self) -> BridgeResult<Vec<NativeValue>> {
        Ok(vec![self.into_native()])
    }
}

impl<K: Key, V: Element> IntoReturn for NativeMap<K, V> {
    fn into_return(self) -> BridgeResult<Vec<NativeValue>> {
        Ok(vec![self.into_native()])
    }
}

impl<T: Record> IntoReturn for Shared<T> {
    fn into_return(self) -> BridgeResult<Vec<NativeValue>> {
        Ok(vec![self.into_native()])
    }
}

macro_rules! impl_tuple_return {
    ($($ty:ident),+) => {
        impl<$($ty: IntoNative),+> IntoReturn for ($($ty,)+) {
            #[allow(non_snake_case)]
            fn into_return(self) -> BridgeResult<Vec<NativeValue>> {
                let ($($ty,)+) = self;
                Ok(vec![$($ty.into_native()),+])
            }
        }
    };
}

impl_tuple_return!(A, B);
impl_tuple_return!(A, B, C);
impl_tuple_return!(A, B, C, D);

impl<T: IntoReturn, E: fmt::Display> IntoReturn for Result<T, E> {
    fn into_return(self) -> BridgeResult<Vec<NativeValue>> {
        match self {
            Ok(value) => value.into_return(),
            Err(e) => Err(BridgeError::call(e)),
        }
    }
}
