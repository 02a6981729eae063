//! # Otter Bridge
//!
//! Live value bridge between Rust host data and an embedded script engine.
//!
//! - **Views**: host maps, sequences and records are exposed to scripts as
//!   aliasing views, so script mutations are visible to the host and vice
//!   versa
//! - **Callables**: ordinary Rust closures become script functions with
//!   checked argument conversion and panic capture
//! - **Freeze and iteration guards**: views refuse mutation once frozen or
//!   while an iterator is live
//! - **Module cache**: each module is loaded once even under concurrent
//!   requests, and load cycles are reported instead of deadlocking
//!
//! The engine itself is pluggable through [`ScriptEngine`].
//!
//! # Example
//!
//! ```ignore
//! use otter_bridge::{BridgeConfig, IntoNative, NativeFunc, NativeSlice, Runner};
//! use std::sync::Arc;
//!
//! let runner = Runner::new(Arc::new(MyEngine), BridgeConfig::new(["scripts"]))?;
//! let names = NativeSlice::new(vec!["ada".to_string()]);
//! let out = runner.run(
//!     "main.star",
//!     [
//!         ("names", names.clone().into_native()),
//!         ("greet", NativeFunc::new("greet", |n: String| format!("hi {n}")).into_native()),
//!     ],
//! )?;
//! // Anything the script appended to `names` is now in `names`.
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cache;
pub mod classify;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod func;
pub mod native;
pub mod record;
pub mod runner;
pub mod source;
pub mod value;
pub mod views;

// Re-export main types
pub use cache::ScriptCache;
pub use classify::{NativeKind, classify};
pub use config::{BridgeConfig, Dialect};
pub use convert::{Converter, Kwarg, NativeGlobals, from_script, to_script};
pub use engine::{Loader, Program, ScriptEngine, Thread};
pub use error::{BridgeError, BridgeResult};
pub use func::{Arity, Handler, IntoReturn, NativeFunc, VariadicHandler};
pub use native::{
    Element, FromNative, IntoNative, Key, MapAccess, NativeMap, NativeSlice, NativeValue,
    OpaqueAccess, SliceAccess, Underlying,
};
pub use record::{Field, Record, Shared, StructAccess};
pub use runner::{Runner, eval};
pub use source::{ModuleSource, SearchPath};
pub use value::{Globals, ScriptIter, ScriptObject, Value};
pub use views::{MapView, OpaqueView, SliceView, StructView};
