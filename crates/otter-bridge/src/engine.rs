//! Embedded engine interface
//!
//! The bridge does not parse or evaluate scripts itself. An engine compiles
//! source into a [`Program`]; running the program against a set of
//! predeclared globals yields the module's globals. Nested `load` calls made
//! by the script are routed through the [`Thread`]'s [`Loader`].

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::Dialect;
use crate::error::{BridgeError, BridgeResult};
use crate::value::Globals;

/// Compiles script source
pub trait ScriptEngine: Send + Sync + 'static {
    /// Compile `source`, reporting errors against `filename`
    fn compile(&self, filename: &str, source: &str, dialect: &Dialect) -> BridgeResult<Arc<dyn Program>>;
}

/// A compiled script, runnable any number of times
pub trait Program: Send + Sync {
    /// Execute top-level statements with `predeclared` in scope and return
    /// the resulting globals
    fn init(&self, thread: &Thread<'_>, predeclared: &Globals) -> BridgeResult<Globals>;
}

/// Resolves `load` statements to module globals
pub trait Loader {
    /// Globals of `module`
    fn load(&self, module: &str) -> BridgeResult<Globals>;
}

type PrintHook<'a> = &'a (dyn Fn(&str, &str) + Sync);

/// Execution context for one program run
pub struct Thread<'a> {
    name: String,
    loader: Option<&'a dyn Loader>,
    print: Option<PrintHook<'a>>,
}

impl<'a> Thread<'a> {
    /// Thread without a loader; `load` fails
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loader: None,
            print: None,
        }
    }

    /// Route `load` statements through `loader`
    pub fn with_loader(mut self, loader: &'a dyn Loader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Replace the default `print` destination
    pub fn with_print(mut self, print: PrintHook<'a>) -> Self {
        self.print = Some(print);
        self
    }

    /// Thread name, usually the file being executed
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a `load` statement
    pub fn load(&self, module: &str) -> BridgeResult<Globals> {
        match self.loader {
            Some(loader) => loader.load(module),
            None => Err(BridgeError::engine(format!(
                "load not implemented by this application (loading {module:?})"
            ))),
        }
    }

    /// Handle a script `print`
    pub fn print(&self, msg: &str) {
        match self.print {
            Some(hook) => hook(&self.name, msg),
            None => info!(target: "otter_bridge::script", thread = %self.name, "{msg}"),
        }
    }
}

impl fmt::Debug for Thread<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use parking_lot::Mutex;

    struct Fixed;

    impl Loader for Fixed {
        fn load(&self, module: &str) -> BridgeResult<Globals> {
            let mut globals = Globals::new();
            globals.insert("name".to_string(), Value::str(module));
            Ok(globals)
        }
    }

    #[test]
    fn test_load_without_loader_fails() {
        let thread = Thread::new("main.star");
        assert!(thread.load("lib.star").is_err());
    }

    #[test]
    fn test_load_through_loader() {
        let thread = Thread::new("main.star").with_loader(&Fixed);
        let globals = thread.load("lib.star").unwrap();
        assert!(globals["name"].equals(&Value::str("lib.star")));
    }

    #[test]
    fn test_print_hook() {
        let seen = Mutex::new(Vec::new());
        let hook = |thread: &str, msg: &str| seen.lock().push(format!("{thread}: {msg}"));
        Thread::new("t").with_print(&hook).print("hello");
        assert_eq!(seen.lock().as_slice(), ["t: hello".to_string()]);
    }
}
