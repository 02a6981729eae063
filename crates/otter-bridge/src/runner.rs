//! Host-facing script runner
//!
//! A [`Runner`] ties a search path, a compiled-program cache and a module
//! cache together: `run` executes a top-level script with host globals and
//! returns the script's globals converted back to native values, while any
//! `load` statements go through the shared [`ScriptCache`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::ScriptCache;
use crate::config::{BridgeConfig, Dialect};
use crate::convert::{Converter, NativeGlobals};
use crate::engine::{Loader, Program, ScriptEngine, Thread};
use crate::error::BridgeResult;
use crate::native::NativeValue;
use crate::source::{ModuleSource, SearchPath};

/// Runs scripts found on a search path
pub struct Runner {
    engine: Arc<dyn ScriptEngine>,
    search: Arc<SearchPath>,
    cache: ScriptCache,
    converter: Converter,
    dialect: Dialect,
    programs: Mutex<HashMap<String, Arc<dyn Program>>>,
}

impl Runner {
    /// Build a runner; fails if the configuration is invalid
    pub fn new(engine: Arc<dyn ScriptEngine>, config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        let search = Arc::new(SearchPath::new(config.search_dirs.iter().cloned())?);
        let cache = ScriptCache::new(
            Arc::clone(&engine),
            Arc::clone(&search) as Arc<dyn ModuleSource>,
            config.dialect,
        );
        Ok(Self {
            engine,
            search,
            cache,
            converter: config.converter(),
            dialect: config.dialect,
            programs: Mutex::new(HashMap::new()),
        })
    }

    /// Predeclared globals for every module loaded through the cache
    pub fn with_globals<K, I>(self, globals: I) -> BridgeResult<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, NativeValue)>,
    {
        self.cache.set_globals(self.converter.make_globals(globals)?);
        Ok(self)
    }

    /// Search path
    pub fn search_path(&self) -> &SearchPath {
        &self.search
    }

    /// Module cache
    pub fn cache(&self) -> &ScriptCache {
        &self.cache
    }

    /// Converter used for globals and results
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Run `filename` with `globals` predeclared.
    ///
    /// The compiled program is kept, so later runs of the same file skip
    /// reading and compiling until [`forget`](Self::forget) or
    /// [`reset`](Self::reset).
    pub fn run<K, I>(&self, filename: &str, globals: I) -> BridgeResult<NativeGlobals>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, NativeValue)>,
    {
        let predeclared = self.converter.make_globals(globals)?;
        let program = self.program(filename)?;
        let thread = Thread::new(filename).with_loader(&self.cache);
        let result = program.init(&thread, &predeclared)?;
        Ok(self.converter.from_globals(&result))
    }

    /// Evaluate `source` directly; `load` statements use the module cache
    pub fn eval<K, I>(&self, source: &str, globals: I) -> BridgeResult<NativeGlobals>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, NativeValue)>,
    {
        let predeclared = self.converter.make_globals(globals)?;
        let program = self.engine.compile("eval", source, &self.dialect)?;
        let thread = Thread::new("eval").with_loader(&self.cache);
        let result = program.init(&thread, &predeclared)?;
        Ok(self.converter.from_globals(&result))
    }

    /// Drop the compiled program and cached module for `filename`
    pub fn forget(&self, filename: &str) {
        self.programs.lock().remove(filename);
        self.cache.forget(filename);
    }

    /// Drop every compiled program and cached module
    pub fn reset(&self) {
        self.programs.lock().clear();
        self.cache.reset();
    }

    fn program(&self, filename: &str) -> BridgeResult<Arc<dyn Program>> {
        if let Some(program) = self.programs.lock().get(filename) {
            trace!(filename, "program cache hit");
            return Ok(Arc::clone(program));
        }
        debug!(filename, "compiling script");
        let source = self.search.read(filename)?;
        let program = self.engine.compile(filename, &source, &self.dialect)?;
        self.programs
            .lock()
            .insert(filename.to_string(), Arc::clone(&program));
        Ok(program)
    }
}

/// Evaluate `source` once, without caching, using `loader` for `load`
/// statements (if given).
pub fn eval<K, I>(
    engine: &dyn ScriptEngine,
    source: &str,
    globals: I,
    loader: Option<&dyn Loader>,
    config: &BridgeConfig,
) -> BridgeResult<NativeGlobals>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, NativeValue)>,
{
    let converter = config.converter();
    let predeclared = converter.make_globals(globals)?;
    let program = engine.compile("eval", source, &config.dialect)?;
    let thread = Thread::new("eval");
    let thread = match loader {
        Some(loader) => thread.with_loader(loader),
        None => thread,
    };
    let result = program.init(&thread, &predeclared)?;
    Ok(converter.from_globals(&result))
}
