//! Concurrent module cache
//!
//! Each module is read, compiled and executed at most once, however many
//! threads ask for it at the same time. The first caller owns the load;
//! later callers block until it finishes and share its outcome, success or
//! failure. Every load in progress records which entry its thread is
//! waiting on, so a request that would close a wait cycle fails with
//! [`BridgeError::LoadCycle`] instead of deadlocking.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::config::Dialect;
use crate::engine::{Loader, ScriptEngine, Thread};
use crate::error::{BridgeError, BridgeResult};
use crate::source::ModuleSource;
use crate::value::Globals;

/// One chain of nested loads, as seen by the cycle check
#[derive(Default)]
struct Waiter {
    waits_for: Mutex<Option<Arc<Entry>>>,
}

/// Cached outcome of loading one module
struct Entry {
    owner: Mutex<Option<Arc<Waiter>>>,
    result: Mutex<Option<BridgeResult<Globals>>>,
    ready: Condvar,
}

impl Entry {
    fn new() -> Self {
        Self {
            owner: Mutex::new(None),
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn set_owner(&self, owner: Option<Arc<Waiter>>) {
        *self.owner.lock() = owner;
    }

    fn owner(&self) -> Option<Arc<Waiter>> {
        self.owner.lock().clone()
    }

    fn complete(&self, result: BridgeResult<Globals>) {
        *self.result.lock() = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> BridgeResult<Globals> {
        let mut result = self.result.lock();
        loop {
            if let Some(done) = result.as_ref() {
                return done.clone();
            }
            self.ready.wait(&mut result);
        }
    }
}

/// Fail if waiting on `entry` would make `me` wait on itself
fn cycle_check(entry: &Arc<Entry>, me: &Arc<Waiter>) -> BridgeResult<()> {
    let mut current = Arc::clone(entry);
    loop {
        let Some(owner) = current.owner() else {
            return Ok(());
        };
        if Arc::ptr_eq(&owner, me) {
            return Err(BridgeError::LoadCycle);
        }
        let next = owner.waits_for.lock().clone();
        match next {
            Some(next) => current = next,
            None => return Ok(()),
        }
    }
}

/// Module cache shared by every script run through it
pub struct ScriptCache {
    entries: Mutex<HashMap<String, Arc<Entry>>>,
    engine: Arc<dyn ScriptEngine>,
    source: Arc<dyn ModuleSource>,
    globals: Mutex<Globals>,
    dialect: Dialect,
}

impl ScriptCache {
    /// Create an empty cache
    pub fn new(engine: Arc<dyn ScriptEngine>, source: Arc<dyn ModuleSource>, dialect: Dialect) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            engine,
            source,
            globals: Mutex::new(Globals::new()),
            dialect,
        }
    }

    /// Predeclared globals for modules loaded from now on
    pub fn set_globals(&self, globals: Globals) {
        *self.globals.lock() = globals;
    }

    /// Globals of `module`, loading it on first use
    pub fn load(&self, module: &str) -> BridgeResult<Globals> {
        self.get(&Arc::new(Waiter::default()), module)
    }

    /// Drop the cached outcome for `module`. Returns whether it was cached.
    pub fn forget(&self, module: &str) -> bool {
        let removed = self.entries.lock().remove(module).is_some();
        if removed {
            debug!(module, "forgot cached module");
        }
        removed
    }

    /// Drop every cached outcome
    pub fn reset(&self) {
        self.entries.lock().clear();
        debug!("reset module cache");
    }

    /// Number of cached modules, including loads in progress
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether `module` has an entry
    pub fn contains(&self, module: &str) -> bool {
        self.entries.lock().contains_key(module)
    }

    fn get(&self, me: &Arc<Waiter>, module: &str) -> BridgeResult<Globals> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(module).cloned() {
            drop(entries);
            cycle_check(&entry, me)?;
            *me.waits_for.lock() = Some(Arc::clone(&entry));
            let result = entry.wait();
            *me.waits_for.lock() = None;
            return result;
        }

        let entry = Arc::new(Entry::new());
        entries.insert(module.to_string(), Arc::clone(&entry));
        drop(entries);

        entry.set_owner(Some(Arc::clone(me)));
        let result = match catch_unwind(AssertUnwindSafe(|| self.execute(me, module))) {
            Ok(result) => result,
            Err(_) => {
                warn!(module, "engine panicked while loading module");
                Err(BridgeError::engine(format!("panic while loading {module:?}")))
            }
        };
        entry.set_owner(None);
        entry.complete(result.clone());
        result
    }

    fn execute(&self, me: &Arc<Waiter>, module: &str) -> BridgeResult<Globals> {
        debug!(module, "loading module");
        let source = self.source.read(module)?;
        let program = self.engine.compile(module, &source, &self.dialect)?;
        let loader = Nested {
            cache: self,
            me: Arc::clone(me),
        };
        let thread = Thread::new(module).with_loader(&loader);
        let predeclared = self.globals.lock().clone();
        let result = program.init(&thread, &predeclared);
        if let Err(e) = &result {
            debug!(module, error = %e, "module failed to load");
        }
        result
    }
}

impl Loader for ScriptCache {
    fn load(&self, module: &str) -> BridgeResult<Globals> {
        ScriptCache::load(self, module)
    }
}

/// Loader for `load` statements inside a module being loaded
struct Nested<'a> {
    cache: &'a ScriptCache,
    me: Arc<Waiter>,
}

impl Loader for Nested<'_> {
    fn load(&self, module: &str) -> BridgeResult<Globals> {
        self.cache.get(&self.me, module)
    }
}
