//! Script-facing views over host values
//!
//! A view aliases the host value it wraps: reads see host changes and
//! script mutations land in the host's data. Map and slice views carry a
//! [`ViewState`] with a frozen flag and a live-iterator count that guard
//! every mutation.

mod aggregate;
mod associative;
mod method;
mod opaque;
mod sequential;

pub use aggregate::StructView;
pub use associative::MapView;
pub use opaque::OpaqueView;
pub use sequential::SliceView;

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rustc_hash::FxHashSet;

use crate::error::{BridgeError, BridgeResult};

thread_local! {
    static PRINTING: RefCell<FxHashSet<usize>> = RefCell::default();
}

/// Frozen flag and live-iterator count of one view
#[derive(Debug, Default)]
pub(crate) struct ViewState {
    frozen: AtomicBool,
    iterators: AtomicUsize,
}

impl ViewState {
    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub(crate) fn live_iterators(&self) -> usize {
        self.iterators.load(Ordering::SeqCst)
    }

    /// Fail unless `verb` may mutate the container right now
    pub(crate) fn check_mutable(&self, verb: &'static str, container: &'static str) -> BridgeResult<()> {
        if self.is_frozen() {
            return Err(BridgeError::Frozen { verb, container });
        }
        if self.live_iterators() > 0 {
            return Err(BridgeError::Iterating { verb, container });
        }
        Ok(())
    }

    pub(crate) fn begin_iteration(self: &Arc<Self>) -> IterationGuard {
        self.iterators.fetch_add(1, Ordering::SeqCst);
        IterationGuard(Arc::clone(self))
    }
}

/// Counts as one live iterator until dropped
#[derive(Debug)]
pub(crate) struct IterationGuard(Arc<ViewState>);

impl Drop for IterationGuard {
    fn drop(&mut self) {
        self.0.iterators.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Marks one container as being printed on the current thread.
///
/// A container that holds itself prints its inner occurrence as `[...]` or
/// `{...}` instead of recursing.
#[derive(Debug)]
pub(crate) struct ReprGuard(usize);

impl ReprGuard {
    /// `None` when `identity` is already being printed further up the stack
    pub(crate) fn enter(identity: usize) -> Option<Self> {
        PRINTING
            .with(|printing| printing.borrow_mut().insert(identity))
            .then_some(Self(identity))
    }
}

impl Drop for ReprGuard {
    fn drop(&mut self) {
        PRINTING.with(|printing| {
            printing.borrow_mut().remove(&self.0);
        });
    }
}

/// Python-style index normalization: negative counts from the end
pub(crate) fn resolve_index(index: i64, len: usize) -> BridgeResult<usize> {
    let adjusted = if index < 0 { index + len as i64 } else { index };
    if adjusted < 0 || adjusted >= len as i64 {
        return Err(BridgeError::IndexOutOfRange { index, len });
    }
    Ok(adjusted as usize)
}
