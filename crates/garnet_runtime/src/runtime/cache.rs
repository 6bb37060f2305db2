//! Per-call-site inline caches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::bridge::Forward;
use crate::compile::fast::OpKind;
use crate::model::ClassId;
use crate::runtime::unit::CompiledUnit;

/// How the last dispatch at a call site was resolved.
#[derive(Clone, Default)]
pub enum CacheState {
    #[default]
    Empty,
    Resolved {
        class_id: ClassId,
        unit: Arc<CompiledUnit>,
        /// Epoch counter of the receiver class and selector, and its value at install time.
        epoch: Arc<AtomicU64>,
        seen: u64,
        /// Global ancestry epoch at install time.
        hierarchy: u64,
    },
    /// Valid while the selector still misses in the registry.
    ForeignForward {
        class_id: ClassId,
        forward: Forward,
        epoch: Arc<AtomicU64>,
        seen: u64,
        hierarchy: u64,
    },
    Specialized(OpKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKind {
    Empty,
    Resolved,
    ForeignForward,
    Specialized,
}

#[derive(Default)]
pub struct InlineCache {
    state: RwLock<CacheState>,
}

impl InlineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached unit if the entry is still valid for a receiver of `class_id`.
    #[inline]
    pub fn lookup(&self, class_id: ClassId, hierarchy: u64) -> Option<Arc<CompiledUnit>> {
        match &*self.state.read() {
            CacheState::Resolved {
                class_id: cid,
                unit,
                epoch,
                seen,
                hierarchy: h,
            } if *cid == class_id
                && *h == hierarchy
                && epoch.load(Ordering::Acquire) == *seen =>
            {
                Some(unit.clone())
            }
            _ => None,
        }
    }

    pub fn lookup_forward(&self, class_id: ClassId, hierarchy: u64) -> Option<Forward> {
        match &*self.state.read() {
            CacheState::ForeignForward {
                class_id: cid,
                forward,
                epoch,
                seen,
                hierarchy: h,
            } if *cid == class_id
                && *h == hierarchy
                && epoch.load(Ordering::Acquire) == *seen =>
            {
                Some(forward.clone())
            }
            _ => None,
        }
    }

    pub fn install_resolved(
        &self,
        class_id: ClassId,
        unit: Arc<CompiledUnit>,
        epoch: Arc<AtomicU64>,
        seen: u64,
        hierarchy: u64,
    ) {
        *self.state.write() = CacheState::Resolved {
            class_id,
            unit,
            epoch,
            seen,
            hierarchy,
        };
    }

    pub fn install_forward(
        &self,
        class_id: ClassId,
        forward: Forward,
        epoch: Arc<AtomicU64>,
        seen: u64,
        hierarchy: u64,
    ) {
        *self.state.write() = CacheState::ForeignForward {
            class_id,
            forward,
            epoch,
            seen,
            hierarchy,
        };
    }

    pub fn specialize(&self, op: OpKind) {
        if matches!(*self.state.read(), CacheState::Specialized(o) if o == op) {
            return;
        }
        *self.state.write() = CacheState::Specialized(op);
    }

    pub fn invalidate(&self) {
        *self.state.write() = CacheState::Empty;
    }

    pub fn kind(&self) -> CacheKind {
        match &*self.state.read() {
            CacheState::Empty => CacheKind::Empty,
            CacheState::Resolved { .. } => CacheKind::Resolved,
            CacheState::ForeignForward { .. } => CacheKind::ForeignForward,
            CacheState::Specialized(_) => CacheKind::Specialized,
        }
    }
}
