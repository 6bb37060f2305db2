//! Collector seam.
//!
//! Reclamation itself is reference counting through `Arc`; the collector is told whenever a
//! long-lived structure (method table, escaped closure, object slot) starts or stops holding
//! a reference, so an external tracing collector can keep its remembered set accurate.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::Value;

pub trait Collector: Send + Sync {
    fn retain(&self, value: &Value);
    fn release(&self, value: &Value);
    fn write_barrier(&self, container: &Value, field: &str, value: &Value);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub retained: u64,
    pub released: u64,
    pub barriers: u64,
}

/// Default collector: counts events and leaves reclamation to `Arc`.
#[derive(Default)]
pub struct RefCountCollector {
    retained: AtomicU64,
    released: AtomicU64,
    barriers: AtomicU64,
}

impl RefCountCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            retained: self.retained.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            barriers: self.barriers.load(Ordering::Relaxed),
        }
    }
}

/// Immediates never need tracking.
fn is_heap(value: &Value) -> bool {
    !matches!(
        value,
        Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Sym(_)
    )
}

impl Collector for RefCountCollector {
    fn retain(&self, value: &Value) {
        if is_heap(value) {
            self.retained.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn release(&self, value: &Value) {
        if is_heap(value) {
            self.released.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn write_barrier(&self, _container: &Value, _field: &str, value: &Value) {
        if is_heap(value) {
            self.barriers.fetch_add(1, Ordering::Relaxed);
        }
    }
}
