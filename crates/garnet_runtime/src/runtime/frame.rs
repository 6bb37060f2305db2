//! Activation records and captured-variable cells.
//!
//! Locals that no nested block or binding can see live in `Frame::locals`. Locals that
//! are visible to a closure are allocated as shared cells from the start, so a block that
//! outlives its frame simply keeps the cells alive and every holder sees the same storage.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Symbol, Value};
use crate::model::ClassRef;
use crate::runtime::closure::Block;
use crate::runtime::unit::CompiledUnit;

pub type FrameId = u64;

/// Compile-time address of a local variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalRef {
    /// Unshared slot in `Frame::locals`.
    Slot(u32),
    /// Shared cell owned by this frame (`Frame::cells`).
    Cell(u32),
    /// Cell captured from an enclosing frame (`Frame::dvars`).
    Dvar(u32),
}

pub struct VarCell {
    value: Mutex<Value>,
}

impl VarCell {
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(value),
        })
    }

    #[inline]
    pub fn get(&self) -> Value {
        self.value.lock().clone()
    }

    #[inline]
    pub fn set(&self, value: Value) {
        *self.value.lock() = value;
    }
}

/// The method a frame belongs to, for `super` and `__method__`.
pub struct MethodCtx {
    pub unit: Arc<CompiledUnit>,
    pub owner: ClassRef,
    pub selector: Symbol,
    /// Arguments as received, for argument-less `super`.
    pub args: Vec<Value>,
}

pub struct Frame {
    pub self_value: Value,
    pub locals: Vec<Value>,
    pub cells: Vec<Arc<VarCell>>,
    pub dvars: Arc<[Arc<VarCell>]>,
    /// Block passed to the enclosing method; target of `yield`.
    pub block: Option<Arc<Block>>,
    pub method: Option<Arc<MethodCtx>>,
    pub id: FrameId,
    /// Frame a `return` in this body (or in blocks created here) lands on.
    pub home: FrameId,
    /// Id of the running block when this frame executes a block body.
    pub block_id: Option<u64>,
    pub lambda: bool,
}

impl Frame {
    pub(crate) fn new(self_value: Value, slots: usize, cells: usize, id: FrameId) -> Self {
        Self {
            self_value,
            locals: vec![Value::Nil; slots],
            cells: (0..cells).map(|_| VarCell::new(Value::Nil)).collect(),
            dvars: Arc::from(Vec::new()),
            block: None,
            method: None,
            id,
            home: id,
            block_id: None,
            lambda: false,
        }
    }

    #[inline]
    pub fn get(&self, r: LocalRef) -> Value {
        match r {
            LocalRef::Slot(i) => self.locals[i as usize].clone(),
            LocalRef::Cell(i) => self.cells[i as usize].get(),
            LocalRef::Dvar(i) => self.dvars[i as usize].get(),
        }
    }

    #[inline]
    pub fn set(&mut self, r: LocalRef, value: Value) {
        match r {
            LocalRef::Slot(i) => self.locals[i as usize] = value,
            LocalRef::Cell(i) => self.cells[i as usize].set(value),
            LocalRef::Dvar(i) => self.dvars[i as usize].set(value),
        }
    }

    /// The shared cell behind a boxed local.
    pub fn cell(&self, r: LocalRef) -> Option<Arc<VarCell>> {
        match r {
            LocalRef::Slot(_) => None,
            LocalRef::Cell(i) => Some(self.cells[i as usize].clone()),
            LocalRef::Dvar(i) => Some(self.dvars[i as usize].clone()),
        }
    }
}
