//! Compiled units, pending sources and compiled bodies.

use std::sync::Arc;

use garnet_ir::{DefNode, Node, Params};

use super::Runtime;
use crate::builtins_registry::BuiltinFn;
use crate::core::{Symbol, Value};
use crate::model::ClassRef;
use crate::runtime::arity::Arity;
use crate::runtime::closure::Block;
use crate::runtime::config::Eval;
use crate::runtime::frame::{Frame, LocalRef};

/// Executable form of one node: a native closure over the runtime and the current frame.
pub type Code = Box<dyn Fn(&mut Runtime, &mut Frame) -> Eval + Send + Sync>;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UnitFlags: u8 {
        const PRIVATE = 1 << 0;
        const PROTECTED = 1 << 1;
        /// Body evaluates to nil without side effects.
        const EMPTY_BODY = 1 << 2;
        /// Implemented in Rust by the core library.
        const NATIVE_GLUE = 1 << 3;
        /// Created by `define_method` from a block.
        const FROM_BLOCK = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

impl Visibility {
    pub fn flags(self) -> UnitFlags {
        match self {
            Visibility::Public => UnitFlags::empty(),
            Visibility::Private => UnitFlags::PRIVATE,
            Visibility::Protected => UnitFlags::PROTECTED,
        }
    }
}

impl UnitFlags {
    pub fn visibility(self) -> Visibility {
        if self.contains(UnitFlags::PRIVATE) {
            Visibility::Private
        } else if self.contains(UnitFlags::PROTECTED) {
            Visibility::Protected
        } else {
            Visibility::Public
        }
    }

    pub fn with_visibility(self, vis: Visibility) -> UnitFlags {
        (self - UnitFlags::PRIVATE - UnitFlags::PROTECTED) | vis.flags()
    }
}

#[derive(Clone)]
pub enum Imp {
    Guest(Arc<Body>),
    Native(BuiltinFn),
    Block(Arc<Block>),
    AttrReader(Symbol),
    AttrWriter(Symbol),
}

/// An installed method implementation. Immutable; redefinition installs a new unit.
pub struct CompiledUnit {
    pub(crate) imp: Imp,
    pub arity: Arity,
    pub flags: UnitFlags,
    pub(crate) owner: ClassRef,
    pub(crate) selector: Symbol,
}

impl CompiledUnit {
    pub fn owner(&self) -> &ClassRef {
        &self.owner
    }

    pub fn selector(&self) -> Symbol {
        self.selector
    }

    pub fn is_native(&self) -> bool {
        self.flags.contains(UnitFlags::NATIVE_GLUE)
    }

    pub(crate) fn with_flags(&self, flags: UnitFlags) -> CompiledUnit {
        CompiledUnit {
            imp: self.imp.clone(),
            arity: self.arity,
            flags,
            owner: self.owner.clone(),
            selector: self.selector,
        }
    }

    pub(crate) fn rehome(&self, owner: &ClassRef) -> CompiledUnit {
        CompiledUnit {
            imp: self.imp.clone(),
            arity: self.arity,
            flags: self.flags,
            owner: owner.clone(),
            selector: self.selector,
        }
    }
}

/// How to copy arguments into a fresh frame.
#[derive(Default)]
pub struct ParamPlan {
    pub(crate) required: Vec<LocalRef>,
    pub(crate) optional: Vec<(LocalRef, Code)>,
    pub(crate) rest: Option<LocalRef>,
    pub(crate) post: Vec<LocalRef>,
    pub(crate) block: Option<LocalRef>,
}

/// How a block builds its captured-variable array from the creating frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureSource {
    Cell(u32),
    Dvar(u32),
}

/// A compiled method, block, class or top-level body.
pub struct Body {
    pub(crate) code: Code,
    pub(crate) params: ParamPlan,
    pub(crate) arity: Arity,
    pub(crate) slots: usize,
    pub(crate) cells: usize,
    pub(crate) captures: Box<[CaptureSource]>,
    pub(crate) locals: Box<[(Symbol, LocalRef)]>,
    pub(crate) label: Arc<str>,
    pub(crate) file: Arc<str>,
    pub(crate) empty: bool,
    pub(crate) line: u32,
    /// Lexical class for method bodies; blocks carry theirs at runtime.
    pub(crate) cref: Option<ClassRef>,
}

impl Body {
    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A method that was defined but not compiled yet.
pub struct PendingSource {
    pub(crate) owner: ClassRef,
    pub(crate) selector: Symbol,
    pub(crate) def: Arc<DefNode>,
    pub(crate) arity: Arity,
    pub(crate) flags: UnitFlags,
    /// Lexical class of the `def`, for constant lookup inside the body.
    pub(crate) cref: ClassRef,
    pub(crate) file: Arc<str>,
    pub(crate) optimized: bool,
}

impl PendingSource {
    pub fn selector(&self) -> Symbol {
        self.selector
    }
}

pub fn arity_of(params: &Params) -> Arity {
    Arity::new(
        params.required.len(),
        params.optional.len(),
        params.rest.is_some(),
        params.post.len(),
    )
}

/// What a host hands to `Runtime::define_method`.
pub enum MethodSource {
    /// Compiled on first call.
    Ast { params: Params, body: Node },
    Native(BuiltinFn),
    Block(Value),
    AttrReader(String),
    AttrWriter(String),
}
