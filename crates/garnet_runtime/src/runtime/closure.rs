//! Blocks, procs and bindings.
//!
//! A `Block` is created each time execution reaches a block literal. It holds the shared
//! cells of every outer local its body mentions, the creating frame's `self`, class
//! context and home frame. Handing the block to a method does not make it escape; turning
//! it into a `Proc` value does, and an escaped block is never reused by its literal site.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use garnet_ir::Node;
use garnet_syntax::DiagnosticKind;
use log::trace;
use parking_lot::{Mutex, RwLock};

use crate::compile;
use crate::core::{FastIndexMap, Symbol, Value};
use crate::model::ClassRef;
use crate::runtime::Runtime;
use crate::runtime::arity::Arity;
use crate::runtime::config::{BreakTag, Eval, Flow};
use crate::runtime::dispatch::CallKind;
use crate::runtime::exception::Exc;
use crate::runtime::frame::{Frame, FrameId, LocalRef, MethodCtx, VarCell};
use crate::runtime::thread::{CallRecord, CrefEntry};
use crate::runtime::unit::{Body, CaptureSource, Visibility};
use crate::runtime::vm::Stat;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockFlags: u8 {
        /// Strict arity; `return` and `break` leave only the lambda.
        const LAMBDA = 1 << 0;
        /// Body of a method defined with `define_method`.
        const FROM_METHOD = 1 << 1;
        /// Body evaluates to nil without side effects.
        const EMPTY = 1 << 2;
        /// Reified as a `Proc` value; set lazily, see `Block::flags`.
        const ESCAPED = 1 << 3;
    }
}

pub enum BlockCode {
    Guest(Arc<Body>),
    /// `&:name`: calls `name` on the first argument.
    SymbolProc(Symbol),
}

pub struct Block {
    pub(crate) id: u64,
    pub(crate) code: BlockCode,
    pub(crate) dvars: Arc<[Arc<VarCell>]>,
    pub(crate) self_value: Value,
    pub(crate) cref: ClassRef,
    pub(crate) home: FrameId,
    /// Block of the creating frame; `yield` inside the body goes there.
    pub(crate) outer_block: Option<Arc<Block>>,
    pub(crate) method: Option<Arc<MethodCtx>>,
    flags: BlockFlags,
    escaped: AtomicBool,
    active: AtomicUsize,
    pub(crate) arity: Arity,
}

impl Block {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn flags(&self) -> BlockFlags {
        if self.escaped.load(Ordering::Acquire) {
            self.flags | BlockFlags::ESCAPED
        } else {
            self.flags
        }
    }

    pub fn is_lambda(&self) -> bool {
        self.flags.contains(BlockFlags::LAMBDA)
    }

    pub fn is_escaped(&self) -> bool {
        self.escaped.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    pub fn self_value(&self) -> &Value {
        &self.self_value
    }

    /// A copy with extra flags and a fresh identity, for `lambda { }` and `define_method`.
    pub(crate) fn derive(&self, id: u64, extra: BlockFlags) -> Block {
        Block {
            id,
            code: match &self.code {
                BlockCode::Guest(b) => BlockCode::Guest(b.clone()),
                BlockCode::SymbolProc(s) => BlockCode::SymbolProc(*s),
            },
            dvars: self.dvars.clone(),
            self_value: self.self_value.clone(),
            cref: self.cref.clone(),
            home: self.home,
            outer_block: self.outer_block.clone(),
            method: self.method.clone(),
            flags: self.flags | extra,
            escaped: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            arity: self.arity,
        }
    }

    fn reusable(&self, frame: &Frame, dvars: &[Arc<VarCell>]) -> bool {
        !self.is_active()
            && !self.is_escaped()
            && self.home == frame.home
            && self.self_value.identical(&frame.self_value)
            && self.dvars.len() == dvars.len()
            && self.dvars.iter().zip(dvars).all(|(a, b)| Arc::ptr_eq(a, b))
            && match (&self.outer_block, &frame.block) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

/// Per-literal state: the compiled body and the last block made here.
pub struct BlockSite {
    pub(crate) body: Arc<Body>,
    pub(crate) flags: BlockFlags,
    last: Mutex<Option<Arc<Block>>>,
}

impl BlockSite {
    pub(crate) fn new(body: Arc<Body>, flags: BlockFlags) -> Self {
        Self {
            body,
            flags,
            last: Mutex::new(None),
        }
    }
}

/// Overrides applied when a block runs as something other than a plain closure.
pub(crate) struct Rebind {
    pub self_value: Value,
    pub cref: ClassRef,
    pub method: Option<Arc<MethodCtx>>,
    /// `define_method` body: strict arity, `return` leaves the method.
    pub as_method: bool,
}

/// Heap snapshot of the locals visible at a `binding` call.
pub struct Binding {
    vars: RwLock<FastIndexMap<Symbol, Arc<VarCell>>>,
    pub(crate) self_value: Value,
    pub(crate) cref: ClassRef,
    pub(crate) block: Option<Arc<Block>>,
    pub(crate) method: Option<Arc<MethodCtx>>,
    pub(crate) home: FrameId,
}

impl Binding {
    pub fn local_get(&self, name: Symbol) -> Option<Value> {
        self.vars.read().get(&name).map(|c| c.get())
    }

    /// Assigns an existing local, or adds a new one to the binding.
    pub fn local_set(&self, name: Symbol, value: Value) {
        if let Some(cell) = self.vars.read().get(&name) {
            cell.set(value);
            return;
        }
        self.vars.write().insert(name, VarCell::new(value));
    }

    pub fn local_defined(&self, name: Symbol) -> bool {
        self.vars.read().contains_key(&name)
    }

    pub fn local_names(&self) -> Vec<Symbol> {
        self.vars.read().keys().copied().collect()
    }

    pub fn receiver(&self) -> &Value {
        &self.self_value
    }

    fn snapshot(&self) -> (Vec<Symbol>, Arc<[Arc<VarCell>]>) {
        let vars = self.vars.read();
        let names = vars.keys().copied().collect();
        let cells: Vec<Arc<VarCell>> = vars.values().cloned().collect();
        (names, Arc::from(cells))
    }

    fn adopt(&self, name: Symbol, cell: Arc<VarCell>) {
        self.vars.write().entry(name).or_insert(cell);
    }
}

impl Runtime {
    /// Materializes the block literal at `site` for the running frame.
    pub(crate) fn create_block(&mut self, site: &BlockSite, frame: &Frame) -> Arc<Block> {
        let body = &site.body;
        let dvars: Vec<Arc<VarCell>> = body
            .captures
            .iter()
            .map(|c| match *c {
                CaptureSource::Cell(i) => frame.cells[i as usize].clone(),
                CaptureSource::Dvar(i) => frame.dvars[i as usize].clone(),
            })
            .collect();
        let mut last = site.last.lock();
        if let Some(prev) = last.as_ref() {
            if prev.reusable(frame, &dvars) {
                self.vm.stats.bump(Stat::BlockReused);
                trace!("reuse block {} at {}", prev.id, body.label);
                return prev.clone();
            }
        }
        let block = Arc::new(Block {
            id: self.vm.next_block_id(),
            code: BlockCode::Guest(body.clone()),
            dvars: Arc::from(dvars),
            self_value: frame.self_value.clone(),
            cref: self.thread.cref().class.clone(),
            home: frame.home,
            outer_block: frame.block.clone(),
            method: frame.method.clone(),
            flags: site.flags,
            escaped: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            arity: body.arity,
        });
        self.vm.stats.bump(Stat::BlockCreated);
        *last = Some(block.clone());
        block
    }

    /// `&:name` and `Symbol#to_proc`.
    pub(crate) fn symbol_block(&mut self, selector: Symbol, self_value: Value, home: FrameId) -> Arc<Block> {
        Arc::new(Block {
            id: self.vm.next_block_id(),
            code: BlockCode::SymbolProc(selector),
            dvars: Arc::from(Vec::new()),
            self_value,
            cref: self.thread.cref().class.clone(),
            home,
            outer_block: None,
            method: None,
            flags: BlockFlags::LAMBDA,
            escaped: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            arity: Arity::at_least(1),
        })
    }

    /// Turns a block into a first-class `Proc`; from here on it has escaped.
    pub fn reify_block(&self, block: &Arc<Block>) -> Value {
        let value = Value::Proc(block.clone());
        if !block.escaped.swap(true, Ordering::AcqRel) {
            self.vm.stats.bump(Stat::BlockEscaped);
            self.vm.collector.retain(&value);
        }
        value
    }

    /// `lambda { }`: the literal's block with lambda semantics.
    pub(crate) fn make_lambda(&self, block: &Arc<Block>) -> Arc<Block> {
        if block.is_lambda() {
            return block.clone();
        }
        Arc::new(block.derive(self.vm.next_block_id(), BlockFlags::LAMBDA))
    }

    pub fn call_block(&mut self, block: &Arc<Block>, args: Vec<Value>) -> Eval {
        self.call_block_with(block, args, None, None)
    }

    /// `yield` from a frame.
    pub(crate) fn yield_block(&mut self, frame: &Frame, args: Vec<Value>) -> Eval {
        match &frame.block {
            Some(b) => {
                let b = b.clone();
                self.call_block_with(&b, args, None, None)
            }
            None => Err(self.error(Exc::LocalJump, DiagnosticKind::NoBlockGiven)),
        }
    }

    /// `Proc#call`: like a block call, but a `break` whose literal call site already
    /// returned cannot land anywhere.
    pub(crate) fn call_proc(
        &mut self,
        block: &Arc<Block>,
        args: Vec<Value>,
        passed: Option<Arc<Block>>,
    ) -> Eval {
        match self.call_block_with(block, args, passed, None) {
            Err(Flow::Break {
                tag: BreakTag::Block(id),
                ..
            }) if id == block.id && !self.thread.break_targets.contains(&id) => {
                Err(self.error(Exc::LocalJump, DiagnosticKind::BreakFromProcClosure))
            }
            other => other,
        }
    }

    pub(crate) fn call_block_with(
        &mut self,
        block: &Arc<Block>,
        args: Vec<Value>,
        passed: Option<Arc<Block>>,
        rebind: Option<Rebind>,
    ) -> Eval {
        let body = match &block.code {
            BlockCode::Guest(body) => body.clone(),
            BlockCode::SymbolProc(sel) => return self.call_symbol_proc(*sel, args, passed),
        };
        self.thread.handle.check()?;
        if self.thread.calls.len() >= self.config.max_call_depth {
            return Err(self.error(Exc::SystemStack, DiagnosticKind::StackLevelTooDeep));
        }

        let strict = block.is_lambda() || rebind.as_ref().is_some_and(|r| r.as_method);
        let mut args = args;
        if strict {
            if let Err(kind) = body.arity.check(args.len()) {
                return Err(self.error(Exc::Argument, kind));
            }
        } else {
            if args.len() == 1 && body.arity.auto_splats() {
                if let Value::Array(items) = &args[0] {
                    args = items.to_vec();
                }
            }
            if body.arity.adjust(&mut args) {
                self.vm.stats.bump(Stat::ArityAdjusted);
            }
        }

        let id = self.vm.next_frame_id();
        let (self_value, cref, method) = match rebind {
            Some(r) => (r.self_value, r.cref, r.method.or_else(|| block.method.clone())),
            None => (block.self_value.clone(), block.cref.clone(), block.method.clone()),
        };
        let mut frame = Frame::new(self_value, body.slots, body.cells, id);
        frame.dvars = block.dvars.clone();
        frame.block = block.outer_block.clone();
        frame.method = method;
        frame.home = if strict { id } else { block.home };
        frame.block_id = Some(block.id);
        frame.lambda = strict;

        block.active.fetch_add(1, Ordering::AcqRel);
        self.thread.cref.push(CrefEntry::new(cref, Visibility::Public));
        self.thread.calls.push(CallRecord {
            label: body.label.clone(),
            file: body.file.clone(),
            caller_line: self.thread.line,
        });
        if strict {
            self.thread.homes.push(id);
        }

        let mut result = self.bind_params(&body, &mut frame, args, passed.as_ref());
        if result.is_ok() {
            result = loop {
                match (body.code)(self, &mut frame) {
                    Err(Flow::Redo) => continue,
                    Err(Flow::Next(v)) => break Ok(v),
                    other => break other,
                }
            };
        }

        if strict {
            self.thread.homes.pop();
        }
        if let Some(rec) = self.thread.calls.pop() {
            self.thread.line = rec.caller_line;
        }
        self.thread.cref.pop();
        block.active.fetch_sub(1, Ordering::AcqRel);

        if strict {
            match result {
                Err(Flow::BlockReturn { value, home }) if home == id => Ok(value),
                Err(Flow::Break {
                    value,
                    tag: BreakTag::Block(b),
                }) if b == block.id => Ok(value),
                other => other,
            }
        } else {
            result
        }
    }

    fn call_symbol_proc(
        &mut self,
        selector: Symbol,
        mut args: Vec<Value>,
        passed: Option<Arc<Block>>,
    ) -> Eval {
        if args.is_empty() {
            return Err(self.error(Exc::Argument, DiagnosticKind::Raw("no receiver given".into())));
        }
        let recv = args.remove(0);
        self.call_method(&recv, selector, args, passed, CallKind::Public)
    }

    pub(crate) fn capture_binding(&self, frame: &Frame, names: &[(Symbol, LocalRef)]) -> Arc<Binding> {
        let mut vars = FastIndexMap::default();
        for (name, r) in names {
            if let Some(cell) = frame.cell(*r) {
                vars.insert(*name, cell);
            }
        }
        Arc::new(Binding {
            vars: RwLock::new(vars),
            self_value: frame.self_value.clone(),
            cref: self.thread.cref().class.clone(),
            block: frame.block.clone(),
            method: frame.method.clone(),
            home: frame.home,
        })
    }

    /// Binding for a host with no guest frame: top-level `self` and an empty scope.
    pub fn top_binding(&self) -> Value {
        Value::Binding(Arc::new(Binding {
            vars: RwLock::new(FastIndexMap::default()),
            self_value: self.vm.main_obj.clone(),
            cref: self.vm.model.core().object.clone(),
            block: None,
            method: None,
            home: 0,
        }))
    }

    /// Runs `node` in the scope captured by `binding`. New locals persist in the binding.
    pub(crate) fn eval_in_binding(&mut self, node: &Node, binding: &Arc<Binding>) -> Eval {
        let (names, cells) = binding.snapshot();
        let body = compile::compile_eval(node, &names, &self.config.file_name);
        let id = self.vm.next_frame_id();
        let mut frame = Frame::new(binding.self_value.clone(), body.slots, body.cells, id);
        frame.dvars = cells;
        frame.block = binding.block.clone();
        frame.method = binding.method.clone();
        frame.home = binding.home;

        self.thread.cref.push(CrefEntry::new(binding.cref.clone(), Visibility::Public));
        self.thread.calls.push(CallRecord {
            label: body.label.clone(),
            file: body.file.clone(),
            caller_line: self.thread.line,
        });
        let result = (body.code)(self, &mut frame);
        if let Some(rec) = self.thread.calls.pop() {
            self.thread.line = rec.caller_line;
        }
        self.thread.cref.pop();

        for (name, r) in body.locals.iter() {
            if let LocalRef::Cell(i) = r {
                binding.adopt(*name, frame.cells[*i as usize].clone());
            }
        }
        result
    }
}
