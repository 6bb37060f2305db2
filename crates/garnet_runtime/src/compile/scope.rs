//! Lexical scopes and local-variable allocation.
//!
//! A scope that contains a block literal, a lambda or a `binding` call allocates every
//! local as a shared cell, so closures can hold on to them directly. Other scopes use
//! plain frame slots.

use garnet_ir::{Arg, BeginNode, BlockNode, CallNode, MultiTarget, Node, OpTarget, Params, Target};

use crate::core::{FastIndexMap, Symbol};
use crate::runtime::frame::LocalRef;
use crate::runtime::unit::CaptureSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Top,
    Method,
    Block,
    Class,
    Eval,
}

pub(crate) struct Scope {
    pub kind: ScopeKind,
    pub vars: FastIndexMap<Symbol, LocalRef>,
    pub slots: u32,
    pub cells: u32,
    /// Block scopes: where each `Dvar(i)` comes from in the creating frame.
    pub captures: Vec<CaptureSource>,
    pub boxed: bool,
    pub loops: u32,
    pub rescues: u32,
    pub label: String,
}

impl Scope {
    pub fn new(kind: ScopeKind, boxed: bool, label: String) -> Self {
        Self {
            kind,
            vars: FastIndexMap::default(),
            slots: 0,
            cells: 0,
            captures: Vec::new(),
            boxed,
            loops: 0,
            rescues: 0,
            label,
        }
    }

    /// Eval scope over a binding's cells: every outer name is `Dvar(i)` in snapshot order.
    pub fn eval(names: &[Symbol]) -> Self {
        let mut scope = Self::new(ScopeKind::Eval, true, "(eval)".into());
        for (i, name) in names.iter().enumerate() {
            scope.vars.insert(*name, LocalRef::Dvar(i as u32));
        }
        scope
    }

    pub fn allocate(&mut self) -> LocalRef {
        if self.boxed {
            self.cells += 1;
            LocalRef::Cell(self.cells - 1)
        } else {
            self.slots += 1;
            LocalRef::Slot(self.slots - 1)
        }
    }

    pub fn declare(&mut self, name: Symbol) -> LocalRef {
        if let Some(r) = self.vars.get(&name) {
            return *r;
        }
        let r = self.allocate();
        self.vars.insert(name, r);
        r
    }
}

/// Scope stack of one compilation.
#[derive(Default)]
pub(crate) struct Scopes {
    stack: Vec<Scope>,
}

impl Scopes {
    pub fn push(&mut self, scope: Scope) {
        self.stack.push(scope);
    }

    pub fn pop(&mut self) -> Scope {
        match self.stack.pop() {
            Some(s) => s,
            None => panic!("scope stack underflow"),
        }
    }

    pub fn current(&self) -> &Scope {
        match self.stack.last() {
            Some(s) => s,
            None => panic!("no open scope"),
        }
    }

    pub fn current_mut(&mut self) -> &mut Scope {
        match self.stack.last_mut() {
            Some(s) => s,
            None => panic!("no open scope"),
        }
    }

    /// Finds `name` in the current scope or, through block scopes, in an enclosing one.
    /// A hit in an outer scope is recorded as a capture in every block scope in between.
    pub fn lookup(&mut self, name: Symbol) -> Option<LocalRef> {
        let top = self.stack.len().checked_sub(1)?;
        self.lookup_at(top, name)
    }

    fn lookup_at(&mut self, idx: usize, name: Symbol) -> Option<LocalRef> {
        if let Some(r) = self.stack[idx].vars.get(&name) {
            return Some(*r);
        }
        if self.stack[idx].kind != ScopeKind::Block || idx == 0 {
            return None;
        }
        let outer = self.lookup_at(idx - 1, name)?;
        let source = match outer {
            LocalRef::Cell(i) => CaptureSource::Cell(i),
            LocalRef::Dvar(i) => CaptureSource::Dvar(i),
            LocalRef::Slot(_) => panic!("local {name} is visible to a block but not boxed"),
        };
        let scope = &mut self.stack[idx];
        scope.captures.push(source);
        let r = LocalRef::Dvar(scope.captures.len() as u32 - 1);
        scope.vars.insert(name, r);
        Some(r)
    }

    /// The local `name` refers to, declaring it in the current scope when unknown.
    pub fn resolve_or_declare(&mut self, name: Symbol) -> LocalRef {
        match self.lookup(name) {
            Some(r) => r,
            None => self.current_mut().declare(name),
        }
    }

    /// Every local visible from the current scope, innermost declarations first.
    pub fn visible(&mut self) -> Vec<(Symbol, LocalRef)> {
        let mut names: Vec<Symbol> = Vec::new();
        for scope in self.stack.iter().rev() {
            for name in scope.vars.keys() {
                if !names.contains(name) {
                    names.push(*name);
                }
            }
            if scope.kind != ScopeKind::Block {
                break;
            }
        }
        names
            .into_iter()
            .filter_map(|n| self.lookup(n).map(|r| (n, r)))
            .collect()
    }

    /// Label of the nearest non-block scope.
    pub fn method_label(&self) -> String {
        self.stack
            .iter()
            .rev()
            .find(|s| s.kind != ScopeKind::Block)
            .map(|s| s.label.clone())
            .unwrap_or_else(|| "<main>".into())
    }
}

/// Whether a scope with this body (and these parameter defaults) hands its locals to a
/// closure. Nested definitions are separate scopes and are not searched.
pub(crate) fn needs_cells(params: Option<&Params>, body: &Node) -> bool {
    params.is_some_and(|p| p.optional.iter().any(|(_, d)| node_needs(d))) || node_needs(body)
}

fn is_binding_call(name: &str) -> bool {
    matches!(name, "binding" | "local_variables")
}

fn node_needs(node: &Node) -> bool {
    match node {
        Node::Lambda(_) => true,
        Node::VCall(name) => is_binding_call(name),
        Node::Call(call) => call_needs(call),
        Node::Super { args, block } => {
            block.is_some() || args.as_deref().is_some_and(|a| a.iter().any(arg_needs))
        }
        // Definition bodies are scopes of their own; only the header runs here.
        Node::Def(_) => false,
        Node::Defs { recv, .. } => node_needs(recv),
        Node::Class {
            scope, superclass, ..
        } => scope.as_deref().is_some_and(node_needs) || superclass.as_deref().is_some_and(node_needs),
        Node::Module { scope, .. } => scope.as_deref().is_some_and(node_needs),
        Node::SClass { target, .. } => node_needs(target),
        Node::DStr(items) | Node::Array(items) | Node::Seq(items) => items.iter().any(node_needs),
        Node::Hash(pairs) => pairs.iter().any(|(k, v)| node_needs(k) || node_needs(v)),
        Node::Range { lo, hi, .. } => node_needs(lo) || node_needs(hi),
        Node::Splat(n)
        | Node::Not(n)
        | Node::Defined(n)
        | Node::LAsgn(_, n)
        | Node::IAsgn(_, n)
        | Node::CVAsgn(_, n)
        | Node::GAsgn(_, n) => node_needs(n),
        Node::Newline { node, .. } => node_needs(node),
        Node::Colon2 { scope, .. } => node_needs(scope),
        Node::CDecl { scope, value, .. } => scope.as_deref().is_some_and(node_needs) || node_needs(value),
        Node::AttrAsgn {
            recv, args, value, ..
        } => node_needs(recv) || args.iter().any(arg_needs) || node_needs(value),
        Node::OpAsgn { target, value, .. } => op_target_needs(target) || node_needs(value),
        Node::MAsgn { targets, value } => multi_needs(targets) || node_needs(value),
        Node::If { cond, then, els } => {
            node_needs(cond) || then.as_deref().is_some_and(node_needs) || els.as_deref().is_some_and(node_needs)
        }
        Node::And(a, b) | Node::Or(a, b) => node_needs(a) || node_needs(b),
        Node::Case {
            subject,
            whens,
            els,
        } => {
            subject.as_deref().is_some_and(node_needs)
                || whens
                    .iter()
                    .any(|w| w.conds.iter().any(node_needs) || node_needs(&w.body))
                || els.as_deref().is_some_and(node_needs)
        }
        Node::While { cond, body, .. } => node_needs(cond) || node_needs(body),
        Node::Break(v) | Node::Next(v) | Node::Return(v) => v.as_deref().is_some_and(node_needs),
        Node::Yield(args) => args.iter().any(arg_needs),
        Node::Begin(begin) => begin_needs(begin),
        _ => false,
    }
}

fn call_needs(call: &CallNode) -> bool {
    call.block.is_some()
        || (call.recv.is_none() && is_binding_call(&call.name) && call.args.is_empty())
        || call.recv.as_ref().is_some_and(node_needs)
        || call.args.iter().any(arg_needs)
}

fn arg_needs(arg: &Arg) -> bool {
    match arg {
        Arg::Plain(n) | Arg::Splat(n) | Arg::BlockPass(n) => node_needs(n),
        Arg::Named(pairs) => pairs.iter().any(|(_, n)| node_needs(n)),
    }
}

fn begin_needs(begin: &BeginNode) -> bool {
    node_needs(&begin.body)
        || begin
            .rescues
            .iter()
            .any(|r| r.classes.iter().any(node_needs) || node_needs(&r.body))
        || begin.els.as_ref().is_some_and(node_needs)
        || begin.ensure.as_ref().is_some_and(node_needs)
}

fn op_target_needs(target: &OpTarget) -> bool {
    match target {
        OpTarget::Attr { recv, .. } => node_needs(recv),
        OpTarget::Index { recv, args } => node_needs(recv) || args.iter().any(arg_needs),
        _ => false,
    }
}

fn multi_needs(targets: &MultiTarget) -> bool {
    targets
        .pre
        .iter()
        .chain(targets.splat.iter())
        .chain(targets.post.iter())
        .any(target_needs)
}

fn target_needs(target: &Target) -> bool {
    match target {
        Target::Attr { recv, .. } => node_needs(recv),
        Target::Index { recv, args } => node_needs(recv) || args.iter().any(arg_needs),
        Target::Nested(m) => multi_needs(m),
        _ => false,
    }
}

/// Whether a block literal's own locals must be boxed.
pub(crate) fn block_needs_cells(block: &BlockNode) -> bool {
    needs_cells(Some(&block.params), &block.body)
}
