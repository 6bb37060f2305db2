//! Node compiler: turns AST bodies into trees of native closures.
//!
//! Every node compiles to a `Code` closure taking the runtime and the current frame.
//! Locals are resolved to frame addresses at compile time; calls get their own inline
//! cache; block literals become `BlockSite`s holding their compiled body.

mod assign;
mod call;
mod control;
mod define;
pub mod fast;
mod literal;
mod rescue;
mod scope;

use std::sync::Arc;

use garnet_ir::{Node, Params};
use garnet_syntax::{Diagnostic, DiagnosticKind, codes};
use log::warn;

use crate::core::{Symbol, Value};
use crate::model::ClassRef;
use crate::runtime::arity::Arity;
use crate::runtime::closure::{BlockFlags, BlockSite};
use crate::runtime::unit::{Body, Code, CompiledUnit, Imp, ParamPlan, PendingSource, UnitFlags, arity_of};

use self::scope::{Scope, ScopeKind, Scopes, block_needs_cells, needs_cells};

pub(crate) struct Compiler {
    scopes: Scopes,
    file: Arc<str>,
    optimized: bool,
    line: u32,
    diagnostics: Vec<Diagnostic>,
}

/// Compiles a whole program body.
pub(crate) fn compile_top(node: &Node, file: &Arc<str>, optimized: bool) -> Arc<Body> {
    let mut c = Compiler::new(file.clone(), optimized);
    c.scopes
        .push(Scope::new(ScopeKind::Top, needs_cells(None, node), "<main>".into()));
    let code = c.compile(node);
    let scope = c.scopes.pop();
    c.flush();
    let line = first_line(node);
    Arc::new(c.finish(scope, code, ParamPlan::default(), Arity::exact(0), None, false, line))
}

/// Compiles the body of a pending method definition.
pub(crate) fn compile_method(src: &PendingSource) -> CompiledUnit {
    let def = &src.def;
    let mut c = Compiler::new(src.file.clone(), src.optimized);
    if let Some(diag) = def.params.check() {
        c.diagnostics.push(diag);
    }
    c.scopes.push(Scope::new(
        ScopeKind::Method,
        needs_cells(Some(&def.params), &def.body),
        def.name.clone(),
    ));
    let params = c.compile_params(&def.params);
    let code = c.compile(&def.body);
    let scope = c.scopes.pop();
    c.flush();
    let empty = def.body.is_empty_body();
    let body = c.finish(
        scope,
        code,
        params,
        src.arity,
        Some(src.cref.clone()),
        empty,
        first_line(&def.body),
    );
    let mut flags = src.flags;
    if empty {
        flags |= UnitFlags::EMPTY_BODY;
    }
    CompiledUnit {
        imp: Imp::Guest(Arc::new(body)),
        arity: src.arity,
        flags,
        owner: src.owner.clone(),
        selector: src.selector,
    }
}

/// Compiles code run by `eval` against a binding whose locals are `names`, in order.
pub(crate) fn compile_eval(node: &Node, names: &[Symbol], file: &Arc<str>) -> Arc<Body> {
    let mut c = Compiler::new(file.clone(), false);
    c.scopes.push(Scope::eval(names));
    let code = c.compile(node);
    let scope = c.scopes.pop();
    c.flush();
    let line = first_line(node);
    Arc::new(c.finish(scope, code, ParamPlan::default(), Arity::exact(0), None, false, line))
}

/// First line number recorded in `node`, or 0.
fn first_line(node: &Node) -> u32 {
    match node {
        Node::Newline { line, .. } => *line,
        Node::Seq(items) => items.iter().map(first_line).find(|l| *l != 0).unwrap_or(0),
        Node::Begin(b) => first_line(&b.body),
        _ => 0,
    }
}

fn is_jump(node: &Node) -> bool {
    matches!(
        node,
        Node::Return(_) | Node::Break(_) | Node::Next(_) | Node::Redo | Node::Retry
    )
}

pub(crate) fn value_code(v: Value) -> Code {
    Box::new(move |_, _| Ok(v.clone()))
}

impl Compiler {
    fn new(file: Arc<str>, optimized: bool) -> Self {
        Self {
            scopes: Scopes::default(),
            file,
            optimized,
            line: 0,
            diagnostics: Vec::new(),
        }
    }

    fn finish(
        &self,
        scope: Scope,
        code: Code,
        params: ParamPlan,
        arity: Arity,
        cref: Option<ClassRef>,
        empty: bool,
        line: u32,
    ) -> Body {
        Body {
            code,
            params,
            arity,
            slots: scope.slots as usize,
            cells: scope.cells as usize,
            captures: scope.captures.into_boxed_slice(),
            locals: scope.vars.into_iter().collect(),
            label: Arc::from(scope.label),
            file: self.file.clone(),
            empty,
            line,
            cref,
        }
    }

    fn warning(&self, kind: DiagnosticKind, code: &'static str) -> Diagnostic {
        let line = (self.line != 0).then_some(self.line);
        Diagnostic::warning_kind(kind, line).with_code(code)
    }

    fn warn(&mut self, kind: DiagnosticKind, code: &'static str) {
        let diag = self.warning(kind, code);
        self.diagnostics.push(diag);
    }

    fn warn_with_help(&mut self, kind: DiagnosticKind, code: &'static str, help: &str) {
        let diag = self.warning(kind, code).with_help(help);
        self.diagnostics.push(diag);
    }

    fn flush(&mut self) {
        for diag in self.diagnostics.drain(..) {
            warn!("{}", diag.render(&self.file));
        }
    }

    /// Whether inline operator paths may be emitted here.
    fn fast_paths(&self) -> bool {
        self.optimized && self.scopes.current().kind != ScopeKind::Eval
    }

    /// Declares every parameter, then compiles the default expressions.
    fn compile_params(&mut self, params: &Params) -> ParamPlan {
        let mut plan = ParamPlan::default();
        let scope = self.scopes.current_mut();
        for name in params.required.iter() {
            plan.required.push(scope.declare(Symbol::intern(name)));
        }
        let optional: Vec<_> = params
            .optional
            .iter()
            .map(|(name, _)| scope.declare(Symbol::intern(name)))
            .collect();
        plan.rest = params.rest.as_ref().map(|name| {
            if name.is_empty() {
                scope.allocate()
            } else {
                scope.declare(Symbol::intern(name))
            }
        });
        for name in params.post.iter() {
            plan.post.push(scope.declare(Symbol::intern(name)));
        }
        plan.block = params.block.as_ref().map(|name| scope.declare(Symbol::intern(name)));
        for (r, (_, default)) in optional.into_iter().zip(params.optional.iter()) {
            let code = self.compile(default);
            plan.optional.push((r, code));
        }
        plan
    }

    /// Compiles a block literal into a site that materializes blocks at run time.
    fn compile_block(&mut self, block: &garnet_ir::BlockNode, flags: BlockFlags) -> Arc<BlockSite> {
        let label = format!("block in {}", self.scopes.method_label());
        self.scopes
            .push(Scope::new(ScopeKind::Block, block_needs_cells(block), label));
        let params = self.compile_params(&block.params);
        let code = self.compile(&block.body);
        let scope = self.scopes.pop();
        let empty = block.body.is_empty_body() && params.optional.is_empty();
        let arity = arity_of(&block.params);
        let body = self.finish(scope, code, params, arity, None, empty, self.line);
        let flags = if empty { flags | BlockFlags::EMPTY } else { flags };
        Arc::new(BlockSite::new(Arc::new(body), flags))
    }

    fn compile_opt(&mut self, node: Option<&Node>) -> Code {
        match node {
            Some(n) => self.compile(n),
            None => value_code(Value::Nil),
        }
    }

    fn compile_seq(&mut self, items: &[Node]) -> Code {
        if let Some(pos) = items.iter().position(|n| is_jump(n.unwrap_newline())) {
            if pos + 1 < items.len() {
                self.warn(DiagnosticKind::UnreachableAfterReturn, codes::UNREACHABLE_CODE);
            }
        }
        let mut codes: Vec<Code> = items.iter().map(|n| self.compile(n)).collect();
        match codes.len() {
            0 => value_code(Value::Nil),
            1 => codes.remove(0),
            _ => Box::new(move |rt, frame| {
                let mut last = Value::Nil;
                for code in &codes {
                    last = code(rt, frame)?;
                }
                Ok(last)
            }),
        }
    }

    pub(crate) fn compile(&mut self, node: &Node) -> Code {
        match node {
            Node::Nil => value_code(Value::Nil),
            Node::True => value_code(Value::TRUE),
            Node::False => value_code(Value::FALSE),
            Node::SelfRef => Box::new(|_, frame| Ok(frame.self_value.clone())),
            Node::Int(i) => value_code(Value::Int(*i)),
            Node::Float(f) => value_code(Value::Float(*f)),
            Node::Sym(s) => value_code(Value::sym(s)),
            Node::Str(s) => self.compile_str(s),
            Node::DStr(parts) => self.compile_dstr(parts),
            Node::Array(items) => self.compile_array(items),
            Node::Hash(pairs) => self.compile_hash(pairs),
            Node::Range { lo, hi, exclusive } => self.compile_range(lo, hi, *exclusive),
            Node::Regexp {
                source,
                ignore_case,
            } => self.compile_regexp(source, *ignore_case),
            Node::Splat(inner) => {
                let inner = self.compile(inner);
                Box::new(move |rt, frame| {
                    let v = inner(rt, frame)?;
                    Ok(Value::array(rt.splat_items(&v)?))
                })
            }

            Node::Seq(items) => self.compile_seq(items),
            Node::Newline { line, node } => {
                self.line = *line;
                let line = *line;
                let inner = self.compile(node);
                Box::new(move |rt, frame| {
                    rt.thread.line = line;
                    inner(rt, frame)
                })
            }

            Node::LVar(name) => self.compile_lvar(name),
            Node::LAsgn(name, value) => self.compile_lasgn(name, value),
            Node::IVar(name) => self.compile_ivar(name),
            Node::IAsgn(name, value) => self.compile_iasgn(name, value),
            Node::CVar(name) => self.compile_cvar(name),
            Node::CVAsgn(name, value) => self.compile_cvasgn(name, value),
            Node::GVar(name) => self.compile_gvar(name),
            Node::GAsgn(name, value) => self.compile_gasgn(name, value),
            Node::Const(name) => self.compile_const(name),
            Node::Colon2 { scope, name } => self.compile_colon2(scope, name),
            Node::Colon3(name) => self.compile_colon3(name),
            Node::CDecl { scope, name, value } => self.compile_cdecl(scope.as_deref(), name, value),
            Node::AttrAsgn {
                recv,
                selector,
                args,
                value,
            } => self.compile_attr_asgn(recv, selector, args, value),
            Node::OpAsgn { target, op, value } => self.compile_op_asgn(target, op, value),
            Node::MAsgn { targets, value } => self.compile_masgn(targets, value),

            Node::If { cond, then, els } => self.compile_if(cond, then.as_deref(), els.as_deref()),
            Node::And(a, b) => self.compile_and(a, b),
            Node::Or(a, b) => self.compile_or(a, b),
            Node::Not(n) => self.compile_not(n),
            Node::Case {
                subject,
                whens,
                els,
            } => self.compile_case(subject.as_deref(), whens, els.as_deref()),
            Node::While {
                cond,
                body,
                do_while,
                until,
            } => self.compile_while(cond, body, *do_while, *until),
            Node::Break(v) => self.compile_break(v.as_deref()),
            Node::Next(v) => self.compile_next(v.as_deref()),
            Node::Redo => self.compile_redo(),
            Node::Retry => self.compile_retry(),
            Node::Return(v) => self.compile_return(v.as_deref()),

            Node::Call(call) => self.compile_call(call),
            Node::VCall(name) => self.compile_vcall(name),
            Node::Super { args, block } => self.compile_super(args.as_deref(), block.as_deref()),
            Node::Yield(args) => self.compile_yield(args),
            Node::Defined(n) => self.compile_defined(n),
            Node::Lambda(block) => self.compile_lambda(block),

            Node::Def(def) => self.compile_def(def),
            Node::Defs { recv, def } => self.compile_defs(recv, def),
            Node::Class {
                scope,
                name,
                superclass,
                body,
            } => self.compile_class(scope.as_deref(), name, superclass.as_deref(), body),
            Node::Module { scope, name, body } => self.compile_module(scope.as_deref(), name, body),
            Node::SClass { target, body } => self.compile_sclass(target, body),
            Node::Undef(names) => self.compile_undef(names),
            Node::Alias { new, old } => self.compile_alias(new, old),

            Node::Begin(begin) => self.compile_begin(begin),
        }
    }
}
