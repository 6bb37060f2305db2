use garnet_ir::{Arg, Node, When};
use garnet_syntax::{DiagnosticKind, codes};

use super::call::{Site, send_binary};
use super::fast::op_kind;
use super::scope::ScopeKind;
use super::Compiler;
use crate::core::{Symbol, Value};
use crate::runtime::Runtime;
use crate::runtime::config::{BreakTag, Flow};
use crate::runtime::dispatch::CallKind;
use crate::runtime::exception::Exc;
use crate::runtime::frame::Frame;
use crate::runtime::registry::Lookup;
use crate::runtime::unit::Code;

/// Answers `defined?` at run time; `None` means not defined.
type DefinedTest = Box<dyn Fn(&mut Runtime, &mut Frame) -> Option<&'static str> + Send + Sync>;

fn fixed(answer: Option<&'static str>) -> DefinedTest {
    Box::new(move |_, _| answer)
}

impl Compiler {
    pub(super) fn compile_if(&mut self, cond: &Node, then: Option<&Node>, els: Option<&Node>) -> Code {
        let cond = self.compile(cond);
        let then = self.compile_opt(then);
        let els = self.compile_opt(els);
        Box::new(move |rt, frame| {
            if cond(rt, frame)?.truthy() {
                then(rt, frame)
            } else {
                els(rt, frame)
            }
        })
    }

    pub(super) fn compile_and(&mut self, a: &Node, b: &Node) -> Code {
        let a = self.compile(a);
        let b = self.compile(b);
        Box::new(move |rt, frame| {
            let left = a(rt, frame)?;
            if left.truthy() { b(rt, frame) } else { Ok(left) }
        })
    }

    pub(super) fn compile_or(&mut self, a: &Node, b: &Node) -> Code {
        let a = self.compile(a);
        let b = self.compile(b);
        Box::new(move |rt, frame| {
            let left = a(rt, frame)?;
            if left.truthy() { Ok(left) } else { b(rt, frame) }
        })
    }

    pub(super) fn compile_not(&mut self, n: &Node) -> Code {
        let n = self.compile(n);
        Box::new(move |rt, frame| Ok(Value::Bool(!n(rt, frame)?.truthy())))
    }

    /// `case`: each `when` value is tested with `value === subject`, in order.
    pub(super) fn compile_case(&mut self, subject: Option<&Node>, whens: &[When], els: Option<&Node>) -> Code {
        struct Arm {
            conds: Vec<(bool, Code)>,
            body: Code,
        }
        let subject = subject.map(|s| self.compile(s));
        let op = op_kind("===").filter(|_| self.fast_paths());
        let site = Site::new("===", CallKind::Public);
        let arms: Vec<Arm> = whens
            .iter()
            .map(|w| Arm {
                conds: w
                    .conds
                    .iter()
                    .map(|c| match c {
                        Node::Splat(inner) => (true, self.compile(inner)),
                        other => (false, self.compile(other)),
                    })
                    .collect(),
                body: self.compile(&w.body),
            })
            .collect();
        let els = self.compile_opt(els);

        Box::new(move |rt, frame| {
            let subject = match &subject {
                Some(code) => Some(code(rt, frame)?),
                None => None,
            };
            for arm in &arms {
                for (splat, cond) in &arm.conds {
                    let v = cond(rt, frame)?;
                    let candidates = if *splat { rt.splat_items(&v)? } else { vec![v] };
                    for candidate in candidates {
                        let hit = match &subject {
                            Some(s) => {
                                send_binary(rt, frame, &site, op, &candidate, s.clone())?.truthy()
                            }
                            None => candidate.truthy(),
                        };
                        if hit {
                            return (arm.body)(rt, frame);
                        }
                    }
                }
            }
            els(rt, frame)
        })
    }

    /// `while`/`until`, including the `begin ... end while` form that runs the body first.
    pub(super) fn compile_while(&mut self, cond: &Node, body: &Node, do_while: bool, until: bool) -> Code {
        let cond = self.compile(cond);
        self.scopes.current_mut().loops += 1;
        let body = self.compile(body);
        self.scopes.current_mut().loops -= 1;
        Box::new(move |rt, frame| {
            let mut first = do_while;
            loop {
                if !first {
                    rt.thread.handle.check()?;
                    if cond(rt, frame)?.truthy() == until {
                        return Ok(Value::Nil);
                    }
                }
                first = false;
                loop {
                    match body(rt, frame) {
                        Ok(_) | Err(Flow::Next(_)) => break,
                        Err(Flow::Redo) => {
                            rt.thread.handle.check()?;
                            continue;
                        }
                        Err(Flow::Break {
                            value,
                            tag: BreakTag::Loop,
                        }) => return Ok(value),
                        Err(other) => return Err(other),
                    }
                }
            }
        })
    }

    fn invalid_jump(&mut self, keyword: &'static str) -> Code {
        let help = match keyword {
            "retry" => "retry is only valid inside a rescue clause",
            _ => "only valid inside a loop or a block",
        };
        self.warn_with_help(DiagnosticKind::InvalidJump(keyword), codes::INVALID_JUMP, help);
        Box::new(move |_, _| Err(Flow::BadTransfer(keyword)))
    }

    pub(super) fn compile_break(&mut self, value: Option<&Node>) -> Code {
        let scope = self.scopes.current();
        let in_loop = scope.loops > 0;
        if !in_loop && scope.kind != ScopeKind::Block {
            return self.invalid_jump("break");
        }
        let value = self.compile_opt(value);
        Box::new(move |rt, frame| {
            let value = value(rt, frame)?;
            let tag = match frame.block_id {
                Some(id) if !in_loop => BreakTag::Block(id),
                _ => BreakTag::Loop,
            };
            Err(Flow::Break { value, tag })
        })
    }

    pub(super) fn compile_next(&mut self, value: Option<&Node>) -> Code {
        let scope = self.scopes.current();
        if scope.loops == 0 && scope.kind != ScopeKind::Block {
            return self.invalid_jump("next");
        }
        let value = self.compile_opt(value);
        Box::new(move |rt, frame| Err(Flow::Next(value(rt, frame)?)))
    }

    pub(super) fn compile_redo(&mut self) -> Code {
        let scope = self.scopes.current();
        if scope.loops == 0 && scope.kind != ScopeKind::Block {
            return self.invalid_jump("redo");
        }
        Box::new(|_, _| Err(Flow::Redo))
    }

    pub(super) fn compile_retry(&mut self) -> Code {
        if self.scopes.current().rescues == 0 {
            return self.invalid_jump("retry");
        }
        Box::new(|_, _| Err(Flow::Retry))
    }

    pub(super) fn compile_return(&mut self, value: Option<&Node>) -> Code {
        let kind = self.scopes.current().kind;
        if kind == ScopeKind::Class {
            return self.invalid_jump("return");
        }
        let value = self.compile_opt(value);
        match kind {
            ScopeKind::Block | ScopeKind::Eval => Box::new(move |rt, frame| {
                let value = value(rt, frame)?;
                if frame.lambda {
                    return Err(Flow::BlockReturn {
                        value,
                        home: frame.id,
                    });
                }
                if !rt.thread.homes.contains(&frame.home) {
                    return Err(rt.error(Exc::LocalJump, DiagnosticKind::UnexpectedReturn));
                }
                Err(Flow::BlockReturn {
                    value,
                    home: frame.home,
                })
            }),
            _ => Box::new(move |rt, frame| Err(Flow::Return(value(rt, frame)?))),
        }
    }

    pub(super) fn compile_defined(&mut self, node: &Node) -> Code {
        let test = self.compile_defined_test(node);
        Box::new(move |rt, frame| {
            let depth = rt.thread.exceptions.len();
            let answer = test(rt, frame);
            rt.thread.exceptions.truncate(depth);
            Ok(answer.map_or(Value::Nil, Value::str))
        })
    }

    fn compile_defined_test(&mut self, node: &Node) -> DefinedTest {
        match node {
            Node::Newline { node, .. } => self.compile_defined_test(node),
            Node::Nil => fixed(Some("nil")),
            Node::True => fixed(Some("true")),
            Node::False => fixed(Some("false")),
            Node::SelfRef => fixed(Some("self")),
            Node::LVar(name) => {
                let known = self.scopes.lookup(Symbol::intern(name)).is_some();
                fixed(known.then_some("local-variable"))
            }
            Node::IVar(name) => {
                let name = Symbol::intern(name);
                Box::new(move |_, frame| {
                    let set = match &frame.self_value {
                        Value::Object(o) => o.ivar_get(name).is_some(),
                        Value::Class(c) => c.ivar_get(name).is_some(),
                        _ => false,
                    };
                    set.then_some("instance-variable")
                })
            }
            Node::GVar(name) => {
                let name = Symbol::intern(name);
                Box::new(move |rt, _| rt.gvar_defined(name).then_some("global-variable"))
            }
            Node::CVar(name) => {
                let name = Symbol::intern(name);
                Box::new(move |rt, _| rt.cvar_defined(name).then_some("class variable"))
            }
            Node::Const(name) => {
                let name = Symbol::intern(name);
                Box::new(move |rt, _| rt.const_lookup(name).is_some().then_some("constant"))
            }
            Node::Colon2 { scope, name } => {
                let inner = self.compile_defined_test(scope);
                let scope = self.compile(scope);
                let name = Symbol::intern(name);
                Box::new(move |rt, frame| {
                    inner(rt, frame)?;
                    match scope(rt, frame).ok()? {
                        Value::Class(c) => rt.scoped_const_lookup(&c, name).map(|_| "constant"),
                        _ => None,
                    }
                })
            }
            Node::VCall(name) => {
                let sel = Symbol::intern(name);
                Box::new(move |rt, frame| rt.responds_to(&frame.self_value, sel, true).then_some("method"))
            }
            Node::Call(call) => {
                let sel = Symbol::intern(&call.name);
                let args: Vec<DefinedTest> = call
                    .args
                    .iter()
                    .filter_map(|a| match a {
                        Arg::Plain(n) | Arg::Splat(n) => Some(n),
                        _ => None,
                    })
                    .map(|n| self.compile_defined_test(n))
                    .collect();
                let recv = call.recv.as_ref().map(|r| (self.compile_defined_test(r), self.compile(r)));
                Box::new(move |rt, frame| {
                    for arg in &args {
                        arg(rt, frame)?;
                    }
                    let found = match &recv {
                        Some((test, code)) => {
                            test(rt, frame)?;
                            let recv = code(rt, frame).ok()?;
                            rt.responds_to(&recv, sel, false)
                        }
                        None => rt.responds_to(&frame.self_value, sel, true),
                    };
                    found.then_some("method")
                })
            }
            Node::Yield(_) => Box::new(|_, frame| frame.block.is_some().then_some("yield")),
            Node::Super { .. } => Box::new(|rt, frame| {
                let ctx = frame.method.clone()?;
                let class = rt.vm.model.class_of(&frame.self_value);
                match rt
                    .vm
                    .registry
                    .resolve_after(rt.vm.model.as_ref(), &class, &ctx.owner, ctx.selector)
                {
                    Lookup::Found(_) => Some("super"),
                    _ => None,
                }
            }),
            Node::LAsgn(..)
            | Node::IAsgn(..)
            | Node::GAsgn(..)
            | Node::CVAsgn(..)
            | Node::CDecl { .. }
            | Node::AttrAsgn { .. }
            | Node::OpAsgn { .. }
            | Node::MAsgn { .. } => fixed(Some("assignment")),
            _ => fixed(Some("expression")),
        }
    }
}
