use garnet_ir::{BeginNode, Node};

use super::Compiler;
use super::assign::Assign;
use crate::core::Value;
use crate::runtime::Runtime;
use crate::runtime::config::{Eval, Flow};
use crate::runtime::exception::Exc;
use crate::runtime::frame::Frame;
use crate::runtime::unit::Code;

struct Clause {
    /// Class expressions; `true` marks a splatted list.
    classes: Vec<(bool, Code)>,
    var: Option<Assign>,
    body: Code,
}

impl Clause {
    /// Whether this clause handles `exc`. A clause with no classes takes `StandardError`.
    fn matches(&self, rt: &mut Runtime, frame: &mut Frame, exc: &Value) -> Result<bool, Flow> {
        if self.classes.is_empty() {
            let standard = rt.vm.model.core().standard_error.clone();
            return Ok(rt.exception_matches(exc, &standard));
        }
        for (splat, code) in &self.classes {
            let v = code(rt, frame)?;
            let candidates = if *splat { rt.splat_items(&v)? } else { vec![v] };
            for candidate in candidates {
                match candidate {
                    Value::Class(c) => {
                        if rt.exception_matches(exc, &c) {
                            return Ok(true);
                        }
                    }
                    _ => {
                        return Err(rt.error_msg(Exc::Type, "class or module required for rescue clause"));
                    }
                }
            }
        }
        Ok(false)
    }
}

impl Compiler {
    pub(super) fn compile_begin(&mut self, begin: &BeginNode) -> Code {
        if begin.rescues.is_empty() && begin.els.is_none() && begin.ensure.is_none() {
            return self.compile(&begin.body);
        }
        let body = self.compile(&begin.body);
        let clauses: Vec<Clause> = begin
            .rescues
            .iter()
            .map(|r| {
                let classes = r
                    .classes
                    .iter()
                    .map(|c| match c {
                        Node::Splat(inner) => (true, self.compile(inner)),
                        other => (false, self.compile(other)),
                    })
                    .collect();
                let var = r.var.as_ref().map(|t| self.compile_target(t));
                self.scopes.current_mut().rescues += 1;
                let body = self.compile(&r.body);
                self.scopes.current_mut().rescues -= 1;
                Clause { classes, var, body }
            })
            .collect();
        let els = begin.els.as_ref().map(|e| self.compile(e));
        let ensure = begin.ensure.as_ref().map(|e| self.compile(e));

        Box::new(move |rt, frame| {
            let result = run_rescued(rt, frame, &body, &clauses, els.as_ref());
            match &ensure {
                // An ensure that completes normally keeps the protected result; one that
                // raises or jumps replaces it.
                Some(ensure) => ensure(rt, frame).and(result),
                None => result,
            }
        })
    }
}

fn run_rescued(
    rt: &mut Runtime,
    frame: &mut Frame,
    body: &Code,
    clauses: &[Clause],
    els: Option<&Code>,
) -> Eval {
    let depth = rt.thread.exceptions.len();
    loop {
        let exc = match body(rt, frame) {
            Ok(v) => {
                return match els {
                    Some(els) => els(rt, frame),
                    None => Ok(v),
                };
            }
            Err(Flow::Raise(exc)) if !clauses.is_empty() => exc,
            Err(other) => return Err(other),
        };

        let mut handler = None;
        for clause in clauses {
            if clause.matches(rt, frame, &exc)? {
                handler = Some(clause);
                break;
            }
        }
        let Some(clause) = handler else {
            return Err(Flow::Raise(exc));
        };

        rt.thread.exceptions.truncate(depth);
        rt.thread.exceptions.push(exc.clone());
        let handled = match &clause.var {
            Some(assign) => assign(rt, frame, exc).and_then(|()| (clause.body)(rt, frame)),
            None => (clause.body)(rt, frame),
        };
        match handled {
            Err(Flow::Retry) => {
                rt.thread.exceptions.truncate(depth);
                rt.thread.handle.check()?;
            }
            Err(Flow::Raise(next)) => {
                // `$!` inside an outer handler is the new exception.
                rt.thread.exceptions.truncate(depth);
                rt.thread.exceptions.push(next.clone());
                return Err(Flow::Raise(next));
            }
            other => {
                rt.thread.exceptions.truncate(depth);
                return other;
            }
        }
    }
}
