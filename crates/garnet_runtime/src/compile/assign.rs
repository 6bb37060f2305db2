use garnet_ir::{MultiTarget, Node, OpTarget, Target};

use super::Compiler;
use super::call::{ArgList, Site, send_binary};
use super::fast::{OpKind, op_kind};
use crate::core::{Symbol, Value};
use crate::model::ClassRef;
use crate::runtime::Runtime;
use crate::runtime::config::{Eval, Flow};
use crate::runtime::dispatch::CallKind;
use crate::runtime::exception::Exc;
use crate::runtime::frame::{Frame, LocalRef};
use crate::runtime::unit::Code;

/// Stores one value into a compiled assignment target.
pub(super) type Assign = Box<dyn Fn(&mut Runtime, &mut Frame, Value) -> Result<(), Flow> + Send + Sync>;

/// Where an `op=` reads from and writes back to.
enum Place {
    Local(LocalRef),
    Ivar(Symbol),
    Gvar(Symbol),
    Cvar(Symbol),
    Const(Symbol),
    Attr {
        recv: Code,
        getter: Site,
        setter: Site,
    },
    Index {
        recv: Code,
        args: ArgList,
        getter: Site,
        setter: Site,
    },
}

/// Receiver and index arguments, evaluated once per `op=`.
#[derive(Default)]
struct Prepared {
    recv: Value,
    args: Vec<Value>,
}

enum OpMode {
    Or,
    And,
    Binary(Site, Option<OpKind>),
}

impl Place {
    fn prepare(&self, rt: &mut Runtime, frame: &mut Frame) -> Result<Prepared, Flow> {
        Ok(match self {
            Place::Attr { recv, .. } => Prepared {
                recv: recv(rt, frame)?,
                args: Vec::new(),
            },
            Place::Index { recv, args, .. } => {
                let recv = recv(rt, frame)?;
                Prepared {
                    recv,
                    args: args.eval_flat(rt, frame)?,
                }
            }
            _ => Prepared::default(),
        })
    }

    /// Current value. With `lenient`, an unset constant or class variable reads as nil.
    fn get(&self, rt: &mut Runtime, frame: &mut Frame, prep: &Prepared, lenient: bool) -> Eval {
        match self {
            Place::Local(r) => Ok(frame.get(*r)),
            Place::Ivar(name) => Ok(rt.ivar_get(&frame.self_value, *name)),
            Place::Gvar(name) => Ok(rt.gvar_get(*name)),
            Place::Cvar(name) if lenient && !rt.cvar_defined(*name) => Ok(Value::Nil),
            Place::Cvar(name) => rt.cvar_get(*name),
            Place::Const(name) => match rt.const_lookup(*name) {
                Some(v) => Ok(v),
                None if lenient => Ok(Value::Nil),
                None => rt.const_get(*name),
            },
            Place::Attr { getter, .. } => rt.dispatch_inner(
                Some(&getter.cache),
                &prep.recv,
                getter.sel,
                Vec::new(),
                None,
                None,
                getter.kind,
                Some(&frame.self_value),
            ),
            Place::Index { getter, .. } => rt.dispatch_inner(
                Some(&getter.cache),
                &prep.recv,
                getter.sel,
                prep.args.clone(),
                None,
                None,
                getter.kind,
                Some(&frame.self_value),
            ),
        }
    }

    fn set(&self, rt: &mut Runtime, frame: &mut Frame, prep: Prepared, value: Value) -> Result<(), Flow> {
        match self {
            Place::Local(r) => {
                frame.set(*r, value);
                Ok(())
            }
            Place::Ivar(name) => rt.ivar_set(&frame.self_value, *name, value),
            Place::Gvar(name) => rt.gvar_set(*name, value),
            Place::Cvar(name) => rt.cvar_set(*name, value),
            Place::Const(name) => {
                let target = rt.thread.cref().class.clone();
                rt.const_set_in(&target, *name, value);
                Ok(())
            }
            Place::Attr { setter, .. } => rt
                .dispatch_inner(
                    Some(&setter.cache),
                    &prep.recv,
                    setter.sel,
                    vec![value],
                    None,
                    None,
                    setter.kind,
                    Some(&frame.self_value),
                )
                .map(drop),
            Place::Index { setter, .. } => {
                let mut args = prep.args;
                args.push(value);
                rt.dispatch_inner(
                    Some(&setter.cache),
                    &prep.recv,
                    setter.sel,
                    args,
                    None,
                    None,
                    setter.kind,
                    Some(&frame.self_value),
                )
                .map(drop)
            }
        }
    }
}

/// Values an assignment with several targets distributes: arrays (and `to_ary`
/// responders) spread, anything else is a single value.
fn destructure(rt: &mut Runtime, value: &Value) -> Result<Vec<Value>, Flow> {
    match value {
        Value::Array(items) => Ok(items.to_vec()),
        Value::Object(_) | Value::Foreign(_) => {
            let to_ary = Symbol::intern("to_ary");
            if rt.responds_to(value, to_ary, true) {
                match rt.call_method(value, to_ary, Vec::new(), None, CallKind::FCall)? {
                    Value::Array(items) => return Ok(items.to_vec()),
                    Value::Nil => {}
                    other => {
                        let from = rt.describe_receiver(value);
                        let got = rt.describe_receiver(&other);
                        return Err(rt.error_msg(
                            Exc::Type,
                            format!("can't convert {from} to Array ({from}#to_ary gives {got})"),
                        ));
                    }
                }
            }
            Ok(vec![value.clone()])
        }
        other => Ok(vec![other.clone()]),
    }
}

fn receiver_kind(recv: &Node) -> CallKind {
    if matches!(recv, Node::SelfRef) {
        CallKind::SelfCall
    } else {
        CallKind::Public
    }
}

impl Compiler {
    pub(super) fn compile_lvar(&mut self, name: &str) -> Code {
        let r = self.scopes.resolve_or_declare(Symbol::intern(name));
        Box::new(move |_, frame| Ok(frame.get(r)))
    }

    pub(super) fn compile_lasgn(&mut self, name: &str, value: &Node) -> Code {
        // Declared before the value so `x = x` and blocks in the value see the new local.
        let r = self.scopes.resolve_or_declare(Symbol::intern(name));
        let value = self.compile(value);
        Box::new(move |rt, frame| {
            let v = value(rt, frame)?;
            frame.set(r, v.clone());
            Ok(v)
        })
    }

    pub(super) fn compile_ivar(&mut self, name: &str) -> Code {
        let name = Symbol::intern(name);
        Box::new(move |rt, frame| Ok(rt.ivar_get(&frame.self_value, name)))
    }

    pub(super) fn compile_iasgn(&mut self, name: &str, value: &Node) -> Code {
        let name = Symbol::intern(name);
        let value = self.compile(value);
        Box::new(move |rt, frame| {
            let v = value(rt, frame)?;
            rt.ivar_set(&frame.self_value, name, v.clone())?;
            Ok(v)
        })
    }

    pub(super) fn compile_cvar(&mut self, name: &str) -> Code {
        let name = Symbol::intern(name);
        Box::new(move |rt, _| rt.cvar_get(name))
    }

    pub(super) fn compile_cvasgn(&mut self, name: &str, value: &Node) -> Code {
        let name = Symbol::intern(name);
        let value = self.compile(value);
        Box::new(move |rt, frame| {
            let v = value(rt, frame)?;
            rt.cvar_set(name, v.clone())?;
            Ok(v)
        })
    }

    pub(super) fn compile_gvar(&mut self, name: &str) -> Code {
        let name = Symbol::intern(name);
        Box::new(move |rt, _| Ok(rt.gvar_get(name)))
    }

    pub(super) fn compile_gasgn(&mut self, name: &str, value: &Node) -> Code {
        let name = Symbol::intern(name);
        let value = self.compile(value);
        Box::new(move |rt, frame| {
            let v = value(rt, frame)?;
            rt.gvar_set(name, v.clone())?;
            Ok(v)
        })
    }

    pub(super) fn compile_const(&mut self, name: &str) -> Code {
        let name = Symbol::intern(name);
        Box::new(move |rt, _| rt.const_get(name))
    }

    pub(super) fn compile_colon2(&mut self, scope: &Node, name: &str) -> Code {
        let scope = self.compile(scope);
        let name = Symbol::intern(name);
        Box::new(move |rt, frame| {
            let scope = scope(rt, frame)?;
            rt.scoped_const_get(&scope, name)
        })
    }

    pub(super) fn compile_colon3(&mut self, name: &str) -> Code {
        let name = Symbol::intern(name);
        Box::new(move |rt, _| {
            let object = rt.vm.model.core().object.clone();
            rt.scoped_const_get(&Value::Class(object), name)
        })
    }

    pub(super) fn compile_cdecl(&mut self, scope: Option<&Node>, name: &str, value: &Node) -> Code {
        let scope = scope.map(|s| self.compile(s));
        let name = Symbol::intern(name);
        let value = self.compile(value);
        Box::new(move |rt, frame| {
            let target = match &scope {
                Some(code) => match code(rt, frame)? {
                    Value::Class(c) => c,
                    other => {
                        let shown = rt.describe_receiver(&other);
                        return Err(rt.error_msg(
                            Exc::Type,
                            format!("{shown} is not a class/module"),
                        ));
                    }
                },
                None => rt.thread.cref().class.clone(),
            };
            let v = value(rt, frame)?;
            rt.const_set_in(&target, name, v.clone());
            Ok(v)
        })
    }

    fn compile_place(&mut self, target: &OpTarget) -> Place {
        match target {
            OpTarget::Local(name) => Place::Local(self.scopes.resolve_or_declare(Symbol::intern(name))),
            OpTarget::Ivar(name) => Place::Ivar(Symbol::intern(name)),
            OpTarget::Gvar(name) => Place::Gvar(Symbol::intern(name)),
            OpTarget::Cvar(name) => Place::Cvar(Symbol::intern(name)),
            OpTarget::Const(name) => Place::Const(Symbol::intern(name)),
            OpTarget::Attr { recv, name } => {
                let kind = receiver_kind(recv);
                Place::Attr {
                    recv: self.compile(recv),
                    getter: Site::new(name, kind),
                    setter: Site::new(&format!("{name}="), kind),
                }
            }
            OpTarget::Index { recv, args } => {
                let kind = receiver_kind(recv);
                Place::Index {
                    recv: self.compile(recv),
                    args: self.compile_arg_list(args, None),
                    getter: Site::new("[]", kind),
                    setter: Site::new("[]=", kind),
                }
            }
        }
    }

    /// `target op= value`, `target ||= value` and `target &&= value`.
    pub(super) fn compile_op_asgn(&mut self, target: &OpTarget, op: &str, value: &Node) -> Code {
        let place = self.compile_place(target);
        let value = self.compile(value);
        let mode = match op {
            "||" => OpMode::Or,
            "&&" => OpMode::And,
            other => OpMode::Binary(
                Site::new(other, CallKind::Public),
                op_kind(other).filter(|_| self.fast_paths()),
            ),
        };
        Box::new(move |rt, frame| {
            let prep = place.prepare(rt, frame)?;
            let current = place.get(rt, frame, &prep, matches!(mode, OpMode::Or))?;
            let new = match &mode {
                OpMode::Or if current.truthy() => return Ok(current),
                OpMode::And if !current.truthy() => return Ok(current),
                OpMode::Or | OpMode::And => value(rt, frame)?,
                OpMode::Binary(site, op) => {
                    let rhs = value(rt, frame)?;
                    send_binary(rt, frame, site, *op, &current, rhs)?
                }
            };
            place.set(rt, frame, prep, new.clone())?;
            Ok(new)
        })
    }

    pub(super) fn compile_target(&mut self, target: &Target) -> Assign {
        match target {
            Target::Local(name) => {
                let r = self.scopes.resolve_or_declare(Symbol::intern(name));
                Box::new(move |_, frame, v| {
                    frame.set(r, v);
                    Ok(())
                })
            }
            Target::Ivar(name) => {
                let name = Symbol::intern(name);
                Box::new(move |rt, frame, v| rt.ivar_set(&frame.self_value, name, v))
            }
            Target::Gvar(name) => {
                let name = Symbol::intern(name);
                Box::new(move |rt, _, v| rt.gvar_set(name, v))
            }
            Target::Cvar(name) => {
                let name = Symbol::intern(name);
                Box::new(move |rt, _, v| rt.cvar_set(name, v))
            }
            Target::Const(name) => {
                let name = Symbol::intern(name);
                Box::new(move |rt, _, v| {
                    let target: ClassRef = rt.thread.cref().class.clone();
                    rt.const_set_in(&target, name, v);
                    Ok(())
                })
            }
            Target::Attr { recv, name } => {
                let site = Site::new(&format!("{name}="), receiver_kind(recv));
                let recv = self.compile(recv);
                Box::new(move |rt, frame, v| {
                    let recv = recv(rt, frame)?;
                    rt.dispatch_inner(
                        Some(&site.cache),
                        &recv,
                        site.sel,
                        vec![v],
                        None,
                        None,
                        site.kind,
                        Some(&frame.self_value),
                    )
                    .map(drop)
                })
            }
            Target::Index { recv, args } => {
                let site = Site::new("[]=", receiver_kind(recv));
                let recv = self.compile(recv);
                let args: ArgList = self.compile_arg_list(args, None);
                Box::new(move |rt, frame, v| {
                    let recv = recv(rt, frame)?;
                    let mut argv = args.eval_flat(rt, frame)?;
                    argv.push(v);
                    rt.dispatch_inner(
                        Some(&site.cache),
                        &recv,
                        site.sel,
                        argv,
                        None,
                        None,
                        site.kind,
                        Some(&frame.self_value),
                    )
                    .map(drop)
                })
            }
            Target::Nested(inner) => {
                let distribute = self.compile_distribute(inner);
                Box::new(move |rt, frame, v| {
                    let items = destructure(rt, &v)?;
                    distribute(rt, frame, items)
                })
            }
            Target::Discard => Box::new(|_, _, _| Ok(())),
        }
    }

    /// Spreads values over `pre`, the splat and `post` the way block parameters are bound.
    fn compile_distribute(
        &mut self,
        targets: &MultiTarget,
    ) -> Box<dyn Fn(&mut Runtime, &mut Frame, Vec<Value>) -> Result<(), Flow> + Send + Sync> {
        let pre: Vec<Assign> = targets.pre.iter().map(|t| self.compile_target(t)).collect();
        let splat: Option<Assign> = targets.splat.as_ref().map(|t| self.compile_target(t));
        let post: Vec<Assign> = targets.post.iter().map(|t| self.compile_target(t)).collect();
        Box::new(move |rt, frame, items| {
            let n = items.len();
            for (i, assign) in pre.iter().enumerate() {
                assign(rt, frame, items.get(i).cloned().unwrap_or(Value::Nil))?;
            }
            let rest_start = pre.len().min(n);
            match &splat {
                Some(assign) => {
                    let post_start = n.saturating_sub(post.len()).max(rest_start);
                    assign(rt, frame, Value::array(items[rest_start..post_start].to_vec()))?;
                    for (j, assign) in post.iter().enumerate() {
                        assign(rt, frame, items.get(post_start + j).cloned().unwrap_or(Value::Nil))?;
                    }
                }
                None => {
                    for (j, assign) in post.iter().enumerate() {
                        assign(rt, frame, items.get(pre.len() + j).cloned().unwrap_or(Value::Nil))?;
                    }
                }
            }
            Ok(())
        })
    }

    /// `a, b = value`; evaluates to the right-hand side.
    pub(super) fn compile_masgn(&mut self, targets: &MultiTarget, value: &Node) -> Code {
        let value = self.compile(value);
        let distribute = self.compile_distribute(targets);
        Box::new(move |rt, frame| {
            let v = value(rt, frame)?;
            let items = destructure(rt, &v)?;
            distribute(rt, frame, items)?;
            Ok(v)
        })
    }
}
