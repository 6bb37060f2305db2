use std::sync::Arc;

use garnet_ir::{Arg, BlockNode, CallNode, Node};

use super::Compiler;
use super::fast::{self, OpKind, op_kind};
use crate::core::{Symbol, Value};
use crate::model::BuiltinType;
use crate::runtime::Runtime;
use crate::runtime::cache::InlineCache;
use crate::runtime::closure::{Block, BlockFlags, BlockSite};
use crate::runtime::config::{BreakTag, Eval, Flow};
use crate::runtime::dispatch::{CallArg, CallKind, with_named};
use crate::runtime::exception::Exc;
use crate::runtime::frame::Frame;
use crate::runtime::unit::Code;
use crate::runtime::vm::Stat;

pub(super) enum ArgCode {
    Plain(Code),
    Splat(Code),
    Named(Vec<(Symbol, Code)>),
}

pub(super) enum BlockArg {
    Literal(Arc<BlockSite>),
    Pass(Code),
}

/// Compiled argument expressions of one call.
pub(super) struct ArgList {
    items: Vec<ArgCode>,
    pub block: Option<BlockArg>,
}

impl ArgList {
    fn plain(&self) -> bool {
        self.block.is_none() && self.items.iter().all(|a| matches!(a, ArgCode::Plain(_)))
    }

    /// Positionals with splats spread, plus the trailing named aggregate.
    pub fn eval(
        &self,
        rt: &mut Runtime,
        frame: &mut Frame,
    ) -> Result<(Vec<Value>, Option<Vec<(Symbol, Value)>>), Flow> {
        if self.items.iter().all(|a| matches!(a, ArgCode::Plain(_))) {
            let mut out = Vec::with_capacity(self.items.len());
            for item in &self.items {
                if let ArgCode::Plain(code) = item {
                    out.push(code(rt, frame)?);
                }
            }
            return Ok((out, None));
        }
        let mut args = Vec::with_capacity(self.items.len());
        for item in &self.items {
            args.push(match item {
                ArgCode::Plain(code) => CallArg::Value(code(rt, frame)?),
                ArgCode::Splat(code) => CallArg::Splat(code(rt, frame)?),
                ArgCode::Named(pairs) => {
                    let mut out = Vec::with_capacity(pairs.len());
                    for (key, code) in pairs {
                        out.push((*key, code(rt, frame)?));
                    }
                    CallArg::Named(out)
                }
            });
        }
        rt.expand_args(args)
    }

    /// All arguments as one positional list; a named aggregate becomes a trailing Hash.
    pub fn eval_flat(&self, rt: &mut Runtime, frame: &mut Frame) -> Result<Vec<Value>, Flow> {
        let (args, named) = self.eval(rt, frame)?;
        Ok(with_named(args, named))
    }
}

/// Selector, cache and dispatch kind of one call site.
pub(super) struct Site {
    pub sel: Symbol,
    pub cache: InlineCache,
    pub kind: CallKind,
}

impl Site {
    pub fn new(name: &str, kind: CallKind) -> Self {
        Self {
            sel: Symbol::intern(name),
            cache: InlineCache::new(),
            kind,
        }
    }
}

/// Block value of `&expr`.
pub(super) fn to_block(rt: &mut Runtime, frame: &Frame, value: Value) -> Result<Option<Arc<Block>>, Flow> {
    match value {
        Value::Nil => Ok(None),
        Value::Proc(b) => Ok(Some(b)),
        Value::Sym(sel) => Ok(Some(rt.symbol_block(sel, frame.self_value.clone(), frame.home))),
        other => {
            let converted = if rt.responds_to(&other, Symbol::intern("to_proc"), true) {
                rt.call_method(&other, Symbol::intern("to_proc"), Vec::new(), None, CallKind::FCall)?
            } else {
                Value::Nil
            };
            match converted {
                Value::Proc(b) => Ok(Some(b)),
                _ => {
                    let from = rt.vm.model.real_class_of(&other).name();
                    Err(rt.error_msg(
                        Exc::Type,
                        format!("wrong argument type {from} (expected Proc)"),
                    ))
                }
            }
        }
    }
}

/// Runs `call` with the block described by `block_arg`. A `break` out of a literal block
/// lands here.
pub(super) fn with_block(
    rt: &mut Runtime,
    frame: &mut Frame,
    block_arg: Option<&BlockArg>,
    call: impl FnOnce(&mut Runtime, &mut Frame, Option<Arc<Block>>) -> Eval,
) -> Eval {
    match block_arg {
        None => call(rt, frame, None),
        Some(BlockArg::Pass(code)) => {
            let v = code(rt, frame)?;
            let block = to_block(rt, frame, v)?;
            call(rt, frame, block)
        }
        Some(BlockArg::Literal(site)) => {
            let block = rt.create_block(site, frame);
            let id = block.id();
            rt.thread.break_targets.push(id);
            let result = call(rt, frame, Some(block));
            rt.thread.break_targets.pop();
            match result {
                Err(Flow::Break {
                    value,
                    tag: BreakTag::Block(b),
                }) if b == id => Ok(value),
                other => other,
            }
        }
    }
}

/// Binary operator send through a site cache, trying the inline path first.
pub(super) fn send_binary(
    rt: &mut Runtime,
    frame: &Frame,
    site: &Site,
    op: Option<OpKind>,
    recv: &Value,
    arg: Value,
) -> Eval {
    let args = vec![arg];
    if let Some(op) = op {
        if let Some(result) = fast::try_fast(rt, op, recv, &args) {
            rt.vm.stats.bump(Stat::FastPath);
            site.cache.specialize(op);
            return result;
        }
    }
    rt.dispatch_inner(
        Some(&site.cache),
        recv,
        site.sel,
        args,
        None,
        None,
        site.kind,
        Some(&frame.self_value),
    )
}

fn send_is_stock(rt: &Runtime) -> bool {
    !rt.vm.registry.is_redefined(OpKind::Send, BuiltinType::Integer)
}

impl Compiler {
    pub(super) fn compile_arg_list(&mut self, args: &[Arg], block: Option<&BlockNode>) -> ArgList {
        let mut items = Vec::with_capacity(args.len());
        let mut pass = None;
        for arg in args {
            match arg {
                Arg::Plain(n) => items.push(ArgCode::Plain(self.compile(n))),
                Arg::Splat(n) => items.push(ArgCode::Splat(self.compile(n))),
                Arg::Named(pairs) => items.push(ArgCode::Named(
                    pairs
                        .iter()
                        .map(|(k, v)| (Symbol::intern(k), self.compile(v)))
                        .collect(),
                )),
                Arg::BlockPass(n) => pass = Some(BlockArg::Pass(self.compile(n))),
            }
        }
        let block = match block {
            Some(b) => Some(BlockArg::Literal(self.compile_block(b, BlockFlags::empty()))),
            None => pass,
        };
        ArgList { items, block }
    }

    /// Calls that need the caller's frame or scope and so never go through dispatch.
    fn compile_intrinsic(&mut self, name: &str) -> Option<Code> {
        Some(match name {
            "block_given?" | "iterator?" => Box::new(|_, frame| Ok(Value::Bool(frame.block.is_some()))),
            "binding" => {
                let names = self.scopes.visible();
                Box::new(move |rt, frame| Ok(Value::Binding(rt.capture_binding(frame, &names))))
            }
            "local_variables" => {
                let names: Vec<Value> = self
                    .scopes
                    .visible()
                    .into_iter()
                    .map(|(n, _)| Value::Sym(n))
                    .collect();
                Box::new(move |_, _| Ok(Value::array(names.clone())))
            }
            "__method__" => Box::new(|_, frame| {
                Ok(frame
                    .method
                    .as_ref()
                    .map_or(Value::Nil, |m| Value::Sym(m.selector)))
            }),
            _ => return None,
        })
    }

    pub(super) fn compile_call(&mut self, call: &CallNode) -> Code {
        if call.recv.is_none() && call.args.is_empty() && call.block.is_none() {
            if let Some(code) = self.compile_intrinsic(&call.name) {
                return code;
            }
        }
        let kind = match &call.recv {
            None => CallKind::FCall,
            Some(Node::SelfRef) => CallKind::SelfCall,
            Some(_) => CallKind::Public,
        };
        let recv = call.recv.as_ref().map(|r| self.compile(r));
        let args = self.compile_arg_list(&call.args, call.block.as_ref());
        let op = op_kind(&call.name).filter(|_| self.fast_paths() && args.plain());
        let site = Site::new(&call.name, kind);

        Box::new(move |rt, frame| {
            let recv = match &recv {
                Some(code) => code(rt, frame)?,
                None => frame.self_value.clone(),
            };
            let (argv, named) = args.eval(rt, frame)?;
            match op {
                Some(OpKind::Send) => {
                    if let Some(sel) = argv.first().and_then(Value::as_name) {
                        if send_is_stock(rt) {
                            let rest = argv[1..].to_vec();
                            return with_block(rt, frame, args.block.as_ref(), |rt, frame, block| {
                                rt.dispatch_inner(
                                    None,
                                    &recv,
                                    sel,
                                    rest,
                                    named,
                                    block,
                                    CallKind::Send,
                                    Some(&frame.self_value),
                                )
                            });
                        }
                    }
                }
                Some(op) => {
                    if let Some(result) = fast::try_fast(rt, op, &recv, &argv) {
                        rt.vm.stats.bump(Stat::FastPath);
                        site.cache.specialize(op);
                        return result;
                    }
                }
                None => {}
            }
            with_block(rt, frame, args.block.as_ref(), |rt, frame, block| {
                rt.dispatch_inner(
                    Some(&site.cache),
                    &recv,
                    site.sel,
                    argv,
                    named,
                    block,
                    site.kind,
                    Some(&frame.self_value),
                )
            })
        })
    }

    pub(super) fn compile_vcall(&mut self, name: &str) -> Code {
        if let Some(code) = self.compile_intrinsic(name) {
            return code;
        }
        let site = Site::new(name, CallKind::VCall);
        Box::new(move |rt, frame| {
            let recv = frame.self_value.clone();
            rt.dispatch_inner(
                Some(&site.cache),
                &recv,
                site.sel,
                Vec::new(),
                None,
                None,
                site.kind,
                Some(&frame.self_value),
            )
        })
    }

    pub(super) fn compile_super(&mut self, args: Option<&[Arg]>, block: Option<&BlockNode>) -> Code {
        let explicit = args.is_some();
        let list = self.compile_arg_list(args.unwrap_or(&[]), block);
        Box::new(move |rt, frame| {
            let argv = if explicit {
                Some(list.eval_flat(rt, frame)?)
            } else {
                None
            };
            with_block(rt, frame, list.block.as_ref(), |rt, frame, block| {
                rt.call_super(frame, argv, block)
            })
        })
    }

    pub(super) fn compile_yield(&mut self, args: &[Arg]) -> Code {
        let list = self.compile_arg_list(args, None);
        Box::new(move |rt, frame| {
            let argv = list.eval_flat(rt, frame)?;
            rt.yield_block(frame, argv)
        })
    }

    pub(super) fn compile_lambda(&mut self, block: &BlockNode) -> Code {
        let site = self.compile_block(block, BlockFlags::LAMBDA);
        Box::new(move |rt, frame| {
            let block = rt.create_block(&site, frame);
            Ok(rt.reify_block(&block))
        })
    }

    pub(super) fn compile_attr_asgn(&mut self, recv: &Node, selector: &str, args: &[Arg], value: &Node) -> Code {
        let kind = if matches!(recv, Node::SelfRef) {
            CallKind::SelfCall
        } else {
            CallKind::Public
        };
        let recv = self.compile(recv);
        let args = self.compile_arg_list(args, None);
        let value = self.compile(value);
        let op = op_kind(selector).filter(|_| self.fast_paths() && args.plain());
        let site = Site::new(selector, kind);
        Box::new(move |rt, frame| {
            let recv = recv(rt, frame)?;
            let mut argv = args.eval_flat(rt, frame)?;
            let value = value(rt, frame)?;
            argv.push(value.clone());
            if let Some(op) = op {
                if let Some(result) = fast::try_fast(rt, op, &recv, &argv) {
                    rt.vm.stats.bump(Stat::FastPath);
                    site.cache.specialize(op);
                    result?;
                    return Ok(value);
                }
            }
            rt.dispatch_inner(
                Some(&site.cache),
                &recv,
                site.sel,
                argv,
                None,
                None,
                site.kind,
                Some(&frame.self_value),
            )?;
            Ok(value)
        })
    }
}
