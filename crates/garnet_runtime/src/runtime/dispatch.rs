//! Method dispatch.
//!
//! Resolution order for a call `recv.sel(args)`:
//!
//! 1. a valid `Resolved` entry in the call site's inline cache;
//! 2. the method registry, subject to visibility; the result is cached;
//! 3. for foreign receivers, forwarding through the bridge (also cached);
//! 4. a trailing `key: value` aggregate retried as selector `sel:k1:k2:` with the values
//!    appended positionally, then the alternate spelling (`foo?` as `is_foo`, `foo=` as
//!    `set_foo`);
//! 5. `method_missing(:sel, *args, &blk)`.
//!
//! A method that exists but is not visible from the call still allows 3 and skips 4.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use garnet_syntax::{DiagnosticKind, DiagnosticsFormatter, find_best_match};
use log::trace;
use smallvec::SmallVec;

use crate::bridge::{ForeignObject, Forward};
use crate::core::{Symbol, Value};
use crate::errors::messages;
use crate::model::ClassRef;
use crate::runtime::Runtime;
use crate::runtime::cache::InlineCache;
use crate::runtime::closure::{Block, Rebind};
use crate::runtime::config::{Eval, Flow};
use crate::runtime::exception::Exc;
use crate::runtime::frame::{Frame, MethodCtx};
use crate::runtime::registry::Lookup;
use crate::runtime::thread::{CallRecord, CrefEntry};
use crate::runtime::unit::{Body, CompiledUnit, Imp, Visibility};
use crate::runtime::vm::Stat;

const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// One argument expression's value at a call site.
#[derive(Clone, Debug)]
pub enum CallArg {
    Value(Value),
    /// `*expr`: spread into positionals.
    Splat(Value),
    /// Trailing `key: value` aggregate.
    Named(Vec<(Symbol, Value)>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// Explicit receiver.
    Public,
    /// Literal `self.` receiver; private methods are reachable.
    SelfCall,
    /// Implicit receiver with arguments or parentheses.
    FCall,
    /// Bare identifier; a miss is reported as an undefined local or method.
    VCall,
    /// `send`/`__send__`: ignores visibility.
    Send,
}

/// Why a call ended up in `method_missing`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingReason {
    Undefined,
    Private,
    Protected,
    VCall,
    Super,
}

type Positional = SmallVec<[Value; 4]>;

pub(crate) fn with_named(mut args: Vec<Value>, named: Option<Vec<(Symbol, Value)>>) -> Vec<Value> {
    if let Some(pairs) = named {
        args.push(Value::hash(
            pairs.into_iter().map(|(k, v)| (Value::Sym(k), v)).collect(),
        ));
    }
    args
}

/// `foo?` is also tried as `is_foo`, `foo=` as `set_foo`.
fn alternate_spelling(sel: Symbol) -> Option<Symbol> {
    let name = sel.as_str();
    if let Some(stem) = name.strip_suffix('?') {
        if !stem.is_empty() {
            return Some(Symbol::intern(&format!("is_{stem}")));
        }
    }
    if sel.is_setter() {
        let stem = &name[..name.len() - 1];
        return Some(Symbol::intern(&format!("set_{stem}")));
    }
    None
}

fn coalesced_selector(sel: Symbol, pairs: &[(Symbol, Value)]) -> Symbol {
    let mut name = sel.as_str().to_string();
    for (key, _) in pairs {
        name.push(':');
        name.push_str(&key.as_str());
    }
    name.push(':');
    Symbol::intern(&name)
}

impl Runtime {
    /// Splats spread into positionals; a trailing named aggregate is returned separately.
    pub(crate) fn expand_args(
        &mut self,
        args: Vec<CallArg>,
    ) -> Result<(Vec<Value>, Option<Vec<(Symbol, Value)>>), Flow> {
        let mut positional: Positional = SmallVec::new();
        let mut named = None;
        for arg in args {
            match arg {
                CallArg::Value(v) => positional.push(v),
                CallArg::Splat(v) => positional.extend(self.splat_items(&v)?),
                CallArg::Named(pairs) => named = Some(pairs),
            }
        }
        Ok((positional.into_vec(), named))
    }

    /// Elements produced by `*value`.
    pub(crate) fn splat_items(&mut self, value: &Value) -> Result<Vec<Value>, Flow> {
        Ok(match value {
            Value::Array(a) => a.to_vec(),
            Value::Nil => Vec::new(),
            Value::Hash(h) => h
                .pairs()
                .into_iter()
                .map(|(k, v)| Value::array(vec![k, v]))
                .collect(),
            Value::Range(r) => match r.int_bounds() {
                Some((lo, hi)) => (lo..=hi).map(Value::Int).collect(),
                None => vec![value.clone()],
            },
            Value::Object(_) if self.responds_to(value, Symbol::intern("to_a"), true) => {
                match self.call_method(value, Symbol::intern("to_a"), Vec::new(), None, CallKind::FCall)? {
                    Value::Array(a) => a.to_vec(),
                    other => vec![other],
                }
            }
            other => vec![other.clone()],
        })
    }

    /// Full dispatch without a call-site cache.
    pub fn call_method(
        &mut self,
        recv: &Value,
        sel: Symbol,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
        kind: CallKind,
    ) -> Eval {
        self.dispatch_inner(None, recv, sel, args, None, block, kind, None)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn dispatch_inner(
        &mut self,
        cache: Option<&InlineCache>,
        recv: &Value,
        sel: Symbol,
        args: Vec<Value>,
        named: Option<Vec<(Symbol, Value)>>,
        block: Option<Arc<Block>>,
        kind: CallKind,
        caller: Option<&Value>,
    ) -> Eval {
        let class = self.vm.model.class_of(recv);
        let hierarchy = self.vm.registry.hierarchy_epoch();

        if let Some(cache) = cache {
            if let Some(unit) = cache.lookup(class.id(), hierarchy) {
                self.vm.stats.bump(Stat::CacheHit);
                trace!("cache hit {}#{}", class.name(), sel);
                return self.invoke_unit(&unit, recv, with_named(args, named), block);
            }
            if let Value::Foreign(obj) = recv {
                if let Some(fwd) = cache.lookup_forward(class.id(), hierarchy) {
                    if *fwd.imp.owner == *obj.class_name() {
                        self.vm.stats.bump(Stat::CacheHit);
                        return self.invoke_foreign(obj, &fwd, with_named(args, named));
                    }
                }
            }
            self.vm.stats.bump(Stat::CacheMiss);
            trace!("cache miss {}#{}", class.name(), sel);
        }

        // Read before resolving: a concurrent redefinition then invalidates what we install.
        let epoch = self.vm.registry.epoch(class.id(), sel);
        let seen = epoch.load(Ordering::Acquire);

        let reason = match self.vm.registry.resolve(self.vm.model.as_ref(), &class, sel) {
            Lookup::Found(unit) => match self.visibility_violation(&unit, kind, caller) {
                None => {
                    if let Some(cache) = cache {
                        cache.install_resolved(class.id(), unit.clone(), epoch, seen, hierarchy);
                    }
                    return self.invoke_unit(&unit, recv, with_named(args, named), block);
                }
                Some(reason) => reason,
            },
            Lookup::Undefined | Lookup::Missing if kind == CallKind::VCall => MissingReason::VCall,
            Lookup::Undefined | Lookup::Missing => MissingReason::Undefined,
        };

        // A hidden method (private Kernel `puts`, `fail`, ...) does not shadow a native one.
        if let Value::Foreign(obj) = recv {
            if let Some(fwd) = self.vm.bridge.forwardable(obj, &sel.as_str()) {
                if let Some(cache) = cache {
                    cache.install_forward(class.id(), fwd.clone(), epoch, seen, hierarchy);
                }
                return self.invoke_foreign(obj, &fwd, with_named(args, named));
            }
        }

        if matches!(reason, MissingReason::Undefined | MissingReason::VCall) {
            if let Some(pairs) = named.as_ref().filter(|p| !p.is_empty()) {
                let coalesced = coalesced_selector(sel, pairs);
                let mut positional = args.clone();
                positional.extend(pairs.iter().map(|(_, v)| v.clone()));
                if let Some(result) =
                    self.try_fallback(recv, &class, coalesced, positional, block.clone(), kind, caller)
                {
                    self.vm.stats.bump(Stat::NamedArgRetry);
                    return result;
                }
            }
            if let Some(alt) = alternate_spelling(sel) {
                let alt_args = with_named(args.clone(), named.clone());
                if let Some(result) = self.try_fallback(recv, &class, alt, alt_args, block.clone(), kind, caller) {
                    self.vm.stats.bump(Stat::AlternateSpelling);
                    return result;
                }
            }
        }

        self.method_missing(recv, sel, with_named(args, named), block, reason)
    }

    #[allow(clippy::too_many_arguments)]
    fn try_fallback(
        &mut self,
        recv: &Value,
        class: &ClassRef,
        sel: Symbol,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
        kind: CallKind,
        caller: Option<&Value>,
    ) -> Option<Eval> {
        if let Some(unit) = self.vm.registry.resolve(self.vm.model.as_ref(), class, sel).found() {
            if self.visibility_violation(&unit, kind, caller).is_none() {
                return Some(self.invoke_unit(&unit, recv, args, block));
            }
        }
        if let Value::Foreign(obj) = recv {
            if let Some(fwd) = self.vm.bridge.forwardable(obj, &sel.as_str()) {
                return Some(self.invoke_foreign(obj, &fwd, args));
            }
        }
        None
    }

    fn visibility_violation(
        &self,
        unit: &CompiledUnit,
        kind: CallKind,
        caller: Option<&Value>,
    ) -> Option<MissingReason> {
        match unit.flags.visibility() {
            Visibility::Public => None,
            Visibility::Private if kind == CallKind::Public => Some(MissingReason::Private),
            Visibility::Private => None,
            Visibility::Protected if kind == CallKind::Public => match caller {
                Some(c) if self.vm.model.class_of(c).inherits(unit.owner()) => None,
                _ => Some(MissingReason::Protected),
            },
            Visibility::Protected => None,
        }
    }

    pub(crate) fn method_missing(
        &mut self,
        recv: &Value,
        sel: Symbol,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
        reason: MissingReason,
    ) -> Eval {
        self.vm.stats.bump(Stat::MethodMissing);
        let class = self.vm.model.class_of(recv);
        let mm = Symbol::intern("method_missing");
        let Some(unit) = self.vm.registry.resolve(self.vm.model.as_ref(), &class, mm).found() else {
            return Err(self.missing_error(recv, sel, reason));
        };
        let mut mm_args = Vec::with_capacity(args.len() + 1);
        mm_args.push(Value::Sym(sel));
        mm_args.extend(args);
        self.thread.missing_reason = Some(reason);
        self.invoke_unit(&unit, recv, mm_args, block)
    }

    /// Short receiver description used in NoMethodError messages.
    pub(crate) fn describe_receiver(&self, recv: &Value) -> String {
        match recv {
            Value::Nil => "nil".into(),
            Value::Bool(b) => b.to_string(),
            Value::Class(c) if c.is_module() => format!("module {}", c.name()),
            Value::Class(c) => format!("class {}", c.name()),
            v if v.identical(&self.vm.main_obj) => "main:Object".into(),
            v => format!("an instance of {}", self.vm.model.real_class_of(v).name()),
        }
    }

    /// The NoMethodError/NameError the default `method_missing` raises.
    pub(crate) fn missing_error(&mut self, recv: &Value, sel: Symbol, reason: MissingReason) -> Flow {
        let name = sel.as_str().to_string();
        let desc = self.describe_receiver(recv);
        let (exc, kind) = match reason {
            MissingReason::Undefined => (
                Exc::NoMethod,
                DiagnosticKind::UndefinedMethod {
                    name: name.clone(),
                    recv: desc,
                },
            ),
            MissingReason::Private => (
                Exc::NoMethod,
                DiagnosticKind::PrivateMethod {
                    name: name.clone(),
                    recv: desc,
                },
            ),
            MissingReason::Protected => (
                Exc::NoMethod,
                DiagnosticKind::ProtectedMethod {
                    name: name.clone(),
                    recv: desc,
                },
            ),
            MissingReason::VCall => (
                Exc::Name,
                DiagnosticKind::UndefinedLocalOrMethod {
                    name: name.clone(),
                    recv: desc,
                },
            ),
            MissingReason::Super => (Exc::NoMethod, DiagnosticKind::NoSuperclassMethod(name.clone())),
        };
        let mut message = DiagnosticsFormatter::format(&kind);
        if matches!(reason, MissingReason::Undefined | MissingReason::VCall) {
            let class = self.vm.model.class_of(recv);
            let names: Vec<String> = self
                .vm
                .registry
                .method_names(self.vm.model.as_ref(), &class, true)
                .iter()
                .map(|s| s.as_str().to_string())
                .collect();
            if let Some(best) = find_best_match(&name, names.iter().map(String::as_str)) {
                message.push('\n');
                message.push_str(&DiagnosticsFormatter::format(&DiagnosticKind::DidYouMean(
                    best.to_string(),
                )));
            }
        }
        let class = exc.class(self.vm.model.core()).clone();
        let err = self.new_exception(&class, &message);
        if let Value::Object(o) = &err {
            o.ivar_set(Symbol::intern("@name"), Value::Sym(sel));
            o.ivar_set(Symbol::intern("@receiver"), recv.clone());
        }
        self.raise(err)
    }

    /// Runs an installed unit. Arity is checked before the body starts.
    pub(crate) fn invoke_unit(
        &mut self,
        unit: &Arc<CompiledUnit>,
        recv: &Value,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
    ) -> Eval {
        self.thread.handle.check()?;
        self.vm.stats.bump(Stat::Dispatch);
        match &unit.imp {
            Imp::Guest(body) => {
                let body = body.clone();
                self.invoke_body(unit, &body, recv, args, block)
            }
            Imp::Native(f) => {
                if let Err(kind) = unit.arity.check(args.len()) {
                    return Err(self.error(Exc::Argument, kind));
                }
                f(self, recv, &args, block.as_ref())
            }
            Imp::AttrReader(name) => {
                if let Err(kind) = unit.arity.check(args.len()) {
                    return Err(self.error(Exc::Argument, kind));
                }
                Ok(self.ivar_get(recv, *name))
            }
            Imp::AttrWriter(name) => {
                if let Err(kind) = unit.arity.check(args.len()) {
                    return Err(self.error(Exc::Argument, kind));
                }
                let value = args[0].clone();
                self.ivar_set(recv, *name, value.clone())?;
                Ok(value)
            }
            Imp::Block(b) => {
                let ctx = MethodCtx {
                    unit: unit.clone(),
                    owner: unit.owner.clone(),
                    selector: unit.selector,
                    args: args.clone(),
                };
                let rebind = Rebind {
                    self_value: recv.clone(),
                    cref: unit.owner.clone(),
                    method: Some(Arc::new(ctx)),
                    as_method: true,
                };
                let b = b.clone();
                stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
                    self.call_block_with(&b, args, block, Some(rebind))
                })
            }
        }
    }

    fn invoke_body(
        &mut self,
        unit: &Arc<CompiledUnit>,
        body: &Arc<Body>,
        recv: &Value,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
    ) -> Eval {
        if let Err(kind) = body.arity.check(args.len()) {
            return Err(self.error(Exc::Argument, kind));
        }
        if self.thread.calls.len() >= self.config.max_call_depth {
            return Err(self.error(Exc::SystemStack, DiagnosticKind::StackLevelTooDeep));
        }
        if body.empty && body.params.optional.is_empty() {
            return Ok(Value::Nil);
        }

        let id = self.vm.next_frame_id();
        let mut frame = Frame::new(recv.clone(), body.slots, body.cells, id);
        frame.block = block;
        frame.method = Some(Arc::new(MethodCtx {
            unit: unit.clone(),
            owner: unit.owner.clone(),
            selector: unit.selector,
            args: args.clone(),
        }));

        let cref = body.cref.clone().unwrap_or_else(|| unit.owner.clone());
        self.thread.cref.push(CrefEntry::new(cref, Visibility::Public));
        self.thread.calls.push(CallRecord {
            label: body.label.clone(),
            file: body.file.clone(),
            caller_line: self.thread.line,
        });
        self.thread.homes.push(id);
        self.thread.line = body.line;

        let passed = frame.block.clone();
        let mut result = self.bind_params(body, &mut frame, args, passed.as_ref());
        if result.is_ok() {
            result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
                (body.code)(self, &mut frame)
            });
        }

        self.thread.homes.pop();
        if let Some(rec) = self.thread.calls.pop() {
            self.thread.line = rec.caller_line;
        }
        self.thread.cref.pop();

        match result {
            Err(Flow::Return(v)) => Ok(v),
            Err(Flow::BlockReturn { value, home }) if home == id => Ok(value),
            other => other,
        }
    }

    /// Copies arguments into parameter locals; defaults run after the positionals are set.
    pub(crate) fn bind_params(
        &mut self,
        body: &Body,
        frame: &mut Frame,
        args: Vec<Value>,
        passed: Option<&Arc<Block>>,
    ) -> Eval {
        let plan = &body.params;
        let dist = body.arity.distribute(&args);
        for (r, v) in plan.required.iter().zip(dist.pre) {
            frame.set(*r, v);
        }
        for (r, v) in plan.post.iter().zip(dist.post) {
            frame.set(*r, v);
        }
        if let Some(r) = plan.rest {
            frame.set(r, Value::array(dist.rest));
        }
        if let Some(r) = plan.block {
            let value = match passed {
                Some(b) => self.reify_block(b),
                None => Value::Nil,
            };
            frame.set(r, value);
        }
        for ((r, default), given) in plan.optional.iter().zip(dist.optional) {
            let value = match given {
                Some(v) => v,
                None => default(self, frame)?,
            };
            frame.set(*r, value);
        }
        Ok(Value::Nil)
    }

    fn invoke_foreign(&mut self, obj: &Arc<dyn ForeignObject>, fwd: &Forward, args: Vec<Value>) -> Eval {
        self.vm.stats.bump(Stat::ForeignForward);
        if args.len() != fwd.arg_shape.len() {
            let kind = DiagnosticKind::ArgumentCount {
                given: args.len(),
                expected_min: fwd.arg_shape.len(),
                expected_max: Some(fwd.arg_shape.len()),
            };
            return Err(self.error(Exc::Argument, kind));
        }
        let bridge = self.vm.bridge.clone();
        let mut native = Vec::with_capacity(args.len());
        for (value, tag) in args.iter().zip(fwd.arg_shape.iter()) {
            match bridge.convert_out(value, *tag) {
                Ok(v) => native.push(v),
                Err(desc) => {
                    let kind = DiagnosticKind::ForeignConversion {
                        value: desc,
                        tag: format!("{tag:?}"),
                    };
                    return Err(self.error(Exc::Type, kind));
                }
            }
        }
        trace!("forward {}#{}", obj.class_name(), fwd.imp.name);
        let ret = match bridge.invoke_native(obj, &fwd.imp, native) {
            Ok(v) => v,
            Err(msg) => return Err(self.error(Exc::Runtime, DiagnosticKind::ForeignCall(msg))),
        };
        match bridge.convert_in(ret, fwd.imp.ret) {
            Ok(v) => Ok(v),
            Err(desc) => {
                let kind = DiagnosticKind::ForeignConversion {
                    value: desc,
                    tag: format!("{:?}", fwd.imp.ret),
                };
                Err(self.error(Exc::Type, kind))
            }
        }
    }

    /// `super`: continues lookup after the running method's owner.
    pub(crate) fn call_super(
        &mut self,
        frame: &Frame,
        args: Option<Vec<Value>>,
        block: Option<Arc<Block>>,
    ) -> Eval {
        let Some(ctx) = frame.method.clone() else {
            return Err(self.error_msg(Exc::Runtime, "super called outside of method"));
        };
        let args = args.unwrap_or_else(|| ctx.args.clone());
        let block = block.or_else(|| frame.block.clone());
        let recv = frame.self_value.clone();
        let class = self.vm.model.class_of(&recv);
        match self
            .vm
            .registry
            .resolve_after(self.vm.model.as_ref(), &class, &ctx.owner, ctx.selector)
        {
            Lookup::Found(unit) => self.invoke_unit(&unit, &recv, args, block),
            _ => self.method_missing(&recv, ctx.selector, args, block, MissingReason::Super),
        }
    }

    /// Whether `recv` answers `sel`, including foreign forwarding.
    pub(crate) fn responds_to(&self, recv: &Value, sel: Symbol, include_private: bool) -> bool {
        let class = self.vm.model.class_of(recv);
        if let Some(unit) = self.vm.registry.resolve(self.vm.model.as_ref(), &class, sel).found() {
            return include_private || unit.flags.visibility() == Visibility::Public;
        }
        match recv {
            Value::Foreign(obj) => self.vm.bridge.forwardable(obj, &sel.as_str()).is_some(),
            _ => false,
        }
    }

    /// Whether the method a call would find is defined in Rust and not overridden.
    pub(crate) fn method_is_native(&self, recv: &Value, sel: Symbol) -> bool {
        let class = self.vm.model.class_of(recv);
        self.vm
            .registry
            .resolve(self.vm.model.as_ref(), &class, sel)
            .found()
            .is_some_and(|u| u.is_native())
    }

    /// Singleton class of `value`; immediates other than nil/true/false have none.
    pub(crate) fn singleton_class(&mut self, value: &Value) -> Result<ClassRef, Flow> {
        let meta = match value {
            Value::Int(_) | Value::Float(_) | Value::Sym(_) => None,
            other => self.vm.model.singleton_class_of(other),
        };
        match meta {
            Some(c) => Ok(c),
            None => {
                let shown = self.describe_receiver(value);
                Err(self.error(Exc::Type, DiagnosticKind::NoSingletonClass(shown)))
            }
        }
    }

    pub(crate) fn ivar_get(&self, recv: &Value, name: Symbol) -> Value {
        match recv {
            Value::Object(o) => o.ivar_get(name).unwrap_or(Value::Nil),
            Value::Class(c) => c.ivar_get(name).unwrap_or(Value::Nil),
            _ => Value::Nil,
        }
    }

    pub(crate) fn ivar_set(&mut self, recv: &Value, name: Symbol, value: Value) -> Result<(), Flow> {
        match recv {
            Value::Object(o) => {
                self.vm.collector.write_barrier(recv, &name.as_str(), &value);
                o.ivar_set(name, value);
                Ok(())
            }
            Value::Class(c) => {
                self.vm.collector.write_barrier(recv, &name.as_str(), &value);
                c.ivar_set(name, value);
                Ok(())
            }
            other => {
                let class = self.vm.model.real_class_of(other).name();
                Err(self.error_msg(Exc::Runtime, format!("{} {class}", messages::CANT_MODIFY_FROZEN)))
            }
        }
    }
}
