//! Kernel, Module/Class, Proc, Exception and Binding.

use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

use garnet_syntax::{DiagnosticKind, is_const_name};

use super::common::{class_arg, module_arg, need_block, opt, pick, sym_arg};
use super::conversion::{inspect, to_s};
use crate::builtins_registry::{BuiltinRegistry, ClassPick};
use crate::core::{RObject, Symbol, Value};
use crate::errors::messages;
use crate::model::ClassRef;
use crate::runtime::Runtime;
use crate::runtime::arity::Arity;
use crate::runtime::closure::{Block, Rebind};
use crate::runtime::config::{Eval, Flow};
use crate::runtime::dispatch::{CallKind, MissingReason};
use crate::runtime::exception::{Exc, backtrace_sym, message_sym};
use crate::runtime::registry::Lookup;
use crate::runtime::unit::{Imp, UnitFlags, Visibility};

fn class_of_recv(rt: &mut Runtime, recv: &Value) -> Result<ClassRef, Flow> {
    match recv {
        Value::Class(c) => Ok(c.clone()),
        other => Err(super::common::conversion_error(rt, other, "Module")),
    }
}

fn undefined_for_class(rt: &mut Runtime, class: &ClassRef, sel: Symbol) -> Flow {
    let kind = DiagnosticKind::UndefinedMethodForClass {
        name: sel.as_str().to_string(),
        class: class.name(),
    };
    rt.error(Exc::Name, kind)
}

/// Symbol arguments, with arrays flattened one level (`private attr_reader :a, :b`).
fn selector_args(rt: &mut Runtime, args: &[Value]) -> Result<Vec<Symbol>, Flow> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Array(items) => {
                for item in items.to_vec() {
                    out.push(sym_arg(rt, &item)?);
                }
            }
            other => out.push(sym_arg(rt, other)?),
        }
    }
    Ok(out)
}

// --- Kernel: output ---------------------------------------------------------------------

fn puts_value(rt: &mut Runtime, value: &Value, out: &mut String) -> Result<(), Flow> {
    match value {
        Value::Array(items) => {
            let items = items.to_vec();
            if items.is_empty() {
                out.push('\n');
            }
            for item in &items {
                puts_value(rt, item, out)?;
            }
        }
        other => {
            let text = to_s(rt, other)?;
            out.push_str(&text);
            if !text.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    Ok(())
}

fn k_puts(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let mut out = String::new();
    if args.is_empty() {
        out.push('\n');
    }
    for arg in args {
        puts_value(rt, arg, &mut out)?;
    }
    rt.write_output(&out);
    Ok(Value::Nil)
}

fn k_print(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let mut out = String::new();
    for arg in args {
        out.push_str(&to_s(rt, arg)?);
    }
    rt.write_output(&out);
    Ok(Value::Nil)
}

fn k_p(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let mut out = String::new();
    for arg in args {
        out.push_str(&inspect(rt, arg)?);
        out.push('\n');
    }
    rt.write_output(&out);
    Ok(match args {
        [] => Value::Nil,
        [one] => one.clone(),
        many => Value::array(many.to_vec()),
    })
}

// --- Kernel: identity and type ----------------------------------------------------------

fn k_raise(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Err(rt.raise_from_args(args))
}

fn k_class(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Class(rt.vm.model.real_class_of(recv)))
}

fn k_equal(_rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(recv.identical(&args[0])))
}

fn k_not_equal(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let eq = rt.call_method(recv, Symbol::intern("=="), args.to_vec(), None, CallKind::Public)?;
    Ok(Value::Bool(!eq.truthy()))
}

fn k_not(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(!recv.truthy()))
}

fn k_nil_p(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(recv.is_nil()))
}

fn k_object_id(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Int(recv.object_id()))
}

fn k_hash(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let mut hasher = ahash::RandomState::with_seeds(0x5eed, 0x9a7e, 0x0b1e, 0xc7).build_hasher();
    recv.hash_into(&mut hasher);
    Ok(Value::Int(hasher.finish() as i64 >> 2))
}

fn k_cmp(_rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(if recv.identical(&args[0]) { Value::Int(0) } else { Value::Nil })
}

fn k_is_a(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_arg(rt, &args[0])?;
    Ok(Value::Bool(rt.vm.model.class_of(recv).inherits(&class)))
}

fn k_instance_of(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_arg(rt, &args[0])?;
    Ok(Value::Bool(Arc::ptr_eq(&rt.vm.model.real_class_of(recv), &class)))
}

fn k_respond_to(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let sel = sym_arg(rt, &args[0])?;
    let include_private = opt(args, 1).truthy();
    Ok(Value::Bool(rt.responds_to(recv, sel, include_private)))
}

fn send_with(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>, kind: CallKind) -> Eval {
    let Some((name, rest)) = args.split_first() else {
        return Err(rt.error_msg(Exc::Argument, "no method name given"));
    };
    let sel = sym_arg(rt, name)?;
    rt.call_method(recv, sel, rest.to_vec(), block.cloned(), kind)
}

fn k_send(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    send_with(rt, recv, args, block, CallKind::Send)
}

fn k_public_send(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    send_with(rt, recv, args, block, CallKind::Public)
}

/// Default `method_missing`: the NoMethodError/NameError the failed call earned.
fn k_method_missing(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let sel = sym_arg(rt, &args[0])?;
    let reason = rt.thread.missing_reason.take().unwrap_or(MissingReason::Undefined);
    Err(rt.missing_error(recv, sel, reason))
}

fn k_methods(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = rt.vm.model.class_of(recv);
    let names = rt.vm.registry.method_names(rt.vm.model.as_ref(), &class, false);
    Ok(Value::array(names.into_iter().map(Value::Sym).collect()))
}

// --- Kernel: instance variables ---------------------------------------------------------

fn ivar_name(rt: &mut Runtime, value: &Value) -> Result<Symbol, Flow> {
    let sym = sym_arg(rt, value)?;
    let name = sym.as_str();
    if name.len() < 2 || !name.starts_with('@') || name.starts_with("@@") {
        let kind = DiagnosticKind::InvalidName {
            kind: "an instance variable",
            name: name.to_string(),
        };
        return Err(rt.error(Exc::Name, kind));
    }
    Ok(sym)
}

fn k_ivar_get(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let name = ivar_name(rt, &args[0])?;
    Ok(rt.ivar_get(recv, name))
}

fn k_ivar_set(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let name = ivar_name(rt, &args[0])?;
    rt.ivar_set(recv, name, args[1].clone())?;
    Ok(args[1].clone())
}

fn ivar_names_of(recv: &Value) -> Vec<Symbol> {
    let names = match recv {
        Value::Object(o) => o.ivar_names(),
        Value::Class(c) => c.ivar_names(),
        _ => Vec::new(),
    };
    names
        .into_iter()
        .filter(|n| !n.as_str().starts_with("@__"))
        .collect()
}

fn k_ivars(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::array(ivar_names_of(recv).into_iter().map(Value::Sym).collect()))
}

fn k_ivar_defined(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let name = ivar_name(rt, &args[0])?;
    Ok(Value::Bool(ivar_names_of(recv).contains(&name)))
}

// --- Kernel: blocks and evaluation ------------------------------------------------------

fn k_proc(rt: &mut Runtime, _: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    match block {
        Some(b) => Ok(rt.reify_block(b)),
        None => Err(rt.error_msg(Exc::Argument, messages::TRIED_TO_CREATE_PROC)),
    }
}

fn k_lambda(rt: &mut Runtime, _: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    match block {
        Some(b) => {
            let lambda = rt.make_lambda(b);
            Ok(rt.reify_block(&lambda))
        }
        None => Err(rt.error_msg(Exc::Argument, messages::TRIED_TO_CREATE_PROC)),
    }
}

/// `loop { }`: runs until `break`, or until `StopIteration` escapes the block.
fn k_loop(rt: &mut Runtime, _: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let stop = rt.vm.model.core().stop_iteration.clone();
    let depth = rt.thread.exceptions.len();
    loop {
        rt.thread.handle.check()?;
        match rt.call_block(&block, Vec::new()) {
            Ok(_) => {}
            Err(Flow::Raise(exc)) if rt.exception_matches(&exc, &stop) => {
                rt.thread.exceptions.truncate(depth);
                return Ok(rt.ivar_get(&exc, Symbol::intern("@result")));
            }
            Err(other) => return Err(other),
        }
    }
}

fn k_instance_eval(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    let cref = match recv {
        Value::Int(_) | Value::Float(_) | Value::Sym(_) => rt.vm.model.real_class_of(recv),
        other => rt.singleton_class(other)?,
    };
    let rebind = Rebind {
        self_value: recv.clone(),
        cref,
        method: None,
        as_method: false,
    };
    rt.call_block_with(&block, vec![recv.clone()], None, Some(rebind))
}

fn k_singleton_class(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Class(rt.singleton_class(recv)?))
}

fn k_extend(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let meta = rt.singleton_class(recv)?;
    for arg in args {
        let module = module_arg(rt, arg)?;
        if rt.vm.model.include_module(&meta, &module) {
            rt.vm.registry.note_include(&*rt.vm.model, &meta, &module);
            rt.vm.registry.bump_hierarchy();
        }
    }
    Ok(recv.clone())
}

fn k_define_singleton_method(
    rt: &mut Runtime,
    recv: &Value,
    args: &[Value],
    block: Option<&Arc<Block>>,
) -> Eval {
    let meta = rt.singleton_class(recv)?;
    define_from_block(rt, &meta, args, block, UnitFlags::empty())
}

fn k_tap(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    rt.call_block(&block, vec![recv.clone()])?;
    Ok(recv.clone())
}

fn k_then(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let block = need_block(rt, block)?.clone();
    rt.call_block(&block, vec![recv.clone()])
}

fn k_itself(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(recv.clone())
}

fn k_frozen(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(matches!(
        recv,
        Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Sym(_)
    )))
}

fn k_dup(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match recv {
        Value::Object(o) => {
            let copy = RObject::new(o.class().clone());
            for name in o.ivar_names() {
                if let Some(v) = o.ivar_get(name) {
                    copy.ivar_set(name, v);
                }
            }
            let copy = Value::Object(Arc::new(copy));
            let init_copy = Symbol::intern("initialize_copy");
            if rt.responds_to(&copy, init_copy, true) {
                rt.call_method(&copy, init_copy, vec![recv.clone()], None, CallKind::FCall)?;
            }
            Ok(copy)
        }
        other => Ok(other.clone()),
    }
}

fn k_caller(rt: &mut Runtime, _: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let lines = rt.backtrace().into_iter().skip(1).map(Value::str).collect();
    Ok(Value::array(lines))
}

// --- booleans ---------------------------------------------------------------------------

fn bool_and(_rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(recv.truthy() && args[0].truthy()))
}

fn bool_or(_rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(recv.truthy() || args[0].truthy()))
}

fn bool_xor(_rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(recv.truthy() != args[0].truthy()))
}

// --- Module / Class ---------------------------------------------------------------------

/// `Class.new(superclass) { body }` and `Module.new { body }`.
fn anonymous_class(rt: &mut Runtime, kind: &ClassRef, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let class = if kind.is_module() || Arc::ptr_eq(kind, &rt.vm.model.core().module) {
        rt.vm.model.create_module(None)
    } else {
        let sup = match args.first() {
            Some(v) => class_arg(rt, v)?,
            None => rt.vm.model.core().object.clone(),
        };
        if sup.builtin().is_some() || sup.is_singleton() || sup.is_module() {
            return Err(rt.error_msg(Exc::Type, format!("can't make subclass of {}", sup.name())));
        }
        rt.vm.model.create_class(None, &sup)
    };
    let value = Value::Class(class.clone());
    if let Some(b) = block {
        let rebind = Rebind {
            self_value: value.clone(),
            cref: class,
            method: None,
            as_method: false,
        };
        rt.call_block_with(b, vec![value.clone()], None, Some(rebind))?;
    }
    Ok(value)
}

fn mod_new(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let core = rt.vm.model.core();
    if Arc::ptr_eq(&class, &core.class) || Arc::ptr_eq(&class, &core.module) {
        return anonymous_class(rt, &class, args, block);
    }
    if class.is_module() {
        return Err(rt.missing_error(recv, Symbol::intern("new"), MissingReason::Undefined));
    }
    let obj = alloc(rt, &class)?;
    rt.call_method(
        &obj,
        Symbol::intern("initialize"),
        args.to_vec(),
        block.cloned(),
        CallKind::FCall,
    )?;
    Ok(obj)
}

fn alloc(rt: &mut Runtime, class: &ClassRef) -> Eval {
    if class.builtin().is_some() || class.is_singleton() {
        return Err(rt.error_msg(
            Exc::Type,
            format!("{} {}", messages::ALLOCATOR_UNDEFINED, class.name()),
        ));
    }
    Ok(Value::Object(Arc::new(RObject::new(class.clone()))))
}

fn mod_allocate(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    alloc(rt, &class)
}

fn obj_initialize(_rt: &mut Runtime, _: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Nil)
}

fn mod_name(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    Ok(if class.has_name() { Value::str(class.name()) } else { Value::Nil })
}

fn mod_superclass(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    Ok(class.superclass().map_or(Value::Nil, Value::Class))
}

fn mod_ancestors(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let list = rt.vm.model.ancestors(&class);
    Ok(Value::array(list.into_iter().map(Value::Class).collect()))
}

fn mod_include(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let included = Symbol::intern("included");
    for arg in args.iter().rev() {
        let module = module_arg(rt, arg)?;
        if !rt.vm.model.include_module(&class, &module) {
            continue;
        }
        rt.vm.registry.note_include(&*rt.vm.model, &class, &module);
        rt.vm.registry.bump_hierarchy();
        if !rt.method_is_native(arg, included) {
            rt.call_method(arg, included, vec![recv.clone()], None, CallKind::FCall)?;
        }
    }
    Ok(recv.clone())
}

fn mod_include_p(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let module = module_arg(rt, &args[0])?;
    let found = rt
        .vm
        .model
        .ancestors(&class)
        .iter()
        .any(|c| Arc::ptr_eq(c, &module) && !Arc::ptr_eq(c, &class));
    Ok(Value::Bool(found))
}

fn visibility_of(rt: &mut Runtime, recv: &Value, args: &[Value]) -> Result<Option<Visibility>, Flow> {
    let class = class_of_recv(rt, recv)?;
    let sel = sym_arg(rt, &args[0])?;
    Ok(rt
        .vm
        .registry
        .resolve(rt.vm.model.as_ref(), &class, sel)
        .found()
        .map(|u| u.flags.visibility()))
}

fn mod_method_defined(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let vis = visibility_of(rt, recv, args)?;
    Ok(Value::Bool(matches!(vis, Some(Visibility::Public | Visibility::Protected))))
}

fn mod_private_method_defined(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let vis = visibility_of(rt, recv, args)?;
    Ok(Value::Bool(vis == Some(Visibility::Private)))
}

fn mod_instance_methods(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let inherited = args.first().is_none_or(Value::truthy);
    let names = if inherited {
        rt.vm.registry.method_names(rt.vm.model.as_ref(), &class, false)
    } else {
        rt.vm
            .registry
            .own_method_names(&class)
            .into_iter()
            .filter(|s| {
                rt.vm
                    .registry
                    .own_flags(&class, *s)
                    .is_some_and(|f| !f.contains(UnitFlags::PRIVATE))
            })
            .collect()
    };
    Ok(Value::array(names.into_iter().map(Value::Sym).collect()))
}

/// Installs a block (or a `Proc` argument) as method `args[0]` on `class`.
fn define_from_block(
    rt: &mut Runtime,
    class: &ClassRef,
    args: &[Value],
    block: Option<&Arc<Block>>,
    flags: UnitFlags,
) -> Eval {
    let sel = sym_arg(rt, &args[0])?;
    let body = match (args.get(1), block) {
        (Some(Value::Proc(p)), _) => p.clone(),
        (Some(other), _) => return Err(super::common::conversion_error(rt, other, "Proc")),
        (None, Some(b)) => b.clone(),
        (None, None) => return Err(rt.error_msg(Exc::Argument, messages::TRIED_TO_CREATE_PROC)),
    };
    rt.reify_block(&body);
    let arity = body.arity();
    rt.install_unit(class, sel, Imp::Block(body), arity, flags | UnitFlags::FROM_BLOCK);
    Ok(Value::Sym(sel))
}

fn mod_define_method(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let entry = rt.thread.cref().clone();
    let flags = if Arc::ptr_eq(&entry.class, &class) {
        entry.visibility.flags()
    } else {
        UnitFlags::empty()
    };
    define_from_block(rt, &class, args, block, flags)
}

fn define_attrs(rt: &mut Runtime, recv: &Value, args: &[Value], reader: bool, writer: bool) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let entry = rt.thread.cref().clone();
    let flags = if Arc::ptr_eq(&entry.class, &class) {
        entry.visibility.flags()
    } else {
        UnitFlags::empty()
    };
    let mut defined = Vec::new();
    for name in selector_args(rt, args)? {
        let ivar = Symbol::intern(&format!("@{name}"));
        if reader {
            rt.install_unit(&class, name, Imp::AttrReader(ivar), Arity::exact(0), flags);
            defined.push(Value::Sym(name));
        }
        if writer {
            let setter = Symbol::intern(&format!("{name}="));
            rt.install_unit(&class, setter, Imp::AttrWriter(ivar), Arity::exact(1), flags);
            defined.push(Value::Sym(setter));
        }
    }
    Ok(Value::array(defined))
}

fn mod_attr_reader(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    define_attrs(rt, recv, args, true, false)
}

fn mod_attr_writer(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    define_attrs(rt, recv, args, false, true)
}

fn mod_attr_accessor(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    define_attrs(rt, recv, args, true, true)
}

/// `private`/`public`/`protected`: with no names, sets the default for following `def`s.
fn set_visibility(rt: &mut Runtime, recv: &Value, args: &[Value], vis: Visibility) -> Eval {
    let class = class_of_recv(rt, recv)?;
    if args.is_empty() {
        let entry = rt.thread.cref_mut();
        if Arc::ptr_eq(&entry.class, &class) {
            entry.visibility = vis;
            entry.module_function = false;
        }
        return Ok(Value::Nil);
    }
    for sel in selector_args(rt, args)? {
        if !rt.vm.registry.set_visibility(rt.vm.model.as_ref(), &class, sel, vis) {
            return Err(undefined_for_class(rt, &class, sel));
        }
    }
    Ok(match args {
        [one] => one.clone(),
        many => Value::array(many.to_vec()),
    })
}

fn mod_private(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    set_visibility(rt, recv, args, Visibility::Private)
}

fn mod_public(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    set_visibility(rt, recv, args, Visibility::Public)
}

fn mod_protected(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    set_visibility(rt, recv, args, Visibility::Protected)
}

fn mod_private_class_method(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let meta = rt.singleton_class(recv)?;
    set_visibility(rt, &Value::Class(meta), args, Visibility::Private)?;
    Ok(Value::Nil)
}

/// `module_function`: copies each method to the module's singleton class and makes the
/// instance-side copy private.
fn mod_module_function(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let module = class_of_recv(rt, recv)?;
    if args.is_empty() {
        let entry = rt.thread.cref_mut();
        if Arc::ptr_eq(&entry.class, &module) {
            entry.module_function = true;
        }
        return Ok(Value::Nil);
    }
    let meta = rt.singleton_class(recv)?;
    for sel in selector_args(rt, args)? {
        let Some(unit) = rt.vm.registry.resolve(rt.vm.model.as_ref(), &module, sel).found() else {
            return Err(undefined_for_class(rt, &module, sel));
        };
        let public = unit.rehome(&meta).with_flags(unit.flags.with_visibility(Visibility::Public));
        rt.vm.registry.define_unit(&meta, public);
        rt.vm
            .registry
            .set_visibility(rt.vm.model.as_ref(), &module, sel, Visibility::Private);
    }
    Ok(Value::Nil)
}

fn mod_undef_method(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    for sel in selector_args(rt, args)? {
        match rt.vm.registry.resolve(rt.vm.model.as_ref(), &class, sel) {
            Lookup::Found(_) => rt.vm.registry.undefine(&class, sel),
            _ => return Err(undefined_for_class(rt, &class, sel)),
        }
    }
    Ok(recv.clone())
}

fn mod_remove_method(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    for sel in selector_args(rt, args)? {
        if !rt.vm.registry.remove(&class, sel) {
            return Err(rt.error_msg(
                Exc::Name,
                format!("method '{sel}' not defined in {}", class.name()),
            ));
        }
    }
    Ok(recv.clone())
}

fn mod_alias_method(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let new = sym_arg(rt, &args[0])?;
    let old = sym_arg(rt, &args[1])?;
    if rt.vm.registry.alias(rt.vm.model.as_ref(), &class, new, old) {
        Ok(Value::Sym(new))
    } else {
        Err(undefined_for_class(rt, &class, old))
    }
}

fn mod_class_eval(rt: &mut Runtime, recv: &Value, _: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let block = need_block(rt, block)?.clone();
    let rebind = Rebind {
        self_value: recv.clone(),
        cref: class,
        method: None,
        as_method: false,
    };
    rt.call_block_with(&block, vec![recv.clone()], None, Some(rebind))
}

fn mod_const_get(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let path = match &args[0] {
        Value::Str(s) => s.to_string_lossy(),
        other => sym_arg(rt, other)?.as_str().to_string(),
    };
    let mut current = recv.clone();
    for part in path.trim_start_matches("::").split("::") {
        if !is_const_name(part) {
            return Err(rt.error_msg(Exc::Name, format!("wrong constant name {part}")));
        }
        current = rt.scoped_const_get(&current, Symbol::intern(part))?;
    }
    Ok(current)
}

fn mod_const_set(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let name = sym_arg(rt, &args[0])?;
    if !is_const_name(&name.as_str()) {
        return Err(rt.error_msg(Exc::Name, format!("wrong constant name {name}")));
    }
    rt.const_set_in(&class, name, args[1].clone());
    Ok(args[1].clone())
}

fn mod_const_defined(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let name = sym_arg(rt, &args[0])?;
    Ok(Value::Bool(rt.scoped_const_lookup(&class, name).is_some()))
}

fn mod_constants(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    Ok(Value::array(class.const_names().into_iter().map(Value::Sym).collect()))
}

fn mod_cvar_get(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let name = sym_arg(rt, &args[0])?;
    match rt.vm.model.ancestors(&class).iter().find_map(|c| c.cvar_get(name)) {
        Some(v) => Ok(v),
        None => Err(rt.error_msg(
            Exc::Name,
            format!("uninitialized class variable {name} in {}", class.name()),
        )),
    }
}

fn mod_cvar_set(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let name = sym_arg(rt, &args[0])?;
    class.cvar_set(name, args[1].clone());
    Ok(args[1].clone())
}

fn mod_eqq(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    Ok(Value::Bool(rt.vm.model.class_of(&args[0]).inherits(&class)))
}

fn mod_lt(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let class = class_of_recv(rt, recv)?;
    let other = class_arg(rt, &args[0])?;
    Ok(if Arc::ptr_eq(&class, &other) {
        Value::FALSE
    } else if class.inherits(&other) || rt.vm.model.ancestors(&class).iter().any(|c| Arc::ptr_eq(c, &other)) {
        Value::TRUE
    } else if other.inherits(&class) {
        Value::FALSE
    } else {
        Value::Nil
    })
}

fn mod_le(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    if let (Value::Class(a), Value::Class(b)) = (recv, &args[0]) {
        if Arc::ptr_eq(a, b) {
            return Ok(Value::TRUE);
        }
    }
    mod_lt(rt, recv, args, block)
}

fn mod_hook(_rt: &mut Runtime, _: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Nil)
}

// --- Proc -------------------------------------------------------------------------------

fn proc_of<'a>(rt: &mut Runtime, recv: &'a Value) -> Result<&'a Arc<Block>, Flow> {
    match recv {
        Value::Proc(b) => Ok(b),
        other => Err(super::common::conversion_error(rt, other, "Proc")),
    }
}

fn proc_call(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    let b = proc_of(rt, recv)?.clone();
    rt.call_proc(&b, args.to_vec(), block.cloned())
}

fn proc_arity(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let b = proc_of(rt, recv)?;
    let arity = b.arity();
    Ok(Value::Int(if b.is_lambda() {
        arity.guest_arity()
    } else if arity.rest {
        -(arity.min() as i64) - 1
    } else {
        arity.min() as i64
    }))
}

fn proc_lambda_p(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(Value::Bool(proc_of(rt, recv)?.is_lambda()))
}

fn proc_to_proc(_rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(recv.clone())
}

// --- Exception --------------------------------------------------------------------------

fn exc_initialize(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    if let Some(message) = args.first() {
        rt.ivar_set(recv, message_sym(), message.clone())?;
    }
    Ok(Value::Nil)
}

fn exc_s_exception(rt: &mut Runtime, recv: &Value, args: &[Value], block: Option<&Arc<Block>>) -> Eval {
    mod_new(rt, recv, args, block)
}

fn exc_to_s(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    match rt.ivar_get(recv, message_sym()) {
        Value::Nil => Ok(Value::str(rt.vm.model.real_class_of(recv).name())),
        Value::Str(s) => Ok(Value::Str(s)),
        other => Ok(Value::str(to_s(rt, &other)?)),
    }
}

fn exc_message(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let text = to_s(rt, recv)?;
    Ok(Value::str(text))
}

fn exc_backtrace(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(rt.ivar_get(recv, backtrace_sym()))
}

fn exc_set_backtrace(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let lines = match &args[0] {
        Value::Str(_) => Value::array(vec![args[0].clone()]),
        other => other.clone(),
    };
    rt.ivar_set(recv, backtrace_sym(), lines.clone())?;
    Ok(lines)
}

/// `file:line:in 'label': message (Class)` followed by the remaining frames.
fn exc_full_message(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let message = to_s(rt, recv)?;
    let class = rt.vm.model.real_class_of(recv).name();
    let trace = rt.exception_backtrace(recv);
    let mut out = match trace.first() {
        Some(top) => format!("{top}: {message} ({class})"),
        None => format!("{}: {message} ({class})", rt.config.file_name),
    };
    for line in trace.iter().skip(1) {
        out.push_str("\n\tfrom ");
        out.push_str(line);
    }
    Ok(Value::str(out))
}

fn exc_exception(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let Some(message) = args.first() else {
        return Ok(recv.clone());
    };
    let copy = k_dup(rt, recv, &[], None)?;
    rt.ivar_set(&copy, message_sym(), message.clone())?;
    rt.ivar_set(&copy, backtrace_sym(), Value::Nil)?;
    Ok(copy)
}

fn exc_eq(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let other = &args[0];
    if recv.identical(other) {
        return Ok(Value::TRUE);
    }
    let same_class = Arc::ptr_eq(&rt.vm.model.real_class_of(recv), &rt.vm.model.real_class_of(other));
    Ok(Value::Bool(
        same_class && rt.is_exception(other) && rt.exception_message(recv) == rt.exception_message(other),
    ))
}

fn exc_name(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(rt.ivar_get(recv, Symbol::intern("@name")))
}

fn exc_receiver(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(rt.ivar_get(recv, Symbol::intern("@receiver")))
}

fn exc_result(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(rt.ivar_get(recv, Symbol::intern("@result")))
}

// --- Binding ----------------------------------------------------------------------------

fn binding_of<'a>(
    rt: &mut Runtime,
    recv: &'a Value,
) -> Result<&'a Arc<crate::runtime::closure::Binding>, Flow> {
    match recv {
        Value::Binding(b) => Ok(b),
        other => Err(super::common::conversion_error(rt, other, "Binding")),
    }
}

fn binding_local_get(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let b = binding_of(rt, recv)?.clone();
    let name = sym_arg(rt, &args[0])?;
    match b.local_get(name) {
        Some(v) => Ok(v),
        None => Err(rt.error_msg(
            Exc::Name,
            format!("local variable '{name}' is not defined for #<Binding>"),
        )),
    }
}

fn binding_local_set(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let b = binding_of(rt, recv)?.clone();
    let name = sym_arg(rt, &args[0])?;
    b.local_set(name, args[1].clone());
    Ok(args[1].clone())
}

fn binding_local_defined(rt: &mut Runtime, recv: &Value, args: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let b = binding_of(rt, recv)?.clone();
    let name = sym_arg(rt, &args[0])?;
    Ok(Value::Bool(b.local_defined(name)))
}

fn binding_locals(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    let b = binding_of(rt, recv)?;
    Ok(Value::array(b.local_names().into_iter().map(Value::Sym).collect()))
}

fn binding_receiver(rt: &mut Runtime, recv: &Value, _: &[Value], _: Option<&Arc<Block>>) -> Eval {
    Ok(binding_of(rt, recv)?.receiver().clone())
}

pub(crate) fn install(r: &mut BuiltinRegistry) {
    r.register_private(pick::kernel, "puts", Arity::any(), k_puts);
    r.register_private(pick::kernel, "print", Arity::any(), k_print);
    r.register_private(pick::kernel, "p", Arity::any(), k_p);
    r.register_private(pick::kernel, "raise", Arity::range(0, 2), k_raise);
    r.register_private(pick::kernel, "fail", Arity::range(0, 2), k_raise);
    r.register_private(pick::kernel, "proc", Arity::exact(0), k_proc);
    r.register_private(pick::kernel, "lambda", Arity::exact(0), k_lambda);
    r.register_private(pick::kernel, "loop", Arity::exact(0), k_loop);
    r.register_private(pick::kernel, "caller", Arity::exact(0), k_caller);
    r.register_private(pick::kernel, "method_missing", Arity::at_least(1), k_method_missing);
    r.register_private(pick::object, "initialize", Arity::any(), obj_initialize);

    r.register(pick::kernel, "class", Arity::exact(0), k_class);
    r.register(pick::kernel, "==", Arity::exact(1), k_equal);
    r.register(pick::kernel, "equal?", Arity::exact(1), k_equal);
    r.register(pick::kernel, "eql?", Arity::exact(1), k_equal);
    r.register(pick::kernel, "===", Arity::exact(1), k_equal);
    r.register(pick::kernel, "!=", Arity::exact(1), k_not_equal);
    r.register(pick::kernel, "!", Arity::exact(0), k_not);
    r.register(pick::kernel, "nil?", Arity::exact(0), k_nil_p);
    r.register(pick::kernel, "object_id", Arity::exact(0), k_object_id);
    r.register(pick::kernel, "__id__", Arity::exact(0), k_object_id);
    r.register(pick::kernel, "hash", Arity::exact(0), k_hash);
    r.register(pick::kernel, "<=>", Arity::exact(1), k_cmp);
    r.register(pick::kernel, "is_a?", Arity::exact(1), k_is_a);
    r.register(pick::kernel, "kind_of?", Arity::exact(1), k_is_a);
    r.register(pick::kernel, "instance_of?", Arity::exact(1), k_instance_of);
    r.register(pick::kernel, "respond_to?", Arity::range(1, 2), k_respond_to);
    r.register(pick::kernel, "send", Arity::at_least(1), k_send);
    r.register(pick::kernel, "__send__", Arity::at_least(1), k_send);
    r.register(pick::kernel, "public_send", Arity::at_least(1), k_public_send);
    r.register(pick::kernel, "methods", Arity::exact(0), k_methods);
    r.register(pick::kernel, "instance_variable_get", Arity::exact(1), k_ivar_get);
    r.register(pick::kernel, "instance_variable_set", Arity::exact(2), k_ivar_set);
    r.register(pick::kernel, "instance_variables", Arity::exact(0), k_ivars);
    r.register(pick::kernel, "instance_variable_defined?", Arity::exact(1), k_ivar_defined);
    r.register(pick::kernel, "instance_eval", Arity::exact(0), k_instance_eval);
    r.register(pick::kernel, "instance_exec", Arity::any(), k_instance_eval);
    r.register(pick::kernel, "singleton_class", Arity::exact(0), k_singleton_class);
    r.register(pick::kernel, "extend", Arity::at_least(1), k_extend);
    r.register(pick::kernel, "define_singleton_method", Arity::range(1, 2), k_define_singleton_method);
    r.register(pick::kernel, "tap", Arity::exact(0), k_tap);
    r.register(pick::kernel, "then", Arity::exact(0), k_then);
    r.register(pick::kernel, "yield_self", Arity::exact(0), k_then);
    r.register(pick::kernel, "itself", Arity::exact(0), k_itself);
    r.register(pick::kernel, "frozen?", Arity::exact(0), k_frozen);
    r.register(pick::kernel, "freeze", Arity::exact(0), k_itself);
    r.register(pick::kernel, "dup", Arity::exact(0), k_dup);
    r.register(pick::kernel, "clone", Arity::exact(0), k_dup);

    for class in [pick::true_class as ClassPick, pick::false_class] {
        r.register(class, "&", Arity::exact(1), bool_and);
        r.register(class, "|", Arity::exact(1), bool_or);
        r.register(class, "^", Arity::exact(1), bool_xor);
    }

    r.register(pick::module, "new", Arity::any(), mod_new);
    r.register(pick::class, "new", Arity::any(), mod_new);
    r.register(pick::class, "allocate", Arity::exact(0), mod_allocate);
    r.register(pick::module, "name", Arity::exact(0), mod_name);
    r.register(pick::class, "superclass", Arity::exact(0), mod_superclass);
    r.register(pick::module, "ancestors", Arity::exact(0), mod_ancestors);
    r.register(pick::module, "include", Arity::at_least(1), mod_include);
    r.register(pick::module, "include?", Arity::exact(1), mod_include_p);
    r.register(pick::module, "method_defined?", Arity::exact(1), mod_method_defined);
    r.register(pick::module, "public_method_defined?", Arity::exact(1), mod_method_defined);
    r.register(pick::module, "private_method_defined?", Arity::exact(1), mod_private_method_defined);
    r.register(pick::module, "instance_methods", Arity::range(0, 1), mod_instance_methods);
    r.register(pick::module, "define_method", Arity::range(1, 2), mod_define_method);
    r.register(pick::module, "attr_reader", Arity::any(), mod_attr_reader);
    r.register(pick::module, "attr", Arity::any(), mod_attr_reader);
    r.register(pick::module, "attr_writer", Arity::any(), mod_attr_writer);
    r.register(pick::module, "attr_accessor", Arity::any(), mod_attr_accessor);
    r.register(pick::module, "private", Arity::any(), mod_private);
    r.register(pick::module, "public", Arity::any(), mod_public);
    r.register(pick::module, "protected", Arity::any(), mod_protected);
    r.register(pick::module, "private_class_method", Arity::any(), mod_private_class_method);
    r.register(pick::module, "module_function", Arity::any(), mod_module_function);
    r.register(pick::module, "undef_method", Arity::any(), mod_undef_method);
    r.register(pick::module, "remove_method", Arity::any(), mod_remove_method);
    r.register(pick::module, "alias_method", Arity::exact(2), mod_alias_method);
    r.register(pick::module, "class_eval", Arity::exact(0), mod_class_eval);
    r.register(pick::module, "module_eval", Arity::exact(0), mod_class_eval);
    r.register(pick::module, "class_exec", Arity::any(), mod_class_eval);
    r.register(pick::module, "const_get", Arity::exact(1), mod_const_get);
    r.register(pick::module, "const_set", Arity::exact(2), mod_const_set);
    r.register(pick::module, "const_defined?", Arity::exact(1), mod_const_defined);
    r.register(pick::module, "constants", Arity::exact(0), mod_constants);
    r.register(pick::module, "class_variable_get", Arity::exact(1), mod_cvar_get);
    r.register(pick::module, "class_variable_set", Arity::exact(2), mod_cvar_set);
    r.register(pick::module, "===", Arity::exact(1), mod_eqq);
    r.register(pick::module, "<", Arity::exact(1), mod_lt);
    r.register(pick::module, "<=", Arity::exact(1), mod_le);
    r.register_private(pick::class, "inherited", Arity::exact(1), mod_hook);
    r.register_private(pick::module, "included", Arity::exact(1), mod_hook);

    r.register(pick::proc_class, "call", Arity::any(), proc_call);
    r.register(pick::proc_class, "()", Arity::any(), proc_call);
    r.register(pick::proc_class, "[]", Arity::any(), proc_call);
    r.register(pick::proc_class, "yield", Arity::any(), proc_call);
    r.register(pick::proc_class, "===", Arity::any(), proc_call);
    r.register(pick::proc_class, "arity", Arity::exact(0), proc_arity);
    r.register(pick::proc_class, "lambda?", Arity::exact(0), proc_lambda_p);
    r.register(pick::proc_class, "to_proc", Arity::exact(0), proc_to_proc);

    r.register_singleton(pick::exception, "exception", Arity::any(), exc_s_exception);
    r.register_private(pick::exception, "initialize", Arity::range(0, 1), exc_initialize);
    r.register(pick::exception, "to_s", Arity::exact(0), exc_to_s);
    r.register(pick::exception, "message", Arity::exact(0), exc_message);
    r.register(pick::exception, "backtrace", Arity::exact(0), exc_backtrace);
    r.register(pick::exception, "set_backtrace", Arity::exact(1), exc_set_backtrace);
    r.register(pick::exception, "full_message", Arity::any(), exc_full_message);
    r.register(pick::exception, "exception", Arity::range(0, 1), exc_exception);
    r.register(pick::exception, "==", Arity::exact(1), exc_eq);
    r.register(pick::exception, "name", Arity::exact(0), exc_name);
    r.register(pick::exception, "receiver", Arity::exact(0), exc_receiver);
    r.register(pick::exception, "result", Arity::exact(0), exc_result);

    r.register(pick::binding, "local_variable_get", Arity::exact(1), binding_local_get);
    r.register(pick::binding, "local_variable_set", Arity::exact(2), binding_local_set);
    r.register(pick::binding, "local_variable_defined?", Arity::exact(1), binding_local_defined);
    r.register(pick::binding, "local_variables", Arity::exact(0), binding_locals);
    r.register(pick::binding, "receiver", Arity::exact(0), binding_receiver);
}
