use std::sync::Arc;

use garnet_ir::{DefNode, Node};
use garnet_syntax::DiagnosticKind;
use log::debug;

use crate::builtins::conversion;
use crate::compile;
use crate::core::{Symbol, Value};
use crate::errors::ExecError;
use crate::model::{ClassRef, CoreClasses};
use crate::runtime::arity::Arity;
use crate::runtime::cache::InlineCache;
use crate::runtime::closure::Block;
use crate::runtime::config::{ExecResult, Flow, RuntimeConfig};
use crate::runtime::dispatch::CallKind;
use crate::runtime::exception::Exc;
use crate::runtime::frame::Frame;
use crate::runtime::thread::{CallRecord, ThreadHandle, VmThreadState};
use crate::runtime::unit::{CompiledUnit, Imp, MethodSource, PendingSource, UnitFlags, arity_of};
use crate::runtime::vm::{StatsSnapshot, Vm};

const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// One guest thread's interpreter: the shared `Vm` plus this thread's state.
pub struct Runtime {
    pub(crate) vm: Arc<Vm>,
    pub(crate) thread: VmThreadState,
    pub(crate) config: RuntimeConfig,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let vm = Vm::new(config);
        let handle = vm.main_thread.clone();
        Self::for_thread(vm, handle)
    }

    /// A second interpreter over an existing VM, with its own thread state.
    pub fn with_vm(vm: Arc<Vm>) -> Self {
        let handle = ThreadHandle::new(vm.next_thread_id());
        Self::for_thread(vm, handle)
    }

    pub(crate) fn for_thread(vm: Arc<Vm>, handle: Arc<ThreadHandle>) -> Self {
        let top = vm.model.core().object.clone();
        let config = vm.config.clone();
        Self {
            thread: VmThreadState::new(handle, top),
            config,
            vm,
        }
    }

    pub fn set_eager_compile(&mut self, eager: bool) {
        self.config.eager_compile = eager;
        self.vm.registry.set_eager(eager);
    }

    pub fn set_optimized_dispatch(&mut self, optimized: bool) {
        self.config.optimized_dispatch = optimized;
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.config.max_call_depth = depth;
    }

    pub fn set_echo_output(&mut self, echo: bool) {
        self.config.echo_output = echo;
    }

    pub fn set_file_name(&mut self, name: &str) {
        self.config.file_name = Arc::from(name);
    }

    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn core(&self) -> &CoreClasses {
        self.vm.model.core()
    }

    pub fn main_object(&self) -> Value {
        self.vm.main_obj.clone()
    }

    pub fn thread_handle(&self) -> &Arc<ThreadHandle> {
        &self.thread.handle
    }

    /// Compiles `node` as a top-level program and runs it with `self` = main.
    pub fn compile_and_run(&mut self, node: &Node) -> Result<ExecResult, ExecError> {
        let body = compile::compile_top(node, &self.config.file_name, self.config.optimized_dispatch);
        self.thread.exceptions.clear();
        let id = self.vm.next_frame_id();
        let mut frame = Frame::new(self.vm.main_obj.clone(), body.slots, body.cells, id);
        let cref_depth = self.thread.cref.len();
        self.thread.calls.push(CallRecord {
            label: body.label.clone(),
            file: body.file.clone(),
            caller_line: self.thread.line,
        });
        self.thread.homes.push(id);

        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            (body.code)(self, &mut frame)
        });

        self.thread.homes.pop();
        self.thread.calls.pop();
        self.thread.cref.truncate(cref_depth.max(1));

        let value = match result {
            Ok(v) | Err(Flow::Return(v)) => v,
            Err(Flow::BlockReturn { value, home }) if home == id => value,
            Err(flow) => {
                let err = self.host_error(flow);
                debug!("program ended with {err}");
                return Err(err);
            }
        };
        self.thread.exceptions.clear();
        Ok(ExecResult {
            value,
            output: self.vm.take_output(),
        })
    }

    /// Installs a method on `class`. Guest sources compile on first call unless eager
    /// compilation is on; `arity` applies to native implementations.
    pub fn define_method(
        &mut self,
        class: &ClassRef,
        name: &str,
        source: MethodSource,
        arity: Arity,
        flags: UnitFlags,
    ) -> Result<(), ExecError> {
        let selector = Symbol::intern(name);
        match source {
            MethodSource::Ast { params, body } => {
                let arity = arity_of(&params);
                let def = DefNode {
                    name: name.to_string(),
                    params,
                    body,
                };
                self.vm.registry.define_pending(PendingSource {
                    owner: class.clone(),
                    selector,
                    def: Arc::new(def),
                    arity,
                    flags,
                    cref: class.clone(),
                    file: self.config.file_name.clone(),
                    optimized: self.config.optimized_dispatch,
                });
            }
            MethodSource::Native(fun) => {
                self.install_unit(class, selector, Imp::Native(fun), arity, flags | UnitFlags::NATIVE_GLUE);
            }
            MethodSource::Block(Value::Proc(block)) => {
                let arity = block.arity();
                self.install_unit(class, selector, Imp::Block(block), arity, flags | UnitFlags::FROM_BLOCK);
            }
            MethodSource::Block(other) => {
                let kind = DiagnosticKind::NoImplicitConversion {
                    from: self.vm.model.real_class_of(&other).name(),
                    to: "Proc".into(),
                };
                let flow = self.error(Exc::Type, kind);
                return Err(self.host_error(flow));
            }
            MethodSource::AttrReader(attr) => {
                let ivar = Symbol::intern(&format!("@{attr}"));
                self.install_unit(class, selector, Imp::AttrReader(ivar), Arity::exact(0), flags);
            }
            MethodSource::AttrWriter(attr) => {
                let ivar = Symbol::intern(&format!("@{attr}"));
                let selector = Symbol::intern(&format!("{attr}="));
                self.install_unit(class, selector, Imp::AttrWriter(ivar), Arity::exact(1), flags);
            }
        }
        Ok(())
    }

    pub(crate) fn install_unit(
        &self,
        class: &ClassRef,
        selector: Symbol,
        imp: Imp,
        arity: Arity,
        flags: UnitFlags,
    ) {
        self.vm.registry.define_unit(
            class,
            CompiledUnit {
                imp,
                arity,
                flags,
                owner: class.clone(),
                selector,
            },
        );
    }

    /// Calls `selector` on `recv` with full dispatch (private methods are reachable, as for
    /// a call with an implicit receiver).
    pub fn dispatch(
        &mut self,
        recv: &Value,
        selector: &str,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
    ) -> Result<Value, ExecError> {
        let sel = Symbol::intern(selector);
        let result = self.call_method(recv, sel, args, block, CallKind::FCall);
        self.finish_host_call(result)
    }

    /// Like `dispatch`, through a host-held call-site cache.
    pub fn dispatch_cached(
        &mut self,
        cache: &InlineCache,
        recv: &Value,
        selector: &str,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
    ) -> Result<Value, ExecError> {
        let sel = Symbol::intern(selector);
        let result =
            self.dispatch_inner(Some(cache), recv, sel, args, None, block, CallKind::Public, None);
        self.finish_host_call(result)
    }

    /// Calls a `Proc` value.
    pub fn call(&mut self, proc: &Value, args: Vec<Value>) -> Result<Value, ExecError> {
        let result = match proc {
            Value::Proc(b) => {
                let b = b.clone();
                self.call_proc(&b, args, None)
            }
            other => {
                let other = other.clone();
                self.call_method(&other, Symbol::intern("call"), args, None, CallKind::Public)
            }
        };
        self.finish_host_call(result)
    }

    fn finish_host_call(&mut self, result: Result<Value, Flow>) -> Result<Value, ExecError> {
        match result {
            Ok(v) => {
                self.thread.exceptions.clear();
                Ok(v)
            }
            Err(flow) => Err(self.host_error(flow)),
        }
    }

    /// Compiles every method still waiting for its first call.
    pub fn compile_all_pending(&self) -> usize {
        self.vm.registry.compile_all_pending()
    }

    /// Evaluates `node` inside a `Binding` value (see `Kernel#binding`).
    pub fn eval_with_binding(&mut self, node: &Node, binding: &Value) -> Result<Value, ExecError> {
        let result = match binding {
            Value::Binding(b) => {
                let b = b.clone();
                self.eval_in_binding(node, &b)
            }
            other => {
                let kind = DiagnosticKind::NoImplicitConversion {
                    from: self.vm.model.real_class_of(other).name(),
                    to: "Binding".into(),
                };
                Err(self.error(Exc::Type, kind))
            }
        };
        self.finish_host_call(result)
    }

    pub fn global_get(&self, name: &str) -> Value {
        self.gvar_get(Symbol::intern(name))
    }

    pub fn global_set(&mut self, name: &str, value: Value) -> Result<(), ExecError> {
        match self.gvar_set(Symbol::intern(name), value) {
            Ok(()) => Ok(()),
            Err(flow) => Err(self.host_error(flow)),
        }
    }

    pub(crate) fn gvar_get(&self, name: Symbol) -> Value {
        let key = name.as_str();
        match &*key {
            "$!" => self.current_exception().unwrap_or(Value::Nil),
            "$SAFE" => Value::Int(self.thread.safe_level),
            "$?" => self.thread.last_status.clone(),
            "$0" | "$PROGRAM_NAME" => Value::str(&*self.config.file_name),
            "$~" => match &self.thread.last_match {
                Some(groups) => Value::array(
                    groups
                        .iter()
                        .map(|g| g.as_deref().map_or(Value::Nil, Value::str))
                        .collect(),
                ),
                None => Value::Nil,
            },
            k if k.len() == 2 && k.as_bytes()[1].is_ascii_digit() && k.as_bytes()[1] != b'0' => {
                let idx = (k.as_bytes()[1] - b'0') as usize;
                self.thread
                    .last_match
                    .as_ref()
                    .and_then(|g| g.get(idx).cloned().flatten())
                    .map_or(Value::Nil, Value::str)
            }
            _ => self.vm.globals.read().get(&name).cloned().unwrap_or(Value::Nil),
        }
    }

    pub(crate) fn gvar_set(&mut self, name: Symbol, value: Value) -> Result<(), Flow> {
        let key = name.as_str();
        match &*key {
            "$SAFE" => match value {
                Value::Int(level) if level >= self.thread.safe_level => {
                    self.thread.safe_level = level;
                    Ok(())
                }
                Value::Int(level) => Err(self.error_msg(
                    Exc::Standard,
                    format!(
                        "tried to downgrade safe level from {} to {}",
                        self.thread.safe_level, level
                    ),
                )),
                other => {
                    let kind = DiagnosticKind::NoImplicitConversion {
                        from: self.vm.model.real_class_of(&other).name(),
                        to: "Integer".into(),
                    };
                    Err(self.error(Exc::Type, kind))
                }
            },
            "$!" if !value.is_nil() && !self.is_exception(&value) => {
                Err(self.error_msg(Exc::Type, "assigning non-exception to $!"))
            }
            "$!" => {
                self.thread.exceptions.push(value);
                Ok(())
            }
            "$?" | "$~" => Err(self.error_msg(Exc::Name, format!("{key} is a read-only variable"))),
            _ => {
                self.vm.globals.write().insert(name, value);
                Ok(())
            }
        }
    }

    /// Resolves a constant path such as `"Outer::Inner"` from the top level.
    pub fn lookup_class(&self, path: &str) -> Option<ClassRef> {
        let mut current = self.vm.model.core().object.clone();
        for part in path.trim_start_matches("::").split("::") {
            let found = self
                .vm
                .model
                .ancestors(&current)
                .iter()
                .find_map(|c| c.const_get(Symbol::intern(part)))?;
            current = match found {
                Value::Class(c) => c,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Output written by the guest since the last call.
    pub fn take_output(&self) -> String {
        self.vm.take_output()
    }

    pub(crate) fn write_output(&self, s: &str) {
        self.vm.write_output(s, self.config.echo_output);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.vm.stats()
    }

    /// `inspect` through guest dispatch; falls back to the structural form on error.
    pub fn inspect_value(&mut self, value: &Value) -> String {
        match conversion::inspect(self, value) {
            Ok(s) => s,
            Err(_) => {
                self.thread.exceptions.clear();
                format!("{value:?}")
            }
        }
    }

    /// Backtrace lines recorded on a guest exception value.
    pub fn backtrace_of(&self, exc: &Value) -> Vec<String> {
        self.exception_backtrace(exc)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
