mod common;

use std::any::Any;
use std::sync::Arc;

use common::init_logging;
use garnet_ir::build::*;
use garnet_runtime::{
    ForeignBridge, ForeignImp, ForeignObject, Forward, NativeValue, RefCountCollector, Runtime,
    RuntimeConfig, StdObjectModel, TypeTag, Value, Vm,
};

struct Meter {
    base: i64,
}

impl ForeignObject for Meter {
    fn class_name(&self) -> &str {
        "Meter"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MeterBridge;

fn forward(name: &str, args: &[TypeTag], ret: TypeTag) -> Forward {
    Forward {
        imp: ForeignImp {
            owner: Arc::from("Meter"),
            name: Arc::from(name),
            ret,
        },
        arg_shape: Arc::from(args),
    }
}

impl ForeignBridge for MeterBridge {
    fn invoke_native(
        &self,
        recv: &Arc<dyn ForeignObject>,
        imp: &ForeignImp,
        args: Vec<NativeValue>,
    ) -> Result<NativeValue, String> {
        let meter = recv
            .as_any()
            .downcast_ref::<Meter>()
            .ok_or_else(|| "not a meter".to_string())?;
        match (&*imp.name, args.as_slice()) {
            ("add", [NativeValue::Int(n)]) => Ok(NativeValue::Int(meter.base + n)),
            ("label", []) => Ok(NativeValue::Str(format!("meter@{}", meter.base))),
            ("fail", []) => Err("sensor offline".into()),
            ("puts", [NativeValue::Str(line)]) => Ok(NativeValue::Str(format!("{}:{line}", meter.base))),
            (name, _) => Err(format!("no native {name}")),
        }
    }

    fn forwardable(&self, recv: &Arc<dyn ForeignObject>, selector: &str) -> Option<Forward> {
        if recv.class_name() != "Meter" {
            return None;
        }
        match selector {
            "add" => Some(forward("add", &[TypeTag::Int], TypeTag::Int)),
            "label" => Some(forward("label", &[], TypeTag::Str)),
            "fail" => Some(forward("fail", &[], TypeTag::Void)),
            "puts" => Some(forward("puts", &[TypeTag::Str], TypeTag::Str)),
            _ => None,
        }
    }
}

fn bridged_runtime() -> Runtime {
    init_logging();
    let vm = Vm::with_seams(
        RuntimeConfig::default(),
        Arc::new(StdObjectModel::new()),
        Arc::new(RefCountCollector::new()),
        Arc::new(MeterBridge),
    );
    Runtime::with_vm(vm)
}

fn meter(base: i64) -> Value {
    Value::Foreign(Arc::new(Meter { base }))
}

#[test]
fn unresolved_selector_is_forwarded_to_the_native_side() {
    let mut rt = bridged_runtime();
    rt.global_set("$m", meter(10)).unwrap();
    let prog = array(vec![
        call(gvar("$m"), "add", vec![int(5)]),
        call(gvar("$m"), "label", vec![]),
    ]);
    let out = rt.compile_and_run(&prog).unwrap().value;
    assert_eq!(out, Value::array(vec![Value::from(15), Value::str("meter@10")]));
    assert_eq!(rt.stats().foreign_forwards, 2);
}

#[test]
fn guest_methods_win_over_forwarding() {
    let mut rt = bridged_runtime();
    let foreign = rt.core().foreign.clone();
    rt.compile_and_run(&class("ForeignObject", None, def("label", &[], str("guest"))))
        .unwrap();
    let out = rt.dispatch(&meter(1), "label", vec![], None).unwrap();
    assert_eq!(out, Value::str("guest"));
    assert_eq!(rt.stats().foreign_forwards, 0);
    assert!(rt.vm().registry().own_flags(&foreign, garnet_runtime::Symbol::intern("label")).is_some());
}

#[test]
fn forwarded_site_is_cached_per_native_class() {
    let mut rt = bridged_runtime();
    rt.global_set("$m", meter(1)).unwrap();
    let prog = lines(vec![
        lasgn("i", int(0)),
        lasgn("sum", int(0)),
        while_(
            call(lvar("i"), "<", vec![int(4)]),
            seq(vec![
                lasgn("sum", call(lvar("sum"), "+", vec![call(gvar("$m"), "add", vec![lvar("i")])])),
                lasgn("i", call(lvar("i"), "+", vec![int(1)])),
            ]),
        ),
        lvar("sum"),
    ]);
    let out = rt.compile_and_run(&prog).unwrap().value;
    assert_eq!(out, Value::from(10));
    let stats = rt.stats();
    assert_eq!(stats.foreign_forwards, 4);
    assert!(stats.cache_hits >= 3, "{stats:?}");
}

#[test]
fn wrong_argument_shape_is_an_argument_error() {
    let mut rt = bridged_runtime();
    let err = rt.dispatch(&meter(1), "add", vec![], None).unwrap_err();
    assert_eq!(err.class_name(), Some("ArgumentError"));

    let err = rt
        .dispatch(&meter(1), "add", vec![Value::str("x")], None)
        .unwrap_err();
    assert_eq!(err.class_name(), Some("TypeError"));
}

#[test]
fn native_failure_surfaces_as_a_guest_exception() {
    let mut rt = bridged_runtime();
    rt.global_set("$m", meter(1)).unwrap();
    let prog = begin(
        call(gvar("$m"), "fail", vec![]),
        vec![rescue(vec![], Some("e"), call(lvar("e"), "message", vec![]))],
        None,
        None,
    );
    let out = rt.compile_and_run(&prog).unwrap().value;
    assert_eq!(out, Value::str("native call failed: sensor offline"));
}

#[test]
fn private_kernel_method_does_not_hide_a_native_one() {
    let mut rt = bridged_runtime();
    rt.global_set("$m", meter(4)).unwrap();
    let prog = array(vec![
        call(gvar("$m"), "puts", vec![str("a")]),
        call(gvar("$m"), "puts", vec![str("b")]),
    ]);
    let out = rt.compile_and_run(&prog).unwrap().value;
    assert_eq!(out, Value::array(vec![Value::str("4:a"), Value::str("4:b")]));
}

#[test]
fn unknown_native_selector_still_raises_no_method_error() {
    let mut rt = bridged_runtime();
    let err = rt.dispatch(&meter(1), "calibrate", vec![], None).unwrap_err();
    assert_eq!(err.class_name(), Some("NoMethodError"));
    assert!(err.message().contains("for an instance of ForeignObject"), "{}", err.message());
}
