mod common;

use common::{eval, runtime};
use garnet_ir::build::*;
use garnet_runtime::{Arity, ExecError, MethodSource, RuntimeConfig, UnitFlags, Value};

#[test]
fn config_defaults() {
    let config = RuntimeConfig::default();
    assert!(!config.eager_compile);
    assert!(config.optimized_dispatch);
    assert_eq!(config.max_call_depth, 2000);
    assert_eq!(&*config.file_name, "main.rb");
}

#[test]
fn attribute_sources_install_reader_and_writer() {
    let mut rt = runtime();
    rt.compile_and_run(&class("Point", None, nil())).unwrap();
    let point = rt.lookup_class("Point").unwrap();
    rt.define_method(&point, "x", MethodSource::AttrReader("x".into()), Arity::exact(0), UnitFlags::empty())
        .unwrap();
    rt.define_method(&point, "x=", MethodSource::AttrWriter("x".into()), Arity::exact(1), UnitFlags::empty())
        .unwrap();
    let prog = lines(vec![
        lasgn("p", call(constant("Point"), "new", vec![])),
        attr_asgn(lvar("p"), "x", int(3)),
        call(lvar("p"), "x", vec![]),
    ]);
    assert_eq!(rt.compile_and_run(&prog).unwrap().value, Value::from(3));
}

#[test]
fn block_source_becomes_a_method_with_strict_arity() {
    let mut rt = runtime();
    let adder = rt
        .compile_and_run(&lambda(&["a", "b"], call(lvar("a"), "+", vec![lvar("b")])))
        .unwrap()
        .value;
    let object = rt.core().object.clone();
    rt.define_method(&object, "add", MethodSource::Block(adder), Arity::exact(2), UnitFlags::empty())
        .unwrap();
    let out = rt.dispatch(&Value::from(0), "add", vec![Value::from(2), Value::from(5)], None);
    assert_eq!(out.unwrap(), Value::from(7));
    let err = rt.dispatch(&Value::from(0), "add", vec![Value::from(2)], None).unwrap_err();
    assert_eq!(err.class_name(), Some("ArgumentError"));
}

#[test]
fn non_proc_block_source_is_rejected() {
    let mut rt = runtime();
    let object = rt.core().object.clone();
    let err = rt
        .define_method(&object, "bad", MethodSource::Block(Value::from(1)), Arity::any(), UnitFlags::empty())
        .unwrap_err();
    assert_eq!(err.class_name(), Some("TypeError"));
}

#[test]
fn private_flag_hides_a_host_method_from_explicit_calls() {
    let mut rt = runtime();
    rt.compile_and_run(&class("Shy", None, nil())).unwrap();
    let shy = rt.lookup_class("Shy").unwrap();
    let source = MethodSource::Ast {
        params: Default::default(),
        body: sym("hidden"),
    };
    rt.define_method(&shy, "peek", source, Arity::exact(0), UnitFlags::PRIVATE)
        .unwrap();
    let err = rt
        .compile_and_run(&call(call(constant("Shy"), "new", vec![]), "peek", vec![]))
        .unwrap_err();
    assert_eq!(err.class_name(), Some("NoMethodError"));
}

#[test]
fn host_calls_procs() {
    let mut rt = runtime();
    let double = rt
        .compile_and_run(&lambda(&["x"], call(lvar("x"), "*", vec![int(2)])))
        .unwrap()
        .value;
    assert_eq!(rt.call(&double, vec![Value::from(21)]).unwrap(), Value::from(42));
}

#[test]
fn binding_sees_and_updates_captured_locals() {
    let mut rt = runtime();
    let binding = rt
        .compile_and_run(&lines(vec![lasgn("x", int(4)), fcall("binding", vec![])]))
        .unwrap()
        .value;
    let out = rt
        .eval_with_binding(&call(lvar("x"), "*", vec![int(10)]), &binding)
        .unwrap();
    assert_eq!(out, Value::from(40));
    rt.eval_with_binding(&lasgn("x", int(7)), &binding).unwrap();
    let x = rt
        .eval_with_binding(&lvar("x"), &binding)
        .unwrap();
    assert_eq!(x, Value::from(7));
}

#[test]
fn top_binding_evaluates_against_main() {
    let mut rt = runtime();
    let binding = rt.top_binding();
    let out = rt.eval_with_binding(&call(self_(), "to_s", vec![]), &binding).unwrap();
    assert_eq!(out, Value::str("main"));
}

#[test]
fn safe_level_only_rises() {
    let mut rt = runtime();
    rt.global_set("$SAFE", Value::from(1)).unwrap();
    assert_eq!(rt.global_get("$SAFE"), Value::from(1));
    let err = rt.global_set("$SAFE", Value::from(0)).unwrap_err();
    assert!(err.message().contains("downgrade"), "{}", err.message());
}

#[test]
fn nested_constants_resolve_from_the_top() {
    let mut rt = runtime();
    rt.compile_and_run(&module("Outer", class("Inner", None, nil()))).unwrap();
    let inner = rt.lookup_class("Outer::Inner").unwrap();
    assert_eq!(inner.name(), "Outer::Inner");
    assert!(rt.lookup_class("Outer::Missing").is_none());
}

#[test]
fn inspect_value_uses_guest_overrides() {
    let mut rt = runtime();
    rt.compile_and_run(&class("Fancy", None, def("inspect", &[], str("<fancy>"))))
        .unwrap();
    let fancy = rt.lookup_class("Fancy").unwrap();
    let obj = rt.dispatch(&Value::Class(fancy), "new", vec![], None).unwrap();
    assert_eq!(rt.inspect_value(&obj), "<fancy>");
    let list = Value::array(vec![Value::from(1), Value::str("a"), Value::sym("b"), Value::Nil]);
    assert_eq!(rt.inspect_value(&list), "[1, \"a\", :b, nil]");
}

#[test]
fn call_depth_limit_is_configurable() {
    let mut rt = runtime();
    rt.set_max_call_depth(10);
    let prog = lines(vec![
        def("down", &["n"], if_(call(lvar("n"), "==", vec![int(0)]), int(0), Some(fcall("down", vec![call(lvar("n"), "-", vec![int(1)])])))),
        fcall("down", vec![int(50)]),
    ]);
    let err = rt.compile_and_run(&prog).unwrap_err();
    assert_eq!(err.class_name(), Some("SystemStackError"));
    assert_eq!(eval(&prog), Value::from(0));
}

#[test]
fn output_is_collected_per_run() {
    let mut rt = runtime();
    let first = rt
        .compile_and_run(&seq(vec![fcall("puts", vec![str("a"), int(1)]), fcall("print", vec![str("b")])]))
        .unwrap();
    assert_eq!(first.output, "a\n1\nb");
    let second = rt.compile_and_run(&fcall("p", vec![str("q")])).unwrap();
    assert_eq!(second.output, "\"q\"\n");
}

#[test]
fn top_level_return_ends_the_program() {
    let prog = seq(vec![return_(Some(int(1))), int(2)]);
    assert_eq!(eval(&prog), Value::from(1));
}

#[test]
fn return_from_an_orphaned_proc_is_unexpected() {
    let prog = lines(vec![
        def("make", &[], fcall_proc(return_(Some(int(1))))),
        call(fcall("make", vec![]), "call", vec![]),
    ]);
    let err = common::eval_err(&prog);
    assert!(matches!(err, ExecError::UnexpectedReturn | ExecError::Uncaught { .. }), "{err:?}");
}

fn fcall_proc(body: garnet_ir::Node) -> garnet_ir::Node {
    call_block(None, "proc", vec![], block(&[], body))
}
