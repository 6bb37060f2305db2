mod common;

use common::{eval, eval_err, ints, runtime};
use garnet_ir::build::*;
use garnet_ir::Params;
use garnet_runtime::{Arity, ExecError, InlineCache, MethodSource, Runtime, UnitFlags, Value};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

fn new_instance(rt: &mut Runtime, class: &str) -> Value {
    let class = rt.lookup_class(class).expect("class defined");
    rt.dispatch(&Value::Class(class), "new", vec![], None)
        .expect("instantiable")
}

fn returning(value: i64) -> MethodSource {
    MethodSource::Ast {
        params: Params::default(),
        body: int(value),
    }
}

#[test]
fn redefinition_reaches_new_instances_and_cached_sites() {
    let mut rt = runtime();
    rt.compile_and_run(&class("C", None, def("f", &[], int(1))))
        .unwrap();
    let old = new_instance(&mut rt, "C");
    let cache = InlineCache::new();
    assert_eq!(rt.dispatch_cached(&cache, &old, "f", vec![], None).unwrap(), Value::from(1));
    assert_eq!(rt.dispatch_cached(&cache, &old, "f", vec![], None).unwrap(), Value::from(1));
    assert!(rt.stats().cache_hits >= 1);

    rt.compile_and_run(&class("C", None, def("f", &[], int(2))))
        .unwrap();
    let fresh = new_instance(&mut rt, "C");
    assert_eq!(rt.dispatch_cached(&cache, &fresh, "f", vec![], None).unwrap(), Value::from(2));
    assert_eq!(rt.dispatch_cached(&cache, &old, "f", vec![], None).unwrap(), Value::from(2));
}

#[test]
fn guest_call_site_sees_redefinition() {
    let prog = lines(vec![
        class("C", None, def("f", &[], int(1))),
        def("who_of", &["o"], call(lvar("o"), "f", vec![])),
        lasgn("a", fcall("who_of", vec![call(constant("C"), "new", vec![])])),
        class("C", None, def("f", &[], int(2))),
        lasgn("b", fcall("who_of", vec![call(constant("C"), "new", vec![])])),
        array(vec![lvar("a"), lvar("b")]),
    ]);
    assert_eq!(ints(&eval(&prog)), [1, 2]);
}

#[test]
fn superclass_definition_invalidates_subclass_entries() {
    let prog = lines(vec![
        class("A", None, def("who", &[], sym("a"))),
        class("B", Some(constant("A")), nil()),
        def("who_of", &["o"], call(lvar("o"), "who", vec![])),
        lasgn("first", fcall("who_of", vec![call(constant("B"), "new", vec![])])),
        class("A", None, def("who", &[], sym("changed"))),
        lasgn("second", fcall("who_of", vec![call(constant("B"), "new", vec![])])),
        array(vec![lvar("first"), lvar("second")]),
    ]);
    let out = eval(&prog);
    assert_eq!(out, Value::array(vec![Value::sym("a"), Value::sym("changed")]));
}

#[test]
fn operator_fast_path_yields_to_a_guest_redefinition() {
    let prog = lines(vec![
        lasgn("a", call(int(1), "+", vec![int(2)])),
        class("Integer", None, def("+", &["other"], int(42))),
        lasgn("b", call(int(1), "+", vec![int(2)])),
        array(vec![lvar("a"), lvar("b")]),
    ]);
    let mut rt = runtime();
    let out = rt.compile_and_run(&prog).unwrap();
    assert_eq!(ints(&out.value), [3, 42]);
    assert!(rt.stats().fast_path_hits >= 1);
}

#[test]
fn object_level_operator_redefinition_reaches_builtin_receivers() {
    let prog = lines(vec![
        lasgn("before", call(sym("a"), "==", vec![sym("b")])),
        class("Object", None, def("==", &["other"], sym("custom"))),
        array(vec![
            lvar("before"),
            call(sym("a"), "==", vec![sym("b")]),
            call(sym("a"), "send", vec![sym("=="), sym("b")]),
            call(nil(), "==", vec![int(1)]),
        ]),
    ]);
    let out = eval(&prog);
    let custom = Value::sym("custom");
    assert_eq!(out, Value::array(vec![Value::FALSE, custom.clone(), custom.clone(), custom]));
}

#[test]
fn operators_from_included_modules_disable_the_fast_path() {
    let prog = lines(vec![
        module("Loud", def("==", &["other"], sym("loud"))),
        lasgn("before", call(nil(), "==", vec![nil()])),
        class("NilClass", None, fcall("include", vec![constant("Loud")])),
        lasgn("included", call(nil(), "==", vec![nil()])),
        module("Later", nil()),
        class("Symbol", None, fcall("include", vec![constant("Later")])),
        module("Later", def("==", &["other"], sym("later"))),
        array(vec![lvar("before"), lvar("included"), call(sym("a"), "==", vec![sym("a")])]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::TRUE, Value::sym("loud"), Value::sym("later")])
    );
}

#[test]
fn method_missing_without_override_raises() {
    let prog = lines(vec![
        class("Plain", None, nil()),
        call(call(constant("Plain"), "new", vec![]), "frobnicate", vec![int(1)]),
    ]);
    match eval_err(&prog) {
        ExecError::Uncaught { class, message, .. } => {
            assert_eq!(class, "NoMethodError");
            assert!(message.starts_with("undefined method `frobnicate' for an instance of Plain"), "{message}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn method_missing_override_receives_selector_and_args() {
    let ghost = class(
        "Ghost",
        None,
        def_params(
            "method_missing",
            Params {
                required: vec!["name".to_string()].into(),
                rest: Some("args".to_string()),
                ..Params::default()
            },
            array(vec![lvar("name"), lvar("args")]),
        ),
    );
    let prog = lines(vec![
        ghost,
        call(call(constant("Ghost"), "new", vec![]), "boo", vec![int(1), int(2)]),
    ]);
    let mut rt = runtime();
    let out = rt.compile_and_run(&prog).unwrap().value;
    let expected = Value::array(vec![
        Value::sym("boo"),
        Value::array(vec![Value::from(1), Value::from(2)]),
    ]);
    assert_eq!(out, expected);
    assert_eq!(rt.stats().method_missing_calls, 1);
}

#[test]
fn misspelled_call_suggests_a_close_name() {
    let prog = lines(vec![
        class("Greeter", None, def("greeting", &[], str("hi"))),
        call(call(constant("Greeter"), "new", vec![]), "greting", vec![]),
    ]);
    let err = eval_err(&prog);
    assert!(err.message().contains("Did you mean?  greeting"), "{}", err.message());
}

#[test]
fn private_methods_reject_explicit_receivers() {
    let vault = class(
        "Vault",
        None,
        seq(vec![
            def("open", &[], vcall("secret")),
            vcall("private"),
            def("secret", &[], sym("gold")),
        ]),
    );
    let ok = lines(vec![vault.clone(), call(call(constant("Vault"), "new", vec![]), "open", vec![])]);
    assert_eq!(eval(&ok), Value::sym("gold"));

    let bad = lines(vec![vault, call(call(constant("Vault"), "new", vec![]), "secret", vec![])]);
    match eval_err(&bad) {
        ExecError::Uncaught { class, message, .. } => {
            assert_eq!(class, "NoMethodError");
            assert_eq!(message, "private method `secret' called for an instance of Vault");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn protected_methods_answer_only_to_related_callers() {
    let account = class(
        "Account",
        None,
        seq(vec![
            def("initialize", &["n"], iasgn("@n", lvar("n"))),
            def(
                "bigger?",
                &["other"],
                call(ivar("@n"), ">", vec![call(lvar("other"), "balance", vec![])]),
            ),
            vcall("protected"),
            def("balance", &[], ivar("@n")),
        ]),
    );
    let make = |n| call(constant("Account"), "new", vec![int(n)]);
    let ok = lines(vec![account.clone(), call(make(5), "bigger?", vec![make(3)])]);
    assert_eq!(eval(&ok), Value::TRUE);

    let bad = lines(vec![account, call(make(5), "balance", vec![])]);
    let err = eval_err(&bad);
    assert_eq!(err.class_name(), Some("NoMethodError"));
    assert!(err.message().starts_with("protected method `balance'"), "{}", err.message());
}

#[test]
fn named_arguments_retry_under_a_coalesced_selector() {
    let mover = class(
        "Mover",
        None,
        def("move:speed:", &["dist", "speed"], array(vec![lvar("dist"), lvar("speed")])),
    );
    let prog = lines(vec![
        mover,
        call_args(
            Some(call(constant("Mover"), "new", vec![])),
            "move",
            vec![garnet_ir::Arg::Plain(int(10)), named(vec![("speed", int(3))])],
            None,
        ),
    ]);
    let mut rt = runtime();
    let out = rt.compile_and_run(&prog).unwrap().value;
    assert_eq!(ints(&out), [10, 3]);
    assert_eq!(rt.stats().named_arg_retries, 1);
}

#[test]
fn predicate_and_setter_fall_back_to_alternate_spellings() {
    let widget = class(
        "Widget",
        None,
        seq(vec![
            def("is_ready", &[], true_()),
            def("set_size", &["v"], iasgn("@size", lvar("v"))),
            def("size", &[], ivar("@size")),
        ]),
    );
    let prog = lines(vec![
        widget,
        lasgn("w", call(constant("Widget"), "new", vec![])),
        attr_asgn(lvar("w"), "size", int(4)),
        array(vec![call(lvar("w"), "ready?", vec![]), call(lvar("w"), "size", vec![])]),
    ]);
    let mut rt = runtime();
    let out = rt.compile_and_run(&prog).unwrap().value;
    assert_eq!(out, Value::array(vec![Value::TRUE, Value::from(4)]));
    assert_eq!(rt.stats().alternate_spellings, 2);
}

#[test]
fn native_arity_errors_are_rescuable() {
    let prog = begin(
        call(int(1), "chr", vec![int(2)]),
        vec![rescue(vec![constant("ArgumentError")], Some("e"), call(lvar("e"), "message", vec![]))],
        None,
        None,
    );
    assert_eq!(eval(&prog), Value::str("wrong number of arguments (given 1, expected 0)"));
}

#[test]
fn arity_ranges_bound_the_positional_count() {
    let optional = Arity::range(1, 3);
    assert!(!optional.accepts(0));
    assert!(optional.accepts(1) && optional.accepts(3));
    assert!(!optional.accepts(4));
    assert!(Arity::range(2, 2).accepts(2));
}

#[test]
#[should_panic(expected = "arity range with max below min")]
fn inverted_arity_range_is_rejected() {
    let _ = Arity::range(3, 1);
}

#[test]
fn host_defined_native_method_is_dispatched() {
    fn double(
        _rt: &mut Runtime,
        recv: &Value,
        _args: &[Value],
        _block: Option<&std::sync::Arc<garnet_runtime::runtime::closure::Block>>,
    ) -> garnet_runtime::runtime::Eval {
        Ok(Value::from(recv.as_int().unwrap_or(0) * 2))
    }
    let mut rt = runtime();
    let integer = rt.core().integer.clone();
    rt.define_method(&integer, "double", MethodSource::Native(double), Arity::exact(0), UnitFlags::empty())
        .unwrap();
    let out = rt.compile_and_run(&call(int(21), "double", vec![])).unwrap();
    assert_eq!(out.value, Value::from(42));
}

#[derive(Clone, Debug)]
enum Op {
    Define { class: usize, value: i64 },
    Dispatch { class: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..100i64).prop_map(|(class, value)| Op::Define { class, value }),
        (0..3usize).prop_map(|class| Op::Dispatch { class }),
    ]
}

const CLASSES: [&str; 3] = ["Base", "Mid", "Leaf"];

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48, max_shrink_iters: 200, .. ProptestConfig::default()
    })]
    #[test]
    fn cached_dispatch_agrees_with_fresh_lookup(ops in proptest::collection::vec(op(), 1..24)) {
        let mut rt = runtime();
        rt.compile_and_run(&lines(vec![
            class("Base", None, nil()),
            class("Mid", Some(constant("Base")), nil()),
            class("Leaf", Some(constant("Mid")), nil()),
        ]))
        .unwrap();
        let instances: Vec<Value> = CLASSES.iter().map(|c| new_instance(&mut rt, c)).collect();
        let cache = InlineCache::new();
        // Class `i` inherits from every class before it.
        let mut defined: [Option<i64>; 3] = [None; 3];

        for op in ops {
            match op {
                Op::Define { class, value } => {
                    let target = rt.lookup_class(CLASSES[class]).unwrap();
                    rt.define_method(&target, "m", returning(value), Arity::exact(0), UnitFlags::empty())
                        .unwrap();
                    defined[class] = Some(value);
                }
                Op::Dispatch { class } => {
                    let expected = defined[..=class].iter().rev().find_map(|v| *v);
                    let cached = rt.dispatch_cached(&cache, &instances[class], "m", vec![], None);
                    let fresh = rt.dispatch(&instances[class], "m", vec![], None);
                    match expected {
                        Some(v) => {
                            prop_assert_eq!(cached.unwrap(), Value::from(v));
                            prop_assert_eq!(fresh.unwrap(), Value::from(v));
                        }
                        None => {
                            let cached = cached.unwrap_err();
                            let fresh = fresh.unwrap_err();
                            prop_assert_eq!(cached.class_name(), Some("NoMethodError"));
                            prop_assert_eq!(fresh.class_name(), Some("NoMethodError"));
                        }
                    }
                }
            }
        }
    }
}
