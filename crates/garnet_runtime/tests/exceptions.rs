mod common;

use common::{eval, eval_err, runtime};
use garnet_ir::build::*;
use garnet_ir::Node;
use garnet_runtime::{ExecError, Value};

fn log(tag: &str) -> Node {
    call(gvar("$log"), "<<", vec![sym(tag)])
}

fn logged(rt_prog: Vec<Node>) -> Node {
    let mut items = vec![gasgn("$log", array(vec![]))];
    items.extend(rt_prog);
    items.push(gvar("$log"));
    lines(items)
}

fn syms(value: &Value) -> Vec<String> {
    value
        .as_array()
        .expect("array")
        .to_vec()
        .iter()
        .map(|v| v.as_sym().expect("symbol").as_str().to_string())
        .collect()
}

fn error_classes() -> Vec<Node> {
    vec![
        class("GeneralError", Some(constant("StandardError")), nil()),
        class("SpecificError", Some(constant("GeneralError")), nil()),
    ]
}

#[test]
fn ensure_runs_after_normal_completion() {
    let prog = logged(vec![begin(log("body"), vec![], None, Some(log("ensure")))]);
    assert_eq!(syms(&eval(&prog)), ["body", "ensure"]);
}

#[test]
fn ensure_runs_after_rescue_and_else() {
    let prog = logged(vec![
        begin(
            seq(vec![log("body"), raise(vec![str("boom")]), log("unreached")]),
            vec![rescue(vec![], None, log("rescue"))],
            Some(log("else")),
            Some(log("ensure")),
        ),
        begin(log("body2"), vec![rescue(vec![], None, log("rescue2"))], Some(log("else2")), Some(log("ensure2"))),
    ]);
    assert_eq!(
        syms(&eval(&prog)),
        ["body", "rescue", "ensure", "body2", "else2", "ensure2"]
    );
}

#[test]
fn ensure_runs_when_a_method_returns_early() {
    let prog = logged(vec![
        def(
            "early",
            &[],
            begin(seq(vec![log("body"), return_(Some(int(7))), log("unreached")]), vec![], None, Some(log("ensure"))),
        ),
        gasgn("$result", fcall("early", vec![])),
    ]);
    let mut rt = runtime();
    let out = rt.compile_and_run(&prog).unwrap().value;
    assert_eq!(syms(&out), ["body", "ensure"]);
    assert_eq!(rt.global_get("$result"), Value::from(7));
}

#[test]
fn ensure_runs_when_breaking_out_of_a_loop() {
    let prog = logged(vec![while_(
        true_(),
        begin(seq(vec![log("body"), break_(None)]), vec![], None, Some(log("ensure"))),
    )]);
    assert_eq!(syms(&eval(&prog)), ["body", "ensure"]);
}

#[test]
fn ensure_runs_while_an_exception_propagates() {
    let prog = logged(vec![
        def("inner", &[], begin(seq(vec![log("inner"), raise(vec![str("x")])]), vec![], None, Some(log("inner_ensure")))),
        begin(fcall("inner", vec![]), vec![rescue(vec![], None, log("outer_rescue"))], None, Some(log("outer_ensure"))),
    ]);
    assert_eq!(syms(&eval(&prog)), ["inner", "inner_ensure", "outer_rescue", "outer_ensure"]);
}

#[test]
fn ensure_value_does_not_replace_the_result() {
    let prog = begin(int(1), vec![], None, Some(int(2)));
    assert_eq!(eval(&prog), Value::from(1));
}

#[test]
fn first_matching_rescue_clause_wins() {
    let mut items = error_classes();
    items.push(begin(
        raise(vec![constant("SpecificError")]),
        vec![
            rescue(vec![constant("GeneralError")], Some("e"), sym("general")),
            rescue(vec![constant("SpecificError")], Some("e"), sym("specific")),
        ],
        None,
        None,
    ));
    assert_eq!(eval(&lines(items)), Value::sym("general"));
}

#[test]
fn specific_clause_listed_first_is_chosen() {
    let mut items = error_classes();
    items.push(begin(
        raise(vec![constant("SpecificError")]),
        vec![
            rescue(vec![constant("SpecificError")], Some("e"), sym("specific")),
            rescue(vec![constant("GeneralError")], Some("e"), sym("general")),
        ],
        None,
        None,
    ));
    assert_eq!(eval(&lines(items)), Value::sym("specific"));
}

#[test]
fn unmatched_exception_passes_through_rescue() {
    let mut items = error_classes();
    items.push(begin(
        raise(vec![constant("ArgumentError"), str("nope")]),
        vec![rescue(vec![constant("GeneralError")], None, sym("general"))],
        None,
        None,
    ));
    match eval_err(&lines(items)) {
        ExecError::Uncaught { class, message, .. } => {
            assert_eq!(class, "ArgumentError");
            assert_eq!(message, "nope");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn rescued_exception_is_bound_and_visible_as_last_error() {
    let prog = begin(
        raise(vec![str("kaboom")]),
        vec![rescue(
            vec![],
            Some("e"),
            array(vec![
                call(lvar("e"), "message", vec![]),
                call(call(gvar("$!"), "class", vec![]), "name", vec![]),
            ]),
        )],
        None,
        None,
    );
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::str("kaboom"), Value::str("RuntimeError")])
    );
}

#[test]
fn retry_reruns_the_protected_body() {
    let prog = lines(vec![
        lasgn("tries", int(0)),
        begin(
            seq(vec![
                lasgn("tries", call(lvar("tries"), "+", vec![int(1)])),
                if_(call(lvar("tries"), "<", vec![int(3)]), raise(vec![str("again")]), None),
                lvar("tries"),
            ]),
            vec![rescue(vec![], None, Node::Retry)],
            None,
            None,
        ),
    ]);
    assert_eq!(eval(&prog), Value::from(3));
}

#[test]
fn uncaught_error_reports_a_backtrace() {
    let prog = lines(vec![
        def("explode", &[], raise(vec![str("deep")])),
        fcall("explode", vec![]),
    ]);
    match eval_err(&prog) {
        ExecError::Uncaught { class, message, backtrace } => {
            assert_eq!(class, "RuntimeError");
            assert_eq!(message, "deep");
            assert!(backtrace.iter().any(|l| l.contains("explode")), "{backtrace:?}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn stray_break_is_a_bad_control_transfer() {
    let prog = begin(break_(None), vec![rescue(vec![constant("Exception")], None, sym("caught"))], None, None);
    assert_eq!(eval_err(&prog), ExecError::BadControlTransfer("break".into()));
}

#[test]
fn stray_retry_is_a_bad_control_transfer() {
    assert_eq!(eval_err(&Node::Retry), ExecError::BadControlTransfer("retry".into()));
}

#[test]
fn raise_with_non_exception_is_a_type_error() {
    let err = eval_err(&raise(vec![int(3)]));
    assert_eq!(err.class_name(), Some("TypeError"));
}

#[test]
fn deep_recursion_raises_system_stack_error() {
    let prog = lines(vec![
        def("down", &["n"], fcall("down", vec![call(lvar("n"), "+", vec![int(1)])])),
        begin(
            fcall("down", vec![int(0)]),
            vec![rescue(vec![constant("SystemStackError")], None, sym("overflow"))],
            None,
            None,
        ),
    ]);
    assert_eq!(eval(&prog), Value::sym("overflow"));
}
