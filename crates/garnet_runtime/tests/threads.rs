mod common;

use common::{eval, eval_err, ints, runtime};
use garnet_ir::build::*;
use garnet_ir::Node;
use garnet_runtime::Value;

fn thread_new(body: Node) -> Node {
    call_block(Some(constant("Thread")), "new", vec![], block(&[], body))
}

fn wait_until(flag: &str) -> Node {
    until(gvar(flag), call(constant("Thread"), "pass", vec![]))
}

#[test]
fn value_returns_the_block_result() {
    let prog = lines(vec![
        lasgn("t", thread_new(call(int(6), "*", vec![int(7)]))),
        call(lvar("t"), "value", vec![]),
    ]);
    assert_eq!(eval(&prog), Value::from(42));
}

#[test]
fn threads_share_globals_and_captured_locals() {
    let prog = lines(vec![
        lasgn("acc", array(vec![])),
        lasgn(
            "workers",
            call_block(
                Some(array(vec![int(1), int(2), int(3)])),
                "map",
                vec![],
                block(&["n"], thread_new(call(lvar("acc"), "<<", vec![call(lvar("n"), "*", vec![int(10)])]))),
            ),
        ),
        call_block(Some(lvar("workers")), "each", vec![], block(&["w"], call(lvar("w"), "join", vec![]))),
        call(lvar("acc"), "sort", vec![]),
    ]);
    assert_eq!(ints(&eval(&prog)), [10, 20, 30]);
}

#[test]
fn kill_runs_the_ensure_clause() {
    let prog = lines(vec![
        lasgn(
            "t",
            thread_new(begin(
                seq(vec![gasgn("$started", true_()), fcall("sleep", vec![])]),
                vec![],
                None,
                Some(gasgn("$cleaned", sym("yes"))),
            )),
        ),
        wait_until("$started"),
        call(lvar("t"), "kill", vec![]),
        call(lvar("t"), "join", vec![]),
        array(vec![gvar("$cleaned"), call(lvar("t"), "alive?", vec![]), call(lvar("t"), "status", vec![])]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::sym("yes"), Value::FALSE, Value::Nil])
    );
}

#[test]
fn ensure_clause_of_a_killed_thread_can_call_methods() {
    let prog = lines(vec![
        lasgn(
            "t",
            thread_new(begin(
                seq(vec![gasgn("$started", true_()), fcall("sleep", vec![])]),
                vec![],
                None,
                Some(gasgn(
                    "$cleaned",
                    call_block(
                        Some(array(vec![str("y"), str("es")])),
                        "map",
                        vec![],
                        block(&["s"], call(lvar("s"), "upcase", vec![])),
                    ),
                )),
            )),
        ),
        wait_until("$started"),
        call(lvar("t"), "kill", vec![]),
        call(lvar("t"), "join", vec![]),
        call(gvar("$cleaned"), "join", vec![]),
    ]);
    assert_eq!(eval(&prog), Value::str("YES"));
}

#[test]
fn thread_killing_itself_still_runs_its_ensure_clause() {
    let prog = lines(vec![
        lasgn(
            "t",
            thread_new(begin(
                seq(vec![call(call(constant("Thread"), "current", vec![]), "kill", vec![]), gasgn("$after", true_())]),
                vec![],
                None,
                Some(gasgn("$cleaned", call(str("done"), "upcase", vec![]))),
            )),
        ),
        call(lvar("t"), "join", vec![]),
        array(vec![gvar("$cleaned"), gvar("$after")]),
    ]);
    assert_eq!(eval(&prog), Value::array(vec![Value::str("DONE"), Value::Nil]));
}

#[test]
fn sleep_rejects_intervals_it_cannot_represent() {
    let cases = [
        (f64::NAN, "FloatDomainError", "NaN"),
        (f64::INFINITY, "FloatDomainError", "Infinity"),
        (-1.0, "ArgumentError", "time interval must not be negative"),
        (1e300, "RangeError", "time interval 1.0e+300 out of range"),
    ];
    for (secs, class, message) in cases {
        let err = eval_err(&fcall("sleep", vec![float(secs)]));
        assert_eq!(err.class_name(), Some(class), "sleep({secs})");
        assert_eq!(err.message(), message);
    }
}

#[test]
fn exception_in_thread_is_reraised_by_join() {
    let prog = lines(vec![
        lasgn("t", thread_new(raise(vec![constant("ArgumentError"), str("bad input")]))),
        begin(
            call(lvar("t"), "join", vec![]),
            vec![rescue(vec![constant("ArgumentError")], Some("e"), call(lvar("e"), "message", vec![]))],
            None,
            None,
        ),
    ]);
    assert_eq!(eval(&prog), Value::str("bad input"));
}

#[test]
fn wakeup_ends_an_untimed_sleep() {
    let prog = lines(vec![
        lasgn(
            "t",
            thread_new(seq(vec![gasgn("$ready", true_()), fcall("sleep", vec![]), sym("woke")])),
        ),
        wait_until("$ready"),
        until(
            call(call(lvar("t"), "status", vec![]), "==", vec![str("sleep")]),
            call(constant("Thread"), "pass", vec![]),
        ),
        call(lvar("t"), "wakeup", vec![]),
        call(lvar("t"), "value", vec![]),
    ]);
    assert_eq!(eval(&prog), Value::sym("woke"));
}

#[test]
fn timed_join_returns_nil_while_the_thread_sleeps() {
    let prog = lines(vec![
        lasgn("t", thread_new(fcall("sleep", vec![]))),
        lasgn("early", call(lvar("t"), "join", vec![float(0.05)])),
        call(lvar("t"), "kill", vec![]),
        call(lvar("t"), "join", vec![]),
        lvar("early"),
    ]);
    assert_eq!(eval(&prog), Value::Nil);
}

#[test]
fn joining_the_current_thread_is_an_error() {
    let err = eval_err(&call(call(constant("Thread"), "current", vec![]), "join", vec![]));
    assert_eq!(err.class_name(), Some("ThreadError"));
}

#[test]
fn thread_locals_are_per_thread() {
    let prog = lines(vec![
        index_asgn(call(constant("Thread"), "current", vec![]), vec![sym("name")], str("main")),
        lasgn(
            "t",
            thread_new(seq(vec![
                index_asgn(call(constant("Thread"), "current", vec![]), vec![sym("name")], str("worker")),
                call(call(constant("Thread"), "current", vec![]), "[]", vec![sym("name")]),
            ])),
        ),
        array(vec![
            call(lvar("t"), "value", vec![]),
            call(call(constant("Thread"), "current", vec![]), "[]", vec![sym("name")]),
        ]),
    ]);
    assert_eq!(
        eval(&prog),
        Value::array(vec![Value::str("worker"), Value::str("main")])
    );
}

#[test]
fn host_can_run_a_second_interpreter_on_the_same_vm() {
    let mut rt = runtime();
    rt.compile_and_run(&gasgn("$shared", int(5))).unwrap();
    let mut other = garnet_runtime::Runtime::with_vm(rt.vm().clone());
    let out = other.compile_and_run(&call(gvar("$shared"), "+", vec![int(1)])).unwrap();
    assert_eq!(out.value, Value::from(6));
}
