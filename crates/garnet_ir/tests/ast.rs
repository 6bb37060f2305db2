use garnet_ir::build::*;
use garnet_ir::{Node, Params};

#[test]
fn tree_survives_json() {
    let prog = lines(vec![
        class(
            "Counter",
            None,
            seq(vec![def("bump", &["n"], op_asgn(garnet_ir::OpTarget::Ivar("@count".into()), "+", lvar("n")))]),
        ),
        begin(
            call(call(constant("Counter"), "new", vec![]), "bump", vec![int(2)]),
            vec![rescue(vec![constant("StandardError")], Some("e"), nil())],
            None,
            Some(gasgn("$done", true_())),
        ),
    ]);
    let json = serde_json::to_string(&prog).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(prog, back);
}

#[test]
fn duplicate_parameter_is_reported_unless_underscored() {
    let params = Params {
        required: vec!["a".to_string(), "a".to_string()].into(),
        ..Params::default()
    };
    let diag = params.check().expect("duplicate reported");
    assert!(diag.message.contains("`a'"), "{}", diag.message);

    let params = Params {
        required: vec!["_".to_string(), "_".to_string()].into(),
        ..Params::default()
    };
    assert!(params.check().is_none());
}

#[test]
fn names_follow_declaration_order_and_skip_anonymous_rest() {
    let params = Params {
        required: vec!["a".to_string()].into(),
        optional: vec![("b".to_string(), int(1))].into(),
        rest: Some(String::new()),
        post: vec!["c".to_string()].into(),
        block: Some("blk".to_string()),
    };
    assert_eq!(params.names().collect::<Vec<_>>(), ["a", "b", "c", "blk"]);
    assert!(!params.is_empty());
    assert!(Params::default().is_empty());
}

#[test]
fn empty_bodies_see_through_newlines() {
    assert!(seq(vec![line(1, nil()), line(2, seq(vec![]))]).is_empty_body());
    assert!(!line(1, int(1)).is_empty_body());
    assert!(int(3).is_literal());
    assert!(!lvar("x").is_literal());
}
