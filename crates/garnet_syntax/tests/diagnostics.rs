use garnet_syntax::{
    Diagnostic, DiagnosticKind, DiagnosticsFormatter, codes, find_best_match, levenshtein_distance,
    plain_symbol_name,
};

#[test]
fn argument_count_messages_cover_fixed_ranged_and_open_arity() {
    let fixed = DiagnosticKind::ArgumentCount {
        given: 3,
        expected_min: 2,
        expected_max: Some(2),
    };
    let ranged = DiagnosticKind::ArgumentCount {
        given: 0,
        expected_min: 1,
        expected_max: Some(3),
    };
    let open = DiagnosticKind::ArgumentCount {
        given: 0,
        expected_min: 1,
        expected_max: None,
    };
    assert_eq!(
        DiagnosticsFormatter::format(&fixed),
        "wrong number of arguments (given 3, expected 2)"
    );
    assert_eq!(
        DiagnosticsFormatter::format(&ranged),
        "wrong number of arguments (given 0, expected 1..3)"
    );
    assert_eq!(
        DiagnosticsFormatter::format(&open),
        "wrong number of arguments (given 0, expected 1+)"
    );
}

#[test]
fn missing_method_messages_name_the_receiver() {
    let kind = DiagnosticKind::PrivateMethod {
        name: "secret".into(),
        recv: "an instance of Vault".into(),
    };
    assert_eq!(
        DiagnosticsFormatter::format(&kind),
        "private method `secret' called for an instance of Vault"
    );
    let kind = DiagnosticKind::UndefinedLocalOrMethod {
        name: "fo".into(),
        recv: "main:Object".into(),
    };
    assert_eq!(
        DiagnosticsFormatter::format(&kind),
        "undefined local variable or method `fo' for main:Object"
    );
}

#[test]
fn rendered_warning_carries_line_and_code() {
    let d = Diagnostic::warning_kind(DiagnosticKind::InvalidJump("break"), Some(7))
        .with_code(codes::INVALID_JUMP);
    let out = d.render("main.rb");
    assert!(out.starts_with("main.rb:7: warning: "), "{out}");
    assert!(out.ends_with("[W0001]"), "{out}");
}

#[test]
fn best_match_prefers_the_closest_candidate() {
    let names = ["length", "lstrip", "upcase"];
    assert_eq!(find_best_match("lenght", names.iter().copied()), Some("length"));
    assert_eq!(find_best_match("zzzzzz", names.iter().copied()), None);
    assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
}

#[test]
fn symbol_names_that_print_without_quotes() {
    for name in ["foo", "foo?", "bar=", "save!", "@ivar", "@@cvar", "$glob", "+", "[]="] {
        assert!(plain_symbol_name(name), "{name}");
    }
    for name in ["", "foo bar", "9lives", "a-b"] {
        assert!(!plain_symbol_name(name), "{name}");
    }
}

#[test]
fn unreachable_code_renders_without_a_line() {
    let d = Diagnostic::warning_kind(DiagnosticKind::UnreachableAfterReturn, None)
        .with_code(codes::UNREACHABLE_CODE);
    assert_eq!(d.render("lib.rb"), "lib.rb: warning: statement not reached [W0002]");
}

#[test]
fn invalid_name_message() {
    let kind = DiagnosticKind::InvalidName {
        kind: "an instance variable",
        name: "count".into(),
    };
    assert_eq!(
        DiagnosticsFormatter::format(&kind),
        "`count' is not allowed as an instance variable name"
    );
}

#[test]
fn help_note_follows_the_message() {
    let d = Diagnostic::warning_kind(DiagnosticKind::InvalidJump("retry"), Some(3))
        .with_code(codes::INVALID_JUMP)
        .with_help("retry is only valid inside a rescue clause");
    let out = d.render("main.rb");
    assert!(out.ends_with("[W0001]\n  = help: retry is only valid inside a rescue clause"), "{out}");
}
