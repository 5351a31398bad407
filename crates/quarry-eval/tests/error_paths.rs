use quarry_eval::{EvalError, Expression, Schema};
use quarry_parser::ParseError;

fn compile_err(query: &str) -> ParseError {
    match Expression::compile(query, Schema::default()).unwrap_err() {
        EvalError::Parse(e) => e,
        other => panic!("expected a parse error, got {other}"),
    }
}

#[test]
fn empty_query_has_its_own_kind() {
    assert!(matches!(compile_err(""), ParseError::Empty));
    assert!(matches!(compile_err("  \n "), ParseError::Empty));
}

#[test]
fn syntax_error_carries_query_and_location() {
    match compile_err("name == ") {
        ParseError::Syntax {
            query, location, ..
        } => {
            assert_eq!(query, "name == ");
            assert_eq!(location.line, 1);
            assert!(location.col > 1);
        }
        other => panic!("expected syntax error, got {other:?}"),
    }
}

#[test]
fn garbage_is_a_syntax_error() {
    assert!(matches!(compile_err("&& ||"), ParseError::Syntax { .. }));
    assert!(matches!(compile_err("@ == 1"), ParseError::Syntax { .. }));
}

#[test]
fn match_against_non_regex_is_semantic() {
    assert!(matches!(
        compile_err(r#"name ~ "http""#),
        ParseError::Semantic { .. }
    ));
}

#[test]
fn in_against_scalar_is_semantic() {
    assert!(matches!(
        compile_err(":addr in 5"),
        ParseError::Semantic { .. }
    ));
}

#[test]
fn time_against_integer_is_semantic() {
    assert!(matches!(
        compile_err("time > 5"),
        ParseError::Semantic { .. }
    ));
}

#[test]
fn id_against_string_is_semantic() {
    assert!(matches!(
        compile_err(r#"id == "7""#),
        ParseError::Semantic { .. }
    ));
}

#[test]
fn order_on_regex_is_semantic() {
    assert!(matches!(
        compile_err("name < /x/"),
        ParseError::Semantic { .. }
    ));
}

#[test]
fn unfoldable_arithmetic_is_semantic() {
    // Mixing tags in constant arithmetic cannot fold.
    assert!(matches!(
        compile_err(r#"@0 == 1 + "x""#),
        ParseError::Semantic { .. }
    ));
    assert!(matches!(
        compile_err("@0 == 1 / 0"),
        ParseError::Semantic { .. }
    ));
}

#[test]
fn semantic_errors_are_found_inside_groups() {
    assert!(matches!(
        compile_err(r#"name == "a" || !(time > 5)"#),
        ParseError::Semantic { .. }
    ));
}

#[test]
fn error_display_mentions_the_query() {
    let err = compile_err(r#"name ~ "http""#);
    let message = err.to_string();
    assert!(message.contains(r#"name ~ "http""#), "got: {message}");
}
