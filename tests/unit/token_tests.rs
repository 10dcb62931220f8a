//! Unit tests for policy token parsing and matching.

use trace_selector::{PolicyToken, Severity};

#[test]
fn severity_only_token_gates_on_minimum() {
    let token = PolicyToken::parse("WARNING").expect("token");

    assert!(!token.matches(Severity::Debug, None));
    assert!(token.matches(Severity::Warning, None));
    assert!(token.matches(Severity::Error, None));
    assert!(token.matches(Severity::Error, Some("anything")));
}

#[test]
fn pattern_token_requires_full_match() {
    let token = PolicyToken::parse(r"INFO:^ORD-\d+$").expect("token");

    assert!(token.matches(Severity::Info, Some("ORD-42")));
    assert!(!token.matches(Severity::Info, Some("XYZ")));
}

#[test]
fn failing_pattern_overrides_higher_severity() {
    let token = PolicyToken::parse(r"INFO:^ORD-\d+$").expect("token");
    assert!(!token.matches(Severity::Critical, Some("XYZ")));
}

#[test]
fn unanchored_pattern_is_still_full_match() {
    let token = PolicyToken::parse("INFO:ORD-1").expect("token");

    assert!(token.matches(Severity::Info, Some("ORD-1")));
    assert!(!token.matches(Severity::Info, Some("ORD-10")));
    assert!(!token.matches(Severity::Info, Some("xORD-1")));
}

#[test]
fn pattern_without_value_denies() {
    let token = PolicyToken::parse("INFO:.*").expect("token");
    assert!(!token.matches(Severity::Halt, None));
    assert!(token.matches(Severity::Info, Some("")));
}

#[test]
fn alternation_is_grouped_before_anchoring() {
    let token = PolicyToken::parse("DEBUG:a|b").expect("token");

    assert!(token.matches(Severity::Debug, Some("a")));
    assert!(token.matches(Severity::Debug, Some("b")));
    assert!(!token.matches(Severity::Debug, Some("ab")));
}

#[test]
fn severity_name_is_case_insensitive() {
    let token = PolicyToken::parse("error").expect("token");
    assert_eq!(token.minimum(), Severity::Error);
}

#[test]
fn raw_value_is_kept_for_round_trip() {
    let token = PolicyToken::parse("  warning:ORD-1 ").expect("token");
    assert_eq!(token.raw(), "warning:ORD-1");
    assert_eq!(token.to_string(), "warning:ORD-1");
}

#[test]
fn render_builds_raw_values() {
    assert_eq!(
        PolicyToken::render(Severity::Warning, Some("ORD-1")),
        "WARNING:ORD-1"
    );
    assert_eq!(PolicyToken::render(Severity::Info, None), "INFO");
}

#[test]
fn malformed_values_are_rejected() {
    for raw in ["NOT_A_SEVERITY", "", ":INFO", "INFO:[", "LOUD:.*"] {
        assert!(PolicyToken::parse(raw).is_err(), "{raw:?} must be rejected");
    }
}
