//! Integration tests for the plugin output parser.
//!
//! These tests verify the documented parsing properties: unit stripping,
//! quoted metric names, separator handling and exit-code mapping, for both
//! the nagios and errplane output formats.

use chrono::{DateTime, Utc};
use vigil_agent::parser::{parse, CheckState, OutputFormat, ParseError};

fn ts() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[test]
fn test_unit_suffix_classes_reduce_to_magnitude() {
    let line = "OK | time=100ms;;;; wall=5s load=0.5% mem=10MB";
    let output = parse(OutputFormat::Nagios, 0, line, ts()).unwrap();
    let metrics = output.metrics.unwrap();

    assert_eq!(metrics["time"], 100.0);
    assert_eq!(metrics["wall"], 5.0);
    assert_eq!(metrics["load"], 0.5);
    assert_eq!(metrics["mem"], 10.0);
}

#[test]
fn test_quoted_names_round_trip() {
    let output = parse(
        OutputFormat::Nagios,
        0,
        "OK | 'my metric'=1 'it''s fine'=2",
        ts(),
    )
    .unwrap();
    let metrics = output.metrics.unwrap();

    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics["my metric"], 1.0);
    assert_eq!(metrics["it's fine"], 2.0);
}

#[test]
fn test_single_pipe_line_and_exit_code_mapping() {
    for (code, state) in [
        (0, CheckState::Ok),
        (1, CheckState::Warning),
        (2, CheckState::Critical),
        (3, CheckState::Unknown),
        (17, CheckState::Unknown),
    ] {
        let output = parse(OutputFormat::Nagios, code, "msg | a=1 b=2", ts()).unwrap();
        assert_eq!(output.state, state, "exit code {}", code);

        let metrics = output.metrics.unwrap();
        assert_eq!(metrics["a"], 1.0);
        assert_eq!(metrics["b"], 2.0);
    }
}

#[test]
fn test_multiple_pipes_return_no_partial_result() {
    let result = parse(OutputFormat::Nagios, 0, "msg | a=1 | b=2", ts());
    assert!(matches!(result, Err(ParseError::TooManySeparators)));
}

#[test]
fn test_errplane_populates_points_only() {
    let line = r#"ok | [{"name": "requests", "points": [{"value": 3.0}]}]"#;
    let output = parse(OutputFormat::Errplane, 0, line, ts()).unwrap();

    assert!(output.points.is_some());
    assert!(output.metrics.is_none());
    assert_eq!(output.points.unwrap()[0].name, "requests");
}

#[test]
fn test_errplane_malformed_json_is_error_not_panic() {
    let result = parse(OutputFormat::Errplane, 0, "ok | {broken", ts());
    assert!(matches!(result, Err(ParseError::InvalidJson(_))));
}

#[test]
fn test_errplane_splits_on_first_pipe_only() {
    // a second pipe lands inside the JSON segment and fails decoding -
    // inherited first-pipe-only behavior
    let result = parse(OutputFormat::Errplane, 0, "a | b | []", ts());
    assert!(matches!(result, Err(ParseError::InvalidJson(_))));
}

#[test]
fn test_parsing_is_pure_and_stateless() {
    let line = "WARNING high load | 'cpu load'=92% mem=512MB;600;700";
    let first = parse(OutputFormat::Nagios, 1, line, ts()).unwrap();
    let second = parse(OutputFormat::Nagios, 1, line, ts()).unwrap();
    assert_eq!(first, second);
}
