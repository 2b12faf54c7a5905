//! Plugin output parsing.
//!
//! This module converts the first output line of a check plugin (plus its
//! exit code) into a structured [`PluginOutput`]. Two formats are supported:
//! `errplane` (message + JSON point writes) and `nagios` (message + optional
//! perfdata). Parsing is pure: the same inputs always produce the same output.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transport::PointWrite;

/// Check outcome reported through the plugin's exit code.
///
/// Ordinals mirror the standard check-plugin convention (0-3); any other
/// exit code maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl CheckState {
    /// Total mapping from a process exit code to a check state.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => CheckState::Ok,
            1 => CheckState::Warning,
            2 => CheckState::Critical,
            _ => CheckState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckState::Ok => "ok",
            CheckState::Warning => "warning",
            CheckState::Critical => "critical",
            CheckState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format declared by a plugin's descriptor.
///
/// Closed enum: unknown format strings are rejected when the descriptor is
/// deserialized, before any invocation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Errplane,
    Nagios,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Errplane => f.write_str("errplane"),
            OutputFormat::Nagios => f.write_str("nagios"),
        }
    }
}

/// Structured result of one plugin invocation.
///
/// Exactly one of `points` / `metrics` is populated, depending on the
/// plugin's output format.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginOutput {
    pub state: CheckState,
    pub message: String,
    /// Pre-shaped point writes (errplane format only).
    pub points: Option<Vec<PointWrite>>,
    /// Metric name to numeric value (nagios format only).
    pub metrics: Option<HashMap<String, f64>>,
    pub timestamp: DateTime<Utc>,
}

/// Errors that discard the whole invocation for the cycle.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("errplane output is missing the '|' separator")]
    MissingSeparator,

    #[error("invalid JSON in errplane metrics segment: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("nagios output has more than one '|' separator")]
    TooManySeparators,
}

/// Parses one plugin output line according to the plugin's declared format.
///
/// `timestamp` is the capture time recorded on the result; passing it in
/// keeps the function pure and the output reproducible.
pub fn parse(
    format: OutputFormat,
    exit_code: i32,
    first_line: &str,
    timestamp: DateTime<Utc>,
) -> Result<PluginOutput, ParseError> {
    match format {
        OutputFormat::Errplane => parse_errplane(exit_code, first_line, timestamp),
        OutputFormat::Nagios => parse_nagios(exit_code, first_line, timestamp),
    }
}

/// Parses `<message> | <json-array-of-point-writes>`.
///
/// The line is split on the first `|` only; a message containing `|` will
/// corrupt the JSON segment and fail the invocation.
fn parse_errplane(
    exit_code: i32,
    first_line: &str,
    timestamp: DateTime<Utc>,
) -> Result<PluginOutput, ParseError> {
    let line = first_line.trim();
    let (message, json) = line.split_once('|').ok_or(ParseError::MissingSeparator)?;

    let writes: Vec<PointWrite> = serde_json::from_str(json.trim())?;

    Ok(PluginOutput {
        state: CheckState::from_exit_code(exit_code),
        message: message.trim().to_string(),
        points: Some(writes),
        metrics: None,
        timestamp,
    })
}

/// Parses `<message>` or `<message> | <perfdata>`.
fn parse_nagios(
    exit_code: i32,
    first_line: &str,
    timestamp: DateTime<Utc>,
) -> Result<PluginOutput, ParseError> {
    let line = first_line.trim();
    let segments: Vec<&str> = line.split('|').collect();

    let (message, perfdata) = match segments.as_slice() {
        [message] => (message.trim(), None),
        [message, perfdata] => (message.trim(), Some(perfdata.trim())),
        _ => return Err(ParseError::TooManySeparators),
    };

    let metrics = match perfdata {
        Some(segment) => reduce_metrics(tokenize_perfdata(segment)),
        None => HashMap::new(),
    };

    Ok(PluginOutput {
        state: CheckState::from_exit_code(exit_code),
        message: message.to_string(),
        points: None,
        metrics: Some(metrics),
        timestamp,
    })
}

/// Tokenizer state for the perfdata mini-language.
enum TokenizerState {
    Start,
    InQuotedField,
    InValue,
}

/// Splits a perfdata segment into raw `name -> value` pairs.
///
/// Metric names may be single-quote-delimited and contain spaces; a doubled
/// quote (`''`) inside a quoted name is a literal quote. An unquoted value
/// ends when the next `name=` token begins, detected by seeing another `=`
/// while in the value state, not by whitespace alone.
fn tokenize_perfdata(segment: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let mut state = TokenizerState::Start;
    let mut name = String::new();
    let mut value = String::new();
    let mut token = String::new();

    let chars: Vec<char> = segment.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\'' => match state {
                TokenizerState::InQuotedField => {
                    // a doubled quote inside a quoted name is a literal quote;
                    // otherwise this closes the name and a '=' should follow
                    if chars.get(i + 1) == Some(&'\'') {
                        token.push('\'');
                        i += 1;
                    }
                }
                TokenizerState::InValue => {
                    // a quote while reading a value starts the next metric
                    value.push_str(&token);
                    token.clear();
                    if !name.is_empty() {
                        pairs.insert(std::mem::take(&mut name), std::mem::take(&mut value));
                    } else {
                        name.clear();
                        value.clear();
                    }
                    state = TokenizerState::InQuotedField;
                }
                TokenizerState::Start => {
                    state = TokenizerState::InQuotedField;
                }
            },
            '=' => match state {
                TokenizerState::InValue => {
                    // a second '=' means the accumulated token is the next
                    // metric's name, e.g. `a=1 b=2` seen from inside `a`'s value
                    if !name.is_empty() {
                        pairs.insert(name.clone(), value.clone());
                    }
                    name = std::mem::take(&mut token);
                    value.clear();
                }
                TokenizerState::Start => {
                    name = std::mem::take(&mut token);
                    value.clear();
                    state = TokenizerState::InValue;
                }
                TokenizerState::InQuotedField => {
                    // quoted name finished, value follows
                    name.push_str(&token);
                    token.clear();
                    state = TokenizerState::InValue;
                }
            },
            ' ' => match state {
                TokenizerState::InValue => {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(&token);
                    token.clear();
                }
                TokenizerState::InQuotedField => {
                    name.push_str(&token);
                    name.push(' ');
                    token.clear();
                }
                TokenizerState::Start => {
                    token.clear();
                }
            },
            c => token.push(c),
        }
        i += 1;
    }

    if !value.is_empty() && !token.is_empty() {
        value.push(' ');
    }
    value.push_str(&token);
    if !name.is_empty() {
        pairs.insert(name, value);
    }

    pairs
}

/// Reduces raw perfdata values to numeric magnitudes.
///
/// Strips the threshold/min/max fields (everything from the first `;`),
/// drops empty values, strips a known unit suffix, and parses the rest as a
/// float. A value that still fails to parse is dropped; the remaining
/// metrics survive.
fn reduce_metrics(raw: HashMap<String, String>) -> HashMap<String, f64> {
    let mut metrics = HashMap::new();

    for (name, value) in raw {
        let magnitude = value
            .trim()
            .split(';')
            .next()
            .unwrap_or_default();
        if magnitude.is_empty() {
            continue;
        }

        let stripped = strip_unit(magnitude);
        match stripped.parse::<f64>() {
            Ok(parsed) => {
                metrics.insert(name, parsed);
            }
            Err(err) => {
                debug!(
                    "Cannot parse the value of metric {} into a float: {}",
                    name, err
                );
            }
        }
    }

    metrics
}

/// Strips a known unit suffix from a perfdata value.
///
/// Two-character units are checked before one-character units so `ms` is
/// not mistaken for `s` and `KB` is not mistaken for `B`.
fn strip_unit(value: &str) -> &str {
    for unit in ["ms", "us", "KB", "MB", "GB"] {
        if let Some(stripped) = value.strip_suffix(unit) {
            return stripped;
        }
    }
    for unit in ["s", "B", "%", "c"] {
        if let Some(stripped) = value.strip_suffix(unit) {
            return stripped;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn nagios_metrics(line: &str) -> HashMap<String, f64> {
        parse(OutputFormat::Nagios, 0, line, ts())
            .unwrap()
            .metrics
            .unwrap()
    }

    #[test]
    fn exit_codes_map_to_states() {
        assert_eq!(CheckState::from_exit_code(0), CheckState::Ok);
        assert_eq!(CheckState::from_exit_code(1), CheckState::Warning);
        assert_eq!(CheckState::from_exit_code(2), CheckState::Critical);
        assert_eq!(CheckState::from_exit_code(3), CheckState::Unknown);
        assert_eq!(CheckState::from_exit_code(42), CheckState::Unknown);
        assert_eq!(CheckState::from_exit_code(-1), CheckState::Unknown);
    }

    #[test]
    fn nagios_without_perfdata_is_status_only() {
        let output = parse(OutputFormat::Nagios, 1, "disk almost full", ts()).unwrap();
        assert_eq!(output.state, CheckState::Warning);
        assert_eq!(output.message, "disk almost full");
        assert_eq!(output.metrics, Some(HashMap::new()));
        assert!(output.points.is_none());
    }

    #[test]
    fn nagios_simple_metrics() {
        let metrics = nagios_metrics("OK | a=1 b=2");
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics["a"], 1.0);
        assert_eq!(metrics["b"], 2.0);
    }

    #[test]
    fn nagios_two_pipes_is_an_error() {
        let result = parse(OutputFormat::Nagios, 0, "OK | a=1 | b=2", ts());
        assert!(matches!(result, Err(ParseError::TooManySeparators)));
    }

    #[test]
    fn unit_suffixes_are_stripped() {
        let metrics = nagios_metrics(
            "OK | time=100ms;;;; wait=5s lat=30us load=0.5% mem=10MB disk=2GB buf=64KB raw=7B hits=12c",
        );
        assert_eq!(metrics["time"], 100.0);
        assert_eq!(metrics["wait"], 5.0);
        assert_eq!(metrics["lat"], 30.0);
        assert_eq!(metrics["load"], 0.5);
        assert_eq!(metrics["mem"], 10.0);
        assert_eq!(metrics["disk"], 2.0);
        assert_eq!(metrics["buf"], 64.0);
        assert_eq!(metrics["raw"], 7.0);
        assert_eq!(metrics["hits"], 12.0);
    }

    #[test]
    fn thresholds_are_stripped() {
        let metrics = nagios_metrics("OK | users=4;10;20;0;50");
        assert_eq!(metrics["users"], 4.0);
    }

    #[test]
    fn quoted_name_with_spaces() {
        let metrics = nagios_metrics("OK | 'my metric'=1");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics["my metric"], 1.0);
    }

    #[test]
    fn quoted_name_with_escaped_quote() {
        let metrics = nagios_metrics("OK | 'it''s fine'=2");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics["it's fine"], 2.0);
    }

    #[test]
    fn mixed_quoted_and_unquoted_names() {
        let metrics = nagios_metrics("OK | 'page faults'=3 swap=1KB 'c: used'=80%");
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics["page faults"], 3.0);
        assert_eq!(metrics["swap"], 1.0);
        assert_eq!(metrics["c: used"], 80.0);
    }

    #[test]
    fn unparsable_value_drops_only_that_metric() {
        let metrics = nagios_metrics("OK | good=1 bad=oops also=2");
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics["good"], 1.0);
        assert_eq!(metrics["also"], 2.0);
    }

    #[test]
    fn empty_value_is_dropped() {
        let metrics = nagios_metrics("OK | empty=;10;20 real=3");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics["real"], 3.0);
    }

    #[test]
    fn bare_unit_value_is_dropped_not_panicking() {
        // a value that is nothing but a unit letter reduces to an empty
        // string and must not parse
        let metrics = nagios_metrics("OK | weird=s fine=1");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics["fine"], 1.0);
    }

    #[test]
    fn errplane_decodes_points() {
        let line = r#"ok | [{"name": "queue.depth", "points": [{"value": 12.5, "dimensions": {"shard": "a"}}]}]"#;
        let output = parse(OutputFormat::Errplane, 0, line, ts()).unwrap();
        assert_eq!(output.state, CheckState::Ok);
        assert_eq!(output.message, "ok");
        assert!(output.metrics.is_none());

        let points = output.points.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].name, "queue.depth");
        assert_eq!(points[0].points[0].value, 12.5);
        assert_eq!(points[0].points[0].dimensions["shard"], "a");
    }

    #[test]
    fn errplane_without_pipe_is_an_error() {
        let result = parse(OutputFormat::Errplane, 0, "all good", ts());
        assert!(matches!(result, Err(ParseError::MissingSeparator)));
    }

    #[test]
    fn errplane_bad_json_is_an_error() {
        let result = parse(OutputFormat::Errplane, 0, "ok | [{not json", ts());
        assert!(matches!(result, Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn parsing_is_idempotent() {
        let line = "WARNING: queue deep | 'queue depth'=120c wait=15ms;20;30";
        let first = parse(OutputFormat::Nagios, 1, line, ts()).unwrap();
        let second = parse(OutputFormat::Nagios, 1, line, ts()).unwrap();
        assert_eq!(first, second);
    }
}
