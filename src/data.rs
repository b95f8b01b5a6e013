use std::{fmt, sync::OnceLock};

use regex::Regex;

/// Largest magnitude a float can hold while still representing every integer.
const MAX_SAFE_NUMBER: f64 = 9_007_199_254_740_992.0;
/// Magnitudes below this render in exponent form (`1e-7`).
const MIN_PLAIN_NUMBER: f64 = 1e-6;

/// A single parsed cell.
///
/// Cells may surface as different variants in the same column across rows.
/// Storage collapses them all to text, so the variant only affects how the
/// bound parameter is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Renders the value as the text bound to an insert parameter.
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(render_number(*n)),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Null => None,
        }
    }

    pub fn as_display(&self) -> String {
        self.to_sql_text().unwrap_or_default()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Shortest text that reads back as `n`, with `-0` as `0` and tiny
/// magnitudes in exponent form.
fn render_number(n: f64) -> String {
    if n == 0.0 {
        "0".to_string()
    } else if n.abs() < MIN_PLAIN_NUMBER {
        format!("{n:e}")
    } else {
        n.to_string()
    }
}

fn float_pattern() -> &'static Regex {
    static FLOAT: OnceLock<Regex> = OnceLock::new();
    FLOAT.get_or_init(|| {
        Regex::new(r"^\s*-?(\d+\.?|\.\d+|\d+\.\d+)([eE][-+]?\d+)?\s*$")
            .expect("float pattern is valid")
    })
}

/// Maps a raw cell to a [`Value`] the way a header-mode CSV parser with
/// dynamic typing does: empty → null, `true`/`false` → boolean, numeric
/// literal → number, everything else verbatim text.
pub fn infer_value(raw: &str) -> Value {
    match raw {
        "" => Value::Null,
        "true" | "TRUE" => Value::Boolean(true),
        "false" | "FALSE" => Value::Boolean(false),
        _ => parse_number(raw)
            .map(Value::Number)
            .unwrap_or_else(|| Value::Text(raw.to_string())),
    }
}

/// Keeps every non-empty cell as text.
pub fn literal_value(raw: &str) -> Value {
    if raw.is_empty() {
        Value::Null
    } else {
        Value::Text(raw.to_string())
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    if !float_pattern().is_match(raw) {
        return None;
    }
    let parsed: f64 = raw.trim().parse().ok()?;
    if parsed.is_finite() && parsed.abs() <= MAX_SAFE_NUMBER {
        Some(parsed)
    } else {
        None
    }
}
