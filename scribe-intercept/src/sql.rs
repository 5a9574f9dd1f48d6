//! SQL rendering for captured query events.
//!
//! Captured queries arrive as parameterized SQL plus bound values. For the
//! log line we substitute each positional placeholder (`?` or `$n`) with a
//! rendered value: text and timestamp values single-quoted, numeric, boolean
//! and null values raw. Substitution is best-effort; on any mismatch the raw
//! parameterized SQL is logged instead.

use std::fmt;

/// A bound query parameter, reduced to what the log line needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value, quoted when rendered.
    Text(String),
    /// Date/time value, pre-formatted, quoted when rendered.
    Timestamp(String),
}

impl ParamValue {
    /// Render the value the way it appears in the interpolated SQL.
    pub fn render(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Text(value) => format!("'{}'", value),
            Self::Timestamp(value) => format!("'{}'", value),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Self::Null,
        }
    }
}

/// Whether the statement is the connection-housekeeping self-check that is
/// suppressed from request logs.
pub fn is_self_check(sql: &str) -> bool {
    sql.trim().eq_ignore_ascii_case("select 1")
}

/// Substitute positional placeholders with rendered parameter values.
///
/// Supports `?` placeholders (consumed left to right) and numbered `$n`
/// placeholders. Returns the raw SQL unchanged when the placeholder count
/// does not line up with the parameters; this function never fails.
pub fn interpolate(sql: &str, params: &[ParamValue]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }
    if sql.contains('$') {
        interpolate_numbered(sql, params).unwrap_or_else(|| sql.to_string())
    } else {
        interpolate_positional(sql, params).unwrap_or_else(|| sql.to_string())
    }
}

fn interpolate_positional(sql: &str, params: &[ParamValue]) -> Option<String> {
    let placeholders = sql.matches('?').count();
    if placeholders != params.len() {
        return None;
    }
    let mut out = String::with_capacity(sql.len());
    let mut next = params.iter();
    for ch in sql.chars() {
        if ch == '?' {
            out.push_str(&next.next()?.render());
        } else {
            out.push(ch);
        }
    }
    Some(out)
}

fn interpolate_numbered(sql: &str, params: &[ParamValue]) -> Option<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut substituted = false;
    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        let mut digits = String::new();
        while let Some(&digit) = chars.peek() {
            if !digit.is_ascii_digit() {
                break;
            }
            digits.push(digit);
            chars.next();
        }
        if digits.is_empty() {
            out.push('$');
            continue;
        }
        let index: usize = digits.parse().ok()?;
        let param = params.get(index.checked_sub(1)?)?;
        out.push_str(&param.render());
        substituted = true;
    }
    substituted.then_some(out)
}
