//! Fuzz target for SQL placeholder interpolation.
//!
//! Interpolation is best-effort by contract: for any SQL text and any
//! parameter list it must return a string without panicking.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_sql_interpolate
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scribe_intercept::sql::{self, ParamValue};

#[derive(Debug, Arbitrary)]
struct FuzzQuery {
    sql: String,
    params: Vec<FuzzParam>,
}

#[derive(Debug, Arbitrary)]
enum FuzzParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(String),
}

impl From<FuzzParam> for ParamValue {
    fn from(param: FuzzParam) -> Self {
        match param {
            FuzzParam::Null => ParamValue::Null,
            FuzzParam::Bool(value) => ParamValue::Bool(value),
            FuzzParam::Int(value) => ParamValue::Int(value),
            FuzzParam::Float(value) => ParamValue::Float(value),
            FuzzParam::Text(value) => ParamValue::Text(value),
            FuzzParam::Timestamp(value) => ParamValue::Timestamp(value),
        }
    }
}

fuzz_target!(|query: FuzzQuery| {
    let params: Vec<ParamValue> = query.params.into_iter().map(Into::into).collect();
    let _ = sql::interpolate(&query.sql, &params);
    let _ = sql::is_self_check(&query.sql);
});
