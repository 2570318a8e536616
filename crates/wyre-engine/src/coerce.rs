//! Pin kind conversions.
//!
//! `coerce` is the single place values cross kind boundaries: when a data
//! edge joins pins of different kinds, when literals are seeded, and when
//! `convert` nodes run.

use serde_json::{Number, Value};

use wyre_core::error::{Result, WyreError};
use wyre_core::types::PinKind;

/// Whether a value of kind `from` may flow into a pin of kind `to`.
pub fn can_coerce(from: PinKind, to: PinKind) -> bool {
    use PinKind::*;
    from == to
        || from == Any
        || to == Any
        || matches!(
            (from, to),
            (Array, String)
                | (String, Array)
                | (Object, String)
                | (String, Object)
                | (Boolean, Number)
                | (Number, Boolean)
                | (Number, String)
                | (Boolean, String)
                | (String, Number)
                | (String, Boolean)
        )
}

/// Convert `value`, produced as `from`, into kind `to`.
///
/// `null` becomes the target's zero value. An `Any` source takes the
/// value's actual shape.
pub fn coerce(value: Value, from: PinKind, to: PinKind) -> Result<Value> {
    if value.is_null() {
        return Ok(to.zero_value());
    }
    if to == PinKind::Any {
        return Ok(value);
    }

    let actual = PinKind::of(&value);
    let from = if from == PinKind::Any { actual } else { from };
    if actual != from {
        return Err(WyreError::coercion(
            from,
            to,
            format!("value is {actual}, not {from}"),
        ));
    }
    if from == to {
        return Ok(value);
    }

    match (from, to, value) {
        (PinKind::Array | PinKind::Object, PinKind::String, v) => {
            Ok(Value::String(serde_json::to_string(&v)?))
        }
        (PinKind::String, PinKind::Array, Value::String(s)) => match serde_json::from_str(&s) {
            Ok(v @ Value::Array(_)) => Ok(v),
            Ok(other) => Err(WyreError::coercion(
                from,
                to,
                format!("text holds {}", PinKind::of(&other)),
            )),
            Err(e) => Err(WyreError::coercion(from, to, e.to_string())),
        },
        (PinKind::String, PinKind::Object, Value::String(s)) => match serde_json::from_str(&s) {
            Ok(v @ Value::Object(_)) => Ok(v),
            Ok(other) => Err(WyreError::coercion(
                from,
                to,
                format!("text holds {}", PinKind::of(&other)),
            )),
            Err(e) => Err(WyreError::coercion(from, to, e.to_string())),
        },
        (PinKind::Boolean, PinKind::Number, Value::Bool(b)) => Ok(Value::from(if b { 1 } else { 0 })),
        (PinKind::Number, PinKind::Boolean, Value::Number(n)) => {
            Ok(Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false)))
        }
        (PinKind::Number, PinKind::String, Value::Number(n)) => {
            Ok(Value::String(format_number(&n)))
        }
        (PinKind::Boolean, PinKind::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (PinKind::String, PinKind::Number, Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(number_value(f)),
            _ => Err(WyreError::coercion(from, to, format!("'{s}' is not a number"))),
        },
        (PinKind::String, PinKind::Boolean, Value::String(s)) => Ok(Value::Bool(text_truthy(&s))),
        _ => Err(WyreError::coercion(from, to, "no conversion defined")),
    }
}

/// Build a JSON number from an `f64`, keeping integral values integral.
pub fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Render a number the way it reads in prompts: `3` rather than `3.0`.
pub fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// The string form of any value. Strings are unquoted, `null` is empty.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        other => other.to_string(),
    }
}

/// Lenient truthiness used where any value must become a condition.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => text_truthy(s),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Lenient number: unparseable text reads as zero.
pub fn lenient_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn text_truthy(s: &str) -> bool {
    !matches!(
        s.trim().to_lowercase().as_str(),
        "" | "0" | "false" | "no" | "null" | "none"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_and_any_passthrough() {
        assert_eq!(
            coerce(json!("x"), PinKind::String, PinKind::String).unwrap(),
            json!("x")
        );
        assert_eq!(
            coerce(json!({"a": 1}), PinKind::Object, PinKind::Any).unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_array_string_round_trip() {
        let x = json!([1, "two", {"three": 3.5}, [true, null]]);
        let text = coerce(x.clone(), PinKind::Array, PinKind::String).unwrap();
        assert!(text.is_string());
        let back = coerce(text, PinKind::String, PinKind::Array).unwrap();
        assert_eq!(back, x);
    }

    #[test]
    fn test_boolean_number_round_trip() {
        for b in [true, false] {
            let n = coerce(json!(b), PinKind::Boolean, PinKind::Number).unwrap();
            let back = coerce(n, PinKind::Number, PinKind::Boolean).unwrap();
            assert_eq!(back, json!(b));
        }
    }

    #[test]
    fn test_malformed_text_fails() {
        let err = coerce(json!("[1, 2"), PinKind::String, PinKind::Array).unwrap_err();
        assert!(matches!(
            err,
            WyreError::Coercion {
                from: PinKind::String,
                to: PinKind::Array,
                ..
            }
        ));
        assert!(coerce(json!("{\"a\":1}"), PinKind::String, PinKind::Array).is_err());
        assert!(coerce(json!("abc"), PinKind::String, PinKind::Number).is_err());
    }

    #[test]
    fn test_undefined_pairs_fail() {
        assert!(!can_coerce(PinKind::Array, PinKind::Number));
        assert!(coerce(json!([1]), PinKind::Array, PinKind::Object).is_err());
        assert!(coerce(json!({}), PinKind::Object, PinKind::Boolean).is_err());
    }

    #[test]
    fn test_declared_kind_must_match_value() {
        assert!(coerce(json!("3"), PinKind::Number, PinKind::String).is_err());
    }

    #[test]
    fn test_any_source_uses_actual_shape() {
        assert_eq!(
            coerce(json!("42"), PinKind::Any, PinKind::Number).unwrap(),
            json!(42)
        );
        assert_eq!(
            coerce(json!(2.5), PinKind::Any, PinKind::String).unwrap(),
            json!("2.5")
        );
    }

    #[test]
    fn test_null_becomes_zero_value() {
        assert_eq!(
            coerce(Value::Null, PinKind::Any, PinKind::String).unwrap(),
            json!("")
        );
        assert_eq!(
            coerce(Value::Null, PinKind::Any, PinKind::Array).unwrap(),
            json!([])
        );
        assert_eq!(
            coerce(Value::Null, PinKind::Any, PinKind::Any).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_string_to_boolean() {
        for falsy in ["", "0", "false", "No", "NULL", " none "] {
            assert_eq!(
                coerce(json!(falsy), PinKind::String, PinKind::Boolean).unwrap(),
                json!(false),
                "{falsy:?}"
            );
        }
        assert_eq!(
            coerce(json!("yes"), PinKind::String, PinKind::Boolean).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(text_of(&json!(3.0)), "3");
        assert_eq!(text_of(&json!(-7)), "-7");
        assert_eq!(text_of(&json!(0.25)), "0.25");
        assert_eq!(number_value(4.0), json!(4));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn test_lenient_helpers() {
        assert!(truthy(&json!([0])));
        assert!(!truthy(&json!({})));
        assert_eq!(lenient_number(&json!("oops")), 0.0);
        assert_eq!(lenient_number(&json!(" 2.5 ")), 2.5);
    }
}
