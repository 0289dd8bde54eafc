//! Built-in ordering and rect functions for secondary indexes.
//!
//! # Example
//!
//! ```rust,ignore
//! db.create_index("last_name", "user:*", &[index_json("name.last")])?;
//! db.create_index("age_desc", "user:*:age", &[desc(index_int())])?;
//! db.create_spatial_index("fleet", "fleet:*", index_rect())?;
//! ```

use crate::index::{LessFn, RectFn};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Orders values as strings, ignoring ASCII case.
#[must_use]
pub fn index_string() -> LessFn {
    Arc::new(|a: &[u8], b: &[u8]| {
        a.iter()
            .map(u8::to_ascii_lowercase)
            .lt(b.iter().map(u8::to_ascii_lowercase))
    })
}

/// Orders values by raw bytes.
#[must_use]
pub fn index_binary() -> LessFn {
    Arc::new(|a: &[u8], b: &[u8]| a < b)
}

/// Orders values as signed integers. Unparsable values compare as zero.
#[must_use]
pub fn index_int() -> LessFn {
    Arc::new(|a: &[u8], b: &[u8]| parse_or_zero::<i64>(a) < parse_or_zero::<i64>(b))
}

/// Orders values as unsigned integers. Unparsable values compare as zero.
#[must_use]
pub fn index_uint() -> LessFn {
    Arc::new(|a: &[u8], b: &[u8]| parse_or_zero::<u64>(a) < parse_or_zero::<u64>(b))
}

/// Orders values as floats. Unparsable values and NaN compare as zero.
#[must_use]
pub fn index_float() -> LessFn {
    Arc::new(|a: &[u8], b: &[u8]| parse_float(a) < parse_float(b))
}

/// Orders JSON documents by the field at a dot-separated `path`, comparing
/// strings without regard to ASCII case.
#[must_use]
pub fn index_json(path: &str) -> LessFn {
    json_less(path, false)
}

/// Orders JSON documents by the field at `path`, comparing strings by
/// their bytes.
#[must_use]
pub fn index_json_case_sensitive(path: &str) -> LessFn {
    json_less(path, true)
}

/// Reverses an ordering.
#[must_use]
pub fn desc(less: LessFn) -> LessFn {
    Arc::new(move |a: &[u8], b: &[u8]| less(b, a))
}

/// Places values written as `[x y ...]` points or `[x1 y1 ...],[x2 y2 ...]`
/// boxes. Values that do not parse are left out of the spatial backing.
#[must_use]
pub fn index_rect() -> RectFn {
    Arc::new(|value: &[u8]| parse_rect(value).unwrap_or_default())
}

/// Formats a box in the form understood by [`index_rect`].
#[must_use]
pub fn rect(min: &[f64], max: &[f64]) -> String {
    if min == max {
        return point(min);
    }
    format!("{},{}", point(min), point(max))
}

/// Formats a point in the form understood by [`index_rect`].
#[must_use]
pub fn point(coords: &[f64]) -> String {
    let parts: Vec<String> = coords.iter().map(f64::to_string).collect();
    format!("[{}]", parts.join(" "))
}

fn parse_or_zero<T: std::str::FromStr + Default>(raw: &[u8]) -> T {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_default()
}

fn parse_float(raw: &[u8]) -> f64 {
    let value = parse_or_zero::<f64>(raw);
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

fn parse_rect(value: &[u8]) -> Option<(Vec<f64>, Vec<f64>)> {
    let text = std::str::from_utf8(value).ok()?.trim();
    let mut groups = Vec::with_capacity(2);
    let mut rest = text;
    while !rest.is_empty() {
        let open = rest.strip_prefix('[')?;
        let close = open.find(']')?;
        let coords = open[..close]
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        groups.push(coords);
        rest = open[close + 1..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    match groups.len() {
        1 => {
            let min = groups.pop()?;
            Some((min.clone(), min))
        }
        2 => {
            let max = groups.pop()?;
            let min = groups.pop()?;
            Some((min, max))
        }
        _ => None,
    }
}

fn json_less(path: &str, case_sensitive: bool) -> LessFn {
    let segments: Arc<Vec<String>> = Arc::new(path.split('.').map(str::to_string).collect());
    Arc::new(move |a: &[u8], b: &[u8]| {
        let a = json_field(a, &segments);
        let b = json_field(b, &segments);
        json_cmp(a.as_ref(), b.as_ref(), case_sensitive) == Ordering::Less
    })
}

fn json_field(doc: &[u8], segments: &[String]) -> Option<Value> {
    let mut value: Value = serde_json::from_slice(doc).ok()?;
    for segment in segments {
        value = match value {
            Value::Object(mut map) => map.remove(segment)?,
            Value::Array(mut items) => {
                let idx: usize = segment.parse().ok()?;
                if idx >= items.len() {
                    return None;
                }
                items.swap_remove(idx)
            }
            _ => return None,
        };
    }
    Some(value)
}

/// Type rank: null/missing, false, number, string, true, object/array.
fn json_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(false)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Bool(true)) => 4,
        Some(Value::Array(_) | Value::Object(_)) => 5,
    }
}

fn json_cmp(a: Option<&Value>, b: Option<&Value>, case_sensitive: bool) -> Ordering {
    let rank = json_rank(a).cmp(&json_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => {
            if case_sensitive {
                x.cmp(y)
            } else {
                x.bytes()
                    .map(|c| c.to_ascii_lowercase())
                    .cmp(y.bytes().map(|c| c.to_ascii_lowercase()))
            }
        }
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ignores_case() {
        let less = index_string();
        assert!(less(b"apple", b"Banana"));
        assert!(!less(b"APPLE", b"apple"));
        assert!(!less(b"apple", b"APPLE"));
        assert!(less(b"app", b"APPLE"));
    }

    #[test]
    fn binary_is_case_sensitive() {
        let less = index_binary();
        assert!(less(b"B", b"a"));
    }

    #[test]
    fn numeric_orderings() {
        assert!(index_int()(b"-5", b"3"));
        assert!(index_int()(b"garbage", b"1"));
        assert!(index_uint()(b"9", b"10"));
        assert!(index_float()(b"1.5", b"1.75"));
    }

    #[test]
    fn float_nan_ranks_as_zero() {
        let less = index_float();
        assert!(less(b"-1", b"NaN"));
        assert!(less(b"nan", b"0.5"));
        assert!(!less(b"NaN", b"0"));
        assert!(!less(b"0", b"NaN"));
        assert!(less(b"-inf", b"NaN"));
    }

    #[test]
    fn json_path_ordering() {
        let less = index_json("name.last");
        assert!(less(
            br#"{"name":{"last":"anderson"}}"#,
            br#"{"name":{"last":"Baker"}}"#
        ));
        assert!(!index_json_case_sensitive("name.last")(
            br#"{"name":{"last":"anderson"}}"#,
            br#"{"name":{"last":"Baker"}}"#
        ));
        // Missing fields sort first.
        assert!(less(br#"{"age":1}"#, br#"{"name":{"last":"a"}}"#));
        assert!(index_json("ages.1")(br#"{"ages":[9,1]}"#, br#"{"ages":[0,2]}"#));
        assert!(index_json("n")(br#"{"n":2}"#, br#"{"n":"1"}"#));
    }

    #[test]
    fn desc_reverses() {
        let less = desc(index_int());
        assert!(less(b"10", b"2"));
        assert!(!less(b"2", b"10"));
    }

    #[test]
    fn rect_parsing() {
        let rect_fn = index_rect();
        assert_eq!(rect_fn(b"[1 2]"), (vec![1.0, 2.0], vec![1.0, 2.0]));
        assert_eq!(
            rect_fn(b"[1 2],[3 4.5]"),
            (vec![1.0, 2.0], vec![3.0, 4.5])
        );
        assert_eq!(rect_fn(b" [1, 2] , [3, 4] "), (vec![1.0, 2.0], vec![3.0, 4.0]));
        assert_eq!(rect_fn(b"[1 x]"), (vec![], vec![]));
        assert_eq!(rect_fn(b"[1][2][3]"), (vec![], vec![]));
    }

    #[test]
    fn rect_formatting_round_trips() {
        assert_eq!(point(&[1.0, -2.5]), "[1 -2.5]");
        assert_eq!(rect(&[1.0, 2.0], &[3.0, 4.0]), "[1 2],[3 4]");
        assert_eq!(rect(&[1.0, 2.0], &[1.0, 2.0]), "[1 2]");
        let parsed = index_rect()(rect(&[0.5, 1.0], &[2.0, 3.0]).as_bytes());
        assert_eq!(parsed, (vec![0.5, 1.0], vec![2.0, 3.0]));
    }
}
