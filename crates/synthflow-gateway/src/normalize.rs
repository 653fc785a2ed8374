//! Response shape adapter.
//!
//! The external service is not consistent about envelopes: the same logical
//! result may arrive as a bare object, a one-element array, or wrapped in
//! `data`. Every response is funneled through [`normalize`] into one
//! canonical shape per call before anything downstream looks at it.
//! Unrecognized shapes fail closed with `GatewayError::Validation`.

use serde_json::Value;

use synthflow_utils::error::GatewayError;
use synthflow_utils::types::GatewayCall;

/// Canonical shape a call's response is reduced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A single JSON object. `unwrap` names an optional inner key whose
    /// object value replaces the outer one.
    Record { unwrap: Option<&'static str> },
    /// A JSON array of items.
    List,
    /// Any non-empty object or array, kept as-is.
    Document,
}

/// Keys that commonly wrap a list payload.
const LIST_WRAPPERS: [&str; 3] = ["data", "items", "results"];

/// Expected response shape for each gateway call.
#[must_use]
pub const fn shape_for(call: GatewayCall) -> Shape {
    match call {
        GatewayCall::Refine | GatewayCall::Applications | GatewayCall::GapFinder => {
            Shape::Record { unwrap: None }
        }
        GatewayCall::Solution => Shape::Record {
            unwrap: Some("structuredOutput"),
        },
        GatewayCall::Papers
        | GatewayCall::Repositories
        | GatewayCall::PaperAnalysis
        | GatewayCall::RepositoryAnalysis => Shape::List,
        GatewayCall::Synthesis => Shape::Document,
    }
}

/// Reduce a raw response body to the canonical shape for `call`.
pub fn normalize(call: GatewayCall, raw: Value) -> Result<Value, GatewayError> {
    match shape_for(call) {
        Shape::Record { unwrap } => to_record(call, raw, unwrap),
        Shape::List => to_list(call, raw),
        Shape::Document => to_document(call, raw),
    }
}

fn reject(call: GatewayCall, what: &str) -> GatewayError {
    GatewayError::Validation(format!("{} returned {what}", call.label()))
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn to_record(
    call: GatewayCall,
    raw: Value,
    unwrap: Option<&'static str>,
) -> Result<Value, GatewayError> {
    let mut record = match raw {
        Value::Array(items) => match items.into_iter().next() {
            Some(first @ Value::Object(_)) => first,
            Some(other) => {
                return Err(reject(
                    call,
                    &format!("an array whose first element is {}", describe(&other)),
                ));
            }
            None => return Err(reject(call, "an empty array")),
        },
        obj @ Value::Object(_) => obj,
        other => return Err(reject(call, describe(&other))),
    };

    // `{"data": {...}}` envelope
    if let Value::Object(map) = &record {
        if map.len() == 1 {
            if let Some(inner @ Value::Object(_)) = map.get("data") {
                record = inner.clone();
            }
        }
    }

    if let Some(key) = unwrap {
        if let Some(inner @ Value::Object(_)) = record.get(key) {
            record = inner.clone();
        }
    }

    match &record {
        Value::Object(map) if map.is_empty() => Err(reject(call, "an empty object")),
        _ => Ok(record),
    }
}

fn to_list(call: GatewayCall, raw: Value) -> Result<Value, GatewayError> {
    match raw {
        Value::Array(items) => {
            // `[{"data": [...]}]` envelope
            if items.len() == 1 {
                if let Some(inner) = wrapped_list(&items[0]) {
                    return Ok(inner);
                }
            }
            Ok(Value::Array(items))
        }
        obj @ Value::Object(_) => {
            if let Some(inner) = wrapped_list(&obj) {
                return Ok(inner);
            }
            if obj.as_object().is_some_and(|m| m.is_empty()) {
                return Err(reject(call, "an empty object"));
            }
            Ok(Value::Array(vec![obj]))
        }
        other => Err(reject(call, describe(&other))),
    }
}

fn wrapped_list(value: &Value) -> Option<Value> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    LIST_WRAPPERS
        .iter()
        .find_map(|key| map.get(*key).filter(|v| v.is_array()).cloned())
}

fn to_document(call: GatewayCall, raw: Value) -> Result<Value, GatewayError> {
    match &raw {
        Value::Object(map) if !map.is_empty() => Ok(raw),
        Value::Array(items) if !items.is_empty() => Ok(raw),
        other => Err(reject(call, describe(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_single_element_array() {
        let raw = json!([{"refine_problem": "p", "subtopics": ["a"]}]);
        let out = normalize(GatewayCall::Refine, raw).unwrap();
        assert_eq!(out, json!({"refine_problem": "p", "subtopics": ["a"]}));
    }

    #[test]
    fn test_record_unwraps_data_envelope() {
        let raw = json!({"data": {"evidence_based_gaps": ["g"]}});
        let out = normalize(GatewayCall::GapFinder, raw).unwrap();
        assert_eq!(out, json!({"evidence_based_gaps": ["g"]}));
    }

    #[test]
    fn test_solution_unwraps_structured_output_in_array() {
        let raw = json!([{"structuredOutput": {"proposed_solution": "s"}}]);
        let out = normalize(GatewayCall::Solution, raw).unwrap();
        assert_eq!(out, json!({"proposed_solution": "s"}));
    }

    #[test]
    fn test_record_fails_closed() {
        for raw in [json!(null), json!("text"), json!(42), json!([]), json!([1, 2]), json!({})] {
            let err = normalize(GatewayCall::Refine, raw.clone()).unwrap_err();
            assert!(
                matches!(err, GatewayError::Validation(_)),
                "expected validation error for {raw}"
            );
        }
    }

    #[test]
    fn test_list_passes_arrays_through() {
        let raw = json!([{"title": "a"}, {"title": "b"}]);
        assert_eq!(normalize(GatewayCall::Papers, raw.clone()).unwrap(), raw);
    }

    #[test]
    fn test_list_unwraps_wrapped_arrays() {
        let wrapped = json!({"data": [{"title": "a"}]});
        assert_eq!(
            normalize(GatewayCall::Repositories, wrapped).unwrap(),
            json!([{"title": "a"}])
        );

        let array_wrapped = json!([{"results": [{"title": "b"}]}]);
        assert_eq!(
            normalize(GatewayCall::PaperAnalysis, array_wrapped).unwrap(),
            json!([{"title": "b"}])
        );
    }

    #[test]
    fn test_list_wraps_single_object() {
        let raw = json!({"title": "only"});
        assert_eq!(
            normalize(GatewayCall::RepositoryAnalysis, raw).unwrap(),
            json!([{"title": "only"}])
        );
    }

    #[test]
    fn test_list_rejects_scalars() {
        assert!(normalize(GatewayCall::Papers, json!("nope")).is_err());
        assert!(normalize(GatewayCall::Papers, json!(null)).is_err());
        assert!(normalize(GatewayCall::Papers, json!({})).is_err());
    }

    #[test]
    fn test_document_keeps_shape() {
        let raw = json!([{"section": "intro"}, {"section": "body"}]);
        assert_eq!(normalize(GatewayCall::Synthesis, raw.clone()).unwrap(), raw);
        assert!(normalize(GatewayCall::Synthesis, json!({})).is_err());
        assert!(normalize(GatewayCall::Synthesis, json!("")).is_err());
    }
}
