//! Defensive accessors over remote JSON documents.
//!
//! CRM responses are kept as loosely typed [`Value`]s. Every accessor here
//! returns a default (`None`, empty slice, empty string) instead of failing
//! when a key is missing or has an unexpected type.

use serde_json::{Map, Value};

/// The `results` array of a list/search/batch response.
pub fn results(document: &Value) -> &[Value] {
    document.get("results").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// Owned copy of [`results`], for callers that go on to mutate records.
pub fn take_results(document: &mut Value) -> Vec<Value> {
    match document.get_mut("results").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Record id as a string; the API returns string ids on v3 and numeric ids on v4.
pub fn record_id(record: &Value) -> Option<String> {
    id_value(record.get("id")?)
}

pub fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// A property value, `None` for missing, null, or non-string properties.
pub fn property<'a>(record: &'a Value, name: &str) -> Option<&'a str> {
    record.get("properties")?.get(name)?.as_str()
}

/// Like [`property`], but treating absent values as the empty string.
pub fn property_or_empty<'a>(record: &'a Value, name: &str) -> &'a str {
    property(record, name).unwrap_or("")
}

/// Inserts `key` at the top level of an object record; a no-op for non-objects.
pub fn set_field(record: &mut Value, key: &str, value: Value) {
    if let Some(object) = record.as_object_mut() {
        object.insert(key.to_string(), value);
    }
}

/// Builds the `{results, total, ...}` envelope returned by list operations.
pub fn result_envelope(results: Vec<Value>) -> Map<String, Value> {
    let mut envelope = Map::new();
    envelope.insert("total".to_string(), Value::from(results.len()));
    envelope.insert("results".to_string(), Value::Array(results));
    envelope
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accessors_default_on_missing_or_mistyped_keys() {
        let record = json!({"id": 42, "properties": {"dealname": null, "amount": 5}});

        assert_eq!(record_id(&record).as_deref(), Some("42"));
        assert_eq!(property(&record, "dealname"), None);
        assert_eq!(property(&record, "amount"), None);
        assert_eq!(property_or_empty(&record, "missing"), "");
        assert!(results(&record).is_empty());
        assert_eq!(record_id(&json!({"id": ""})), None);
    }

    #[test]
    fn take_results_moves_the_array_out() {
        let mut document = json!({"results": [{"id": "1"}, {"id": "2"}], "total": 2});

        let taken = take_results(&mut document);

        assert_eq!(taken.len(), 2);
        assert!(document["results"].is_null());
        assert!(take_results(&mut json!({"results": "nope"})).is_empty());
    }

    #[test]
    fn envelope_counts_results() {
        let envelope = result_envelope(vec![json!({"id": "1"})]);

        assert_eq!(envelope["total"], 1);
        assert_eq!(envelope["results"][0]["id"], "1");
    }
}
