//! Best-effort extraction of JSON records from free model text.
//!
//! Models wrap payloads in code fences, add prose around them, or nest the list under an
//! arbitrary key. Extraction cuts the text down to the outermost JSON span, parses it
//! strictly, then picks the record list out of whatever came back.

use serde_json::Value;

use crate::models::ListingKind;
use crate::{log_debug, log_warn};

const ENABLE_LOGS: bool = true;

const SEARCH_URL: &str = "https://www.google.com/search?q=";
const DIRECTIONS_URL: &str = "https://www.google.com/maps/dir/?api=1&destination=";

pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Cuts `text` down to the JSON span that starts first: `[`…last `]` when an array
/// opens before any object (or no object exists), `{`…last `}` otherwise. Text is
/// returned unchanged when the closing delimiter is missing.
pub fn isolate_json_span(text: &str) -> &str {
    let first_brace = text.find('{');
    let first_bracket = text.find('[');

    match (first_bracket, first_brace) {
        (Some(open), brace) if brace.map_or(true, |b| open < b) => match text.rfind(']') {
            Some(close) if close >= open => &text[open..=close],
            _ => text,
        },
        (_, Some(open)) => match text.rfind('}') {
            Some(close) if close >= open => &text[open..=close],
            _ => text,
        },
        _ => text,
    }
}

/// Array payloads are returned as-is. Object payloads yield their first array-valued
/// field in document order, or nothing.
pub fn select_records(parsed: Value) -> Vec<Value> {
    match parsed {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, value)| match value {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Runs fence stripping, span isolation and strict parsing. A blank reply is an empty
/// list.
pub fn extract_records(text: &str) -> Result<Vec<Value>, serde_json::Error> {
    let stripped = strip_code_fences(text);
    if stripped.is_empty() {
        log_debug!("Model returned no text; treating as no records");
        return Ok(Vec::new());
    }
    let span = isolate_json_span(&stripped);
    let parsed: Value = serde_json::from_str(span).map_err(|err| {
        log_warn!("Failed to parse model JSON: {}", err);
        err
    })?;
    let records = select_records(parsed);
    log_debug!("Extracted {} records from model output", records.len());
    Ok(records)
}

pub fn search_url(name: &str, location: &str, kind: ListingKind) -> String {
    let query = format!("{} {} {}", name, location, kind.search_suffix());
    format!("{SEARCH_URL}{}", urlencoding::encode(&query))
}

pub fn directions_url(name: &str, location: &str) -> String {
    let destination = format!("{} {}", name, location);
    format!("{DIRECTIONS_URL}{}", urlencoding::encode(&destination))
}

/// Overwrites `website` and `mapUrl` on every object record with links derived from its
/// `name` and `location`. Whatever the model put there is discarded.
pub fn attach_links(records: Vec<Value>, kind: ListingKind) -> Vec<Value> {
    records
        .into_iter()
        .map(|record| match record {
            Value::Object(mut map) => {
                let name = display_field(map.get("name"));
                let location = display_field(map.get("location"));
                map.insert(
                    "website".into(),
                    Value::String(search_url(&name, &location, kind)),
                );
                map.insert(
                    "mapUrl".into(),
                    Value::String(directions_url(&name, &location)),
                );
                Value::Object(map)
            }
            other => other,
        })
        .collect()
}

/// Listing extraction: [`extract_records`] followed by [`attach_links`].
pub fn normalize_listings(text: &str, kind: ListingKind) -> Result<Vec<Value>, serde_json::Error> {
    extract_records(text).map(|records| attach_links(records, kind))
}

fn display_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_array_is_returned_with_links_overwritten() {
        let text = "Here you go:\n```json\n[{\"name\":\"Dr. Ada\",\"location\":\"Austin\",\"website\":\"http://bogus\",\"rating\":4.9}]\n```";
        let records = normalize_listings(text, ListingKind::Doctor).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "Dr. Ada");
        assert_eq!(records[0]["rating"], 4.9);
        assert_eq!(
            records[0]["website"],
            "https://www.google.com/search?q=Dr.%20Ada%20Austin%20appointment%20booking"
        );
        assert_eq!(
            records[0]["mapUrl"],
            "https://www.google.com/maps/dir/?api=1&destination=Dr.%20Ada%20Austin"
        );
    }

    #[test]
    fn nested_object_yields_first_array_field() {
        let text = r#"{"note": "ok", "results": [{"name": "A"}, {"name": "B"}], "more": [1]}"#;
        let records = extract_records(text).unwrap();
        assert_eq!(records, vec![json!({"name": "A"}), json!({"name": "B"})]);
    }

    #[test]
    fn object_without_arrays_yields_nothing() {
        assert!(extract_records(r#"{"name": "solo"}"#).unwrap().is_empty());
    }

    #[test]
    fn unparsable_text_is_an_error_not_a_panic() {
        assert!(extract_records("I could not find any doctors, sorry.").is_err());
        assert!(extract_records("[{\"name\": }]").is_err());
    }

    #[test]
    fn blank_reply_means_no_results() {
        assert!(normalize_listings("", ListingKind::Lab).unwrap().is_empty());
        assert!(extract_records("  ```json\n```  ").unwrap().is_empty());
    }

    #[test]
    fn span_selection_prefers_whichever_opens_first() {
        assert_eq!(isolate_json_span("x [1, {\"a\": 2}] y"), "[1, {\"a\": 2}]");
        assert_eq!(isolate_json_span("x {\"a\": [1]} y"), "{\"a\": [1]}");
        assert_eq!(isolate_json_span("no json"), "no json");
        assert_eq!(isolate_json_span("[ unterminated"), "[ unterminated");
    }

    #[test]
    fn kind_changes_search_suffix() {
        let records = attach_links(vec![json!({"name": "City Lab", "location": "Pune"})], ListingKind::Lab);
        assert!(records[0]["website"]
            .as_str()
            .unwrap()
            .ends_with("test%20booking%20contact"));
    }

    #[test]
    fn missing_name_and_location_still_get_links() {
        let records = attach_links(vec![json!({})], ListingKind::Hospital);
        assert!(records[0]["website"].as_str().unwrap().starts_with(SEARCH_URL));
        assert!(records[0]["mapUrl"].as_str().unwrap().starts_with(DIRECTIONS_URL));
    }
}
