// Exhibitor Search - core/extract.rs
//
// JSON path extraction: locating the item list in a response and mapping
// each item to an output record.
//
// Paths are dot-separated. Object segments are keys; numeric segments index
// arrays ("data.items.0.name").

use crate::core::model::{FieldMapping, Record};
use crate::util::error::ParseError;
use serde_json::Value;

/// Value at `path` inside `data`.
///
/// An empty path returns `data` itself. A missing key, an out-of-range or
/// non-numeric index, traversal into a scalar, or a null anywhere on the
/// path all yield an empty string, so a missing field becomes an empty cell.
pub fn get_nested_value(data: &Value, path: &str) -> Value {
    if path.is_empty() {
        return data.clone();
    }

    let mut current = data;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(Value::Null) | None => return Value::String(String::new()),
            Some(v) => current = v,
        }
    }
    current.clone()
}

/// Locate the item array of a list response.
///
/// Some ASP.NET endpoints answer with `[meta, {"Table": [...]}]`; an array
/// response with more than one element starts from `response[1]["Table"]`.
pub fn extract_items(response: &Value, items_key: &str) -> Result<Vec<Value>, ParseError> {
    let root = match response {
        Value::Array(parts) if parts.len() > 1 => {
            parts[1].get("Table").ok_or_else(|| ParseError::ItemsNotFound {
                items_key: items_key.to_string(),
                segment: "Table".to_string(),
            })?
        }
        other => other,
    };

    let mut current = root;
    if !crate::core::config::is_blank(items_key) {
        for segment in items_key.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(|| ParseError::ItemsNotFound {
                    items_key: items_key.to_string(),
                    segment: segment.to_string(),
                })?,
                Value::Array(items) if is_index(segment) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| ParseError::ItemsNotFound {
                        items_key: items_key.to_string(),
                        segment: segment.to_string(),
                    })?,
                _ => break,
            };
        }
    }

    match current {
        Value::Array(items) => Ok(items.clone()),
        other => Err(ParseError::NotAnArray {
            items_key: items_key.to_string(),
            found: describe(other).to_string(),
        }),
    }
}

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Map each item to an output record, one column per mapping entry.
pub fn parse_records(items: &[Value], fields: &FieldMapping) -> Vec<Record> {
    items
        .iter()
        .map(|item| {
            fields
                .iter()
                .map(|(column, path)| (column.clone(), get_nested_value(item, path)))
                .collect()
        })
        .collect()
}

/// Text written to an output cell.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// True when any column other than `skip` holds non-blank text.
pub fn is_meaningful(record: &Record, skip: Option<&str>) -> bool {
    record
        .iter()
        .filter(|(column, _)| Some(column.as_str()) != skip)
        .any(|(_, value)| !cell_text(value).trim().is_empty())
}

/// Short name of a JSON value's type, for messages.
pub fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
