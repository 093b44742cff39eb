// Exhibitor Search - core/template.rs
//
// Request template substitution and body preparation.
//
// List requests use page placeholders:
//   {page}       1-based page number
//   {skipCount}  (page - 1) * pageSize
//   {pageSize}   records per page
//
// Detail requests use `#Column` placeholders, replaced with the cell text of
// that output column of the company record from the list page.

use crate::core::config::is_blank;
use crate::core::extract::cell_text;
use crate::core::model::Record;
use serde_json::Value;

const PAGE_PLACEHOLDERS: [&str; 3] = ["{page}", "{skipCount}", "{pageSize}"];

/// Page variables for one list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageVars {
    pub page: u32,
    pub page_size: u32,
}

impl PageVars {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn skip_count(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// Replace the page placeholders in `template`.
pub fn substitute_page(template: &str, vars: PageVars) -> String {
    template
        .replace("{page}", &vars.page.to_string())
        .replace("{skipCount}", &vars.skip_count().to_string())
        .replace("{pageSize}", &vars.page_size.to_string())
}

/// True when any of the templates contains a page placeholder.
pub fn has_page_placeholder<'a>(templates: impl IntoIterator<Item = &'a str>) -> bool {
    templates
        .into_iter()
        .any(|t| PAGE_PLACEHOLDERS.iter().any(|p| t.contains(p)))
}

/// Replace `#Column` placeholders with values from a list record.
///
/// Longer column names go first so `#CompanyId` is not clobbered by `#Company`.
pub fn substitute_record(template: &str, record: &Record) -> String {
    if !template.contains('#') {
        return template.to_string();
    }

    let mut columns: Vec<(&String, &Value)> = record.iter().collect();
    columns.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

    let mut out = template.to_string();
    for (column, value) in columns {
        let placeholder = format!("#{column}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, &cell_text(value));
        }
    }
    out
}

/// Query pairs from a params template.
///
/// Blank templates and `{}` give no query. Text that is not a JSON object is
/// ignored with a debug log, as sites sometimes leave junk in this field.
pub fn parse_query(template: &str) -> Vec<(String, String)> {
    let trimmed = template.trim();
    if is_blank(trimmed) || trimmed == "{}" {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .map(|(k, v)| (k, cell_text(&v)))
            .collect(),
        Ok(other) => {
            tracing::debug!(kind = crate::core::extract::describe(&other), "params is not a JSON object, ignored");
            Vec::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "params is not JSON, ignored");
            Vec::new()
        }
    }
}

/// Prepared request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Sent as `application/json`.
    Json(Value),
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    /// Sent verbatim.
    Text(String),
}

impl RequestBody {
    /// JSON rendering for the request log.
    pub fn log_text(&self) -> String {
        match self {
            Self::Json(v) => v.to_string(),
            Self::Form(pairs) => pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Body for a list request, chosen by content type.
///
/// Blank data gives no body. JSON data becomes a form when the content type
/// is urlencoded and a JSON body otherwise. Anything else is sent as text.
pub fn prepare_body(data: &str, content_type: &str) -> Option<RequestBody> {
    if is_blank(data) {
        return None;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) if content_type.to_lowercase().contains("urlencoded") => {
            Some(RequestBody::Form(form_pairs(value)))
        }
        Ok(value) => Some(RequestBody::Json(value)),
        Err(_) => Some(RequestBody::Text(data.to_string())),
    }
}

/// Body for a detail POST request.
///
/// Detail bodies must be JSON objects; `{}` and text that does not parse give
/// no body. The content type picks JSON (`application/json`) or form encoding.
pub fn prepare_detail_body(data: &str, content_type: &str) -> Option<RequestBody> {
    let trimmed = data.trim();
    if is_blank(trimmed) || trimmed == "{}" {
        return None;
    }
    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "detail data is not JSON, sending no body");
            return None;
        }
    };
    if content_type.to_lowercase().contains("application/json") {
        Some(RequestBody::Json(value))
    } else {
        Some(RequestBody::Form(form_pairs(value)))
    }
}

fn form_pairs(value: Value) -> Vec<(String, String)> {
    match value {
        Value::Object(map) => map.into_iter().map(|(k, v)| (k, cell_text(&v))).collect(),
        other => vec![(cell_text(&other), String::new())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitute_page_variables() {
        let vars = PageVars::new(3, 20);
        assert_eq!(
            substitute_page(r#"{"pageIndex": {page}, "skip": {skipCount}, "size": {pageSize}}"#, vars),
            r#"{"pageIndex": 3, "skip": 40, "size": 20}"#
        );
        assert_eq!(
            substitute_page("https://expo.test/list?p={page}", vars),
            "https://expo.test/list?p=3"
        );
    }

    #[test]
    fn test_skip_count_first_page() {
        assert_eq!(PageVars::new(1, 20).skip_count(), 0);
        assert_eq!(PageVars::new(0, 20).skip_count(), 0);
    }

    #[test]
    fn test_has_page_placeholder() {
        assert!(has_page_placeholder(["https://x", r#"{"p": {page}}"#]));
        assert!(has_page_placeholder(["{skipCount}"]));
        assert!(!has_page_placeholder(["https://x", ""]));
    }

    #[test]
    fn test_substitute_record_longest_first() {
        let mut record = Record::new();
        record.insert("ID".to_string(), json!(7));
        record.insert("IDX".to_string(), json!("abc"));
        assert_eq!(
            substitute_record("https://x/detail/#ID?idx=#IDX", &record),
            "https://x/detail/7?idx=abc"
        );
    }

    #[test]
    fn test_substitute_record_without_placeholder() {
        let record = Record::new();
        assert_eq!(substitute_record("https://x/a", &record), "https://x/a");
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse_query(r#"{"page": 2, "kw": "drone"}"#),
            vec![
                ("page".to_string(), "2".to_string()),
                ("kw".to_string(), "drone".to_string())
            ]
        );
        assert!(parse_query("{}").is_empty());
        assert!(parse_query("nan").is_empty());
        assert!(parse_query("page=2").is_empty());
    }

    #[test]
    fn test_prepare_body_json() {
        assert_eq!(
            prepare_body(r#"{"page": 1}"#, "application/json"),
            Some(RequestBody::Json(json!({"page": 1})))
        );
    }

    #[test]
    fn test_prepare_body_form() {
        assert_eq!(
            prepare_body(r#"{"page": 1, "key": "a b"}"#, "application/x-www-form-urlencoded; charset=UTF-8"),
            Some(RequestBody::Form(vec![
                ("page".to_string(), "1".to_string()),
                ("key".to_string(), "a b".to_string()),
            ]))
        );
    }

    #[test]
    fn test_prepare_body_text_and_blank() {
        assert_eq!(
            prepare_body("page=1&size=20", ""),
            Some(RequestBody::Text("page=1&size=20".to_string()))
        );
        assert_eq!(prepare_body("nan", "application/json"), None);
    }

    #[test]
    fn test_prepare_detail_body() {
        assert_eq!(prepare_detail_body("{}", "application/json"), None);
        assert_eq!(prepare_detail_body("not json", "application/json"), None);
        assert_eq!(
            prepare_detail_body(r#"{"id": "7"}"#, "application/json;charset=utf-8"),
            Some(RequestBody::Json(json!({"id": "7"})))
        );
        assert_eq!(
            prepare_detail_body(r#"{"id": 7}"#, ""),
            Some(RequestBody::Form(vec![("id".to_string(), "7".to_string())]))
        );
    }

    #[test]
    fn test_body_log_text() {
        let body = RequestBody::Form(vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]);
        assert_eq!(body.log_text(), "a=1&b=2");
    }
}
