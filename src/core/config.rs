// Exhibitor Search - core/config.rs
//
// Exhibition config parsing and validation.
// Core layer: accepts JSON strings, never touches the filesystem.
// I/O is handled by app::config_mgr which feeds content here.
//
// The on-disk shape is one flat JSON object per exhibition. Configs exported
// from the old spreadsheet carry JSON-typed fields as strings and use "nan"
// for empty cells, so every field is read leniently and normalised here.

use crate::core::extract::{cell_text, describe};
use crate::core::model::{
    DetailConfig, ExhibitionConfig, FieldMapping, HeaderMap, HttpMethod, RequestMode,
};
use crate::util::constants;
use crate::util::error::ConfigError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

// =============================================================================
// JSON deserialization structure (raw input)
// =============================================================================

/// Raw exhibition definition as deserialized from a .json file.
/// This is validated and compiled into an `ExhibitionConfig` for runtime use.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExhibitionDefinition {
    pub exhibition_code: Option<Value>,
    pub url: Option<Value>,
    pub request_method: Option<Value>,
    pub headers: Option<Value>,
    pub params: Option<Value>,
    pub data: Option<Value>,
    pub items_key: Option<Value>,
    pub company_info_keys: Option<Value>,
    pub request_mode: Option<Value>,

    pub url_detail: Option<Value>,
    pub request_method_detail: Option<Value>,
    pub headers_detail: Option<Value>,
    pub params_detail: Option<Value>,
    pub data_detail: Option<Value>,
    pub items_key_detail: Option<Value>,
    pub info_key: Option<Value>,

    pub city: Option<Value>,
    pub month: Option<Value>,
}

/// True for strings that mean "no value" in hand-edited or exported configs.
pub fn is_blank(s: &str) -> bool {
    constants::BLANK_MARKERS.contains(&s.trim())
}

/// Parse a JSON string into an `ExhibitionDefinition`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_definition(
    json_content: &str,
    source_path: &Path,
) -> Result<ExhibitionDefinition, ConfigError> {
    serde_json::from_str(json_content).map_err(|e| ConfigError::JsonParse {
        path: source_path.to_path_buf(),
        source: e,
    })
}

/// Validate an `ExhibitionDefinition` and compile it into an `ExhibitionConfig`.
///
/// Validates:
/// - `exhibition_code`, `url` and a non-empty `company_info_keys` are present
/// - methods are GET or POST (list default POST, detail default GET)
/// - JSON-typed fields hold objects
/// - `Double` mode has `url_detail` and a non-empty `info_key`
///
/// Detail fields are dropped in `Single` mode.
pub fn validate_and_compile(
    def: ExhibitionDefinition,
    source_path: &Path,
) -> Result<ExhibitionConfig, ConfigError> {
    let code = text(&def.exhibition_code);
    if code.is_empty() {
        return Err(ConfigError::MissingField {
            code: "(empty)".to_string(),
            field: "exhibition_code",
        });
    }

    let url = text(&def.url);
    if url.is_empty() {
        return Err(ConfigError::MissingField {
            code,
            field: "url",
        });
    }

    let method = parse_method(&code, "request_method", &def.request_method, HttpMethod::Post)?;
    let headers = header_map(&code, "headers", &def.headers)?;
    let fields = field_mapping(&code, "company_info_keys", &def.company_info_keys)?;
    if fields.is_empty() {
        return Err(ConfigError::MissingField {
            code,
            field: "company_info_keys",
        });
    }

    let mode = RequestMode::parse(&text(&def.request_mode));

    let detail = match mode {
        RequestMode::Single => None,
        RequestMode::Double => {
            let detail_url = text(&def.url_detail);
            if detail_url.is_empty() {
                return Err(ConfigError::MissingField {
                    code,
                    field: "url_detail",
                });
            }
            let detail_fields = field_mapping(&code, "info_key", &def.info_key)?;
            if detail_fields.is_empty() {
                return Err(ConfigError::MissingField {
                    code,
                    field: "info_key",
                });
            }
            Some(DetailConfig {
                url: detail_url,
                method: parse_method(
                    &code,
                    "request_method_detail",
                    &def.request_method_detail,
                    HttpMethod::Get,
                )?,
                headers: header_map(&code, "headers_detail", &def.headers_detail)?,
                params: text(&def.params_detail),
                data: text(&def.data_detail),
                items_key: text(&def.items_key_detail),
                fields: detail_fields,
            })
        }
    };

    Ok(ExhibitionConfig {
        url,
        method,
        headers,
        params: text(&def.params),
        data: text(&def.data),
        items_key: text(&def.items_key),
        fields,
        mode,
        detail,
        city: text(&def.city),
        month: text(&def.month),
        source_path: source_path.to_path_buf(),
        code,
    })
}

/// Parse and validate in one step.
pub fn load_from_str(
    json_content: &str,
    source_path: &Path,
) -> Result<ExhibitionConfig, ConfigError> {
    parse_definition(json_content, source_path).and_then(|def| validate_and_compile(def, source_path))
}

// =============================================================================
// Field normalisation
// =============================================================================

/// Scalar or template text of a field. Blank markers become "".
fn text(value: &Option<Value>) -> String {
    let raw = match value {
        None => return String::new(),
        Some(v) => cell_text(v),
    };
    if is_blank(&raw) {
        String::new()
    } else {
        raw.trim().to_string()
    }
}

fn parse_method(
    code: &str,
    field: &'static str,
    value: &Option<Value>,
    default: HttpMethod,
) -> Result<HttpMethod, ConfigError> {
    let raw = text(value);
    if raw.is_empty() {
        return Ok(default);
    }
    HttpMethod::parse(&raw).ok_or_else(|| ConfigError::InvalidMethod {
        code: code.to_string(),
        field,
        method: raw,
    })
}

/// A field that must hold a JSON object, given inline or as JSON text.
fn json_object(
    code: &str,
    field: &'static str,
    value: &Option<Value>,
) -> Result<Map<String, Value>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidJsonField {
        code: code.to_string(),
        field,
        reason,
    };

    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(s)) if is_blank(s) => Ok(Map::new()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(invalid(format!(
                "expected a JSON object, found {}",
                describe(&other)
            ))),
            Err(e) => Err(invalid(e.to_string())),
        },
        Some(other) => Err(invalid(format!(
            "expected a JSON object, found {}",
            describe(other)
        ))),
    }
}

fn header_map(
    code: &str,
    field: &'static str,
    value: &Option<Value>,
) -> Result<HeaderMap, ConfigError> {
    json_object(code, field, value)?
        .into_iter()
        .map(|(name, v)| match v {
            Value::Object(_) | Value::Array(_) => Err(ConfigError::InvalidJsonField {
                code: code.to_string(),
                field,
                reason: format!("header '{name}' must be a string"),
            }),
            scalar => Ok((name, cell_text(&scalar))),
        })
        .collect()
}

fn field_mapping(
    code: &str,
    field: &'static str,
    value: &Option<Value>,
) -> Result<FieldMapping, ConfigError> {
    json_object(code, field, value)?
        .into_iter()
        .map(|(column, path)| match path {
            Value::String(s) => Ok((column, s)),
            Value::Number(n) => Ok((column, n.to_string())),
            other => Err(ConfigError::InvalidJsonField {
                code: code.to_string(),
                field,
                reason: format!(
                    "column '{column}' must map to a path string, found {}",
                    describe(&other)
                ),
            }),
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SINGLE_CONFIG: &str = r#"{
        "exhibition_code": "drone-expo",
        "url": "https://expo.test/api/exhibitors",
        "request_method": "post",
        "headers": {"Content-Type": "application/json"},
        "params": "",
        "data": "{\"pageIndex\": {page}, \"pageSize\": {pageSize}}",
        "items_key": "data.list",
        "company_info_keys": {"Company": "name", "Phone": "contact.phone", "Booth": "booth"},
        "request_mode": "single",
        "url_detail": "https://expo.test/ignored",
        "city": "Shenzhen",
        "month": "5"
    }"#;

    const DOUBLE_CONFIG: &str = r#"{
        "exhibition_code": "farm-expo",
        "url": "https://expo.test/api/companies?page={page}",
        "request_method": "GET",
        "headers": "{\"User-Agent\": \"Mozilla/5.0\"}",
        "params": "nan",
        "data": "nan",
        "items_key": "rows",
        "company_info_keys": "{\"ID\": \"id\", \"Company\": \"name\"}",
        "request_mode": "detail",
        "url_detail": "https://expo.test/api/contacts/#ID",
        "request_method_detail": "",
        "headers_detail": null,
        "items_key_detail": "data",
        "info_key": {"Contact": "name", "Mobile": "mobile"}
    }"#;

    fn path() -> PathBuf {
        PathBuf::from("drone-expo.json")
    }

    #[test]
    fn test_compile_single_config() {
        let config = load_from_str(SINGLE_CONFIG, &path()).unwrap();
        assert_eq!(config.code, "drone-expo");
        assert_eq!(config.method, HttpMethod::Post);
        assert_eq!(config.mode, RequestMode::Single);
        assert!(config.detail.is_none(), "detail fields must be dropped in single mode");
        assert_eq!(config.params, "");
        assert_eq!(config.city, "Shenzhen");
        assert_eq!(
            config.fields.keys().collect::<Vec<_>>(),
            vec!["Company", "Phone", "Booth"]
        );
        assert_eq!(config.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_compile_double_config_with_legacy_strings() {
        let config = load_from_str(DOUBLE_CONFIG, &path()).unwrap();
        assert_eq!(config.mode, RequestMode::Double);
        assert_eq!(config.params, "");
        assert_eq!(config.data, "");
        assert_eq!(config.fields.get("ID").map(String::as_str), Some("id"));

        let detail = config.detail.as_ref().unwrap();
        assert_eq!(detail.method, HttpMethod::Get);
        assert!(detail.headers.is_empty());
        assert_eq!(detail.items_key, "data");
        assert_eq!(
            config.output_headers(),
            vec!["ID", "Company", "Contact", "Mobile"]
        );
    }

    #[test]
    fn test_template_given_as_object_is_serialised() {
        let json = r#"{
            "exhibition_code": "x",
            "url": "https://expo.test",
            "data": {"page": "{page}"},
            "company_info_keys": {"Company": "name"}
        }"#;
        let config = load_from_str(json, &path()).unwrap();
        assert_eq!(config.data, r#"{"page":"{page}"}"#);
    }

    #[test]
    fn test_missing_code() {
        let json = r#"{"url": "https://expo.test", "company_info_keys": {"A": "a"}}"#;
        match load_from_str(json, &path()).unwrap_err() {
            ConfigError::MissingField { field, .. } => assert_eq!(field, "exhibition_code"),
            other => panic!("Expected MissingField, got: {other:?}"),
        }
    }

    #[test]
    fn test_empty_mapping_rejected() {
        let json = r#"{"exhibition_code": "x", "url": "https://expo.test", "company_info_keys": "{}"}"#;
        match load_from_str(json, &path()).unwrap_err() {
            ConfigError::MissingField { field, .. } => assert_eq!(field, "company_info_keys"),
            other => panic!("Expected MissingField, got: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_method() {
        let json = r#"{
            "exhibition_code": "x",
            "url": "https://expo.test",
            "request_method": "PATCH",
            "company_info_keys": {"A": "a"}
        }"#;
        assert!(matches!(
            load_from_str(json, &path()).unwrap_err(),
            ConfigError::InvalidMethod { .. }
        ));
    }

    #[test]
    fn test_malformed_json_field() {
        let json = r#"{
            "exhibition_code": "x",
            "url": "https://expo.test",
            "headers": "{not json",
            "company_info_keys": {"A": "a"}
        }"#;
        match load_from_str(json, &path()).unwrap_err() {
            ConfigError::InvalidJsonField { field, .. } => assert_eq!(field, "headers"),
            other => panic!("Expected InvalidJsonField, got: {other:?}"),
        }
    }

    #[test]
    fn test_double_mode_requires_info_key() {
        let json = r#"{
            "exhibition_code": "x",
            "url": "https://expo.test",
            "company_info_keys": {"ID": "id"},
            "request_mode": "double",
            "url_detail": "https://expo.test/#ID"
        }"#;
        match load_from_str(json, &path()).unwrap_err() {
            ConfigError::MissingField { field, .. } => assert_eq!(field, "info_key"),
            other => panic!("Expected MissingField, got: {other:?}"),
        }
    }

    #[test]
    fn test_not_json_at_all() {
        assert!(matches!(
            load_from_str("exhibition_code = 1", &path()).unwrap_err(),
            ConfigError::JsonParse { .. }
        ));
    }

    #[test]
    fn test_is_blank_markers() {
        assert!(is_blank(""));
        assert!(is_blank(" nan "));
        assert!(is_blank("None"));
        assert!(!is_blank("{}"));
        assert!(!is_blank("data"));
    }
}
