// Exhibitor Search - app/http.rs
//
// Blocking HTTP client with throttling-aware retry.
//
// Architecture:
//   - `RequestSpec` is a fully substituted request; `list_request` and
//     `detail_request` build one from a config template.
//   - `send` makes one attempt and classifies the outcome (`HttpError`).
//   - `send_with_retry` retries throttled requests with capped exponential
//     backoff plus random jitter. Detail requests retry every error.
//   - Every exchange and retry is written to the request-history log.
//
// The sleep function is injectable so retry tests finish instantly.

use crate::core::extract::cell_text;
use crate::core::model::{header_value, DetailConfig, ExhibitionConfig, HeaderMap, HttpMethod, Record};
use crate::core::ratelimit::{is_rate_limited, retry_delay};
use crate::core::response::decode_body;
use crate::core::template::{
    self, parse_query, prepare_body, prepare_detail_body, substitute_page, substitute_record, PageVars, RequestBody,
};
use crate::platform::config::Settings;
use crate::util::constants;
use crate::util::error::HttpError;
use crate::util::logging::preview;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pause between attempts. Replaced in tests.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

// =============================================================================
// Request building
// =============================================================================

/// A request with every placeholder substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub url: String,
    pub method: HttpMethod,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    /// Ignored for GET.
    pub body: Option<RequestBody>,
    /// Human-readable label for console messages ("drone-expo page 3").
    pub context: String,
}

/// List request for `page`.
pub fn list_request(config: &ExhibitionConfig, page: u32, page_size: u32) -> RequestSpec {
    let vars = PageVars::new(page, page_size);
    let data = substitute_page(&config.data, vars);
    let content_type = config.header("Content-Type").unwrap_or("");

    RequestSpec {
        url: substitute_page(&config.url, vars),
        method: config.method,
        headers: config.headers.clone(),
        query: parse_query(&substitute_page(&config.params, vars)),
        body: prepare_body(&data, content_type),
        context: format!("{} page {page}", config.code),
    }
}

/// Detail request for one company record from a list page.
pub fn detail_request(detail: &DetailConfig, record: &Record) -> RequestSpec {
    let content_type = header_value(&detail.headers, "Content-Type").unwrap_or("");
    let data = substitute_record(&detail.data, record);

    RequestSpec {
        url: substitute_record(&detail.url, record),
        method: detail.method,
        headers: detail.headers.clone(),
        query: parse_query(&substitute_record(&detail.params, record)),
        body: prepare_detail_body(&data, content_type),
        context: match record.get("Company").map(cell_text) {
            Some(name) if !name.is_empty() => format!("contacts of {name}"),
            _ => "contacts".to_string(),
        },
    }
}

// =============================================================================
// Retry policy
// =============================================================================

/// Which errors are retried and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry every error, not only throttling.
    pub retry_all_errors: bool,
    /// Retries after the first attempt. 0 = until success.
    pub max_retries: u32,
}

// =============================================================================
// HttpClient
// =============================================================================

/// Shared blocking client. Cheap to clone.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
    sleeper: Sleeper,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(settings: &Settings) -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| HttpError::Build { source: e })?;

        if settings.accept_invalid_certs {
            tracing::debug!("TLS certificate verification disabled");
        }

        Ok(Self {
            client,
            sleeper: Arc::new(std::thread::sleep),
            max_retries: settings.max_retries,
        })
    }

    /// Replace the function used to wait between attempts.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Override the retry bound (0 = unlimited).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Policy for list requests: only throttling is retried.
    pub fn list_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_all_errors: false,
            max_retries: self.max_retries,
        }
    }

    /// Policy for detail requests: every error is retried.
    pub fn detail_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_all_errors: true,
            max_retries: self.max_retries,
        }
    }

    /// One attempt. Returns the decoded body.
    pub fn send(&self, spec: &RequestSpec) -> Result<Value, HttpError> {
        let started = Instant::now();
        let mut request = match spec.method {
            HttpMethod::Get => self.client.get(&spec.url),
            HttpMethod::Post => self.client.post(&spec.url),
        };
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if spec.method == HttpMethod::Post {
            request = match &spec.body {
                Some(RequestBody::Json(v)) => request.json(v),
                Some(RequestBody::Form(pairs)) => request.form(pairs),
                Some(RequestBody::Text(s)) => request.body(s.clone()),
                None => request,
            };
        }

        let transport = |e: reqwest::Error| HttpError::Transport {
            url: spec.url.clone(),
            source: e,
        };
        let response = request.send().map_err(transport)?;
        let status = response.status();
        let text = response.text().map_err(transport)?;

        log_exchange(spec, status.as_u16(), &text, started.elapsed());

        if !status.is_success() {
            return Err(HttpError::Status {
                url: spec.url.clone(),
                status: status.as_u16(),
                body_preview: preview(&text, constants::RESPONSE_PREVIEW_CHARS),
            });
        }

        let value = decode_body(&text).map_err(|reason| HttpError::Decode {
            url: spec.url.clone(),
            reason,
        })?;

        // Throttling reported inside a 200 response.
        let rendered = value.to_string();
        if is_rate_limited(&rendered) {
            return Err(HttpError::RateLimited {
                url: spec.url.clone(),
                message: preview(&rendered, constants::RETRY_MESSAGE_PREVIEW_CHARS),
            });
        }

        Ok(value)
    }

    /// Send with retry per `policy`.
    pub fn send_with_retry(&self, spec: &RequestSpec, policy: RetryPolicy) -> Result<Value, HttpError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.send(spec) {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(context = %spec.context, attempt, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !(policy.retry_all_errors || err.is_rate_limit()) {
                return Err(err);
            }
            if policy.max_retries > 0 && attempt > policy.max_retries {
                return Err(HttpError::RetriesExhausted {
                    url: spec.url.clone(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let jitter = rand::thread_rng().gen_range(0.0..constants::RETRY_JITTER_MAX_SECS);
            let delay = retry_delay(attempt, jitter);
            let message = err.to_string();

            tracing::warn!(
                context = %spec.context,
                attempt,
                wait_secs = delay.as_secs(),
                "Retrying: {}",
                preview(&message, constants::RETRY_MESSAGE_PREVIEW_CHARS)
            );
            tracing::debug!(
                target: constants::REQUEST_LOG_TARGET,
                method = %spec.method,
                url = %spec.url,
                attempt,
                wait_secs = delay.as_secs_f64(),
                error = %message,
                "RETRY"
            );

            (self.sleeper)(delay);
        }
    }
}

/// Record one exchange on the request-history target. Header values are
/// deliberately absent; only header names are recorded.
fn log_exchange(spec: &RequestSpec, status: u16, body: &str, elapsed: Duration) {
    let header_names: Vec<&str> = spec.headers.keys().map(String::as_str).collect();
    let query = spec
        .query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let request_body = spec
        .body
        .as_ref()
        .filter(|_| spec.method == HttpMethod::Post)
        .map(RequestBody::log_text)
        .unwrap_or_default();

    tracing::debug!(
        target: constants::REQUEST_LOG_TARGET,
        method = %spec.method,
        url = %spec.url,
        headers = ?header_names,
        query = %query,
        body = %request_body,
        status,
        elapsed_ms = elapsed.as_millis() as u64,
        response = %preview(body, constants::REQUEST_LOG_MAX_BODY_CHARS),
        "REQUEST"
    );
}

/// Record a response that could not be parsed, with its request.
pub fn log_unparsed(spec: &RequestSpec, response: &Value, reason: &str) {
    tracing::debug!(
        target: constants::REQUEST_LOG_TARGET,
        method = %spec.method,
        url = %spec.url,
        body = %spec.body.as_ref().map(RequestBody::log_text).unwrap_or_default(),
        reason,
        response = %preview(&response.to_string(), constants::REQUEST_LOG_MAX_BODY_CHARS),
        "PARSE FAILED"
    );
}

/// True when a list template uses page placeholders anywhere.
pub fn paginates(config: &ExhibitionConfig) -> bool {
    template::has_page_placeholder([config.url.as_str(), config.params.as_str(), config.data.as_str()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::load_from_str;
    use serde_json::json;
    use std::path::Path;

    fn config(json: &str) -> ExhibitionConfig {
        load_from_str(json, Path::new("t.json")).unwrap()
    }

    #[test]
    fn test_list_request_post_json() {
        let cfg = config(
            r#"{
                "exhibition_code": "expo",
                "url": "https://expo.test/api",
                "request_method": "POST",
                "headers": {"Content-Type": "application/json"},
                "params": "{\"lang\": \"zh\"}",
                "data": "{\"pageIndex\": {page}, \"skip\": {skipCount}}",
                "company_info_keys": {"Company": "name"}
            }"#,
        );
        let spec = list_request(&cfg, 3, 20);
        assert_eq!(spec.url, "https://expo.test/api");
        assert_eq!(spec.query, vec![("lang".to_string(), "zh".to_string())]);
        assert_eq!(spec.body, Some(RequestBody::Json(json!({"pageIndex": 3, "skip": 40}))));
        assert_eq!(spec.context, "expo page 3");
    }

    #[test]
    fn test_list_request_url_placeholders() {
        let cfg = config(
            r#"{
                "exhibition_code": "expo",
                "url": "https://expo.test/api?p={page}&size={pageSize}",
                "request_method": "GET",
                "company_info_keys": {"Company": "name"}
            }"#,
        );
        let spec = list_request(&cfg, 2, 20);
        assert_eq!(spec.url, "https://expo.test/api?p=2&size=20");
        assert!(spec.body.is_none());
        assert!(paginates(&cfg));
    }

    #[test]
    fn test_list_request_form_body() {
        let cfg = config(
            r#"{
                "exhibition_code": "expo",
                "url": "https://expo.test/api",
                "headers": {"content-type": "application/x-www-form-urlencoded"},
                "data": "{\"page\": {page}}",
                "company_info_keys": {"Company": "name"}
            }"#,
        );
        let spec = list_request(&cfg, 1, 20);
        assert_eq!(
            spec.body,
            Some(RequestBody::Form(vec![("page".to_string(), "1".to_string())]))
        );
    }

    #[test]
    fn test_detail_request_substitutes_record() {
        let cfg = config(
            r##"{
                "exhibition_code": "expo",
                "url": "https://expo.test/api",
                "company_info_keys": {"ID": "id", "Company": "name"},
                "request_mode": "double",
                "url_detail": "https://expo.test/contacts/#ID",
                "request_method_detail": "POST",
                "headers_detail": {"Content-Type": "application/json"},
                "data_detail": "{\"companyId\": \"#ID\"}",
                "info_key": {"Contact": "name"}
            }"##,
        );
        let mut record = Record::new();
        record.insert("ID".to_string(), json!(42));
        record.insert("Company".to_string(), json!("Acme"));

        let spec = detail_request(cfg.detail.as_ref().unwrap(), &record);
        assert_eq!(spec.url, "https://expo.test/contacts/42");
        assert_eq!(spec.method, HttpMethod::Post);
        assert_eq!(spec.body, Some(RequestBody::Json(json!({"companyId": "42"}))));
        assert_eq!(spec.context, "contacts of Acme");
    }
}
