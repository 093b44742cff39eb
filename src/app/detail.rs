// Exhibitor Search - app/detail.rs
//
// Second-stage requests for `Double` mode: one detail request per company,
// yielding one or more contact rows.
//
// Every detail request retries all errors (see `HttpClient::detail_policy`).
// A company whose contacts cannot be fetched still produces one row with
// empty contact columns, so no company silently disappears from the output.

use crate::app::crawl::worker_pool;
use crate::app::http::{detail_request, HttpClient};
use crate::core::extract::{cell_text, get_nested_value, is_meaningful, parse_records};
use crate::core::model::{DetailConfig, ExhibitionConfig, Record};
use crate::util::error::ConfigError;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Column holding the company identifier in the list mapping.
const ID_COLUMN: &str = "ID";

/// Detail request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailStats {
    pub success: u64,
    pub failed: u64,
}

pub struct DetailFetcher {
    client: HttpClient,
    detail: DetailConfig,
    /// The list mapping defines an `ID` column that must be non-blank.
    requires_id: bool,
    pool: Option<rayon::ThreadPool>,
    success: AtomicU64,
    failed: AtomicU64,
}

impl DetailFetcher {
    /// Fails when `config` has no detail section (not `Double` mode).
    pub fn new(client: HttpClient, config: &ExhibitionConfig, workers: usize) -> Result<Self, ConfigError> {
        let detail = config.detail.clone().ok_or_else(|| ConfigError::MissingField {
            code: config.code.clone(),
            field: "url_detail",
        })?;

        Ok(Self {
            client,
            detail,
            requires_id: config.fields.contains_key(ID_COLUMN),
            pool: worker_pool(workers, "detail"),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// Contacts of one company.
    pub fn fetch_contacts(&self, record: &Record) -> Vec<Record> {
        if self.requires_id {
            let id = record.get(ID_COLUMN).map(cell_text).unwrap_or_default();
            if id.trim().is_empty() {
                tracing::warn!("Company has no ID, skipping contact request");
                return vec![self.empty_contact()];
            }
        }

        let spec = detail_request(&self.detail, record);
        match self.client.send_with_retry(&spec, self.client.detail_policy()) {
            Ok(response) => {
                self.success.fetch_add(1, Ordering::Relaxed);
                let contacts = self.parse_contacts(&response);
                if !contacts.iter().any(|c| is_meaningful(c, None)) {
                    tracing::warn!(context = %spec.context, "No contact data found, writing an empty contact row");
                }
                contacts
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(context = %spec.context, error = %e, "Contact request failed");
                vec![self.empty_contact()]
            }
        }
    }

    /// Contact rows found in a detail response. Never empty.
    pub fn parse_contacts(&self, response: &Value) -> Vec<Record> {
        let mut data = get_nested_value(response, &self.detail.items_key);
        if let Value::String(s) = &data {
            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                data = parsed;
            }
        }

        let contacts = match data {
            Value::Object(_) => parse_records(std::slice::from_ref(&data), &self.detail.fields),
            Value::Array(items) => parse_records(&items, &self.detail.fields),
            _ => Vec::new(),
        };

        if contacts.is_empty() {
            vec![self.empty_contact()]
        } else {
            contacts
        }
    }

    /// Fetch contacts for every company on a page and merge them.
    ///
    /// Each output row holds the company's list columns followed by one
    /// contact's columns. Companies repeated within the page are fetched once.
    /// Row order follows the input order.
    pub fn fetch_page(&self, records: &[Record]) -> Vec<Record> {
        let mut seen = HashSet::new();
        let mut unique: Vec<&Record> = Vec::with_capacity(records.len());
        for record in records {
            let key = serde_json::to_string(record).unwrap_or_default();
            if seen.insert(key) {
                unique.push(record);
            } else {
                tracing::warn!(
                    company = %record.get("Company").map(cell_text).unwrap_or_default(),
                    "Duplicate company on page, skipped"
                );
            }
        }

        let fetch = || -> Vec<Vec<Record>> {
            unique
                .par_iter()
                .map(|record| self.fetch_contacts(record))
                .collect()
        };
        let contacts = match &self.pool {
            Some(pool) => pool.install(fetch),
            None => fetch(),
        };

        let mut rows = Vec::new();
        for (company, company_contacts) in unique.iter().zip(contacts) {
            for contact in company_contacts {
                rows.push(merge(company, contact));
            }
        }

        let stats = self.stats();
        tracing::debug!(
            companies = unique.len(),
            rows = rows.len(),
            success = stats.success,
            failed = stats.failed,
            "Contact batch complete"
        );
        rows
    }

    pub fn stats(&self) -> DetailStats {
        DetailStats {
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn empty_contact(&self) -> Record {
        self.detail
            .fields
            .keys()
            .map(|k| (k.clone(), Value::String(String::new())))
            .collect()
    }
}

/// Company columns first, then contact columns. A contact column with the
/// same name as a company column replaces it only when non-blank.
fn merge(company: &Record, contact: Record) -> Record {
    let mut row = company.clone();
    for (column, value) in contact {
        let blank = cell_text(&value).trim().is_empty();
        if !blank || !row.contains_key(&column) {
            row.insert(column, value);
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::load_from_str;
    use crate::platform::config::Settings;
    use serde_json::json;
    use std::path::Path;

    fn fetcher(items_key: &str) -> DetailFetcher {
        let json = format!(
            r#"{{
                "exhibition_code": "expo",
                "url": "https://expo.invalid/list",
                "company_info_keys": {{"ID": "id", "Company": "name"}},
                "request_mode": "double",
                "url_detail": "https://expo.invalid/contacts/#ID",
                "items_key_detail": "{items_key}",
                "info_key": {{"Contact": "name", "Mobile": "mobile"}}
            }}"#
        );
        let config = load_from_str(&json, Path::new("t.json")).unwrap();
        let client = HttpClient::new(&Settings::default()).unwrap();
        DetailFetcher::new(client, &config, 2).unwrap()
    }

    fn company(id: serde_json::Value, name: &str) -> Record {
        let mut r = Record::new();
        r.insert("ID".to_string(), id);
        r.insert("Company".to_string(), json!(name));
        r
    }

    #[test]
    fn test_parse_contacts_list() {
        let f = fetcher("data");
        let contacts = f.parse_contacts(&json!({"data": [
            {"name": "Li", "mobile": "138"},
            {"name": "Wang"}
        ]}));
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0]["Mobile"], json!("138"));
        assert_eq!(contacts[1]["Mobile"], json!(""));
    }

    #[test]
    fn test_parse_contacts_single_object() {
        let f = fetcher("data.contact");
        let contacts = f.parse_contacts(&json!({"data": {"contact": {"name": "Li", "mobile": "138"}}}));
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0]["Contact"], json!("Li"));
    }

    #[test]
    fn test_parse_contacts_json_string() {
        let f = fetcher("d");
        let contacts = f.parse_contacts(&json!({"d": "[{\"name\": \"Li\"}]"}));
        assert_eq!(contacts[0]["Contact"], json!("Li"));
    }

    #[test]
    fn test_parse_contacts_missing_gives_empty_row() {
        let f = fetcher("data");
        let contacts = f.parse_contacts(&json!({"code": 0}));
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].keys().collect::<Vec<_>>(), vec!["Contact", "Mobile"]);
        assert!(!is_meaningful(&contacts[0], None));
    }

    #[test]
    fn test_blank_id_skips_request() {
        let f = fetcher("data");
        let contacts = f.fetch_contacts(&company(json!(""), "Acme"));
        assert_eq!(contacts.len(), 1);
        assert_eq!(f.stats(), DetailStats::default());
    }

    #[test]
    fn test_merge_keeps_company_columns_first() {
        let mut contact = Record::new();
        contact.insert("Contact".to_string(), json!("Li"));
        contact.insert("Company".to_string(), json!(""));
        let row = merge(&company(json!(1), "Acme"), contact);
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["ID", "Company", "Contact"]);
        assert_eq!(row["Company"], json!("Acme"));
    }

    #[test]
    fn test_new_requires_detail_section() {
        let config = load_from_str(
            r#"{"exhibition_code": "s", "url": "https://x", "company_info_keys": {"A": "a"}}"#,
            Path::new("s.json"),
        )
        .unwrap();
        let client = HttpClient::new(&Settings::default()).unwrap();
        assert!(DetailFetcher::new(client, &config, 1).is_err());
    }
}
