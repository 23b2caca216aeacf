//! In-process `PlatformApi` used by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::Pipeline;
use crate::api::{ApiError, CatalogItem, PlatformApi, RowItem, RowResult, RowsetPage};
use crate::config::Environment;
use crate::state::SqliteStatusStore;
use crate::types::WriteMode;

#[derive(Debug, Clone, PartialEq)]
pub struct Push {
    pub env: String,
    pub target_key: String,
    pub mode: WriteMode,
    pub rows: Vec<Map<String, Value>>,
}

#[derive(Default)]
pub struct FakeApi {
    catalogs: HashMap<String, Vec<CatalogItem>>,
    failing_catalogs: HashSet<String>,
    rowsets: HashMap<String, RowsetPage>,
    pages: HashMap<String, Vec<RowItem>>,
    failing_pages: HashSet<String>,
    failing_pushes: HashSet<String>,
    results: HashMap<String, Vec<RowResult>>,
    failing_results: HashSet<String>,
    failing_clears: HashSet<String>,
    fetched: Mutex<Vec<String>>,
    pushes: Mutex<Vec<Push>>,
    clears: Mutex<Vec<String>>,
}

pub fn environment(name: &str) -> Environment {
    crate::auth::test_environment(name, "http://fake.invalid")
}

pub fn pipeline_with(api: Arc<FakeApi>) -> Pipeline {
    Pipeline {
        api,
        store: Arc::new(SqliteStatusStore::open_in_memory().unwrap()),
        workers: 4,
        no_progress_bar: true,
    }
}

pub fn test_pipeline(api: FakeApi) -> Pipeline {
    pipeline_with(Arc::new(api))
}

/// A row with `fields` value columns, and an `id` key column when
/// `keyed` is set.
pub fn row(keyed: bool, fields: usize) -> RowItem {
    let keys = if keyed {
        json!({"id": "1"}).as_object().cloned().unwrap()
    } else {
        Map::new()
    };
    let values = (0..fields)
        .map(|i| (format!("field_{i}"), Value::from("v")))
        .collect();
    RowItem { keys, values }
}

pub fn error_result(code: &str, message: &str, field_errors: &[(&str, &str, &str)]) -> RowResult {
    RowResult {
        status: "Error".into(),
        error_code: code.into(),
        message: message.into(),
        errors: field_errors
            .iter()
            .map(|(name, code, msg)| crate::api::types::FieldError {
                name: name.to_string(),
                error_code: code.to_string(),
                error_message: msg.to_string(),
            })
            .collect(),
    }
}

pub fn ok_result() -> RowResult {
    RowResult {
        status: "OK".into(),
        error_code: String::new(),
        message: String::new(),
        errors: Vec::new(),
    }
}

impl FakeApi {
    pub fn with_catalog(mut self, env: &str, items: &[(&str, &str)]) -> Self {
        self.catalogs.insert(
            env.to_string(),
            items
                .iter()
                .map(|(name, key)| CatalogItem {
                    name: name.to_string(),
                    external_key: key.to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn failing_catalog(mut self, env: &str) -> Self {
        self.failing_catalogs.insert(env.to_string());
        self
    }

    /// Probe response for an origin key. `sample` becomes the single item.
    pub fn with_rowset(mut self, key: &str, count: u64, sample: Option<RowItem>) -> Self {
        self.rowsets.insert(
            key.to_string(),
            RowsetPage {
                count: Some(count),
                items: sample.into_iter().collect(),
            },
        );
        self
    }

    pub fn with_page(mut self, url: &str, rows: Vec<RowItem>) -> Self {
        self.pages.insert(url.to_string(), rows);
        self
    }

    pub fn failing_page(mut self, url: &str) -> Self {
        self.failing_pages.insert(url.to_string());
        self
    }

    pub fn failing_push(mut self, target_key: &str) -> Self {
        self.failing_pushes.insert(target_key.to_string());
        self
    }

    pub fn with_results(mut self, request_id: &str, results: Vec<RowResult>) -> Self {
        self.results.insert(request_id.to_string(), results);
        self
    }

    pub fn failing_results(mut self, request_id: &str) -> Self {
        self.failing_results.insert(request_id.to_string());
        self
    }

    pub fn failing_clear(mut self, key: &str) -> Self {
        self.failing_clears.insert(key.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn clears(&self) -> Vec<String> {
        self.clears.lock().unwrap().clone()
    }
}

fn status_error(url: &str, status: u16) -> ApiError {
    ApiError::HttpStatus {
        status,
        url: url.to_string(),
    }
}

#[async_trait]
impl PlatformApi for FakeApi {
    async fn list_catalog(&self, env: &Environment) -> Result<Vec<CatalogItem>, ApiError> {
        if self.failing_catalogs.contains(&env.name) {
            return Err(status_error(&env.catalog_url, 503));
        }
        Ok(self.catalogs.get(&env.name).cloned().unwrap_or_default())
    }

    async fn probe_rowset(
        &self,
        _env: &Environment,
        external_key: &str,
    ) -> Result<RowsetPage, ApiError> {
        self.rowsets
            .get(external_key)
            .cloned()
            .ok_or_else(|| status_error(external_key, 404))
    }

    async fn fetch_page(&self, _env: &Environment, url: &str) -> Result<Vec<RowItem>, ApiError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.failing_pages.contains(url) {
            return Err(status_error(url, 500));
        }
        Ok(self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| vec![row(true, 2), row(true, 2)]))
    }

    async fn push_rows(
        &self,
        env: &Environment,
        target_key: &str,
        mode: WriteMode,
        rows: &[Map<String, Value>],
    ) -> Result<String, ApiError> {
        if self.failing_pushes.contains(target_key) {
            return Err(ApiError::Write {
                url: target_key.to_string(),
                reason: "HTTP 400: invalid".into(),
            });
        }
        let mut pushes = self.pushes.lock().unwrap();
        pushes.push(Push {
            env: env.name.clone(),
            target_key: target_key.to_string(),
            mode,
            rows: rows.to_vec(),
        });
        Ok(format!("req-{}", pushes.len()))
    }

    async fn fetch_results(
        &self,
        _env: &Environment,
        request_id: &str,
    ) -> Result<Vec<RowResult>, ApiError> {
        if self.failing_results.contains(request_id) {
            return Err(status_error(request_id, 500));
        }
        Ok(self.results.get(request_id).cloned().unwrap_or_default())
    }

    async fn clear_rows(&self, _env: &Environment, external_key: &str) -> Result<(), ApiError> {
        if self.failing_clears.contains(external_key) {
            return Err(ApiError::Write {
                url: external_key.to_string(),
                reason: "HTTP 500".into(),
            });
        }
        self.clears.lock().unwrap().push(external_key.to_string());
        Ok(())
    }
}
