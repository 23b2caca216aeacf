//! Typed client for the platform's HTTP endpoints.
//!
//! The pipeline only talks to the platform through [`PlatformApi`], so every
//! phase can run against an in-process fake in tests. [`HttpPlatformApi`] is
//! the real implementation: idempotent reads go through
//! [`retry_with_backoff`](crate::retry::retry_with_backoff), writes and the
//! legacy clear call are attempted once.

pub mod endpoints;
pub mod error;
pub mod soap;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::auth::TokenCache;
use crate::config::Environment;
use crate::retry::{self, RetryAction, RetryConfig};
use crate::types::WriteMode;

pub use self::endpoints::Endpoints;
pub use self::error::ApiError;
use self::types::{AsyncJobResponse, ResultsPage, WriteRowsBody};
pub use self::types::{CatalogItem, RowItem, RowResult, RowsetPage};

/// Every platform call the pipeline makes.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// List the data extensions an environment exposes through its index.
    async fn list_catalog(&self, env: &Environment) -> Result<Vec<CatalogItem>, ApiError>;

    /// Fetch the one-row probe for an entry. The returned page always has
    /// a `count`.
    async fn probe_rowset(
        &self,
        env: &Environment,
        external_key: &str,
    ) -> Result<RowsetPage, ApiError>;

    /// Fetch the rows of a page by its canonical URL.
    async fn fetch_page(&self, env: &Environment, url: &str) -> Result<Vec<RowItem>, ApiError>;

    /// Submit a batch to the async write endpoint and return the job id.
    async fn push_rows(
        &self,
        env: &Environment,
        target_key: &str,
        mode: WriteMode,
        rows: &[Map<String, Value>],
    ) -> Result<String, ApiError>;

    /// Per-row outcome of an async write job.
    async fn fetch_results(
        &self,
        env: &Environment,
        request_id: &str,
    ) -> Result<Vec<RowResult>, ApiError>;

    /// Remove every row of a data extension.
    async fn clear_rows(&self, env: &Environment, external_key: &str) -> Result<(), ApiError>;
}

/// HTTP client shared by the token cache and the API.
pub fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("sfmcli-rs/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(300))
        .build()
}

fn classify(e: &ApiError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

pub struct HttpPlatformApi {
    client: Client,
    tokens: Arc<TokenCache>,
    retry: RetryConfig,
}

impl std::fmt::Debug for HttpPlatformApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPlatformApi")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpPlatformApi {
    pub fn new(client: Client, retry: RetryConfig) -> Self {
        Self {
            tokens: Arc::new(TokenCache::new(client.clone())),
            client,
            retry,
        }
    }

    /// GET and decode JSON with retries. `env` carries the bearer token;
    /// `None` sends the request anonymously.
    async fn get_json<T>(&self, env: Option<&Environment>, url: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let client = &self.client;
        let tokens = &self.tokens;

        retry::retry_with_backoff(&self.retry, url, classify, move || async move {
            let mut request = client.get(url);
            if let Some(env) = env {
                request = request.bearer_auth(tokens.get_token(env).await?);
            }
            let response = request.send().await.map_err(|source| ApiError::Fetch {
                url: url.to_string(),
                source,
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ApiError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let bytes = response.bytes().await.map_err(|source| ApiError::Fetch {
                url: url.to_string(),
                source,
            })?;
            serde_json::from_slice(&bytes).map_err(|e| ApiError::malformed(url, e))
        })
        .await
    }
}

#[async_trait]
impl PlatformApi for HttpPlatformApi {
    async fn list_catalog(&self, env: &Environment) -> Result<Vec<CatalogItem>, ApiError> {
        self.get_json(None, &env.catalog_url).await
    }

    async fn probe_rowset(
        &self,
        env: &Environment,
        external_key: &str,
    ) -> Result<RowsetPage, ApiError> {
        let url = Endpoints::for_environment(env).probe_url(external_key);
        let page: RowsetPage = self.get_json(Some(env), &url).await?;
        if page.count.is_none() {
            return Err(ApiError::malformed(&url, "missing 'count'"));
        }
        Ok(page)
    }

    async fn fetch_page(&self, env: &Environment, url: &str) -> Result<Vec<RowItem>, ApiError> {
        let page: RowsetPage = self.get_json(Some(env), url).await?;
        Ok(page.items)
    }

    async fn push_rows(
        &self,
        env: &Environment,
        target_key: &str,
        mode: WriteMode,
        rows: &[Map<String, Value>],
    ) -> Result<String, ApiError> {
        let url = Endpoints::for_environment(env).rows_url(target_key);
        let token = self.tokens.get_token(env).await?;

        let request = match mode {
            WriteMode::Update => self.client.put(&url),
            WriteMode::Insert => self.client.post(&url),
        };
        let response = request
            .bearer_auth(token)
            .json(&WriteRowsBody { items: rows })
            .send()
            .await
            .map_err(|e| ApiError::Write {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::Write {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(ApiError::Write {
                url,
                reason: format!("HTTP {}: {}", status.as_u16(), body),
            });
        }

        let job: AsyncJobResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::malformed(&url, e))?;
        job.request_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::malformed(&url, "missing 'requestId'"))
    }

    async fn fetch_results(
        &self,
        env: &Environment,
        request_id: &str,
    ) -> Result<Vec<RowResult>, ApiError> {
        let url = Endpoints::for_environment(env).results_url(request_id);
        let page: ResultsPage = self.get_json(Some(env), &url).await?;
        Ok(page.items)
    }

    async fn clear_rows(&self, env: &Environment, external_key: &str) -> Result<(), ApiError> {
        let url = Endpoints::for_environment(env).soap;
        let token = self.tokens.get_token(env).await?;
        let envelope = soap::clear_data_envelope(&url, &token, external_key);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, soap::CONTENT_TYPE)
            .body(envelope)
            .send()
            .await
            .map_err(|e| ApiError::Write {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(url = %url, status = status.as_u16(), body = %body, "ClearData response");

        if !status.is_success() {
            return Err(ApiError::Write {
                url,
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        match soap::overall_status(&body) {
            Some(overall) if !overall.starts_with("OK") => Err(ApiError::Write {
                url,
                reason: overall,
            }),
            _ => Ok(()),
        }
    }
}
