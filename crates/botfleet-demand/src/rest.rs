//! Paginated REST demand source.
//!
//! Counts rows matching `{flag_column} = true` through a PostgREST-style
//! endpoint. The endpoint caps each response at `page_size` rows, so the
//! count is the sum of pages fetched until one comes back short.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, header};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use tracing::debug;

use botfleet_core::parse_duration;

use crate::error::{DemandError, DemandResult};
use crate::sampler::DemandSource;

/// Connection and query settings for the REST demand source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestDemandConfig {
    /// Base URL, e.g. `http://db-rest:3000`.
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    pub table: String,
    /// Boolean column that marks a row as active.
    pub flag_column: String,
    #[serde(default = "default_select")]
    pub select: String,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u64,
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

fn default_select() -> String {
    "id".to_string()
}

fn default_page_size() -> u64 {
    1000
}

fn default_max_pages() -> u64 {
    10_000
}

fn default_timeout() -> String {
    "10s".to_string()
}

/// Sum row counts page by page until a page shorter than `page_size`.
///
/// Any page error aborts the count: a partial total would under-count.
pub async fn count_paginated<F, Fut>(page_size: u64, max_pages: u64, mut fetch: F) -> DemandResult<u64>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = DemandResult<u64>>,
{
    if page_size == 0 {
        return Err(DemandError::SampleUnavailable("page size is zero".into()));
    }

    let mut total = 0u64;
    let mut offset = 0u64;
    for page in 0..max_pages {
        let rows = fetch(offset, page_size).await?;
        if rows > page_size {
            return Err(DemandError::SampleUnavailable(format!(
                "page {page} returned {rows} rows, more than the requested {page_size}"
            )));
        }
        total += rows;
        if rows < page_size {
            debug!(pages = page + 1, total, "paginated count complete");
            return Ok(total);
        }
        offset += page_size;
    }

    Err(DemandError::SampleUnavailable(format!(
        "count did not finish within {max_pages} pages"
    )))
}

/// `DemandSource` backed by a PostgREST-compatible endpoint.
pub struct RestDemandSource {
    config: RestDemandConfig,
    client: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
}

impl RestDemandSource {
    pub fn new(config: RestDemandConfig) -> DemandResult<Self> {
        let timeout = parse_duration(&config.timeout).ok_or_else(|| {
            DemandError::SampleUnavailable(format!("invalid timeout {:?}", config.timeout))
        })?;
        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            config,
            client,
            timeout,
        })
    }

    fn page_uri(&self, offset: u64, limit: u64) -> String {
        format!(
            "{}/rest/v1/{}?select={}&{}=eq.true&offset={}&limit={}",
            self.config.url.trim_end_matches('/'),
            self.config.table,
            self.config.select,
            self.config.flag_column,
            offset,
            limit
        )
    }

    async fn fetch_page(&self, offset: u64, limit: u64) -> DemandResult<u64> {
        let uri = self.page_uri(offset, limit);
        let req = Request::builder()
            .method("GET")
            .uri(&uri)
            .header("apikey", &self.config.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .header(header::ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| DemandError::SampleUnavailable(format!("invalid request {uri}: {e}")))?;

        let exchange = async {
            let resp = self
                .client
                .request(req)
                .await
                .map_err(|e| DemandError::SampleUnavailable(format!("request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| DemandError::SampleUnavailable(format!("reading body failed: {e}")))?
                .to_bytes();
            if !status.is_success() {
                return Err(DemandError::SampleUnavailable(format!("HTTP {status} from {uri}")));
            }
            let rows: Vec<serde_json::Value> = serde_json::from_slice(&body)
                .map_err(|e| DemandError::SampleUnavailable(format!("malformed page: {e}")))?;
            Ok(rows.len() as u64)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                DemandError::SampleUnavailable(format!(
                    "page request timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
    }
}

#[async_trait]
impl DemandSource for RestDemandSource {
    async fn count_active(&self) -> DemandResult<u64> {
        count_paginated(self.config.page_size, self.config.max_pages, |offset, limit| {
            self.fetch_page(offset, limit)
        })
        .await
    }
}
