//! HTTP implementation of `HostGateway` against the hosts' IPC API.
//!
//! Uses a pooled hyper client; every call is bounded by the configured
//! request timeout. A call only counts as successful when the host
//! answers 2xx and the JSON envelope does not report `"Success": false`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use tracing::debug;

use botfleet_core::{HostIndex, WorkerAction};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{HostGateway, parse_worker_names};

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Connection details for one bot host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEndpoint {
    /// Base URL of the IPC API, e.g. `http://10.0.0.5:1242/Api`.
    pub url: String,
    /// Value sent in the `Authentication` header.
    #[serde(default)]
    pub password: String,
}

/// Response envelope returned by the host IPC API.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Success")]
    success: Option<bool>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "Result")]
    result: Option<serde_json::Value>,
}

/// `HostGateway` over HTTP, one endpoint per host index.
pub struct AsfGateway {
    endpoints: Vec<HostEndpoint>,
    client: HttpClient,
    timeout: Duration,
}

impl AsfGateway {
    /// Create a gateway for the given hosts, in index order.
    pub fn new(endpoints: Vec<HostEndpoint>, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            endpoints,
            client,
            timeout,
        }
    }

    fn endpoint(&self, host: HostIndex) -> GatewayResult<&HostEndpoint> {
        self.endpoints
            .get(host)
            .ok_or(GatewayError::UnknownHost(host))
    }

    /// Issue one request and return the decoded envelope alongside the raw
    /// document it was read from.
    async fn call(
        &self,
        host: HostIndex,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(Envelope, serde_json::Value), String> {
        let endpoint = self.endpoint(host).map_err(|e| e.to_string())?;
        let uri = format!("{}{}", endpoint.url.trim_end_matches('/'), path);

        let payload = match body {
            Some(json) => Bytes::from(json.to_string()),
            None => Bytes::new(),
        };
        let req = Request::builder()
            .method(method)
            .uri(&uri)
            .header("Authentication", &endpoint.password)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "botfleet/0.1")
            .body(Full::new(payload))
            .map_err(|e| format!("invalid request for {uri}: {e}"))?;

        let exchange = async {
            let resp = self
                .client
                .request(req)
                .await
                .map_err(|e| format!("request failed: {e}"))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| format!("reading body failed: {e}"))?
                .to_bytes();
            Ok::<(StatusCode, Bytes), String>((status, bytes))
        };

        let (status, bytes) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| format!("timed out after {}ms", self.timeout.as_millis()))??;

        if !status.is_success() {
            debug!(host, %uri, %status, "host returned non-2xx");
            return Err(format!("HTTP {status}"));
        }

        let document: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| format!("malformed response: {e}"))?;
        let envelope = Envelope::deserialize(&document)
            .map_err(|e| format!("malformed response: {e}"))?;
        if envelope.success == Some(false) {
            let message = envelope.message.as_deref().unwrap_or("no message");
            return Err(format!("host reported failure: {message}"));
        }
        Ok((envelope, document))
    }
}

#[async_trait]
impl HostGateway for AsfGateway {
    fn host_count(&self) -> usize {
        self.endpoints.len()
    }

    async fn list_worker_names(&self, host: HostIndex) -> GatewayResult<Vec<String>> {
        self.endpoint(host)?;
        let body = serde_json::json!({ "Command": "status ASF" });
        let (envelope, _) = self
            .call(host, Method::POST, "/Command", Some(body))
            .await
            .map_err(|cause| GatewayError::DiscoveryFailure { host, cause })?;

        match envelope.result {
            Some(serde_json::Value::String(text)) => Ok(parse_worker_names(&text)),
            other => Err(GatewayError::DiscoveryFailure {
                host,
                cause: format!("expected text result, got {other:?}"),
            }),
        }
    }

    async fn apply(
        &self,
        host: HostIndex,
        action: WorkerAction,
        names: &[String],
    ) -> GatewayResult<()> {
        self.endpoint(host)?;
        if names.is_empty() {
            return Ok(());
        }
        let path = format!("/Bot/{}/{}", names.join(","), action.as_path_segment());
        self.call(host, Method::POST, &path, None)
            .await
            .map(|_| ())
            .map_err(|cause| GatewayError::RemoteCallFailed {
                host,
                action,
                names: names.to_vec(),
                cause,
            })
    }

    async fn host_status(&self, host: HostIndex) -> GatewayResult<serde_json::Value> {
        self.endpoint(host)?;
        let (_, document) = self
            .call(host, Method::GET, "/ASF", None)
            .await
            .map_err(|cause| GatewayError::StatusQueryFailed { host, cause })?;
        Ok(document)
    }
}
