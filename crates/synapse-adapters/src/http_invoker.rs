//! HTTP workflow invoker.
//!
//! Maps each [`WorkflowRef`] to an endpoint URL and starts the workflow by
//! POSTing `{"inputData": <input>}` as JSON.  Any 2xx response counts as a
//! successful start; everything else is a failed invocation.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use synapse_core::{SynapseError, WorkflowInput, WorkflowInvoker, WorkflowRef};

use crate::error::{AdapterError, Result};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest slice of an error response body kept in the failure reason.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Request body sent to workflow endpoints.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    input_data: &'a WorkflowInput,
}

/// Starts workflows over HTTP.
#[derive(Debug, Clone)]
pub struct HttpWorkflowInvoker {
    client: reqwest::Client,
    routes: HashMap<WorkflowRef, Url>,
    timeout: Duration,
}

impl HttpWorkflowInvoker {
    /// Build an invoker from a `workflow name -> URL` table.
    ///
    /// Fails if any URL does not parse or is not `http`/`https`.
    pub fn new(routes: &BTreeMap<String, String>) -> Result<Self> {
        let routes = routes
            .iter()
            .map(|(name, raw)| {
                let url = parse_route(name, raw)?;
                Ok((WorkflowRef::new(name.as_str()), url))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("synapse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AdapterError::ConfigError(format!("failed to build http client: {e}")))?;

        info!(workflows = routes.len(), "http workflow invoker ready");
        Ok(Self {
            client,
            routes,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint for `workflow`, if it is routed.
    pub fn url_for(&self, workflow: &WorkflowRef) -> Option<&Url> {
        self.routes.get(workflow)
    }
}

#[async_trait]
impl WorkflowInvoker for HttpWorkflowInvoker {
    fn resolves(&self, workflow: &WorkflowRef) -> bool {
        self.routes.contains_key(workflow)
    }

    async fn invoke(&self, workflow: &WorkflowRef, input: WorkflowInput) -> synapse_core::Result<()> {
        let url = self.url_for(workflow).ok_or_else(|| {
            SynapseError::invocation_failed(workflow.as_str(), "no endpoint configured")
        })?;

        debug!(workflow = %workflow, url = %url, kind = input.kind(), "starting workflow");

        let response = self
            .client
            .post(url.clone())
            .timeout(self.timeout)
            .json(&Envelope { input_data: &input })
            .send()
            .await
            .map_err(|e| SynapseError::invocation_failed(workflow.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(workflow = %workflow, status = status.as_u16(), "workflow endpoint rejected input");
            return Err(SynapseError::invocation_failed(
                workflow.as_str(),
                format!("HTTP {status}: {body}"),
            ));
        }

        debug!(workflow = %workflow, status = status.as_u16(), "workflow started");
        Ok(())
    }
}

fn parse_route(workflow: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| AdapterError::InvalidUrl {
        workflow: workflow.to_string(),
        reason: format!("`{raw}`: {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AdapterError::InvalidUrl {
            workflow: workflow.to_string(),
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}
