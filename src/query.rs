// THEORY:
// The `query` module is the engine's only transport surface: a JSON client
// for the device backend plus the polling loop that keeps the overlay fed.
// The loop is deliberately sequential: POST, await the outcome, sleep,
// repeat. Two device queries can never be in flight at once. Failures
// are logged and the loop re-arms unconditionally; the overlay simply keeps
// rendering the last response it saw.
//
// Selection posts are fire-and-forget. The backend's answer is logged for
// the operator's console and never correlated back to the emitting
// selection, so nothing downstream may assume response ordering.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::core_modules::geo::{QueryRequest, QueryResponse};
use crate::core_modules::selection::SelectionIntent;

/// JSON client for the device backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Fetches the device summaries visible in the requested extent.
    pub async fn query_devices(&self, request: &QueryRequest) -> anyhow::Result<QueryResponse> {
        let response = self
            .http
            .post(self.endpoint("query-devices"))
            .json(request)
            .send()
            .await
            .context("device query failed to send")?
            .error_for_status()
            .context("device query rejected")?;
        response
            .json::<QueryResponse>()
            .await
            .context("device query returned malformed JSON")
    }

    /// Submits one confirmed area selection. The response body is arbitrary
    /// JSON and only of interest to the log.
    pub async fn post_selection(
        &self,
        intent: &SelectionIntent,
    ) -> anyhow::Result<serde_json::Value> {
        let response = self
            .http
            .post(self.endpoint("selection"))
            .json(intent)
            .send()
            .await
            .context("selection failed to send")?
            .error_for_status()
            .context("selection rejected")?;
        response
            .json::<serde_json::Value>()
            .await
            .context("selection returned malformed JSON")
    }
}

/// Polls the backend at a fixed delay, delivering each response to the
/// pipeline task. The delay is re-armed only after the previous query
/// completes, so queries never overlap. Ends when the pipeline side hangs
/// up.
pub async fn run_query_loop(
    client: BackendClient,
    mut extent: watch::Receiver<QueryRequest>,
    responses: mpsc::Sender<QueryResponse>,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;
        let request = extent.borrow_and_update().clone();
        match client.query_devices(&request).await {
            Ok(response) => {
                debug!(
                    regions = response.region_summaries.len(),
                    devices = response.device_count,
                    "device query completed"
                );
                if responses.send(response).await.is_err() {
                    return;
                }
            }
            Err(error) => warn!(%error, "device query failed"),
        }
    }
}

/// Sends a selection without waiting for it: the spawned task logs the
/// outcome and is otherwise forgotten.
pub fn send_selection(client: &BackendClient, intent: SelectionIntent) {
    let client = client.clone();
    tokio::spawn(async move {
        match client.post_selection(&intent).await {
            Ok(reply) => info!(action = ?intent.action, %reply, "selection accepted"),
            Err(error) => warn!(%error, "selection failed"),
        }
    });
}
