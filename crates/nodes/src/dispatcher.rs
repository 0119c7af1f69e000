//! The request boundary of the point-cloud node.
//!
//! [`OperationDispatcher::execute`] turns an operation name and a parameter
//! map into an [`OperationResponse`]. It never returns an `Err` and never
//! panics on bad input: unknown operations, missing parameters, domain
//! errors and unexpected backend failures all become `status: "error"`
//! responses. Each request gets its own [`PointCloudSession`], which is
//! closed before the response is built.

use std::sync::Arc;
use std::time::Instant;

use pointcloud::{
    Availability, GeometryBackend, PointCloudError, PointCloudOperation, RequestId,
    ResourceAnalyzer, ResourceProbe, SystemResources, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::handlers::{self, not_yet_implemented, HandlerContext};
use crate::params::RequestParams;
use crate::session::PointCloudSession;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Host state measured when an operation completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub duration_seconds: f64,
    pub total_memory_bytes: f64,
    pub available_memory_bytes: f64,
    pub cpu_count: usize,
    pub gpu_available: bool,
}

impl PerformanceReport {
    fn measure(started: Instant, resources: &SystemResources) -> Self {
        Self {
            duration_seconds: started.elapsed().as_secs_f64(),
            total_memory_bytes: resources.total_memory_bytes,
            available_memory_bytes: resources.available_memory_bytes,
            cpu_count: resources.cpu_count,
            gpu_available: resources.has_gpu,
        }
    }
}

/// The JSON document returned for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub status: ResponseStatus,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Forwarded verbatim from the domain error; omitted when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceReport>,
    pub timestamp: Timestamp,
}

impl OperationResponse {
    pub fn success(operation: &str, result: Value, performance: PerformanceReport) -> Self {
        Self {
            status: ResponseStatus::Success,
            operation: operation.to_string(),
            result: Some(result),
            error: None,
            suggestions: Vec::new(),
            performance: Some(performance),
            timestamp: Timestamp::now(),
        }
    }

    pub fn error(operation: &str, error: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            operation: operation.to_string(),
            result: None,
            error: Some(error.into()),
            suggestions,
            performance: None,
            timestamp: Timestamp::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            json!({
                "status": "error",
                "operation": self.operation,
                "error": format!("failed to encode response: {e}"),
                "timestamp": self.timestamp.to_string(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Observable states of one request, in the order they occur.
///
/// Requests rejected before a session is needed go straight from `Received`
/// or `Validated` to `Responded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    Validated,
    SessionOpen,
    Executing,
    Success,
    DomainError,
    UnexpectedError,
    SessionClosed,
    Responded,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Whether mutating operations may downsample automatically when the
    /// analyzer recommends it. Requests can override this per call.
    pub auto_optimize: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            auto_optimize: true,
        }
    }
}

/// Validates requests, runs them in a fresh session and shapes the response.
#[derive(Clone)]
pub struct OperationDispatcher {
    backend: Option<Arc<dyn GeometryBackend>>,
    analyzer: Arc<ResourceAnalyzer>,
    probe: Arc<dyn ResourceProbe>,
    config: DispatcherConfig,
}

impl OperationDispatcher {
    pub fn new(
        backend: Option<Arc<dyn GeometryBackend>>,
        analyzer: Arc<ResourceAnalyzer>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Self {
        Self {
            backend,
            analyzer,
            probe,
            config: DispatcherConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    pub async fn execute(&self, operation: &str, params: Map<String, Value>) -> OperationResponse {
        self.execute_with_cancellation(operation, params, CancellationToken::new())
            .await
    }

    /// Like [`Self::execute`], honouring `cancel` before long-running backend calls.
    pub async fn execute_with_cancellation(
        &self,
        operation: &str,
        params: Map<String, Value>,
        cancel: CancellationToken,
    ) -> OperationResponse {
        self.execute_traced(operation, params, cancel).await.0
    }

    /// Executes a request and also returns the lifecycle states it passed through.
    pub async fn execute_traced(
        &self,
        operation: &str,
        params: Map<String, Value>,
        cancel: CancellationToken,
    ) -> (OperationResponse, Vec<RequestState>) {
        let request_id = RequestId::new_random();
        let span = info_span!("pointcloud_request", %request_id, operation);
        self.run(operation, params, cancel).instrument(span).await
    }

    async fn run(
        &self,
        operation: &str,
        params: Map<String, Value>,
        cancel: CancellationToken,
    ) -> (OperationResponse, Vec<RequestState>) {
        let started = Instant::now();
        let mut trace = vec![RequestState::Received];

        let op = match PointCloudOperation::from_name(operation) {
            Some(op) if op.availability() == Availability::Implemented => op,
            Some(op) => {
                info!("operation is catalogued but not implemented");
                trace.push(RequestState::Responded);
                return (
                    OperationResponse::error(operation, not_yet_implemented(op), Vec::new()),
                    trace,
                );
            }
            None => {
                warn!("unsupported operation");
                trace.push(RequestState::Responded);
                return (
                    OperationResponse::error(
                        operation,
                        format!("Unsupported point cloud operation: {operation}"),
                        Vec::new(),
                    ),
                    trace,
                );
            }
        };

        let params = RequestParams::new(params);
        let expected = op.parameters();
        if let Some(missing) = params.first_missing(expected.required) {
            let err = PointCloudError::validation_with(
                format!("Missing required parameter: {missing}"),
                vec![format!(
                    "{op} requires: {}",
                    expected.required.join(", ")
                )],
            );
            warn!(kind = err.kind(), error = %err, "request rejected");
            trace.push(RequestState::Responded);
            return (
                OperationResponse::error(operation, err.to_string(), err.suggestions().to_vec()),
                trace,
            );
        }
        trace.push(RequestState::Validated);

        let mut session = PointCloudSession::open(
            self.backend.clone(),
            Arc::clone(&self.analyzer),
            Arc::clone(&self.probe),
            cancel,
        );
        trace.push(RequestState::SessionOpen);
        trace.push(RequestState::Executing);

        let ctx = HandlerContext {
            auto_optimize: self.config.auto_optimize,
        };
        let outcome = handlers::handle(op, &params, &mut session, ctx).await;
        trace.push(match &outcome {
            Ok(_) => RequestState::Success,
            Err(e) if e.is_unexpected() => RequestState::UnexpectedError,
            Err(_) => RequestState::DomainError,
        });

        drop(session);
        trace.push(RequestState::SessionClosed);

        let response = match outcome {
            Ok(result) => {
                let performance = PerformanceReport::measure(started, &self.probe.probe());
                info!(
                    duration_seconds = performance.duration_seconds,
                    "operation succeeded"
                );
                OperationResponse::success(operation, result, performance)
            }
            Err(err) if err.is_unexpected() => {
                error!(error = %err, "unexpected failure");
                OperationResponse::error(
                    operation,
                    format!("Internal error while executing {op}; see logs for details"),
                    Vec::new(),
                )
            }
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "operation failed");
                OperationResponse::error(operation, err.to_string(), err.suggestions().to_vec())
            }
        };
        trace.push(RequestState::Responded);
        (response, trace)
    }
}
