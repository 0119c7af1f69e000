//! Workflow-node adapter.

use async_trait::async_trait;
use pointcloud::Node;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{OperationDispatcher, OperationResponse};

/// Node type identifier registered with the workflow framework.
pub const NODE_TYPE: &str = "pointcloud";

/// The point-cloud node as seen by the workflow framework.
///
/// Accepts `{"params": {"operation": "...", ...}}` and always answers with a
/// serialized [`OperationResponse`].
#[derive(Clone)]
pub struct PointCloudNode {
    dispatcher: OperationDispatcher,
}

impl PointCloudNode {
    pub fn new(dispatcher: OperationDispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &OperationDispatcher {
        &self.dispatcher
    }

    /// Runs a request, honouring `cancel` before long-running backend calls.
    pub async fn execute_with_cancellation(
        &self,
        request: Value,
        cancel: CancellationToken,
    ) -> OperationResponse {
        let mut params = match request {
            Value::Object(mut map) => match map.remove("params") {
                Some(Value::Object(params)) => params,
                Some(_) => {
                    return OperationResponse::error("", "Request 'params' must be an object", Vec::new())
                }
                None => Map::new(),
            },
            _ => return OperationResponse::error("", "Request must be a JSON object", Vec::new()),
        };

        let operation = match params.remove("operation") {
            Some(Value::String(op)) => op,
            _ => {
                return OperationResponse::error(
                    "",
                    "Missing required parameter: operation",
                    vec!["Set params.operation to a point cloud operation name".to_string()],
                )
            }
        };

        self.dispatcher
            .execute_with_cancellation(&operation, params, cancel)
            .await
    }
}

#[async_trait]
impl Node for PointCloudNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    async fn execute(&self, request: Value) -> Value {
        self.execute_with_cancellation(request, CancellationToken::new())
            .await
            .to_json()
    }
}
