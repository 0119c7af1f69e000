//! ACT point-cloud node: sessions, dispatch and the workflow-node adapter.
//!
//! This crate turns raw `{params: {operation, ...}}` requests into structured
//! responses. Each request is validated against the operation catalogue,
//! executed inside its own [`PointCloudSession`], and answered with an
//! [`OperationResponse`] carrying either a result and a performance report or
//! an error with remediation suggestions.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The dispatcher and session sequence calls between
//! the resource rules in the [`pointcloud`] crate and the infrastructure
//! traits (`GeometryBackend`, `ResourceProbe`). They contain no resource
//! rules of their own.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`params`] | Typed access to the request parameter map |
//! | [`session`] | `PointCloudSession`, scoped ownership of one cloud |
//! | [`dispatcher`] | `OperationDispatcher`, responses and the request lifecycle |
//! | [`node`] | `PointCloudNode`, the `Node` implementation |

pub mod dispatcher;
mod handlers;
pub mod node;
pub mod params;
pub mod session;

pub use dispatcher::{
    DispatcherConfig, OperationDispatcher, OperationResponse, PerformanceReport, RequestState,
    ResponseStatus,
};
pub use handlers::not_yet_implemented;
pub use node::{PointCloudNode, NODE_TYPE};
pub use params::RequestParams;
pub use session::{
    DownsampleReport, NormalsReport, OutlierMethod, OutlierParams, OutlierReport,
    PointCloudSession, SaveReport, TransformReport,
};
