//! HTTP API
//!
//! 基于 axum 的 REST 接口，租户由 `X-Tenant-Id` 请求头确定。

pub mod error;
pub mod extract;
pub mod handlers;
pub mod request;
pub mod response;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use response::ApiResponse;
pub use routes::{api_routes, build_router};
pub use state::AppState;
