use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub mod admin;
pub mod dashboard;
pub mod health;
pub mod referral;
pub mod register;
pub mod spin;
pub mod stats;

pub use admin::*;
pub use dashboard::*;
pub use health::*;
pub use referral::*;
pub use register::*;
pub use spin::*;
pub use stats::*;

/// Success envelope shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            fallback: None,
            warning: None,
            error: None,
        }
    }

    /// Degraded answer served when the store could not be read.
    pub fn degraded(data: T, warning: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: true,
            data,
            fallback: Some(true),
            warning: Some(warning.into()),
            error,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
