use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::ledger::LedgerError;
use crate::responses::RequestMeta;

pub const E_BAD_REQUEST: &str = "BAD_REQUEST";
pub const E_DB_FAILURE: &str = "DB_FAILURE";
pub const E_ACCOUNT_NOT_FOUND: &str = "ACCOUNT_NOT_FOUND";
pub const E_USER_NOT_FOUND: &str = "USER_NOT_FOUND";
pub const E_OWNER_UNRESOLVED: &str = "OWNER_UNRESOLVED";
pub const E_STATUS_CONFLICT: &str = "STATUS_CONFLICT";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Internal(anyhow::Error),
}

#[derive(Debug)]
pub struct ApiErrorWithMeta {
    error: ApiError,
    meta: RequestMeta,
    code: Option<String>,
}

impl ApiError {
    pub fn with_meta(self, meta: RequestMeta) -> ApiErrorWithMeta {
        ApiErrorWithMeta {
            error: self,
            meta,
            code: None,
        }
    }

    /// Maps a ledger failure to its HTTP error and error code.
    pub fn from_ledger(err: LedgerError, meta: RequestMeta) -> ApiErrorWithMeta {
        let message = err.user_message();
        let (error, code) = match err {
            LedgerError::AccountNotFound(_) => (ApiError::NotFound(message), E_ACCOUNT_NOT_FOUND),
            LedgerError::UserNotFound(_) => (ApiError::NotFound(message), E_USER_NOT_FOUND),
            LedgerError::OwnerUnresolved { .. } => {
                (ApiError::Unprocessable(message), E_OWNER_UNRESOLVED)
            }
            LedgerError::StatusConflict { .. } => (ApiError::Conflict(message), E_STATUS_CONFLICT),
            LedgerError::Validation(_) => (ApiError::BadRequest(message), E_BAD_REQUEST),
            e @ LedgerError::Store { .. } => (ApiError::Internal(e.into()), E_DB_FAILURE),
        };
        error.with_meta(meta).with_code(code)
    }
}

impl ApiErrorWithMeta {
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }
}

impl IntoResponse for ApiErrorWithMeta {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.error {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(e) => {
                error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let mut body = json!({
            "request_id": self.meta.request_id,
            "error": error_message,
        });
        if let Some(code) = self.code {
            body["code"] = json!(code);
        }

        (status, Json(body)).into_response()
    }
}
