use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::error;

use hal_db::queries::OrderError;
use hal_types::api::FieldError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every handler failure. Renders as `{ "message": ..., "errors"?: [...] }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("Server error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Order rule violations travel inside `anyhow::Error` from the DB layer.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<OrderError>() {
            Some(e @ (OrderError::ProductNotFound | OrderError::NotFound)) => Self::NotFound(e.to_string()),
            Some(e @ OrderError::NotAuthorized) => Self::Forbidden(e.to_string()),
            Some(e) => Self::BadRequest(e.to_string()),
            None => Self::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(errors) => json!({ "message": self.to_string(), "errors": errors }),
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                json!({ "message": self.to_string() })
            }
            _ => json!({ "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// `Json` that reports malformed bodies in the API's error shape.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_errors_map_to_statuses() {
        let cases = [
            (OrderError::ProductNotFound, StatusCode::NOT_FOUND),
            (OrderError::NotFound, StatusCode::NOT_FOUND),
            (OrderError::NotAuthorized, StatusCode::FORBIDDEN),
            (OrderError::InsufficientStock, StatusCode::BAD_REQUEST),
            (OrderError::NotPending, StatusCode::BAD_REQUEST),
        ];
        for (order_err, status) in cases {
            let api: ApiError = anyhow::Error::from(order_err).into();
            assert_eq!(api.status(), status);
        }
    }

    #[test]
    fn other_errors_are_internal() {
        let api: ApiError = anyhow::anyhow!("disk full").into();
        assert!(matches!(api, ApiError::Internal(_)));
        assert_eq!(api.to_string(), "Server error");
    }
}
