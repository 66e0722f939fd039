use axum::{
    Json,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// AppError
///
/// The single error type returned by the services and handlers. Each variant
/// maps to exactly one HTTP status in `IntoResponse`; nothing upstream of this
/// module decides status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("User with username ({0}) already exists!")]
    UserAlreadyExists(String),

    /// Field name -> first failing constraint message.
    #[error("Request validation failed")]
    Validation(BTreeMap<String, String>),

    /// The database is missing data the application seeds itself (e.g. the
    /// default USER role). Not recoverable by the caller.
    #[error("{0}")]
    InternalConsistency(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        AppError::Validation(BTreeMap::from([(field.to_string(), message.to_string())]))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::UserAlreadyExists(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InternalConsistency(_)
            | AppError::PasswordHash(_)
            | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .filter_map(|(field, errs)| {
                let first = errs.first()?;
                let message = first
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| first.code.to_string());
                Some((field.to_string(), message))
            })
            .collect();
        AppError::Validation(fields)
    }
}

/// ErrorDetails
///
/// JSON envelope for every non-validation error.
/// `details` carries `uri=<path>` once `attach_request_details` has seen the response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ErrorDetails {
    pub statuscode: u16,
    pub message: String,
    pub details: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let AppError::Validation(fields) = self {
            tracing::debug!(?fields, "request validation failed");
            return (status, Json(fields)).into_response();
        }

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "An internal server error occurred".to_string()
            }
            AppError::PasswordHash(e) => {
                tracing::error!(error = %e, "password hashing error");
                "An internal server error occurred".to_string()
            }
            AppError::InternalConsistency(msg) => {
                tracing::error!(%msg, "internal consistency error");
                msg.clone()
            }
            other => other.to_string(),
        };

        let body = ErrorDetails {
            statuscode: status.as_u16(),
            message,
            details: String::new(),
        };

        let mut response = (status, Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

/// attach_request_details
///
/// Middleware that fills `ErrorDetails.details` with the path of the request
/// that produced the error. `AppError::into_response` has no access to the
/// request, so it leaves the envelope as a response extension for this layer.
pub async fn attach_request_details(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let Some(mut body) = response.extensions().get::<ErrorDetails>().cloned() else {
        return response;
    };
    body.details = format!("uri={}", path);

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let mut rebuilt = Json(body).into_response();
    *rebuilt.status_mut() = parts.status;
    for (name, value) in parts.headers.iter() {
        rebuilt.headers_mut().insert(name.clone(), value.clone());
    }
    rebuilt
}
