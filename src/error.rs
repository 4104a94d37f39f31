use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

pub const BODY_SHAPE_MESSAGE: &str = "Body must be { user: string, history?: [{role,text}] }";

/// Everything that can cut a proxied chat request short.
///
/// The `Display` text of each variant is exactly what the caller sees in the
/// `error` field of the JSON body.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("POST only")]
    MethodNotAllowed,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit")]
    RateLimited { retry_after: Duration },

    #[error("Invalid JSON body")]
    InvalidJson,

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("{0}")]
    InvalidBody(String),

    #[error("Message flagged by moderation")]
    Flagged,

    /// Non-success answer from the completion or moderation API.
    #[error("{body}")]
    Upstream { status: StatusCode, body: String },

    #[error("{0}")]
    Internal(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidJson | Self::InvalidBody(_) | Self::Flagged => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let Self::RateLimited { retry_after } = self {
            let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            builder.insert_header((header::RETRY_AFTER, secs.to_string()));
        }
        builder.json(json!({ "error": self.to_string() }))
    }
}
