//! Swarm error taxonomy, mirroring `tw2002_bot::error::ErrorKind`'s
//! closed-enum-plus-`http_status` shape for the REST control plane.

use std::fmt;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwarmErrorKind {
    BotNotFound,
    LeaseDenied,
    LeaseExpired,
    BadRequest,
    KnowledgePoisoned,
    Internal,
}

impl SwarmErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BotNotFound => "bot_not_found",
            Self::LeaseDenied => "lease_denied",
            Self::LeaseExpired => "lease_expired",
            Self::BadRequest => "bad_request",
            Self::KnowledgePoisoned => "knowledge_poisoned",
            Self::Internal => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::BotNotFound => 404,
            Self::LeaseDenied | Self::LeaseExpired => 409,
            Self::BadRequest => 400,
            Self::KnowledgePoisoned => 422,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for SwarmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SwarmError {
    pub kind: SwarmErrorKind,
    pub detail: String,
}

impl SwarmError {
    pub fn new(kind: SwarmErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }
}

impl fmt::Display for SwarmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for SwarmError {}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for SwarmError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody { code: self.kind.as_str().to_owned(), message: self.detail };
        (status, Json(body)).into_response()
    }
}

pub type SwarmResult<T> = Result<T, SwarmError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
