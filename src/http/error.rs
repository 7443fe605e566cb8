//! Error-to-response mapping.
//!
//! # Responsibilities
//! - Resolve status, message and cause of a failure into an [`ErrorBody`]
//! - Log server-side failures with the request's correlation id
//! - Expose cause details to clients in development mode only
//!
//! # Design Decisions
//! - Every field of [`HttpError`] is optional and resolved independently:
//!   status defaults to 500, message to the status' reason phrase
//! - Only statuses >= 500 are logged and may carry a stack

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::http::response::{Payload, ResponseHandle};
use crate::http::send::send;

/// Error wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// A failure to report to the client.
#[derive(Debug, Default)]
pub struct HttpError {
    status: Option<StatusCode>,
    message: Option<String>,
    cause: Option<anyhow::Error>,
}

impl HttpError {
    /// An error with nothing specified: 500 with its reason phrase.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_status(status: StatusCode) -> Self {
        Self::new().with_status(status)
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self::new().with_message(message)
    }

    pub fn from_cause(cause: impl Into<anyhow::Error>) -> Self {
        Self::new().with_cause(cause)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Resolved status.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Resolved message.
    pub fn message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| reason_phrase(self.status()).to_string())
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }

    /// Body sent to the client, without a stack.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            status: self.status().as_u16(),
            message: self.message(),
            stack: None,
        }
    }
}

impl From<StatusCode> for HttpError {
    fn from(status: StatusCode) -> Self {
        Self::from_status(status)
    }
}

impl From<anyhow::Error> for HttpError {
    fn from(cause: anyhow::Error) -> Self {
        Self::from_cause(cause)
    }
}

/// Standard reason phrase for a status code.
pub fn reason_phrase(status: StatusCode) -> &'static str {
    if let Some(reason) = status.canonical_reason() {
        return reason;
    }
    match status.as_u16() {
        425 => "Too Early",
        509 => "Bandwidth Limit Exceeded",
        _ if status.is_client_error() => "Client Error",
        _ if status.is_server_error() => "Server Error",
        _ => "Unknown Status",
    }
}

/// Send `error` as a JSON error body.
pub fn send_error(response: &ResponseHandle, error: HttpError) {
    let status = error.status();
    let mut body = error.body();

    if status.is_server_error() {
        tracing::error!(
            request_id = %response.request_label(),
            status = response.status().as_u16(),
            body = ?body,
            response = ?response,
            error = ?error.cause(),
            "internal error"
        );
        if response.exchanges().development() {
            body.stack = error.cause().map(|cause| format!("{cause:?}"));
        }
    }

    send(response, status, Payload::json(&body));
}
