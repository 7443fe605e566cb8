//! Single-write response serialization.

use axum::body::Body;
use axum::http::{
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    HeaderValue, StatusCode,
};

use crate::http::error::{send_error, HttpError};
use crate::http::response::{Commit, Draft, Payload, ResponseHandle};
use crate::observability::metrics;

const OCTET_STREAM: &str = "application/octet-stream";
const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Write `payload` as the response, once.
///
/// Later calls on the same response are logged and ignored. Status and
/// headers are collected in a [`Draft`] and only applied once the write is
/// claimed, so a body that cannot be rendered still gets a proper error
/// response and a losing concurrent writer leaves no trace.
pub fn send(response: &ResponseHandle, status: StatusCode, payload: Payload) {
    if !response.is_writeable() {
        reject(response, status, &payload);
        return;
    }

    let mut draft = Draft::new(status);

    let text = match payload {
        Payload::Empty => {
            finish(response, draft, "empty", Body::empty());
            return;
        }
        Payload::Bytes(bytes) => {
            draft.default_header(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
            draft.set_header(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            finish(response, draft, "bytes", Body::from(bytes));
            return;
        }
        Payload::Stream(body) => {
            draft.default_header(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
            finish(response, draft, "stream", body);
            return;
        }
        Payload::Json(value) => {
            let rendered = if response.exchanges().development() {
                serde_json::to_string_pretty(&value)
            } else {
                serde_json::to_string(&value)
            };
            match rendered {
                Ok(text) => {
                    draft.default_header(CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
                    text
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %response.request_label(),
                        error = %e,
                        "failed to serialize response body"
                    );
                    send_error(response, HttpError::from_cause(e));
                    return;
                }
            }
        }
        Payload::Text(text) => text,
        Payload::Unrepresentable(reason) => {
            let error = anyhow::anyhow!("failed to create a string representation of data: {reason}");
            tracing::error!(
                request_id = %response.request_label(),
                error = %error,
                "unrepresentable response body"
            );
            send_error(response, HttpError::from_cause(error));
            if response.is_writeable() {
                finish(response, draft, "empty", Body::empty());
            }
            return;
        }
    };

    draft.set_header(CONTENT_LENGTH, HeaderValue::from(text.len()));
    finish(response, draft, "text", Body::from(text));
}

fn finish(response: &ResponseHandle, draft: Draft, kind: &'static str, body: Body) {
    let status = draft.status();
    match response.commit(draft, body) {
        Commit::Delivered => {
            tracing::debug!(
                request_id = %response.request_label(),
                status = status.as_u16(),
                kind,
                "response written"
            );
        }
        Commit::AlreadyWritten => {
            metrics::record_rejected_write();
            tracing::error!(
                request_id = %response.request_label(),
                status = status.as_u16(),
                kind,
                "tried to write to a response that had already been written to"
            );
        }
        Commit::Disconnected => {
            tracing::warn!(
                request_id = %response.request_label(),
                status = status.as_u16(),
                "connection closed before the response was delivered"
            );
        }
    }
}

fn reject(response: &ResponseHandle, status: StatusCode, payload: &Payload) {
    metrics::record_rejected_write();
    tracing::error!(
        request_id = %response.request_label(),
        status = status.as_u16(),
        data = ?payload,
        response = ?response,
        "tried to write to a response that had already been written to"
    );
}
