//! Response handles and payloads.
//!
//! # Responsibilities
//! - Give handlers a mutable view of the outbound status and headers
//! - Carry the one-shot channel that delivers the response to the transport
//! - Describe every kind of value a handler can answer with
//!
//! # Design Decisions
//! - A handle is a cheap `Arc` clone; every clone talks about the same response
//! - The write gate lives in [`ResponseTracker`](crate::http::state::ResponseTracker),
//!   not in the handle, so the dispatcher and the transport see the same state
//! - Dropping the transport side before delivery counts as the connection
//!   closing: the response becomes non-writeable

use axum::body::{Body, Bytes};
use axum::http::{header::HeaderName, HeaderMap, HeaderValue, Response, StatusCode};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

use crate::http::error::{self, HttpError};
use crate::http::request::{ExchangeId, RequestId, RequestIds};
use crate::http::send;
use crate::http::state::ResponseTracker;

/// Per-server tracking state shared by every response handle.
#[derive(Debug, Default)]
pub struct Exchanges {
    responses: ResponseTracker,
    request_ids: RequestIds,
    development: bool,
}

impl Exchanges {
    pub fn new(development: bool) -> Self {
        Self {
            development,
            ..Self::default()
        }
    }

    pub fn responses(&self) -> &ResponseTracker {
        &self.responses
    }

    pub fn request_ids(&self) -> &RequestIds {
        &self.request_ids
    }

    /// Development mode: pretty JSON and stack traces in error bodies.
    pub fn development(&self) -> bool {
        self.development
    }
}

/// A value to send as a response body.
pub enum Payload {
    /// No body.
    Empty,
    /// Binary body with a known length.
    Bytes(Bytes),
    /// Streaming body, piped to the client as it is produced.
    Stream(Body),
    /// Text body, sent verbatim.
    Text(String),
    /// Structured body, serialized as JSON.
    Json(serde_json::Value),
    /// A value that could not be turned into a body.
    Unrepresentable(String),
}

impl Payload {
    /// Convert any serializable value into a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Payload::Json(value),
            Err(e) => Payload::Unrepresentable(e.to_string()),
        }
    }

    /// Absent values make the dispatcher answer 204: nothing, empty text,
    /// and the JSON values `null`, `false`, zero and `""`.
    pub fn is_absent(&self) -> bool {
        match self {
            Payload::Empty => true,
            Payload::Text(text) => text.is_empty(),
            Payload::Json(serde_json::Value::Null) => true,
            Payload::Json(serde_json::Value::Bool(flag)) => !flag,
            Payload::Json(serde_json::Value::Number(n)) => n.as_f64() == Some(0.0),
            Payload::Json(serde_json::Value::String(text)) => text.is_empty(),
            _ => false,
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Payload::Empty => "empty".to_string(),
            Payload::Bytes(bytes) => format!("bytes({})", bytes.len()),
            Payload::Stream(_) => "stream".to_string(),
            Payload::Text(text) => format!("text({:?})", truncate(text, 64)),
            Payload::Json(value) => format!("json({})", truncate(&value.to_string(), 64)),
            Payload::Unrepresentable(reason) => format!("unrepresentable({reason})"),
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(bytes))
    }
}

impl From<Body> for Payload {
    fn from(body: Body) -> Self {
        Payload::Stream(body)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Payload::Empty)
    }
}

/// Wrapper marking a serializable value as a JSON body.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize> From<Json<T>> for Payload {
    fn from(Json(value): Json<T>) -> Self {
        Payload::json(&value)
    }
}

#[derive(Debug)]
struct Head {
    status: StatusCode,
    headers: HeaderMap,
}

struct Inner {
    exchange: ExchangeId,
    exchanges: Arc<Exchanges>,
    head: Mutex<Head>,
    transport: Mutex<Option<oneshot::Sender<Response<Body>>>>,
}

/// Status and headers a writer wants on the response, applied at commit.
#[derive(Debug)]
pub(crate) struct Draft {
    status: StatusCode,
    defaults: HeaderMap,
    overrides: HeaderMap,
}

impl Draft {
    pub(crate) fn new(status: StatusCode) -> Self {
        Self {
            status,
            defaults: HeaderMap::new(),
            overrides: HeaderMap::new(),
        }
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }

    /// Used only if the handler has not chosen a value.
    pub(crate) fn default_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.defaults.insert(name, value);
    }

    /// Replaces whatever the handler set.
    pub(crate) fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.overrides.insert(name, value);
    }
}

/// Outcome of handing a body to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The response was delivered.
    Delivered,
    /// Another write got there first.
    AlreadyWritten,
    /// The connection went away before delivery.
    Disconnected,
}

/// Handle to an outbound response.
#[derive(Clone)]
pub struct ResponseHandle {
    inner: Arc<Inner>,
}

impl ResponseHandle {
    /// Open a new writeable response.
    ///
    /// The returned [`PendingResponse`] is the transport side: it resolves
    /// with the first response written through any clone of the handle.
    pub fn open(exchanges: Arc<Exchanges>) -> (Self, PendingResponse) {
        let exchange = ExchangeId::next();
        let (tx, rx) = oneshot::channel();
        exchanges.responses().mark_writeable(exchange);

        let handle = Self {
            inner: Arc::new(Inner {
                exchange,
                exchanges: Arc::clone(&exchanges),
                head: Mutex::new(Head {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                }),
                transport: Mutex::new(Some(tx)),
            }),
        };
        let pending = PendingResponse {
            exchange,
            exchanges,
            rx: Some(rx),
        };
        (handle, pending)
    }

    pub fn exchange(&self) -> ExchangeId {
        self.inner.exchange
    }

    pub(crate) fn exchanges(&self) -> &Exchanges {
        &self.inner.exchanges
    }

    /// Correlation id of the request, while it is being processed.
    pub fn request_id(&self) -> Option<RequestId> {
        self.inner.exchanges.request_ids().get(self.inner.exchange)
    }

    /// Correlation id rendered for logs.
    pub fn request_label(&self) -> String {
        self.inner.exchanges.request_ids().label(self.inner.exchange)
    }

    pub fn is_writeable(&self) -> bool {
        self.inner.exchanges.responses().is_writeable(self.inner.exchange)
    }

    pub fn status(&self) -> StatusCode {
        self.head().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.head().status = status;
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.head().headers.get(name).cloned()
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.head().headers.insert(name, value);
    }

    pub fn headers(&self) -> HeaderMap {
        self.head().headers.clone()
    }

    /// Write `payload` with `status`. See [`send::send`].
    pub fn send(&self, status: StatusCode, payload: impl Into<Payload>) {
        send::send(self, status, payload.into());
    }

    /// Write an error body. See [`error::send_error`].
    pub fn send_error(&self, error: HttpError) {
        error::send_error(self, error);
    }

    /// Claim the write, apply `draft` over the handler's head and deliver
    /// it with `body`.
    ///
    /// The shared head is only touched after the claim succeeds.
    pub(crate) fn commit(&self, draft: Draft, body: Body) -> Commit {
        if !self
            .inner
            .exchanges
            .responses()
            .try_mark_written(self.inner.exchange)
        {
            return Commit::AlreadyWritten;
        }

        let tx = self
            .inner
            .transport
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(tx) = tx else {
            return Commit::Disconnected;
        };

        let mut head = self.head();
        head.status = draft.status;
        for (name, value) in &draft.overrides {
            head.headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &draft.defaults {
            head.headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        let mut response = Response::new(body);
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers.clone();
        drop(head);

        match tx.send(response) {
            Ok(()) => Commit::Delivered,
            Err(_) => Commit::Disconnected,
        }
    }

    fn head(&self) -> MutexGuard<'_, Head> {
        self.inner
            .head
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let head = self.head();
        f.debug_struct("ResponseHandle")
            .field("exchange", &self.inner.exchange)
            .field("writeable", &self.is_writeable())
            .field("status", &head.status)
            .field("headers", &head.headers)
            .finish()
    }
}

/// Transport side of a response.
///
/// Dropping it before the response arrives (client went away) closes the
/// response for writing.
pub struct PendingResponse {
    exchange: ExchangeId,
    exchanges: Arc<Exchanges>,
    rx: Option<oneshot::Receiver<Response<Body>>>,
}

impl PendingResponse {
    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    /// Wait for the response. `None` if every handle was dropped unwritten.
    pub async fn wait(mut self) -> Option<Response<Body>> {
        let rx = self.rx.take()?;
        rx.await.ok()
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.exchanges.responses().mark_written(self.exchange);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};

    fn open() -> (ResponseHandle, PendingResponse) {
        ResponseHandle::open(Arc::new(Exchanges::new(false)))
    }

    #[test]
    fn absent_payloads() {
        assert!(Payload::Empty.is_absent());
        assert!(Payload::from(()).is_absent());
        assert!(Payload::from(None::<String>).is_absent());
        assert!(Payload::Text(String::new()).is_absent());
        assert!(Payload::Json(serde_json::Value::Null).is_absent());

        assert!(Payload::Json(serde_json::json!(false)).is_absent());
        assert!(Payload::Json(serde_json::json!(0)).is_absent());
        assert!(Payload::Json(serde_json::json!(0.0)).is_absent());
        assert!(Payload::Json(serde_json::json!("")).is_absent());

        assert!(!Payload::Bytes(Bytes::new()).is_absent());
        assert!(!Payload::from("hi").is_absent());
        assert!(!Payload::Json(serde_json::json!(true)).is_absent());
        assert!(!Payload::Json(serde_json::json!(7)).is_absent());
        assert!(!Payload::Json(serde_json::json!([])).is_absent());
    }

    #[test]
    fn json_wrapper_serializes() {
        #[derive(Serialize)]
        struct Pet {
            name: &'static str,
        }
        match Payload::from(Json(Pet { name: "rex" })) {
            Payload::Json(value) => assert_eq!(value, serde_json::json!({"name": "rex"})),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn non_string_map_keys_are_unrepresentable() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "value");
        assert!(matches!(Payload::json(&map), Payload::Unrepresentable(_)));
    }

    #[test]
    fn describe_truncates_on_char_boundary() {
        let text = "é".repeat(100);
        let described = Payload::Text(text).describe();
        assert!(described.starts_with("text("));
    }

    #[tokio::test]
    async fn first_commit_wins() {
        let (handle, pending) = open();
        handle.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let first = handle.commit(Draft::new(StatusCode::CREATED), Body::from("one"));
        assert_eq!(first, Commit::Delivered);
        let second = handle.commit(Draft::new(StatusCode::OK), Body::from("two"));
        assert_eq!(second, Commit::AlreadyWritten);
        assert_eq!(handle.status(), StatusCode::CREATED);
        assert!(!handle.is_writeable());

        let response = pending.wait().await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn dropped_transport_closes_response() {
        let (handle, pending) = open();
        assert!(handle.is_writeable());

        drop(pending);
        assert!(!handle.is_writeable());
        assert_eq!(
            handle.commit(Draft::new(StatusCode::OK), Body::empty()),
            Commit::AlreadyWritten
        );
    }

    #[tokio::test]
    async fn draft_defaults_keep_handler_headers() {
        let (handle, pending) = open();
        handle.set_header(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        handle.set_header(CONTENT_LENGTH, HeaderValue::from_static("99"));

        let mut draft = Draft::new(StatusCode::OK);
        draft.default_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        draft.set_header(CONTENT_LENGTH, HeaderValue::from(3usize));
        handle.commit(draft, Body::from("a,b"));

        let response = pending.wait().await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "text/csv");
        assert_eq!(response.headers()[CONTENT_LENGTH], "3");
    }
}
