//! Request lifecycle.
//!
//! # State Machine
//! ```text
//! ARRIVED ──▶ ROUTED ──▶ HANDLING ──▶ COMPLETED ──┐
//!    │           │           │                     ├──▶ FINALIZED
//!    │           └── 400/404 ┴──▶ FAILED ──────────┘
//!    │
//!    └── transport waits for the first write, logs `response sent`
//! ```
//!
//! # Design Decisions
//! - The lifecycle runs on its own task: a handler that writes early frees
//!   the connection while it keeps working, and a client that disconnects
//!   does not cancel the handler
//! - Every outcome, panics and deadline expiry included, is funnelled into
//!   exactly one call to the writer or the error mapper
//! - The correlation id is released unconditionally at FINALIZED

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use chrono::{SecondsFormat, Utc};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::http::error::{send_error, HttpError};
use crate::http::request::RequestId;
use crate::http::response::{Exchanges, Payload, ResponseHandle};
use crate::http::send::send;
use crate::observability::metrics;
use crate::routing::{HandlerContext, RouteMatch, Router};

enum Outcome {
    Completed(Payload),
    Failed(HttpError),
}

/// Owns the route table and per-request tracking state.
pub struct Dispatcher {
    router: Router,
    exchanges: Arc<Exchanges>,
    request_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(router: Router, development: bool) -> Self {
        Self {
            router,
            exchanges: Arc::new(Exchanges::new(development)),
            request_timeout: None,
        }
    }

    /// Build from configuration. Dispatch settings override the router's.
    pub fn from_config(router: Router, config: &ServerConfig) -> Self {
        let router = router.ignore_trailing_slash(config.dispatch.ignore_trailing_slash);
        let timeout = match config.dispatch.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self::new(router, config.development).with_request_timeout(timeout)
    }

    /// Deadline for a handler to finish; `None` waits forever.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn exchanges(&self) -> &Arc<Exchanges> {
        &self.exchanges
    }

    /// Requests whose outcome is not resolved yet.
    pub fn in_flight(&self) -> usize {
        self.exchanges.request_ids().len()
    }

    /// Handle one request and return the first response written for it.
    pub async fn dispatch(self: Arc<Self>, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().clone();
        let request_id = RequestId::new();

        let (response, pending) = ResponseHandle::open(Arc::clone(&self.exchanges));
        let exchange = response.exchange();
        self.exchanges.request_ids().register(exchange, request_id);

        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %request.uri(),
            time = %now(),
            "incoming request"
        );

        tokio::spawn(Arc::clone(&self).run(request, response));

        match pending.wait().await {
            Some(res) => {
                tracing::info!(
                    request_id = %request_id,
                    status = res.status().as_u16(),
                    time = %now(),
                    "response sent"
                );
                metrics::record_request(method.as_str(), res.status().as_u16(), start);
                res
            }
            None => {
                tracing::error!(
                    request_id = %request_id,
                    "request finished without a response"
                );
                metrics::record_request(method.as_str(), 500, start);
                let mut res = Response::new(Body::empty());
                *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                res
            }
        }
    }

    async fn run(self: Arc<Self>, request: Request<Body>, response: ResponseHandle) {
        let outcome = match self.route(&request) {
            Ok(matched) => self.handle(matched, request, response.clone()).await,
            Err(error) => Outcome::Failed(error),
        };

        match outcome {
            Outcome::Completed(payload) => complete(&response, payload),
            Outcome::Failed(error) => send_error(&response, error),
        }

        self.exchanges.request_ids().release(response.exchange());
    }

    fn route(&self, request: &Request<Body>) -> Result<RouteMatch, HttpError> {
        let path = resolve_path(request)
            .ok_or_else(|| HttpError::from_status(StatusCode::BAD_REQUEST))?;
        self.router
            .find(request.method(), &path, request)
            .ok_or_else(|| HttpError::from_status(StatusCode::NOT_FOUND))
    }

    async fn handle(
        &self,
        matched: RouteMatch,
        request: Request<Body>,
        response: ResponseHandle,
    ) -> Outcome {
        let RouteMatch { route, params } = matched;
        let cx = HandlerContext::new(request, response, params, route.store().cloned());

        let invoked = std::panic::catch_unwind(AssertUnwindSafe(|| route.handler().call(cx)));
        let fut = match invoked {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind(),
            Err(panic) => return handler_panicked(panic),
        };

        let result = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    return Outcome::Failed(
                        HttpError::from_status(StatusCode::GATEWAY_TIMEOUT).with_cause(
                            anyhow::anyhow!("handler did not complete within {limit:?}"),
                        ),
                    )
                }
            },
            None => fut.await,
        };

        match result {
            Ok(Ok(payload)) => Outcome::Completed(payload),
            Ok(Err(e)) => Outcome::Failed(
                HttpError::from_status(StatusCode::INTERNAL_SERVER_ERROR).with_cause(e),
            ),
            Err(panic) => handler_panicked(panic),
        }
    }
}

fn complete(response: &ResponseHandle, payload: Payload) {
    if payload.is_absent() {
        if response.is_writeable() {
            send(response, StatusCode::NO_CONTENT, Payload::Empty);
        }
    } else {
        send(response, response.status(), payload);
    }
}

fn handler_panicked(panic: Box<dyn Any + Send>) -> Outcome {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    Outcome::Failed(
        HttpError::from_status(StatusCode::INTERNAL_SERVER_ERROR)
            .with_cause(anyhow::anyhow!("handler panicked: {message}")),
    )
}

/// Origin-form path of the request, falling back to the raw target.
///
/// The asterisk form (`OPTIONS *`) resolves to `*`, which no route matches.
fn resolve_path(request: &Request<Body>) -> Option<String> {
    let path = request.uri().path();
    if path.starts_with('/') || path == "*" {
        return Some(path.to_string());
    }
    let raw = request.uri().to_string();
    (raw.starts_with('/') || raw == "*").then_some(raw)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorBody;
    use crate::routing::{sync, Route};
    use axum::body::Bytes;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::{HeaderValue, Method};

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body(res: Response<Body>) -> Bytes {
        axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap()
    }

    fn dispatcher(router: Router) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(router, false))
    }

    #[tokio::test]
    async fn unmatched_route_is_not_found() {
        let d = dispatcher(Router::new());
        let res = Arc::clone(&d).dispatch(get("/nope")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(&body(res).await[..], br#"{"status":404,"message":"Not Found"}"#);
    }

    #[tokio::test]
    async fn authority_form_is_bad_request() {
        let d = dispatcher(Router::new());
        let req = Request::builder()
            .method(Method::CONNECT)
            .uri("example.com:443")
            .body(Body::empty())
            .unwrap();
        let res = d.dispatch(req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let error: ErrorBody = serde_json::from_slice(&body(res).await).unwrap();
        assert_eq!(error.message, "Bad Request");
    }

    #[tokio::test]
    async fn asterisk_form_is_not_found() {
        let mut router = Router::new();
        router
            .add_handler(Method::OPTIONS, "/", |_cx: HandlerContext| async { Ok("root") })
            .unwrap();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("*")
            .body(Body::empty())
            .unwrap();
        let res = dispatcher(router).dispatch(req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let error: ErrorBody = serde_json::from_slice(&body(res).await).unwrap();
        assert_eq!(error.message, "Not Found");
    }

    #[tokio::test]
    async fn no_value_is_no_content() {
        let mut router = Router::new();
        router
            .add_handler(Method::GET, "/empty", |_cx: HandlerContext| async { Ok(()) })
            .unwrap();
        let res = dispatcher(router).dispatch(get("/empty")).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(body(res).await.is_empty());
    }

    #[tokio::test]
    async fn handler_status_is_kept() {
        let mut router = Router::new();
        router
            .add_handler(Method::GET, "/created", |cx: HandlerContext| async move {
                cx.response.set_status(StatusCode::CREATED);
                Ok("made")
            })
            .unwrap();
        let res = dispatcher(router).dispatch(get("/created")).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(&body(res).await[..], b"made");
    }

    #[tokio::test]
    async fn params_and_store_reach_handler() {
        let mut router = Router::new();
        router
            .add(
                Route::new(Method::GET, "/greet/:name", |cx: HandlerContext| async move {
                    let greeting = cx.store::<String>().cloned().unwrap_or_default();
                    Ok(format!("{greeting}, {}", cx.param("name").unwrap_or("?")))
                })
                .with_store("hello".to_string()),
            )
            .unwrap();
        let res = dispatcher(router).dispatch(get("/greet/ana")).await;
        assert_eq!(&body(res).await[..], b"hello, ana");
    }

    #[tokio::test]
    async fn handler_error_is_internal() {
        let mut router = Router::new();
        router
            .add_handler(Method::GET, "/fail", |_cx: HandlerContext| async {
                Err::<(), _>(anyhow::anyhow!("database unreachable"))
            })
            .unwrap();
        let res = dispatcher(router).dispatch(get("/fail")).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorBody = serde_json::from_slice(&body(res).await).unwrap();
        assert_eq!(error.message, "Internal Server Error");
        assert_eq!(error.stack, None);
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let mut router = Router::new();
        router
            .add_handler(Method::GET, "/async", |_cx: HandlerContext| async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .unwrap();
        router
            .add_handler(
                Method::GET,
                "/sync",
                sync(|_cx| -> anyhow::Result<()> { panic!("boom") }),
            )
            .unwrap();
        let d = Arc::new(Dispatcher::new(router, true));

        for path in ["/async", "/sync"] {
            let res = Arc::clone(&d).dispatch(get(path)).await;
            assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let error: ErrorBody = serde_json::from_slice(&body(res).await).unwrap();
            assert!(error.stack.unwrap().contains("boom"));
        }
    }

    #[tokio::test]
    async fn deadline_expiry_is_gateway_timeout() {
        let mut router = Router::new();
        router
            .add_handler(Method::GET, "/slow", |_cx: HandlerContext| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("late")
            })
            .unwrap();
        let d = Arc::new(
            Dispatcher::new(router, false).with_request_timeout(Some(Duration::from_millis(50))),
        );
        let res = d.dispatch(get("/slow")).await;
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn early_write_wins_over_returned_value() {
        let mut router = Router::new();
        router
            .add_handler(Method::GET, "/early", |cx: HandlerContext| async move {
                cx.response.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                cx.response.send(StatusCode::ACCEPTED, "first");
                Ok("second")
            })
            .unwrap();
        let res = dispatcher(router).dispatch(get("/early")).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(&body(res).await[..], b"first");
    }

    #[tokio::test]
    async fn early_write_then_nothing_is_not_overwritten() {
        let mut router = Router::new();
        router
            .add_handler(Method::GET, "/done", |cx: HandlerContext| async move {
                cx.response.send(StatusCode::OK, "done");
                Ok(())
            })
            .unwrap();
        let d = dispatcher(router);
        let res = Arc::clone(&d).dispatch(get("/done")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(&body(res).await[..], b"done");
    }

    #[tokio::test]
    async fn correlation_ids_are_released() {
        let mut router = Router::new();
        router
            .add_handler(Method::GET, "/ok", |_cx: HandlerContext| async { Ok("ok") })
            .unwrap();
        let d = dispatcher(router);

        for _ in 0..5 {
            let res = Arc::clone(&d).dispatch(get("/ok")).await;
            assert_eq!(res.status(), StatusCode::OK);
        }
        let _ = Arc::clone(&d).dispatch(get("/missing")).await;

        // Release happens on the lifecycle task right after the write.
        for _ in 0..100 {
            if d.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(d.in_flight(), 0);
        assert_eq!(d.exchanges().responses().open_count(), 0);
    }

    #[test]
    fn path_resolution() {
        assert_eq!(resolve_path(&get("/a/b?x=1")).as_deref(), Some("/a/b"));
        assert_eq!(
            resolve_path(&get("http://example.com/a")).as_deref(),
            Some("/a")
        );
        assert_eq!(resolve_path(&get("*")).as_deref(), Some("*"));
    }
}
