use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_std::task;
use futures_util::future::FutureExt;
use http_types::{Request, Response, StatusCode};

/// A boxed response future, as returned by registered handlers.
type BoxFuture = Pin<Box<dyn Future<Output = http_types::Result<Response>> + Send + 'static>>;

type Endpoint = dyn Fn(Request) -> BoxFuture + Send + Sync + 'static;

/// Maps request paths to the handlers servicing them.
///
/// Handlers run as their own tasks on the executor, one task per request, so
/// a slow handler never blocks request parsing and pipelined requests are
/// processed concurrently. Requests for unregistered paths are answered with
/// a `404 Not Found`.
#[derive(Default)]
pub struct HandlerRegistry {
    routes: HashMap<String, Arc<Endpoint>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Registers `handler` for requests whose path equals `path`.
    pub fn at<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = http_types::Result<Response>> + Send + 'static,
    {
        let endpoint: Arc<Endpoint> = Arc::new(move |req| Box::pin(handler(req)));
        self.routes.insert(path.to_owned(), endpoint);
    }

    /// Spawns the handler task for `request`.
    ///
    /// Panics and handler errors are contained within the task; the response
    /// sender observes them as a [`HandlerFailure`] when joining the task.
    pub(crate) fn start_request_task(&self, request: Request) -> HandlerTask {
        let endpoint = self.routes.get(request.url().path()).cloned();
        let handle = task::spawn(async move {
            let fut: BoxFuture = match endpoint {
                Some(endpoint) => endpoint(request),
                None => Box::pin(not_found()),
            };
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(err)) => Err(HandlerFailure::Failed(err)),
                Err(_) => Err(HandlerFailure::Panicked),
            }
        });
        HandlerTask { handle }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("routes", &self.routes.keys())
            .finish()
    }
}

async fn not_found() -> http_types::Result<Response> {
    Ok(Response::new(StatusCode::NotFound))
}

/// Why a handler task did not produce a response.
#[derive(Debug)]
pub(crate) enum HandlerFailure {
    /// The handler future panicked.
    Panicked,
    /// The handler returned an error.
    Failed(http_types::Error),
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFailure::Panicked => write!(f, "panic"),
            HandlerFailure::Failed(err) => write!(f, "error: {}", err),
        }
    }
}

/// A running handler task.
///
/// Awaiting the task yields the handler's outcome; this happens exactly once
/// and only in the response sender. [`cancel`][HandlerTask::cancel] tears
/// the task down at its next suspension point and waits for that to finish.
#[derive(Debug)]
pub(crate) struct HandlerTask {
    handle: task::JoinHandle<Result<Response, HandlerFailure>>,
}

impl HandlerTask {
    /// Cancels the task and waits until it is gone.
    pub(crate) async fn cancel(self) {
        let _ = self.handle.cancel().await;
    }
}

impl Future for HandlerTask {
    type Output = Result<Response, HandlerFailure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_types::{Method, Url};

    fn request(path: &str) -> Request {
        let url = Url::parse("http://example.com").unwrap().join(path).unwrap();
        Request::new(Method::Get, url)
    }

    #[async_std::test]
    async fn routes_by_path() {
        let mut registry = HandlerRegistry::new();
        registry.at("/hello", |_req| async {
            let mut res = Response::new(StatusCode::Ok);
            res.set_body("world");
            Ok(res)
        });

        let response = registry
            .start_request_task(request("/hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::Ok);
    }

    #[async_std::test]
    async fn unknown_paths_get_a_404() {
        let registry = HandlerRegistry::new();
        let response = registry
            .start_request_task(request("/missing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NotFound);
    }

    #[async_std::test]
    async fn a_panic_is_contained_in_the_task() {
        let mut registry = HandlerRegistry::new();
        registry.at("/crash", |_req| async { panic!("kaboom") });

        let outcome = registry.start_request_task(request("/crash")).await;
        match outcome {
            Err(HandlerFailure::Panicked) => {}
            other => panic!("expected a contained panic, got {:?}", other.map(|_| ())),
        }
    }

    #[async_std::test]
    async fn handler_errors_are_reported() {
        let mut registry = HandlerRegistry::new();
        registry.at("/fail", |_req| async {
            Err(http_types::format_err!("no can do"))
        });

        let outcome = registry.start_request_task(request("/fail")).await;
        assert!(matches!(outcome, Err(HandlerFailure::Failed(_))));
    }
}
