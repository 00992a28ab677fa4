use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::error::Error;
use crate::outcome::{ErrorOutcome, RequestOutcome, ResponseOutcome, StackInfo};
use crate::request::Request;
use crate::response::Response;

/// An interceptor sees every request and response that passes through a
/// [`crate::Pipeline`] it was registered on.
///
/// All three hooks default to "forward" (`Next` with the input unchanged),
/// so an interceptor only needs to implement the stage(s) it cares about.
/// The same interceptor instance serves many concurrent requests; it must
/// not keep per-request mutable state on `self` — any such state belongs on
/// the stack of the call that needs it.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Inspect or rewrite the outgoing request, or short-circuit it.
    async fn on_request(&self, request: Request) -> RequestOutcome {
        RequestOutcome::Next(request)
    }

    /// Inspect or rewrite the response, or short-circuit it.
    async fn on_response(&self, response: Response) -> ResponseOutcome {
        ResponseOutcome::Next(response)
    }

    /// Inspect or rewrite an in-flight error, or recover from it.
    async fn on_error(
        &self,
        request: Request,
        error: Error,
        _stack_info: StackInfo,
    ) -> ErrorOutcome {
        ErrorOutcome::Next(request, error)
    }

    /// Called once when the owning pipeline is closed.
    fn dispose(&self) {}
}

/// The transport this pipeline eventually hands requests to. Out of scope
/// for this crate (connection management, TLS, retries belong to whatever
/// implements it); the pipeline only needs to invoke it and route failures
/// into the error stage.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and produce a response or an error.
    async fn send(&self, request: Request) -> Result<Response, Error>;

    /// Called once when the owning pipeline is closed.
    fn dispose(&self) {}
}

type RequestFn = dyn Fn(Request) -> Pin<Box<dyn Future<Output = RequestOutcome> + Send>>
    + Send
    + Sync;
type ResponseFn = dyn Fn(Response) -> Pin<Box<dyn Future<Output = ResponseOutcome> + Send>>
    + Send
    + Sync;
type ErrorFn = dyn Fn(Request, Error, StackInfo) -> Pin<Box<dyn Future<Output = ErrorOutcome> + Send>>
    + Send
    + Sync;

/// An [`Interceptor`] assembled from plain closures, for callers who'd
/// rather not define a type for a one-off interceptor.
///
/// ```ignore
/// let logger = FnInterceptor::new().on_request(|req| async move {
///     RequestOutcome::Next(req)
/// });
/// ```
#[derive(Default)]
pub struct FnInterceptor {
    request: Option<Box<RequestFn>>,
    response: Option<Box<ResponseFn>>,
    error: Option<Box<ErrorFn>>,
}

impl FnInterceptor {
    /// An interceptor with no handlers set (forwards everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request-stage handler.
    pub fn on_request<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RequestOutcome> + Send + 'static,
    {
        self.request = Some(Box::new(move |r| Box::pin(f(r))));
        self
    }

    /// Set the response-stage handler.
    pub fn on_response<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResponseOutcome> + Send + 'static,
    {
        self.response = Some(Box::new(move |r| Box::pin(f(r))));
        self
    }

    /// Set the error-stage handler.
    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, Error, StackInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ErrorOutcome> + Send + 'static,
    {
        self.error = Some(Box::new(move |req, err, info| Box::pin(f(req, err, info))));
        self
    }
}

#[async_trait]
impl Interceptor for FnInterceptor {
    async fn on_request(&self, request: Request) -> RequestOutcome {
        match &self.request {
            Some(f) => f(request).await,
            None => RequestOutcome::Next(request),
        }
    }

    async fn on_response(&self, response: Response) -> ResponseOutcome {
        match &self.response {
            Some(f) => f(response).await,
            None => ResponseOutcome::Next(response),
        }
    }

    async fn on_error(
        &self,
        request: Request,
        error: Error,
        stack_info: StackInfo,
    ) -> ErrorOutcome {
        match &self.error {
            Some(f) => f(request, error, stack_info).await,
            None => ErrorOutcome::Next(request, error),
        }
    }
}
