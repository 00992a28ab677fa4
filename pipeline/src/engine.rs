use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::Error;
use crate::interceptor::{Interceptor, Transport};
use crate::outcome::{ErrorOutcome, RequestOutcome, ResponseOutcome, StackInfo};
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, Default)]
struct NoTransportConfigured;

impl fmt::Display for NoTransportConfigured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pipeline has no transport configured and no interceptor resolved the request")
    }
}

impl std::error::Error for NoTransportConfigured {}

/// Builds a [`Pipeline`] from an ordered interceptor list, an optional
/// transport, and the response-stage ordering flag.
pub struct PipelineBuilder {
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Option<Arc<dyn Transport>>,
    reverse_response: bool,
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("interceptors", &self.interceptors.len())
            .field("has_transport", &self.transport.is_some())
            .field("reverse_response", &self.reverse_response)
            .finish()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self { interceptors: Vec::new(), transport: None, reverse_response: false }
    }
}

impl PipelineBuilder {
    /// Start building an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor to the end of the declared order.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Set the transport the pipeline sends requests to once no
    /// interceptor has resolved them.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// When set, response-stage interceptors run in the reverse of their
    /// declared order (request-stage and error-stage order is unaffected).
    pub fn reverse_response(mut self, reverse: bool) -> Self {
        self.reverse_response = reverse;
        self
    }

    /// Finish building the pipeline.
    pub fn build(self) -> Pipeline {
        Pipeline {
            interceptors: self.interceptors,
            transport: self.transport,
            reverse_response: self.reverse_response,
        }
    }
}

/// Routes a request through an ordered chain of [`Interceptor`]s and a
/// [`Transport`], producing a single streamed response or a final error.
///
/// See the module-level algorithm description on [`Pipeline::send`].
pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Option<Arc<dyn Transport>>,
    reverse_response: bool,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("interceptors", &self.interceptors.len())
            .field("has_transport", &self.transport.is_some())
            .field("reverse_response", &self.reverse_response)
            .finish()
    }
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Drive `request` through the request stage, the transport, the
    /// response stage, and (on failure) the error stage.
    ///
    /// Request-stage and response-stage handlers run strictly in sequence
    /// within a single call; multiple concurrent calls to `send` interleave
    /// arbitrarily with each other, and none of them mutate the pipeline's
    /// own interceptor list.
    pub async fn send(&self, request: Request) -> Result<Response, Error> {
        let request_id = request.id().to_string();
        let mut current = request;
        let mut resolved: Option<Response> = None;
        let mut resolve_and_next = false;

        for interceptor in &self.interceptors {
            match interceptor.on_request(current).await {
                RequestOutcome::Next(next) => current = next,
                RequestOutcome::Resolve { response, skip_remaining_response_stages } => {
                    if skip_remaining_response_stages {
                        debug!(%request_id, "request stage resolved, skipping response stage");
                        return Ok(response);
                    }
                    // Remember the response but keep walking the remaining
                    // request-stage interceptors; they still see the
                    // (possibly further rewritten) request.
                    resolved = Some(response);
                }
                RequestOutcome::ResolveAndNext { request, response } => {
                    current = request;
                    resolved = Some(response);
                    resolve_and_next = true;
                }
                RequestOutcome::Reject { error, skip_remaining_error_stages } => {
                    if skip_remaining_error_stages {
                        warn!(%request_id, %error, "request stage rejected, skipping error stage");
                        return Err(error);
                    }
                    return self
                        .run_error_stage(current, error, StackInfo::RequestStage)
                        .await;
                }
            }
        }

        self.finish_after_request_stage(current, resolved, resolve_and_next).await
    }

    async fn finish_after_request_stage(
        &self,
        request: Request,
        resolved: Option<Response>,
        resolve_and_next: bool,
    ) -> Result<Response, Error> {
        if resolve_and_next {
            let response = resolved.expect("ResolveAndNext always carries a response");
            self.spawn_background_continuation(request);
            return Ok(response);
        }

        if let Some(response) = resolved {
            // A plain Resolve(response, false) was returned: the transport
            // is skipped entirely but the response still flows through the
            // response stage.
            return self.run_response_stage(request, response).await;
        }

        self.dispatch_to_transport(request).await
    }

    async fn dispatch_to_transport(&self, request: Request) -> Result<Response, Error> {
        let error_context = request.clone_without_body();
        let outcome = match &self.transport {
            Some(transport) => transport.send(request).await,
            None => Err(Error::Transport(Box::new(NoTransportConfigured))),
        };
        match outcome {
            Ok(response) => self.run_response_stage(error_context, response).await,
            Err(error) => self.run_error_stage(error_context, error, StackInfo::Transport).await,
        }
    }

    async fn run_response_stage(
        &self,
        request_context: Request,
        mut response: Response,
    ) -> Result<Response, Error> {
        response.attach_source(request_context.snapshot());

        let indices: Vec<usize> = if self.reverse_response {
            (0..self.interceptors.len()).rev().collect()
        } else {
            (0..self.interceptors.len()).collect()
        };

        for i in indices {
            match self.interceptors[i].on_response(response).await {
                ResponseOutcome::Next(next) => response = next,
                ResponseOutcome::Resolve(resolved) => return Ok(resolved),
                ResponseOutcome::Reject { error, skip_remaining_error_stages } => {
                    if skip_remaining_error_stages {
                        return Err(error);
                    }
                    return self
                        .run_error_stage(request_context, error, StackInfo::ResponseStage)
                        .await;
                }
            }
        }
        Ok(response)
    }

    async fn run_error_stage(
        &self,
        mut request: Request,
        mut error: Error,
        mut stack_info: StackInfo,
    ) -> Result<Response, Error> {
        for interceptor in &self.interceptors {
            match interceptor.on_error(request, error, stack_info).await {
                ErrorOutcome::Next(next_request, next_error) => {
                    request = next_request;
                    error = next_error;
                    stack_info = StackInfo::ErrorStage;
                }
                ErrorOutcome::Resolve(response) => return Ok(response),
                ErrorOutcome::Reject(error) => return Err(error),
            }
        }
        error!(error = %error, "error stage exhausted without recovery");
        Err(error)
    }

    /// Spawn the background continuation for a `ResolveAndNext` outcome: the
    /// caller already has its response, so any error or further rejection
    /// here is simply logged and discarded.
    fn spawn_background_continuation(&self, request: Request) {
        let interceptors = self.interceptors.clone();
        let transport = self.transport.clone();
        let reverse_response = self.reverse_response;
        let request_id = request.id().to_string();
        tokio::spawn(async move {
            let background = Pipeline { interceptors, transport, reverse_response };
            if let Err(error) = background.dispatch_to_transport(request).await {
                debug!(%request_id, %error, "background revalidation did not complete");
            }
        });
    }

    /// Dispose every interceptor, then the transport, in declared order.
    pub fn close(&self) {
        for interceptor in &self.interceptors {
            interceptor.dispose();
        }
        if let Some(transport) = &self.transport {
            transport.dispose();
        }
    }
}
