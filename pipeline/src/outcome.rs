use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// Outcome of an interceptor's request-stage handler.
pub enum RequestOutcome {
    /// Forward the (possibly rewritten) request to the next interceptor.
    Next(Request),
    /// Resolve with a response, optionally continuing through the
    /// remaining response-stage interceptors.
    Resolve {
        response: Response,
        skip_remaining_response_stages: bool,
    },
    /// Resolve with a response for the caller, but still commit to sending
    /// `request` through the transport and the rest of the pipeline (used
    /// for stale-while-revalidate background refresh).
    ResolveAndNext { request: Request, response: Response },
    /// Reject with an error, optionally skipping the error stage entirely.
    Reject { error: Error, skip_remaining_error_stages: bool },
}

/// Outcome of an interceptor's response-stage handler.
pub enum ResponseOutcome {
    /// Forward the (possibly rewritten) response to the next interceptor.
    Next(Response),
    /// Resolve immediately with this response.
    Resolve(Response),
    /// Reject with an error, optionally skipping the error stage entirely.
    Reject { error: Error, skip_remaining_error_stages: bool },
}

/// Extra context passed to error-stage handlers describing which stage
/// raised the error, for logging purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackInfo {
    /// The error originated in a request-stage handler.
    RequestStage,
    /// The error originated from the transport.
    Transport,
    /// The error originated in a response-stage handler.
    ResponseStage,
    /// The error originated in an earlier error-stage handler.
    ErrorStage,
}

/// Outcome of an interceptor's error-stage handler.
pub enum ErrorOutcome {
    /// Forward the (possibly rewritten) error to the next error-stage
    /// interceptor, along with the request that produced it.
    Next(Request, Error),
    /// Resolve with a synthetic response, ending the pipeline in success.
    Resolve(Response),
    /// Reject with the (possibly rewritten) final error.
    Reject(Error),
}
