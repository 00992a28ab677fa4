#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]
//! A small state machine that routes an HTTP request through an ordered
//! chain of interceptors (request / response / error stages) before and
//! after handing it to an external [`Transport`].
//!
//! This crate owns none of the transport, logging sink, or body producer —
//! those are traits the caller implements. It is the building block the
//! `http-cache` crate layers an RFC 9111 cache on top of, via
//! [`Interceptor::on_request`]'s `ResolveAndNext` outcome.

mod body;
mod engine;
mod error;
pub mod id;
mod interceptor;
pub mod logging;
mod outcome;
mod request;
mod response;

pub use body::{Body, BodyStream, Chunk, StreamError};
pub use engine::{Pipeline, PipelineBuilder};
pub use error::{BoxError, Error, Result};
pub use interceptor::{FnInterceptor, Interceptor, Transport};
pub use outcome::{ErrorOutcome, RequestOutcome, ResponseOutcome, StackInfo};
pub use request::{Request, RequestSnapshot};
pub use response::{Response, ResponseParts};
