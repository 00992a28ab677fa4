use thiserror::Error;

/// Errors produced while caching, reading, or serving a response.
///
/// Journal and body I/O failures are never returned to the pipeline caller
/// directly — per the cache's best-effort policy, callers of
/// [`crate::HttpCacheInterceptor`] see the original response even when a
/// variant of this type was logged internally. This type exists for the
/// handful of call sites (construction, explicit `clear_cache`) where a
/// failure genuinely must propagate.
#[derive(Error, Debug)]
pub enum Error {
    /// The underlying pipeline rejected the request or response.
    #[error(transparent)]
    Pipeline(#[from] pipeline::Error),

    /// The journal snapshot could not be read, written, or parsed.
    #[error("journal I/O error: {0}")]
    Journal(#[source] std::io::Error),

    /// A body blob could not be read or written.
    #[error("body store I/O error: {0}")]
    Body(#[source] std::io::Error),

    /// A header value was not valid ASCII/visible-printable text.
    #[error("invalid header value: {0}")]
    Header(#[from] http::header::ToStrError),

    /// A header value could not be constructed from computed text.
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// A stored or constructed URL was malformed.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The journal's binary snapshot could not be encoded or decoded.
    #[error("journal snapshot (de)serialization error: {0}")]
    Snapshot(#[from] bincode::Error),
}

/// A `Result` alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
