use thiserror::Error;

/// Generic boxed error for transport and interceptor failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the pipeline engine.
///
/// `Transport` and `Interceptor` wrap whatever the respective trait
/// implementation raised; the pipeline itself never inspects the inner
/// error, it only routes it through the error stage.
#[derive(Error, Debug)]
pub enum Error {
    /// The transport failed to produce a response.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// An interceptor raised an error outside of its tagged outcomes.
    #[error("interceptor error: {0}")]
    Interceptor(#[source] BoxError),

    /// A handler could not be reached because the future driving it was
    /// dropped. Background revalidation spawned for `ResolveAndNext` never
    /// observes this; it runs to completion independently of the caller.
    #[error("request cancelled")]
    Cancelled,
}

/// A `Result` alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
