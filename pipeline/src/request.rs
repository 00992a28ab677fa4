use http::{HeaderMap, Method};
use url::Url;

use crate::body::Body;

/// A request as it travels through the pipeline.
///
/// Immutable after the request stage finishes rewriting it; mutations made
/// by one interceptor are visible to every later interceptor in the same
/// stage, since each `Next` outcome replaces the request the engine is
/// holding.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Body,
    /// Stable, short, unique id for this request; set once when the
    /// pipeline first receives the request and carried through logs and the
    /// `x-request-id` header.
    id: String,
}

impl Request {
    /// Build a new request with an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        let id = crate::id::generate();
        let mut headers = HeaderMap::new();
        if let Ok(value) = http::HeaderValue::from_str(&id) {
            headers.insert("x-request-id", value);
        }
        Self { method, url, headers, body: Body::empty(), id }
    }

    /// The request id assigned when this request entered the pipeline.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers, mutable so interceptors can rewrite them.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request headers, mutable so interceptors can rewrite them.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a header's value verbatim (case-insensitive lookup on name).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set a request header, replacing any prior value.
    pub fn set_header(&mut self, name: &'static str, value: impl AsRef<str>) {
        if let Ok(value) = http::HeaderValue::from_str(value.as_ref()) {
            self.headers.insert(name, value);
        }
    }

    /// Replace the body, consuming the previous one.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Take the body out of the request, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(&mut self.body, Body::empty())
    }

    /// Consume the request, returning its parts.
    pub fn into_parts(self) -> (Method, Url, HeaderMap, Body, String) {
        (self.method, self.url, self.headers, self.body, self.id)
    }

    /// Whether this request is safe to cache lookups for (GET only, per
    /// this crate's scope).
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Whether this request uses one of the methods that invalidate cached
    /// entries for the same URL (PUT, POST, DELETE, PATCH).
    pub fn is_unsafe_method(&self) -> bool {
        matches!(
            self.method,
            Method::PUT | Method::POST | Method::DELETE | Method::PATCH
        )
    }

    /// Shallow clone for use by a background revalidation task; the body is
    /// replaced with an empty one since it has already been consumed by the
    /// time a cached response resolves the caller's request.
    pub fn clone_without_body(&self) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: Body::empty(),
            id: self.id.clone(),
        }
    }

    /// A cheap, bodyless snapshot of this request's method, URL, and
    /// headers, carried on the [`crate::Response`] that the pipeline
    /// produces for it so response-stage interceptors can see what
    /// produced the response they're looking at.
    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
        }
    }
}

/// A back-reference to the request that produced a [`crate::Response`],
/// minus the body (already consumed by the time a response exists).
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl RequestSnapshot {
    /// Get a request header's value verbatim.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
