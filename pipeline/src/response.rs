use http::HeaderMap;

use crate::body::Body;
use crate::request::RequestSnapshot;

/// A streamed response produced by the transport, a cache hit, or a
/// synthetic error-stage resolution.
#[derive(Debug)]
pub struct Response {
    status: u16,
    reason: Option<String>,
    content_length: Option<u64>,
    headers: HeaderMap,
    body: Body,
    /// Id of the request that produced this response, for log correlation.
    request_id: String,
    /// The request that produced this response, minus its body. The
    /// pipeline attaches this automatically before running the response
    /// stage; it's `None` for responses that never reach that stage (e.g.
    /// `Resolve { skip_remaining_response_stages: true }`) and for
    /// synthetic responses built directly by callers in tests.
    source: Option<RequestSnapshot>,
}

impl Response {
    /// Build a response with the given status and body.
    pub fn new(status: u16, request_id: impl Into<String>, body: Body) -> Self {
        Self {
            status,
            reason: None,
            content_length: None,
            headers: HeaderMap::new(),
            body,
            request_id: request_id.into(),
            source: None,
        }
    }

    /// The HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Set the status code.
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// The reason phrase, if one was recorded.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Set the reason phrase.
    pub fn set_reason(&mut self, reason: Option<String>) {
        self.reason = reason;
    }

    /// The declared content length, if known.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Set the declared content length.
    pub fn set_content_length(&mut self, len: Option<u64>) {
        self.content_length = len;
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response headers, mutable.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a header's value verbatim.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set a response header, replacing any prior value.
    pub fn set_header(&mut self, name: &'static str, value: impl AsRef<str>) {
        if let Ok(value) = http::HeaderValue::from_str(value.as_ref()) {
            self.headers.insert(name, value);
        }
    }

    /// Remove a response header.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    /// The id of the request that produced this response.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The request that produced this response, if the pipeline has
    /// attached one (true for anything that reaches the response stage).
    pub fn source(&self) -> Option<&RequestSnapshot> {
        self.source.as_ref()
    }

    /// Attach or replace the back-reference to the producing request.
    pub fn attach_source(&mut self, source: RequestSnapshot) {
        self.source = Some(source);
    }

    /// Replace the body, consuming the previous one.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Take the body out of the response, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(&mut self.body, Body::empty())
    }

    /// Split the body into two independent streams, one to return to the
    /// caller and one for a side consumer (e.g. the cache writing the blob
    /// to disk while the original bytes still reach the caller).
    pub fn tee_body(&mut self) -> Body {
        let (keep, side) = self.take_body().tee();
        self.body = keep;
        side
    }

    /// Consume the response, returning its parts.
    pub fn into_parts(self) -> ResponseParts {
        ResponseParts {
            status: self.status,
            reason: self.reason,
            content_length: self.content_length,
            headers: self.headers,
            body: self.body,
            request_id: self.request_id,
            source: self.source,
        }
    }
}

/// Owned parts of a [`Response`], used when reassembling a response after
/// inspecting or replacing its body.
pub struct ResponseParts {
    pub status: u16,
    pub reason: Option<String>,
    pub content_length: Option<u64>,
    pub headers: HeaderMap,
    pub body: Body,
    pub request_id: String,
    pub source: Option<RequestSnapshot>,
}

impl From<ResponseParts> for Response {
    fn from(parts: ResponseParts) -> Self {
        Self {
            status: parts.status,
            reason: parts.reason,
            content_length: parts.content_length,
            headers: parts.headers,
            body: parts.body,
            request_id: parts.request_id,
            source: parts.source,
        }
    }
}
