use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::interceptor::Interceptor;
use crate::outcome::{ErrorOutcome, RequestOutcome, ResponseOutcome, StackInfo};
use crate::request::Request;
use crate::response::Response;

/// An illustrative interceptor that logs one structured line per request,
/// keyed by the request's stable id.
///
/// Per-request timing state never lives on `self` (the instance is shared
/// across concurrent requests); instead each call stashes its start time in
/// a small keyed table and removes it once the matching response or error
/// is seen, so the interceptor itself stays free of per-request mutable
/// state beyond that bookkeeping map.
#[derive(Default)]
pub struct LoggingInterceptor {
    started: Mutex<std::collections::HashMap<String, (Instant, http::Method, url::Url)>>,
}

impl LoggingInterceptor {
    /// Construct a new logging interceptor.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn on_request(&self, request: Request) -> RequestOutcome {
        let mut started = self.started.lock().await;
        started.insert(
            request.id().to_string(),
            (Instant::now(), request.method().clone(), request.url().clone()),
        );
        RequestOutcome::Next(request)
    }

    async fn on_response(&self, response: Response) -> ResponseOutcome {
        let request_id = response.request_id().to_string();
        let entry = self.started.lock().await.remove(&request_id);
        match entry {
            Some((start, method, url)) => {
                tracing::info!(
                    request_id = %request_id,
                    method = %method,
                    url = %url,
                    status = response.status(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "request completed"
                );
            }
            None => {
                tracing::info!(
                    request_id = %request_id,
                    status = response.status(),
                    "request completed (no start time recorded)"
                );
            }
        }
        ResponseOutcome::Next(response)
    }

    async fn on_error(
        &self,
        request: Request,
        error: crate::error::Error,
        stack_info: StackInfo,
    ) -> ErrorOutcome {
        let mut started = self.started.lock().await;
        let elapsed_ms = started
            .remove(request.id())
            .map(|(start, _, _)| start.elapsed().as_millis() as u64);
        drop(started);
        tracing::warn!(
            request_id = %request.id(),
            method = %request.method(),
            url = %request.url(),
            stage = ?stack_info,
            elapsed_ms,
            error = %error,
            "request failed"
        );
        ErrorOutcome::Next(request, error)
    }
}
