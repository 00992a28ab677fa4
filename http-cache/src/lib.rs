#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_docs,
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]
//! An RFC 9111-aligned HTTP cache, implemented as a
//! [`pipeline::Interceptor`].
//!
//! [`HttpCacheInterceptor`] stores 200 responses to GET requests on disk or
//! in memory, serves them without contacting the origin while fresh,
//! revalidates them conditionally when stale, and falls back to serving
//! stale content under `stale-while-revalidate` / `stale-if-error`. Cache
//! state lives in a [`Journal`](journal) (entry metadata, durably
//! snapshotted) and a [`BodyStore`] (response bodies, addressed by
//! secondary key); neither is a process-wide singleton — both are owned by
//! the `HttpCacheInterceptor` value a caller constructs and registers on a
//! `pipeline::Pipeline`.
//!
//! This crate never negotiates content, caches methods other than GET, or
//! acts as a shared cache between users; see the module-level docs on
//! [`freshness`] and [`journal`] for the semantics it does implement.

mod body_store;
mod cache_control;
mod cache_status;
mod entry;
mod error;
mod freshness;
mod journal;
mod key;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use http::header::{CACHE_CONTROL, DATE, ETAG, EXPIRES, LAST_MODIFIED, VARY};
use http::{HeaderName, HeaderValue};
use pipeline::{
    Body, ErrorOutcome, Interceptor, Request, RequestOutcome, Response, ResponseOutcome,
    StackInfo,
};
use tracing::{debug, error, info};
use uuid::Uuid;

pub use body_store::{BodyStore, FsBodyStore, MemoryBodyStore};
pub use cache_control::CacheControl;
pub use cache_status::{CacheStatus, ForwardReason};
pub use entry::{CacheEntry, Timestamp};
pub use error::{Error, Result};
pub use freshness::{compute as compute_freshness, Freshness};
pub use key::{primary_key, secondary_key, VaryPair};

use journal::Journal;

/// Default cache name, used as the `cache-name` token in every
/// `Cache-Status` entry this cache emits, unless overridden with
/// [`HttpCacheInterceptor::with_cache_name`].
pub const DEFAULT_CACHE_NAME: &str = "http-cache";

/// Default maximum on-disk/in-memory cache size: 100 MiB.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 100 * 1024 * 1024;

/// Response header subset overlaid from a 304 onto the stored entry on
/// revalidation.
const REVALIDATION_HEADER_OVERLAY: &[HeaderName] =
    &[CACHE_CONTROL, DATE, ETAG, EXPIRES, LAST_MODIFIED, VARY];
// `warning` has no typed `http::header` constant; handled separately by name.

/// An RFC 9111-aligned HTTP cache interceptor.
///
/// Construct one with [`init_local`](Self::init_local) (a filesystem-backed
/// cache rooted at a directory) or [`init_in_memory`](Self::init_in_memory),
/// then register it on a `pipeline::PipelineBuilder`. The interceptor keeps
/// no per-request mutable state on itself; the journal and body store are
/// each safe against concurrent callers on their own.
pub struct HttpCacheInterceptor {
    journal: Journal,
    body_store: Arc<dyn BodyStore>,
    max_cache_size: u64,
    private: bool,
    cache_name: String,
}

impl std::fmt::Debug for HttpCacheInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCacheInterceptor")
            .field("max_cache_size", &self.max_cache_size)
            .field("private", &self.private)
            .field("cache_name", &self.cache_name)
            .finish()
    }
}

impl HttpCacheInterceptor {
    /// Build a filesystem-backed cache rooted at `directory`, recovering any
    /// existing journal and reconciling it against the blobs actually
    /// present on disk.
    pub async fn init_local(
        directory: impl AsRef<Path>,
        max_cache_size: u64,
        private: bool,
    ) -> Result<Self> {
        let directory = directory.as_ref();
        let store = FsBodyStore::new(directory).await.map_err(Error::Body)?;
        let body_store: Arc<dyn BodyStore> = Arc::new(store);
        let journal = Journal::load(Some(directory.join("journal")), body_store.clone()).await;
        Ok(Self {
            journal,
            body_store,
            max_cache_size,
            private,
            cache_name: DEFAULT_CACHE_NAME.to_string(),
        })
    }

    /// Build a process-scoped, in-memory cache with no on-disk journal.
    pub async fn init_in_memory(max_cache_size: u64, private: bool) -> Self {
        let body_store: Arc<dyn BodyStore> = Arc::new(MemoryBodyStore::new());
        let journal = Journal::load(None, body_store.clone()).await;
        Self {
            journal,
            body_store,
            max_cache_size,
            private,
            cache_name: DEFAULT_CACHE_NAME.to_string(),
        }
    }

    /// Override the `cache-name` token this cache emits in `Cache-Status`.
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Remove every cache entry and blob.
    pub async fn clear_cache(&self) {
        self.journal.clear().await;
    }

    /// Remove every entry whose stored `Cache-Control` was `private`.
    pub async fn delete_private_content(&self) {
        self.journal
            .remove_matching(|entry| CacheControl::parse(&entry.header_map()).private)
            .await;
    }

    /// Flush any pending debounced journal write. `Interceptor::dispose`
    /// calls this on a best-effort, fire-and-forget basis (it is a sync
    /// hook); call this directly and await it for a guaranteed flush before
    /// shutdown.
    pub async fn close(&self) {
        self.journal.flush_now().await;
    }

    fn cache_status_hit(&self, primary: Uuid) -> CacheStatus {
        CacheStatus::hit(self.cache_name.clone(), primary.to_string())
    }

    /// Reassemble a stored entry and its blob into a streamed response, with
    /// a `Cache-Status` entry describing why it was served this way.
    fn build_cached_response(
        &self,
        entry: &CacheEntry,
        body: Body,
        request_id: &str,
        status: &CacheStatus,
    ) -> Response {
        let mut response = Response::new(200, request_id.to_string(), body);
        response.set_content_length(entry.content_length);
        response.set_reason(entry.reason.clone());
        {
            let headers = response.headers_mut();
            for (name, value) in &entry.headers {
                if let (Ok(name), Ok(value)) =
                    (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
                {
                    headers.insert(name, value);
                }
            }
        }
        append_cache_status(&mut response, status);
        response
    }

    async fn lookup_for(
        &self,
        url: &str,
        request_headers: &http::HeaderMap,
    ) -> Option<(Uuid, CacheEntry, Body)> {
        let primary = primary_key(url);
        let entry = self.journal.get_matching(primary, request_headers).await?;
        match self.body_store.read(entry.secondary_key).await {
            Ok(Some(body)) => Some((primary, entry, body)),
            Ok(None) => {
                debug!(%primary, secondary = %entry.secondary_key, "matching entry has no blob yet, treating as miss");
                None
            }
            Err(e) => {
                error!(error = %e, %primary, "failed to read cached body");
                None
            }
        }
    }

    /// Spawn the blob write and subsequent journal/eviction update for a
    /// freshly cached response, without blocking the response stage (the
    /// caller already has its own tee'd copy of the body).
    fn spawn_store(&self, primary: Uuid, secondary: Uuid, body: Body, mut entry: CacheEntry) {
        let body_store = self.body_store.clone();
        let journal = self.journal.clone();
        let max_cache_size = self.max_cache_size;
        tokio::spawn(async move {
            match body_store.write(secondary, body).await {
                Ok(len) => {
                    entry.persisted_size = len;
                    journal.upsert(primary, entry).await;
                    journal.evict_to_fit(max_cache_size, SystemTime::now()).await;
                }
                Err(e) => {
                    error!(error = %e, %primary, %secondary, "failed to write cached body, dropping entry");
                    journal.remove_entry(primary, secondary).await;
                }
            }
        });
    }

    async fn handle_not_modified(&self, response: Response) -> ResponseOutcome {
        let Some(source) = response.source().cloned() else {
            return ResponseOutcome::Next(response);
        };
        let primary = primary_key(source.url.as_str());
        let Some(entry) = self.journal.get_matching(primary, &source.headers).await else {
            return ResponseOutcome::Next(response);
        };

        let mut overlay = HashMap::new();
        for name in REVALIDATION_HEADER_OVERLAY {
            if let Some(value) = response.header(name.as_str()) {
                overlay.insert(name.as_str().to_string(), value.to_string());
            }
        }
        if let Some(value) = response.header("warning") {
            overlay.insert("warning".to_string(), value.to_string());
        }

        let now = SystemTime::now();
        let Some(updated) =
            self.journal.overlay_headers(primary, entry.secondary_key, &overlay, now).await
        else {
            return ResponseOutcome::Next(response);
        };

        match self.body_store.read(updated.secondary_key).await {
            Ok(Some(body)) => {
                info!(%primary, "304 revalidation merged into stored entry");
                let status = self.cache_status_hit(primary);
                let cached = self.build_cached_response(
                    &updated,
                    body,
                    response.request_id(),
                    &status,
                );
                ResponseOutcome::Resolve(cached)
            }
            _ => ResponseOutcome::Next(response),
        }
    }

    async fn handle_cacheable_response(&self, mut response: Response) -> ResponseOutcome {
        let Some(source) = response.source().cloned() else {
            return ResponseOutcome::Next(response);
        };
        let Some(vary_pairs) = key::vary_pairs_for(response.headers(), &source.headers) else {
            debug!(url = %source.url, "response Vary: * is never cacheable, skipping");
            return ResponseOutcome::Next(response);
        };

        let primary = primary_key(source.url.as_str());
        let secondary = secondary_key(source.url.as_str(), &vary_pairs);
        let side = response.tee_body();

        let headers = lowercased_headers(response.headers());
        let entry = CacheEntry {
            secondary_key: secondary,
            created_at: Timestamp::now(),
            reason: response.reason().map(str::to_string),
            content_length: response.content_length(),
            headers,
            vary: vary_pairs,
            hit_count: 0,
            last_access: Timestamp::now(),
            persisted_size: 0,
        };
        self.journal.upsert(primary, entry.clone()).await;
        self.spawn_store(primary, secondary, side, entry);

        let status = CacheStatus::forward(self.cache_name.clone(), ForwardReason::UriMiss)
            .with_forward_status(200)
            .with_key(primary.to_string());
        append_cache_status(&mut response, &status);
        ResponseOutcome::Next(response)
    }
}

#[async_trait]
impl Interceptor for HttpCacheInterceptor {
    async fn on_request(&self, mut request: Request) -> RequestOutcome {
        if request.is_unsafe_method() {
            let primary = primary_key(request.url().as_str());
            self.journal.invalidate_primary(primary).await;
            return RequestOutcome::Next(request);
        }
        if !request.is_get() {
            return RequestOutcome::Next(request);
        }

        let url = request.url().as_str().to_string();
        let Some((primary, entry, body)) = self.lookup_for(&url, request.headers()).await else {
            debug!(%url, "cache miss");
            return RequestOutcome::Next(request);
        };

        if let Some(etag) = entry.headers.get("etag") {
            request.set_header("if-none-match", etag.clone());
        }
        if let Some(last_modified) = entry.headers.get("last-modified") {
            request.set_header("if-modified-since", last_modified.clone());
        }

        let freshness = freshness::compute(&entry, SystemTime::now());
        if !freshness.needs_revalidation {
            info!(%url, %primary, "cache hit, serving without revalidation");
            self.journal.record_hit(primary, entry.secondary_key, SystemTime::now()).await;
            let status = self.cache_status_hit(primary);
            let response =
                self.build_cached_response(&entry, body, request.id(), &status);
            return RequestOutcome::Resolve { response, skip_remaining_response_stages: false };
        }

        if freshness.is_stale_while_revalidate {
            info!(%url, %primary, "serving stale body, revalidating in the background");
            self.journal.record_hit(primary, entry.secondary_key, SystemTime::now()).await;
            let status = self.cache_status_hit(primary);
            let response =
                self.build_cached_response(&entry, body, request.id(), &status);
            return RequestOutcome::ResolveAndNext { request, response };
        }

        debug!(%url, %primary, "entry requires revalidation, contacting origin");
        RequestOutcome::Next(request)
    }

    async fn on_response(&self, response: Response) -> ResponseOutcome {
        let Some(source) = response.source() else {
            return ResponseOutcome::Next(response);
        };
        if source.method != http::Method::GET {
            return ResponseOutcome::Next(response);
        }
        if let Some(cache_status) = response.header("cache-status") {
            if CacheStatus::header_value_has_hit_for(cache_status, &self.cache_name) {
                return ResponseOutcome::Next(response);
            }
        }

        let cache_control = CacheControl::parse(response.headers());
        if cache_control.private && !self.private {
            debug!("response is private, cache configured as non-private, skipping");
            return ResponseOutcome::Next(response);
        }
        if cache_control.no_store {
            debug!("response is no-store, skipping");
            return ResponseOutcome::Next(response);
        }

        match response.status() {
            304 => self.handle_not_modified(response).await,
            200 => self.handle_cacheable_response(response).await,
            _ => ResponseOutcome::Next(response),
        }
    }

    async fn on_error(
        &self,
        request: Request,
        error: pipeline::Error,
        _stack_info: StackInfo,
    ) -> ErrorOutcome {
        if !request.is_get() {
            return ErrorOutcome::Next(request, error);
        }
        let url = request.url().as_str().to_string();
        let Some((primary, entry, body)) = self.lookup_for(&url, request.headers()).await else {
            return ErrorOutcome::Next(request, error);
        };

        let freshness = freshness::compute(&entry, SystemTime::now());
        if !freshness.is_stale_if_error {
            return ErrorOutcome::Next(request, error);
        }

        info!(%url, %primary, %error, "transport failed, serving stale body under stale-if-error");
        let status = self.cache_status_hit(primary);
        let response = self.build_cached_response(&entry, body, request.id(), &status);
        ErrorOutcome::Resolve(response)
    }

    fn dispose(&self) {
        let journal = self.journal.clone();
        tokio::spawn(async move { journal.flush_now().await });
    }
}

fn lowercased_headers(headers: &http::HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    out
}

fn append_cache_status(response: &mut Response, status: &CacheStatus) {
    let value = match response.header("cache-status") {
        Some(existing) if !existing.is_empty() => format!("{existing}, {status}"),
        _ => status.to_string(),
    };
    response.set_header("cache-status", value);
}
