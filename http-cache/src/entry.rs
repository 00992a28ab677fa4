use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::key::VaryPair;

/// A point in time encoded as (seconds, nanoseconds) since the Unix epoch —
/// plain, portable, and avoids tying the on-disk format to `SystemTime`'s
/// platform representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub secs: u64,
    /// Sub-second nanoseconds.
    pub nanos: u32,
}

impl Timestamp {
    /// The current wall-clock time.
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Self { secs: duration.as_secs(), nanos: duration.subsec_nanos() }
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> Self {
        UNIX_EPOCH + Duration::new(ts.secs, ts.nanos)
    }
}

/// A single cached response, owned exclusively by the journal.
///
/// Metadata only — never the body bytes themselves (those live in the body
/// store, addressed by `secondary_key`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Address of this entry's body blob.
    pub secondary_key: Uuid,
    /// When this entry (or the response it was created from) was produced.
    pub created_at: Timestamp,
    /// The response's reason phrase, if any.
    pub reason: Option<String>,
    /// The response's declared `Content-Length`, if known.
    pub content_length: Option<u64>,
    /// Response headers, names lowercased, one value per name.
    pub headers: HashMap<String, String>,
    /// The request-side vary header values that produced this variant.
    pub vary: Vec<VaryPair>,
    /// Number of times this entry has been served from cache.
    pub hit_count: u64,
    /// Most recent time this entry was served or revalidated.
    pub last_access: Timestamp,
    /// Actual length of the persisted body blob, once known.
    pub persisted_size: u64,
}

impl CacheEntry {
    /// Reassemble this entry's headers into an [`http::HeaderMap`] for
    /// reuse by the `Cache-Control` parser and conditional-request builder.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                http::header::HeaderName::from_bytes(name.as_bytes()),
                http::header::HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        map
    }

    /// Seconds since this entry was last accessed, floored at zero.
    pub fn seconds_since_last_access(&self, now: SystemTime) -> u64 {
        let last_access: SystemTime = self.last_access.into();
        now.duration_since(last_access).unwrap_or(Duration::ZERO).as_secs()
    }

    /// The frecency score used by the eviction policy: more hits and more
    /// recent access both push the score up, so the lowest-scoring entries
    /// are evicted first.
    pub fn frecency_score(&self, now: SystemTime) -> f64 {
        self.hit_count as f64 / (self.seconds_since_last_access(now) as f64 + 1.0)
    }
}
