use std::fmt;
use std::str::FromStr;

/// The `fwd` parameter value on a `Cache-Status` entry that forwarded the
/// request, naming the reason the cache did not serve from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardReason {
    /// The cache itself was configured to bypass.
    Bypass,
    /// The request method is not cacheable.
    Method,
    /// No entry exists for the primary key.
    UriMiss,
    /// An entry exists for the URL but none of its variants match `Vary`.
    VaryMiss,
    /// A secondary key matched but the stored body/metadata was unusable.
    Miss,
    /// The response was marked `no-store` or otherwise not cacheable.
    Request,
    /// A matching entry exists but must be revalidated.
    Stale,
    /// The stored representation only covers part of the response.
    Partial,
}

impl fmt::Display for ForwardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ForwardReason::Bypass => "bypass",
            ForwardReason::Method => "method",
            ForwardReason::UriMiss => "uri-miss",
            ForwardReason::VaryMiss => "vary-miss",
            ForwardReason::Miss => "miss",
            ForwardReason::Request => "request",
            ForwardReason::Stale => "stale",
            ForwardReason::Partial => "partial",
        };
        f.write_str(s)
    }
}

impl FromStr for ForwardReason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "bypass" => ForwardReason::Bypass,
            "method" => ForwardReason::Method,
            "uri-miss" => ForwardReason::UriMiss,
            "vary-miss" => ForwardReason::VaryMiss,
            "miss" => ForwardReason::Miss,
            "request" => ForwardReason::Request,
            "stale" => ForwardReason::Stale,
            "partial" => ForwardReason::Partial,
            _ => return Err(()),
        })
    }
}

/// One entry of an RFC 9211 `Cache-Status` header, restricted to the subset
/// this cache emits and understands: whether it was a hit or a forward (and
/// why), the age remaining, and whether this exchange stored a new entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    /// The cache's configured name, e.g. `"http-cache"`.
    pub cache_name: String,
    /// `hit` when true; otherwise a forward with `fwd`/`fwd-status`.
    pub hit: bool,
    /// Present when `hit` is false: why the cache forwarded the request.
    pub forward_reason: Option<ForwardReason>,
    /// Present alongside `forward_reason` when the origin answered.
    pub forward_status: Option<u16>,
    /// Remaining freshness lifetime in seconds, when known.
    pub ttl: Option<i64>,
    /// Whether this exchange caused a new or updated entry to be stored.
    pub stored: bool,
    /// The primary key, surfaced for diagnostics.
    pub key: Option<String>,
    /// Free-text diagnostic detail.
    pub detail: Option<String>,
}

impl CacheStatus {
    /// A `hit` entry.
    pub fn hit(cache_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            hit: true,
            forward_reason: None,
            forward_status: None,
            ttl: None,
            stored: false,
            key: Some(key.into()),
            detail: None,
        }
    }

    /// A forwarding entry for the given reason.
    pub fn forward(cache_name: impl Into<String>, reason: ForwardReason) -> Self {
        Self {
            cache_name: cache_name.into(),
            hit: false,
            forward_reason: Some(reason),
            forward_status: None,
            ttl: None,
            stored: false,
            key: None,
            detail: None,
        }
    }

    /// Attach the origin's status code to a forwarding entry.
    pub fn with_forward_status(mut self, status: u16) -> Self {
        self.forward_status = Some(status);
        self
    }

    /// Record the primary key this entry concerns.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Mark that this exchange stored a new or updated entry.
    pub fn with_stored(mut self, stored: bool) -> Self {
        self.stored = stored;
        self
    }

    /// Attach free-text diagnostic detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Parse a single `Cache-Status` list member (one cache's contribution,
    /// e.g. `"http-cache; hit; key=abc"`). A response that has passed
    /// through more than one cache carries a comma-separated list of these;
    /// split on `,` before calling this.
    pub fn parse_entry(input: &str) -> Option<Self> {
        let mut parts = input.split(';').map(str::trim);
        let cache_name = parts.next()?.to_string();
        if cache_name.is_empty() {
            return None;
        }
        let mut status = CacheStatus {
            cache_name,
            hit: false,
            forward_reason: None,
            forward_status: None,
            ttl: None,
            stored: false,
            key: None,
            detail: None,
        };
        for part in parts {
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                None => match part {
                    "hit" => status.hit = true,
                    "stored" => status.stored = true,
                    _ => {}
                },
                Some((name, value)) => {
                    let value = value.trim().trim_matches('"');
                    match name.trim() {
                        "fwd" => status.forward_reason = value.parse().ok(),
                        "fwd-status" => status.forward_status = value.parse().ok(),
                        "ttl" => status.ttl = value.parse().ok(),
                        "key" => status.key = Some(value.to_string()),
                        "detail" => status.detail = Some(value.to_string()),
                        _ => {}
                    }
                }
            }
        }
        Some(status)
    }

    /// Whether a raw `Cache-Status` header value contains an entry naming
    /// `cache_name` as a `hit`, used to detect a response that already
    /// passed through this cache (prevents response-stage reprocessing
    /// loops when `ResolveAndNext` surfaces a cached response).
    pub fn header_value_has_hit_for(header_value: &str, cache_name: &str) -> bool {
        header_value
            .split(',')
            .filter_map(Self::parse_entry)
            .any(|entry| entry.hit && entry.cache_name == cache_name)
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_name)?;
        if self.hit {
            write!(f, "; hit")?;
        } else if let Some(reason) = self.forward_reason {
            write!(f, "; fwd={reason}")?;
            if let Some(status) = self.forward_status {
                write!(f, "; fwd-status={status}")?;
            }
        }
        if let Some(ttl) = self.ttl {
            write!(f, "; ttl={ttl}")?;
        }
        if self.stored {
            write!(f, "; stored")?;
        }
        if let Some(key) = &self.key {
            write!(f, "; key={key}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "; detail=\"{detail}\"")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_entry_formats_with_key() {
        let status = CacheStatus::hit("http-cache", "abc-123");
        assert_eq!(status.to_string(), "http-cache; hit; key=abc-123");
    }

    #[test]
    fn forward_entry_formats_with_reason_and_status() {
        let status =
            CacheStatus::forward("http-cache", ForwardReason::UriMiss).with_forward_status(200);
        assert_eq!(status.to_string(), "http-cache; fwd=uri-miss; fwd-status=200");
    }

    #[test]
    fn stored_forward_entry_includes_stored_and_key() {
        let status = CacheStatus::forward("http-cache", ForwardReason::UriMiss)
            .with_forward_status(200)
            .with_stored(true)
            .with_key("primary-key");
        assert_eq!(
            status.to_string(),
            "http-cache; fwd=uri-miss; fwd-status=200; stored; key=primary-key"
        );
    }

    #[test]
    fn parse_entry_round_trips_a_hit() {
        let original = CacheStatus::hit("http-cache", "abc-123");
        let parsed = CacheStatus::parse_entry(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn parse_entry_round_trips_a_forward() {
        let original = CacheStatus::forward("http-cache", ForwardReason::Stale)
            .with_forward_status(200)
            .with_stored(true)
            .with_key("k");
        let parsed = CacheStatus::parse_entry(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn header_value_has_hit_for_detects_this_caches_hit_among_several() {
        let header = "upstream-cache; fwd=uri-miss, http-cache; hit; key=abc";
        assert!(CacheStatus::header_value_has_hit_for(header, "http-cache"));
        assert!(!CacheStatus::header_value_has_hit_for(header, "other-cache"));
    }
}
