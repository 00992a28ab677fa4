use std::time::SystemTime;

use crate::cache_control::CacheControl;
use crate::entry::CacheEntry;

/// The computed freshness state of a cache entry at a given instant.
///
/// Every field is derived purely from the entry's stored headers and
/// timestamps plus `now` — this module never touches the journal or body
/// store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Freshness {
    /// Seconds elapsed since the response was generated.
    pub age_secs: u64,
    /// The instant after which the entry is considered expired, if known.
    pub expiration_time: Option<SystemTime>,
    /// `now > expiration_time`, when `expiration_time` is known.
    pub is_expired: bool,
    /// Expired but within the `stale-while-revalidate` window.
    pub is_stale_while_revalidate: bool,
    /// Expired but within the `stale-if-error` window.
    pub is_stale_if_error: bool,
    /// Whether the entry must be revalidated before being served as-is.
    pub needs_revalidation: bool,
}

/// Compute [`Freshness`] for `entry` as of `now`.
///
/// `response_time` is the entry's `Date` header if present and parsable,
/// else its `created_at` timestamp.
pub fn compute(entry: &CacheEntry, now: SystemTime) -> Freshness {
    let headers = entry.header_map();
    let cache_control = CacheControl::parse(&headers);

    let response_time = headers
        .get(http::header::DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .unwrap_or_else(|| entry.created_at.into());

    let age_secs = now.duration_since(response_time).map(|d| d.as_secs()).unwrap_or(0);

    let expiration_time = cache_control
        .max_age
        .map(|max_age| response_time + std::time::Duration::from_secs(max_age))
        .or_else(|| {
            headers
                .get(http::header::EXPIRES)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| httpdate::parse_http_date(v).ok())
        });

    let is_expired = expiration_time.is_some_and(|expiration| now > expiration);

    let is_stale_while_revalidate = expiration_time.is_some_and(|expiration| {
        cache_control
            .stale_while_revalidate
            .is_some_and(|swr| now < expiration + std::time::Duration::from_secs(swr))
    });

    let is_stale_if_error = expiration_time.is_some_and(|expiration| {
        cache_control
            .stale_if_error
            .is_some_and(|sie| now < expiration + std::time::Duration::from_secs(sie))
    });

    let is_fresh_and_immutable =
        expiration_time.is_some() && !is_expired && cache_control.immutable;
    let needs_revalidation = !is_fresh_and_immutable
        && (cache_control.no_store
            || cache_control.no_cache
            || expiration_time.is_none()
            || cache_control.must_revalidate
            || is_expired);

    Freshness {
        age_secs,
        expiration_time,
        is_expired,
        is_stale_while_revalidate,
        is_stale_if_error,
        needs_revalidation,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::entry::Timestamp;
    use crate::key::VaryPair;

    fn entry_with_headers(headers: &[(&str, &str)]) -> CacheEntry {
        CacheEntry {
            secondary_key: uuid::Uuid::nil(),
            created_at: Timestamp::now(),
            reason: None,
            content_length: None,
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            vary: Vec::<VaryPair>::new(),
            hit_count: 0,
            last_access: Timestamp::now(),
            persisted_size: 0,
        }
    }

    #[test]
    fn fresh_entry_within_max_age_does_not_need_revalidation() {
        let entry = entry_with_headers(&[("cache-control", "max-age=60")]);
        let fresh = compute(&entry, SystemTime::now());
        assert!(!fresh.is_expired);
        assert!(!fresh.needs_revalidation);
    }

    #[test]
    fn expired_entry_needs_revalidation() {
        let entry = entry_with_headers(&[("cache-control", "max-age=0")]);
        let now = SystemTime::from(entry.created_at) + Duration::from_secs(1);
        let fresh = compute(&entry, now);
        assert!(fresh.is_expired);
        assert!(fresh.needs_revalidation);
    }

    #[test]
    fn no_cache_always_needs_revalidation_even_fresh() {
        let entry = entry_with_headers(&[("cache-control", "max-age=60, no-cache")]);
        let fresh = compute(&entry, SystemTime::now());
        assert!(fresh.needs_revalidation);
    }

    #[test]
    fn unknown_expiration_needs_revalidation() {
        let entry = entry_with_headers(&[]);
        let fresh = compute(&entry, SystemTime::now());
        assert!(fresh.expiration_time.is_none());
        assert!(fresh.needs_revalidation);
    }

    #[test]
    fn immutable_fresh_entry_skips_revalidation() {
        let entry = entry_with_headers(&[("cache-control", "max-age=60, immutable")]);
        let fresh = compute(&entry, SystemTime::now());
        assert!(!fresh.needs_revalidation);
    }

    #[test]
    fn stale_while_revalidate_window_is_respected() {
        let entry = entry_with_headers(&[(
            "cache-control",
            "max-age=0, stale-while-revalidate=60",
        )]);
        let now = SystemTime::from(entry.created_at) + Duration::from_secs(30);
        let fresh = compute(&entry, now);
        assert!(fresh.is_expired);
        assert!(fresh.is_stale_while_revalidate);
    }

    #[test]
    fn stale_if_error_window_is_respected() {
        let entry =
            entry_with_headers(&[("cache-control", "max-age=0, stale-if-error=60")]);
        let now = SystemTime::from(entry.created_at) + Duration::from_secs(30);
        let fresh = compute(&entry, now);
        assert!(fresh.is_stale_if_error);
    }

    #[test]
    fn must_revalidate_forces_revalidation_even_when_fresh() {
        let entry =
            entry_with_headers(&[("cache-control", "max-age=60, must-revalidate")]);
        let fresh = compute(&entry, SystemTime::now());
        assert!(!fresh.is_expired);
        assert!(fresh.needs_revalidation);
    }
}
