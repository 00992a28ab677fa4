use http::HeaderMap;

/// The `Cache-Control` directives this cache understands, both for parsing
/// an incoming response and for re-emitting a normalized header.
///
/// Unknown directives are preserved in `extensions` so a value round-trips
/// even though the freshness engine ignores them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// `max-age=N`, seconds. Negative or non-numeric values are absent.
    pub max_age: Option<u64>,
    /// `no-cache` — entry must be revalidated before reuse.
    pub no_cache: bool,
    /// `no-store` — response must not be cached at all.
    pub no_store: bool,
    /// `must-revalidate` — a stale entry must never be served without
    /// revalidation, even under stale-if-error.
    pub must_revalidate: bool,
    /// `private` — not to be stored by a shared cache.
    pub private: bool,
    /// `public` — explicitly cacheable even if normally non-cacheable.
    pub public: bool,
    /// `immutable` — while fresh, never needs revalidation.
    pub immutable: bool,
    /// `stale-while-revalidate=N`, seconds.
    pub stale_while_revalidate: Option<u64>,
    /// `stale-if-error=N`, seconds.
    pub stale_if_error: Option<u64>,
    /// Any other directive, preserved verbatim as `(name, value)`.
    pub extensions: Vec<(String, Option<String>)>,
}

impl CacheControl {
    /// Parse every `Cache-Control` header present (there may be more than
    /// one occurrence; all are folded into one directive set).
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut cc = CacheControl::default();
        for value in headers.get_all(http::header::CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };
            for part in value.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let mut kv = part.splitn(2, '=');
                let name = kv.next().unwrap_or("").trim();
                if name.is_empty() {
                    continue;
                }
                let raw_value = kv.next().map(|v| v.trim().trim_matches('"').to_string());
                cc.apply_directive(&name.to_ascii_lowercase(), raw_value);
            }
        }
        cc
    }

    fn apply_directive(&mut self, name: &str, value: Option<String>) {
        match name {
            "max-age" => self.max_age = parse_non_negative(value.as_deref()),
            "no-cache" => self.no_cache = true,
            "no-store" => self.no_store = true,
            "must-revalidate" => self.must_revalidate = true,
            "private" => self.private = true,
            "public" => self.public = true,
            "immutable" => self.immutable = true,
            "stale-while-revalidate" => {
                self.stale_while_revalidate = parse_non_negative(value.as_deref())
            }
            "stale-if-error" => self.stale_if_error = parse_non_negative(value.as_deref()),
            other => self.extensions.push((other.to_string(), value)),
        }
    }

    /// Format this directive set back into a single `Cache-Control` value.
    pub fn to_header_value(&self) -> String {
        let mut parts = Vec::new();
        if let Some(max_age) = self.max_age {
            parts.push(format!("max-age={max_age}"));
        }
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        if self.private {
            parts.push("private".to_string());
        }
        if self.public {
            parts.push("public".to_string());
        }
        if self.immutable {
            parts.push("immutable".to_string());
        }
        if let Some(swr) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={swr}"));
        }
        if let Some(sie) = self.stale_if_error {
            parts.push(format!("stale-if-error={sie}"));
        }
        for (name, value) in &self.extensions {
            match value {
                Some(value) => parts.push(format!("{name}={value}")),
                None => parts.push(name.clone()),
            }
        }
        parts.join(", ")
    }
}

/// Non-numeric and negative values are treated as absent per the freshness
/// engine's rules; this also rejects values that overflow `u64`.
fn parse_non_negative(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|raw| raw.parse::<i64>().ok()).and_then(|n| u64::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CACHE_CONTROL, value.parse().unwrap());
        headers
    }

    #[test]
    fn parses_max_age_and_booleans() {
        let cc = CacheControl::parse(&headers_with("max-age=60, must-revalidate, private"));
        assert_eq!(cc.max_age, Some(60));
        assert!(cc.must_revalidate);
        assert!(cc.private);
        assert!(!cc.public);
    }

    #[test]
    fn negative_max_age_is_absent() {
        let cc = CacheControl::parse(&headers_with("max-age=-1"));
        assert_eq!(cc.max_age, None);
    }

    #[test]
    fn non_numeric_max_age_is_absent() {
        let cc = CacheControl::parse(&headers_with("max-age=banana"));
        assert_eq!(cc.max_age, None);
    }

    #[test]
    fn unknown_directives_round_trip_as_extensions() {
        let cc = CacheControl::parse(&headers_with("max-age=5, community=\"UCI\""));
        assert_eq!(cc.extensions, vec![("community".to_string(), Some("UCI".to_string()))]);
        assert!(cc.to_header_value().contains("community=UCI"));
    }

    #[test]
    fn stale_while_revalidate_and_stale_if_error_parse_independently() {
        let cc = CacheControl::parse(&headers_with(
            "max-age=0, stale-while-revalidate=60, stale-if-error=120",
        ));
        assert_eq!(cc.stale_while_revalidate, Some(60));
        assert_eq!(cc.stale_if_error, Some(120));
    }

    #[test]
    fn round_trips_through_format() {
        let original = CacheControl::parse(&headers_with("max-age=60, immutable"));
        let reparsed = CacheControl::parse(&headers_with(&original.to_header_value()));
        assert_eq!(original, reparsed);
    }
}
