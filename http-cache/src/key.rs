use http::HeaderMap;
use uuid::Uuid;

/// Namespace the primary and secondary key hashes are derived under. Fixed
/// so the same URL/vary pair always hashes to the same key across runs and
/// platforms.
const NAMESPACE: Uuid = Uuid::from_bytes([
    0x6c, 0xa6, 0x55, 0x6f, 0x4d, 0xcd, 0x4d, 0x92, 0x9b, 0x95, 0x5c, 0x2e, 0x3c, 0xb5, 0x37, 0x21,
]);

/// A `(name, value)` pair captured from the request's side of a `Vary`
/// negotiation, with the name already lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaryPair {
    /// The lowercased header name.
    pub name: String,
    /// The request header's verbatim value.
    pub value: String,
}

/// The primary key: a stable hash of the request URL alone. Every variant
/// of a URL (across distinct `Vary` values) shares this key.
pub fn primary_key(url: &str) -> Uuid {
    Uuid::new_v5(&NAMESPACE, url.as_bytes())
}

/// The secondary key: a stable hash of the URL plus the sorted, lowercased
/// `name:value` pairs named by the response's `Vary` header. When there is
/// no `Vary` header (`vary_pairs` is empty) this is the hash of `url + "|"`,
/// with no variants to disambiguate.
pub fn secondary_key(url: &str, vary_pairs: &[VaryPair]) -> Uuid {
    let mut sorted: Vec<&VaryPair> = vary_pairs.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.value.cmp(&b.value)));
    let joined = sorted
        .iter()
        .map(|pair| format!("{}:{}", pair.name, pair.value))
        .collect::<Vec<_>>()
        .join(",");
    let input = format!("{url}|{joined}");
    Uuid::new_v5(&NAMESPACE, input.as_bytes())
}

/// Extract the vary pairs a response's `Vary` header names, reading each
/// named header's verbatim value from the request that produced it.
///
/// Returns `None` if `Vary: *` is present, since that header is never
/// cacheable regardless of the request's headers.
pub fn vary_pairs_for(
    response_headers: &HeaderMap,
    request_headers: &HeaderMap,
) -> Option<Vec<VaryPair>> {
    let mut pairs = Vec::new();
    for value in response_headers.get_all(http::header::VARY) {
        let Ok(value) = value.to_str() else { continue };
        for name in value.split(',') {
            let name = name.trim();
            if name == "*" {
                return None;
            }
            if name.is_empty() {
                continue;
            }
            let lowercase = name.to_ascii_lowercase();
            let request_value =
                request_headers.get(&lowercase).and_then(|v| v.to_str().ok()).unwrap_or("");
            pairs.push(VaryPair { name: lowercase, value: request_value.to_string() });
        }
    }
    Some(pairs)
}

/// Whether `recorded` (the vary snapshot stored with a cache entry) matches
/// the headers of a new incoming request: every recorded `(name, value)`
/// must equal the corresponding request header, case-insensitive on name
/// and exact on value. Extra request headers are allowed; a recorded name
/// missing from the request is a mismatch.
pub fn matches_vary(recorded: &[VaryPair], request_headers: &HeaderMap) -> bool {
    recorded.iter().all(|pair| {
        request_headers
            .get(&pair.name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|value| value == pair.value)
    })
}
