//! Header rules applied when relaying an exchange to an agent.

use http::HeaderMap;
use http::header::{
    CACHE_CONTROL, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, DATE, HeaderName, LOCATION,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, SERVER, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};

/// Backend response headers relayed to the caller. Everything else is dropped.
pub const RESPONSE_ALLOW_LIST: [HeaderName; 5] = [DATE, CACHE_CONTROL, SERVER, CONTENT_TYPE, LOCATION];

/// Request headers that describe the inbound connection, not the request.
const HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    CONTENT_LENGTH,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Keeps only allow-listed headers, with every value in its original order.
#[must_use]
pub fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for name in &RESPONSE_ALLOW_LIST {
        for value in headers.get_all(name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Drops connection-level headers before a request is sent to an agent.
/// `Host` stays so the agent builds URLs for the public name; the HTTP
/// client recomputes the length.
#[must_use]
pub fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in &HOP_BY_HOP {
        forwarded.remove(name);
    }
    forwarded.remove("keep-alive");
    forwarded
}
