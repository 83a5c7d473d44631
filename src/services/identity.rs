//! Caller identity resolution
//!
//! Derives the network identity the rate limiter buckets on. The value comes
//! from proxy/CDN headers and is best effort only; it is never an error to
//! have no usable header.

use axum::http::{header, HeaderMap};

/// Client IP headers, edge-proxy specific first
const CLIENT_IP_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "true-client-ip",
    "x-vercel-forwarded-for",
    "x-forwarded-for",
    "x-real-ip",
];

pub const LOCALHOST_IPV6: &str = "localhost-ipv6";
pub const LOCALHOST_DEV: &str = "localhost-dev";
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Resolve the caller's network identity from request headers.
///
/// Forwarded chains contribute only their left-most entry. Requests with no
/// client IP header collapse to a shared sentinel.
pub fn resolve_identity(headers: &HeaderMap) -> String {
    for name in CLIENT_IP_HEADERS {
        let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) else {
            continue;
        };

        let first = value.split(',').next().unwrap_or_default().trim();
        if first.is_empty() {
            continue;
        }

        if first == "::1" {
            return LOCALHOST_IPV6.to_string();
        }
        return first.to_string();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if is_local_host(host) {
        LOCALHOST_DEV.to_string()
    } else {
        UNKNOWN_IDENTITY.to_string()
    }
}

fn is_local_host(host: &str) -> bool {
    let host = host.trim().to_ascii_lowercase();
    // Bracketed IPv6 carries colons of its own, so strip the port after it
    let name = if let Some(rest) = host.strip_prefix('[') {
        rest.split(']').next().unwrap_or_default()
    } else {
        host.split(':').next().unwrap_or_default()
    };
    matches!(name, "localhost" | "127.0.0.1" | "::1")
}
