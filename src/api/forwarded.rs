//! Client details as seen through the reverse proxy.
//!
//! Exactly one proxy hop is trusted: of a comma separated header only the
//! right-most value, the one the proxy itself appended, is used.

use axum::http::HeaderMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedInfo {
    pub client: Option<String>,
    pub proto: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ForwardedInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            client: last_hop(headers, "x-forwarded-for"),
            proto: last_hop(headers, "x-forwarded-proto"),
            host: last_hop(headers, "x-forwarded-host"),
            port: last_hop(headers, "x-forwarded-port").and_then(|p| p.parse().ok()),
        }
    }
}

fn last_hop(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .last()
        .map(str::to_string)
}
