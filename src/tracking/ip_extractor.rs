//! Source address extraction for tracking requests
//!
//! The first `X-Forwarded-For` entry names the original client. When a list
//! of trusted proxy networks is configured, the header is only honored for
//! requests whose direct peer sits inside one of them.

use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};

/// Extract the client IP address for a tracking request
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `peer` - The socket remote address (fallback)
/// * `trusted_proxies` - Networks allowed to set `X-Forwarded-For`; empty trusts every peer
pub fn extract_client_ip(headers: &HeaderMap, peer: IpAddr, trusted_proxies: &[IpNet]) -> IpAddr {
    if !trusted_proxies.is_empty() && !trusted_proxies.iter().any(|net| net.contains(&peer)) {
        return peer;
    }

    first_forwarded_for(headers).unwrap_or(peer)
}

fn first_forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = xff.split(',').next()?.trim();

    first
        .parse::<IpAddr>()
        .or_else(|_| first.parse::<SocketAddr>().map(|addr| addr.ip()))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> IpAddr {
        "192.168.1.1".parse().unwrap()
    }

    fn headers_with_xff(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_no_header_uses_peer() {
        assert_eq!(extract_client_ip(&HeaderMap::new(), peer(), &[]), peer());
    }

    #[test]
    fn test_first_forwarded_entry_wins() {
        let headers = headers_with_xff("203.0.113.1, 198.51.100.1");
        assert_eq!(
            extract_client_ip(&headers, peer(), &[]),
            "203.0.113.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_forwarded_entry_with_port() {
        let headers = headers_with_xff("203.0.113.1:51234");
        assert_eq!(
            extract_client_ip(&headers, peer(), &[]),
            "203.0.113.1".parse::<IpAddr>().unwrap()
        );

        let headers = headers_with_xff("[2001:db8::7]:443");
        assert_eq!(
            extract_client_ip(&headers, peer(), &[]),
            "2001:db8::7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_garbage_header_falls_back_to_peer() {
        let headers = headers_with_xff("unknown, 198.51.100.1");
        assert_eq!(extract_client_ip(&headers, peer(), &[]), peer());
    }

    #[test]
    fn test_trusted_proxy_honors_header() {
        let headers = headers_with_xff("203.0.113.1");
        let trusted = vec!["192.168.0.0/16".parse::<IpNet>().unwrap()];
        assert_eq!(
            extract_client_ip(&headers, peer(), &trusted),
            "203.0.113.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_untrusted_peer_ignores_header() {
        let headers = headers_with_xff("203.0.113.1");
        let trusted = vec!["10.0.0.0/8".parse::<IpNet>().unwrap()];
        assert_eq!(extract_client_ip(&headers, peer(), &trusted), peer());
    }
}
