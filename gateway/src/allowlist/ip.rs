//! Client IP extraction for admission control.

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Extract client IP from request headers or connection info.
///
/// When `trust_proxy` is true, checks X-Forwarded-For and X-Real-IP headers.
/// Falls back to direct connection IP, or 127.0.0.1 if unavailable.
pub fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> IpAddr {
    if trust_proxy {
        if let Some(forwarded) = headers.get("X-Forwarded-For") {
            if let Ok(s) = forwarded.to_str() {
                if let Some(first_ip) = s.split(',').next() {
                    if let Ok(ip) = first_ip.trim().parse() {
                        return ip;
                    }
                }
            }
        }
        if let Some(real_ip) = headers.get("X-Real-IP") {
            if let Ok(s) = real_ip.to_str() {
                if let Ok(ip) = s.trim().parse() {
                    return ip;
                }
            }
        }
    }
    connect_info
        .map(|c| c.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
