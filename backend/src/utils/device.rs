//! Device identification for session exclusivity.
//!
//! The fingerprint is a coarse heuristic: clients behind the same NAT with
//! identical browser builds collide, and a user-agent upgrade produces a new
//! id. Clients that need a stable identity should send an explicit device id,
//! which always wins over the fingerprint.

use axum::http::{header::USER_AGENT, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// Derives a stable device id from the user agent and client IP.
pub fn fingerprint(user_agent: &str, ip_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    hasher.update(ip_address.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Returns the trimmed explicit device id when one was supplied, otherwise
/// falls back to the request fingerprint.
pub fn resolve_device_id(hint: Option<&str>, user_agent: &str, ip_address: &str) -> String {
    match hint.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => fingerprint(user_agent, ip_address),
    }
}

pub fn extract_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|agent| agent.trim().to_string())
        .filter(|agent| !agent.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Client IP as seen through proxies: first x-forwarded-for entry, then
/// x-real-ip, then "unknown".
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = value
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
        {
            return ip;
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
