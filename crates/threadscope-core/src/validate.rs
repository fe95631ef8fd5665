//! Validation of untrusted handles and profile URLs.
//!
//! Everything a caller sends us ends up in a browser navigation, so this
//! module is the SSRF boundary: only allow-listed domains are reachable, IP
//! literals never are, and the final URL is checked again right before
//! navigation.

use crate::error::ScrapeError;
use crate::types::Handle;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;
use url::{Host, Url};

/// Domains a profile URL may point at.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["threads.net", "www.threads.net"];

/// Maximum raw input length, before any normalization.
pub const MAX_INPUT_LEN: usize = 100;

/// Post limit used when the caller does not send one.
pub const DEFAULT_POST_LIMIT: u32 = 30;

/// Largest post limit a caller may request.
pub const MAX_POST_LIMIT: u32 = 100;

fn handle_regex() -> &'static Regex {
    static HANDLE_REGEX: OnceLock<Regex> = OnceLock::new();
    HANDLE_REGEX.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.]{1,30}$").expect("valid regex"))
}

fn profile_path_regex() -> &'static Regex {
    static PATH_REGEX: OnceLock<Regex> = OnceLock::new();
    PATH_REGEX.get_or_init(|| Regex::new(r"^/@([a-zA-Z0-9_.]+)").expect("valid regex"))
}

/// Validate and normalize a raw handle (`name`, `@name`) or profile URL.
///
/// # Errors
/// Returns [`ScrapeError::Validation`] for empty, oversized or
/// control-character input, non-allow-listed or IP-literal hosts, and
/// malformed handles.
pub fn validate_and_normalize_handle<S: AsRef<str>>(
    raw: &str,
    allowed_domains: &[S],
) -> Result<Handle, ScrapeError> {
    let input = raw.trim();

    if input.is_empty() {
        return Err(ScrapeError::Validation("handle cannot be empty".to_string()));
    }
    if input.chars().count() > MAX_INPUT_LEN {
        return Err(ScrapeError::Validation("handle too long".to_string()));
    }
    if input.chars().any(char::is_control) {
        return Err(ScrapeError::Validation(
            "invalid characters in handle".to_string(),
        ));
    }

    let lowered = input.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        return validate_profile_url(input, allowed_domains);
    }

    normalize_handle(input)
}

/// Normalize a bare handle: strip one leading `@` and check the format.
///
/// # Errors
/// Returns [`ScrapeError::Validation`] when the handle is not 1-30 of
/// `[a-zA-Z0-9_.]` or contains `..`.
pub fn normalize_handle(handle: &str) -> Result<Handle, ScrapeError> {
    let clean = handle.strip_prefix('@').unwrap_or(handle);

    if !handle_regex().is_match(clean) {
        return Err(ScrapeError::Validation(
            "invalid handle format: only letters, numbers, underscore and dots are allowed"
                .to_string(),
        ));
    }
    if clean.contains("..") {
        return Err(ScrapeError::Validation(
            "invalid handle format: sequential dots".to_string(),
        ));
    }

    Ok(Handle::from_normalized(clean.to_string()))
}

/// Validate an absolute profile URL and extract its handle.
fn validate_profile_url<S: AsRef<str>>(
    raw: &str,
    allowed_domains: &[S],
) -> Result<Handle, ScrapeError> {
    let url = Url::parse(raw)
        .map_err(|e| ScrapeError::Validation(format!("invalid URL format: {e}")))?;

    check_host(&url, allowed_domains)?;

    if !url.username().is_empty() || url.password().is_some() {
        return Err(ScrapeError::Validation(
            "URLs with credentials are not allowed".to_string(),
        ));
    }
    if url.port().is_some() {
        return Err(ScrapeError::Validation(
            "URLs with explicit ports are not allowed".to_string(),
        ));
    }

    let captures = profile_path_regex()
        .captures(url.path())
        .ok_or_else(|| ScrapeError::Validation("invalid profile URL path".to_string()))?;

    normalize_handle(&captures[1])
}

/// Check the URL once more right before navigation.
///
/// # Errors
/// Returns [`ScrapeError::Validation`] unless the URL is `https` on an
/// allow-listed domain.
pub fn validate_final_url<S: AsRef<str>>(
    raw: &str,
    allowed_domains: &[S],
) -> Result<Url, ScrapeError> {
    let url = Url::parse(raw)
        .map_err(|e| ScrapeError::Validation(format!("invalid final URL: {e}")))?;

    check_host(&url, allowed_domains)?;

    if url.scheme() != "https" {
        return Err(ScrapeError::Validation(
            "only HTTPS URLs are allowed".to_string(),
        ));
    }

    Ok(url)
}

fn check_host<S: AsRef<str>>(url: &Url, allowed_domains: &[S]) -> Result<(), ScrapeError> {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if allowed_domains
                .iter()
                .any(|allowed| allowed.as_ref().eq_ignore_ascii_case(&domain))
            {
                Ok(())
            } else {
                Err(ScrapeError::Validation(format!(
                    "domain not allowed: {domain}"
                )))
            }
        }
        Some(Host::Ipv4(ip)) => Err(ip_rejection(IpAddr::V4(ip))),
        Some(Host::Ipv6(ip)) => Err(ip_rejection(IpAddr::V6(ip))),
        None => Err(ScrapeError::Validation("URL has no host".to_string())),
    }
}

fn ip_rejection(ip: IpAddr) -> ScrapeError {
    if is_private_or_local_ip(ip) {
        tracing::warn!(%ip, "Rejected private or local address in profile URL");
        ScrapeError::Validation("private or local addresses are not allowed".to_string())
    } else {
        ScrapeError::Validation("IP addresses are not allowed".to_string())
    }
}

/// Whether an address is loopback, private, link-local or unspecified.
#[must_use]
pub fn is_private_or_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_v4(mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
}

/// Resolve the requested post limit.
///
/// # Errors
/// Returns [`ScrapeError::Validation`] when the limit is outside `1..=100`.
pub fn validate_limit(limit: Option<i64>) -> Result<u32, ScrapeError> {
    match limit {
        None => Ok(DEFAULT_POST_LIMIT),
        Some(n) if (1..=i64::from(MAX_POST_LIMIT)).contains(&n) => {
            u32::try_from(n).map_err(|_| ScrapeError::Validation("limit out of range".into()))
        }
        Some(_) => Err(ScrapeError::Validation(format!(
            "limit must be between 1 and {MAX_POST_LIMIT}"
        ))),
    }
}
