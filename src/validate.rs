//! The URL guard: ordered, short-circuiting gates.

use std::net::IpAddr;

use tracing::{debug, info};

use crate::error::Error;
use crate::logging::sanitize_for_log;
use crate::policy::ValidationPolicy;
use crate::target::TargetUrl;

/// An accepted URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    /// Normalized URL, re-serialized from the parsed components. Fetch this,
    /// never the raw input.
    pub url: String,

    /// Scheme, lowercase.
    pub scheme: String,

    /// Hostname without IPv6 brackets (use for Host header / SNI).
    pub host: String,

    /// Port number.
    pub port: u16,

    /// Set when the host is a numeric address.
    pub ip: Option<IpAddr>,
}

impl Validated {
    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }
}

/// Validate an untrusted URL string against `policy`.
///
/// Gates run in this order and the first failure decides the error:
/// 1. percent-decode once and parse
/// 2. scheme allow-list
/// 3. percent-decoding did not move the authority, host present, no userinfo
/// 4. hostname and domain deny-lists
/// 5. IP-literal classification
///
/// Non-numeric hostnames are not resolved here; [`fetch`](crate::fetch)
/// re-checks the resolved addresses right before connecting.
///
/// # Example
///
/// ```rust
/// use url_guard::{validate, ReasonCode, ValidationPolicy};
///
/// let policy = ValidationPolicy::default();
/// assert!(validate("http://example.com", &policy).is_ok());
///
/// let err = validate("ftp://example.com", &policy).unwrap_err();
/// assert_eq!(err.code(), ReasonCode::SchemeNotAllowed);
/// ```
pub fn validate(raw: &str, policy: &ValidationPolicy) -> Result<Validated, Error> {
    let result = TargetUrl::parse(raw).and_then(|target| check(target, raw, policy));
    log_verdict(raw, result)
}

/// Run the same gates on a URL that is already normalized, without
/// percent-decoding it again.
///
/// Used by the fetcher for the URL it is handed and for every redirect
/// target, so the string that passed the gates is exactly the one requested.
pub(crate) fn revalidate(url: &str, policy: &ValidationPolicy) -> Result<Validated, Error> {
    let result = TargetUrl::from_normalized(url).and_then(|target| check(target, url, policy));
    log_verdict(url, result)
}

fn log_verdict(raw: &str, result: Result<Validated, Error>) -> Result<Validated, Error> {
    match result {
        Ok(validated) => {
            debug!(url = %sanitize_for_log(&validated.url), "url accepted");
            Ok(validated)
        }
        Err(e) => {
            info!(
                code = %e.code(),
                url = %sanitize_for_log(raw),
                reason = %sanitize_for_log(&e.to_string()),
                "url rejected"
            );
            Err(e)
        }
    }
}

fn check(target: TargetUrl, raw: &str, policy: &ValidationPolicy) -> Result<Validated, Error> {
    if !policy.is_scheme_allowed(target.scheme()) {
        return Err(Error::scheme_not_allowed(raw, target.scheme()));
    }

    if target.decoding_changed_authority() {
        return Err(Error::invalid_url(
            raw,
            "percent-encoding changes the URL authority",
        ));
    }

    let host = target
        .bare_host()
        .ok_or_else(|| Error::invalid_url(raw, "URL must have a host"))?
        .to_string();

    if target.has_userinfo() {
        return Err(Error::invalid_url(raw, "userinfo (user:pass@) not allowed"));
    }

    if let Err(reason) = policy.is_hostname_allowed(&host) {
        return Err(Error::hostname_blocked(raw, &host, reason));
    }

    let ip = target.ip();
    if let Some(ip) = ip {
        if let Err(reason) = policy.is_ip_allowed(ip) {
            return Err(Error::ssrf_blocked(raw, ip, reason));
        }
    }

    Ok(Validated {
        url: target.as_str().to_string(),
        scheme: target.scheme().to_string(),
        port: target.port(),
        host,
        ip,
    })
}
