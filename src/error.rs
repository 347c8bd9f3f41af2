//! Error types for url-guard.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors produced by validation and fetching.
///
/// Every variant is recoverable. Use [`Error::code`] to get the stable
/// reason code shown to callers.
#[derive(Debug, Error)]
pub enum Error {
    /// The URL could not be decoded or parsed, or has no usable host.
    #[error("Invalid URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The scheme is not in the policy's allow-list.
    #[error("Scheme not allowed: {scheme}")]
    SchemeNotAllowed { url: String, scheme: String },

    /// Hostname is on the policy's host or domain deny-list.
    #[error("Internal host blocked: {host} - {reason}")]
    HostnameBlocked {
        url: String,
        host: String,
        reason: String,
    },

    /// IP address (literal or resolved) is in a blocked range.
    #[error("SSRF blocked: {ip} - {reason}")]
    SsrfBlocked {
        url: String,
        ip: IpAddr,
        reason: String,
    },

    /// A redirect pointed to a URL that failed validation.
    #[error("Redirect blocked: {redirect_url} - {reason}")]
    RedirectBlocked {
        original_url: String,
        redirect_url: String,
        reason: String,
    },

    /// The redirect chain was longer than allowed.
    #[error("Too many redirects (max {max})")]
    TooManyRedirects { url: String, max: u8 },

    /// The whole fetch did not complete in time.
    #[error("Timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    /// DNS resolution failed.
    #[error("DNS error for {host}: {message}")]
    DnsError { host: String, message: String },

    /// Connection, TLS, or protocol failure.
    #[error("HTTP error: {message}")]
    HttpError { url: String, message: String },

    /// Declared Content-Length exceeds the configured cap.
    #[error("Body too large: {declared} bytes (limit {limit})")]
    BodyTooLarge {
        url: String,
        declared: u64,
        limit: u64,
    },
}

/// Stable reason codes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReasonCode {
    MalformedUrl,
    SchemeNotAllowed,
    InternalHostBlocked,
    PrivateNetworkBlocked,
    RedirectRejected,
    Timeout,
    NetworkError,
    BodyTooLarge,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::MalformedUrl => "MalformedUrl",
            ReasonCode::SchemeNotAllowed => "SchemeNotAllowed",
            ReasonCode::InternalHostBlocked => "InternalHostBlocked",
            ReasonCode::PrivateNetworkBlocked => "PrivateNetworkBlocked",
            ReasonCode::RedirectRejected => "RedirectRejected",
            ReasonCode::Timeout => "Timeout",
            ReasonCode::NetworkError => "NetworkError",
            ReasonCode::BodyTooLarge => "BodyTooLarge",
        }
    }

    /// True for codes produced by [`validate`](crate::validate) alone.
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            ReasonCode::MalformedUrl
                | ReasonCode::SchemeNotAllowed
                | ReasonCode::InternalHostBlocked
                | ReasonCode::PrivateNetworkBlocked
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Map this error onto the reason-code taxonomy.
    pub fn code(&self) -> ReasonCode {
        match self {
            Error::InvalidUrl { .. } => ReasonCode::MalformedUrl,
            Error::SchemeNotAllowed { .. } => ReasonCode::SchemeNotAllowed,
            Error::HostnameBlocked { .. } => ReasonCode::InternalHostBlocked,
            Error::SsrfBlocked { .. } => ReasonCode::PrivateNetworkBlocked,
            Error::RedirectBlocked { .. } | Error::TooManyRedirects { .. } => {
                ReasonCode::RedirectRejected
            }
            Error::Timeout { .. } => ReasonCode::Timeout,
            Error::DnsError { .. } | Error::HttpError { .. } => ReasonCode::NetworkError,
            Error::BodyTooLarge { .. } => ReasonCode::BodyTooLarge,
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn scheme_not_allowed(url: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self::SchemeNotAllowed {
            url: url.into(),
            scheme: scheme.into(),
        }
    }

    pub(crate) fn hostname_blocked(
        url: impl Into<String>,
        host: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::HostnameBlocked {
            url: url.into(),
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn ssrf_blocked(url: impl Into<String>, ip: IpAddr, reason: impl Into<String>) -> Self {
        Self::SsrfBlocked {
            url: url.into(),
            ip,
            reason: reason.into(),
        }
    }

    pub(crate) fn dns_error(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DnsError {
            host: host.into(),
            message: message.into(),
        }
    }

    pub(crate) fn http_error(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HttpError {
            url: url.into(),
            message: message.into(),
        }
    }
}
