//! Decode-once URL parsing.

use std::net::IpAddr;

use percent_encoding::percent_decode_str;
use url::{Host, Url};

use crate::Error;

/// An untrusted URL after one round of percent-decoding and WHATWG parsing.
///
/// No policy has been applied yet. The host is lowercased and any trailing
/// dot is removed, and numeric hosts in octal, hex, decimal-integer or
/// short form are already normalized to a structural address by the parser.
#[derive(Debug, Clone)]
pub struct TargetUrl {
    inner: Url,
    reshaped: bool,
}

impl TargetUrl {
    /// Percent-decode `raw` exactly once, then parse it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the decoded bytes are not UTF-8 or
    /// the decoded string is not a URL.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| Error::invalid_url(raw, "not valid UTF-8 after percent-decoding"))?;

        let mut target = Self::parse_decoded(&decoded, raw)?;

        // If the input already parses, decoding must not move its authority
        // boundaries (e.g. `%2F@` turning userinfo into a host).
        if decoded != raw {
            if let Ok(as_given) = Url::parse(raw) {
                target.reshaped = !same_authority(&as_given, &target.inner);
            }
        }

        Ok(target)
    }

    /// Parse a URL that is already in its decoded, normalized form, such as
    /// [`Validated::url`](crate::Validated::url) or a redirect target joined
    /// onto one. Nothing is percent-decoded, so the parsed URL serializes
    /// back to the string that gets fetched.
    pub fn from_normalized(url: &str) -> Result<Self, Error> {
        Self::parse_decoded(url, url)
    }

    fn parse_decoded(decoded: &str, raw: &str) -> Result<Self, Error> {
        let mut inner =
            Url::parse(decoded).map_err(|e| Error::invalid_url(raw, e.to_string()))?;

        strip_trailing_dot(&mut inner, raw)?;

        Ok(Self {
            inner,
            reshaped: false,
        })
    }

    pub fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    /// Host as serialized in the URL (IPv6 in brackets), if any.
    pub fn host_str(&self) -> Option<&str> {
        self.inner.host_str().filter(|h| !h.is_empty())
    }

    /// Host without IPv6 brackets, for comparisons against deny-lists.
    pub fn bare_host(&self) -> Option<&str> {
        self.host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
    }

    /// The host as an address, when the URL names one numerically.
    pub fn ip(&self) -> Option<IpAddr> {
        match self.inner.host()? {
            Host::Ipv4(v4) => Some(IpAddr::V4(v4)),
            Host::Ipv6(v6) => Some(IpAddr::V6(v6)),
            Host::Domain(_) => None,
        }
    }

    /// True when percent-decoding changed the scheme, userinfo, host or
    /// port that the input had as written.
    pub fn decoding_changed_authority(&self) -> bool {
        self.reshaped
    }

    pub fn has_userinfo(&self) -> bool {
        !self.inner.username().is_empty() || self.inner.password().is_some()
    }

    /// Port, defaulting to 80 for http and 443 for https.
    pub fn port(&self) -> u16 {
        self.inner.port_or_known_default().unwrap_or(80)
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.query()
    }

    /// The normalized serialization. This is what gets fetched.
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    pub fn into_url(self) -> Url {
        self.inner
    }
}

fn same_authority(a: &Url, b: &Url) -> bool {
    let host = |u: &Url| u.host_str().map(|h| h.trim_end_matches('.').to_string());

    a.scheme() == b.scheme()
        && a.username() == b.username()
        && a.password() == b.password()
        && host(a) == host(b)
        && a.port_or_known_default() == b.port_or_known_default()
}

/// `example.com.` and `example.com` name the same host.
fn strip_trailing_dot(url: &mut Url, raw: &str) -> Result<(), Error> {
    let stripped = match url.host() {
        Some(Host::Domain(domain)) if domain.ends_with('.') => {
            domain.trim_end_matches('.').to_string()
        }
        _ => return Ok(()),
    };

    if stripped.is_empty() {
        return Err(Error::invalid_url(raw, "empty hostname"));
    }

    url.set_host(Some(&stripped))
        .map_err(|e| Error::invalid_url(raw, e.to_string()))
}
