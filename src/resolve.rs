//! DNS resolution with re-validation of every answer.
//!
//! String gates can't see what a hostname points to. Right before
//! connecting, the fetcher resolves the host here, runs each address through
//! the same classifier used for literals, and pins the connection to the
//! address that passed.

use std::net::{IpAddr, SocketAddr};

use hickory_resolver::TokioResolver;
use tracing::debug;

use crate::error::Error;
use crate::logging::sanitize_for_log;
use crate::policy::ValidationPolicy;
use crate::validate::Validated;

/// Resolve a validated URL's host and return the address to connect to.
///
/// IP-literal hosts were already classified by [`validate`](crate::validate)
/// and are returned as-is.
///
/// # Errors
///
/// - [`Error::DnsError`] if resolution fails or returns nothing
/// - [`Error::SsrfBlocked`] if any returned address is blocked
pub async fn resolve_checked(
    validated: &Validated,
    policy: &ValidationPolicy,
) -> Result<SocketAddr, Error> {
    if let Some(ip) = validated.ip {
        return Ok(SocketAddr::new(ip, validated.port));
    }

    let ips = lookup(&validated.host).await?;
    let ip = check_resolved(&validated.url, &validated.host, &ips, policy)?;

    debug!(
        host = %sanitize_for_log(&validated.host),
        %ip,
        answers = ips.len(),
        "resolved"
    );

    Ok(SocketAddr::new(ip, validated.port))
}

/// Check every resolved address and pick the first one.
///
/// A single blocked answer rejects the host: a resolver returning both a
/// public and a private address would otherwise let the connection land on
/// either.
pub fn check_resolved(
    url: &str,
    host: &str,
    ips: &[IpAddr],
    policy: &ValidationPolicy,
) -> Result<IpAddr, Error> {
    for &ip in ips {
        if let Err(reason) = policy.is_ip_allowed(ip) {
            return Err(Error::ssrf_blocked(
                url,
                ip,
                format!("{} resolves to {}", host, reason),
            ));
        }
    }

    ips.first()
        .copied()
        .ok_or_else(|| Error::dns_error(host, "no IP addresses found"))
}

async fn lookup(host: &str) -> Result<Vec<IpAddr>, Error> {
    let resolver = TokioResolver::builder_tokio()
        .map_err(|e| Error::dns_error(host, e.to_string()))?
        .build();

    let response = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| Error::dns_error(host, e.to_string()))?;

    Ok(response.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonCode;
    use crate::policy::PolicyBuilder;

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_public_answers_pass() {
        let policy = ValidationPolicy::default();
        let ip = check_resolved(
            "http://example.com/",
            "example.com",
            &ips(&["93.184.216.34", "2606:2800:220:1::1"]),
            &policy,
        )
        .unwrap();
        assert_eq!(ip, "93.184.216.34".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_rebinding_to_private_is_blocked() {
        let policy = ValidationPolicy::default();
        let err = check_resolved(
            "http://rebind.example/",
            "rebind.example",
            &ips(&["127.0.0.1"]),
            &policy,
        )
        .unwrap_err();
        assert_eq!(err.code(), ReasonCode::PrivateNetworkBlocked);
        assert!(err.to_string().contains("rebind.example resolves to loopback"));
    }

    #[test]
    fn test_mixed_answers_are_blocked() {
        let policy = ValidationPolicy::default();
        let err = check_resolved(
            "http://mixed.example/",
            "mixed.example",
            &ips(&["93.184.216.34", "10.0.0.5"]),
            &policy,
        )
        .unwrap_err();
        assert_eq!(err.code(), ReasonCode::PrivateNetworkBlocked);
    }

    #[test]
    fn test_empty_answer_is_dns_error() {
        let policy = ValidationPolicy::default();
        let err = check_resolved("http://a.example/", "a.example", &[], &policy).unwrap_err();
        assert_eq!(err.code(), ReasonCode::NetworkError);
    }

    #[test]
    fn test_policy_ranges_apply_to_answers() {
        let policy = PolicyBuilder::new().block_cidr("192.169.100.0/24").build();
        let err = check_resolved(
            "http://svc.example/",
            "svc.example",
            &ips(&["192.169.100.11"]),
            &policy,
        )
        .unwrap_err();
        assert_eq!(err.code(), ReasonCode::PrivateNetworkBlocked);
    }

    #[tokio::test]
    async fn test_literal_host_skips_dns() {
        let policy = ValidationPolicy::default();
        let validated = crate::validate("http://93.184.216.34:8080/", &policy).unwrap();
        let addr = resolve_checked(&validated, &policy).await.unwrap();
        assert_eq!(addr, "93.184.216.34:8080".parse().unwrap());
    }
}
