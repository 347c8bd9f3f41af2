//! Immutable validation policy and its builder.
//!
//! A [`ValidationPolicy`] is built once and then only read. It has no
//! `&mut self` methods; share it by reference or behind an `Arc`.
//!
//! ## Precedence for IP addresses
//!
//! 1. An address inside an `allow_cidr` range is allowed.
//! 2. An address inside a `block_cidr` range is blocked.
//! 3. Otherwise the built-in classifier decides (see [`classify_ip`]).
//!
//! Allow rules override the built-in ranges, so `allow_cidr("127.0.0.0/8")`
//! re-opens loopback. Only use it for audited cases such as test harnesses.

use std::collections::HashSet;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::blocklist::{classify_ip, embedded_ipv4};

/// Schemes accepted by the default policy.
pub const DEFAULT_ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Single-label internal names blocked by the default policy.
pub const DEFAULT_BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "nginx-proxy",
    "internal-service",
    "admin-service",
    "instance-data", // AWS EC2-Classic metadata alias
];

/// Fully qualified internal names blocked by the default policy.
pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "metadata.google.internal",
    "metadata.goog",
    "metadata.azure.internal",
];

/// Immutable URL validation policy.
///
/// Created via [`PolicyBuilder`] or [`GuardConfig::policy`](crate::GuardConfig::policy).
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    allowed_schemes: HashSet<String>,
    blocked_hostnames: HashSet<String>,
    blocked_domains: HashSet<String>,
    blocked_cidrs: Vec<IpNet>,
    allowed_cidrs: Vec<IpNet>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        PolicyBuilder::new().build()
    }
}

impl ValidationPolicy {
    /// Case-sensitive scheme membership.
    pub fn is_scheme_allowed(&self, scheme: &str) -> bool {
        self.allowed_schemes.contains(scheme)
    }

    /// Check a hostname against the host and domain deny-lists.
    ///
    /// Returns `Ok(())` if allowed, `Err(reason)` if blocked. Matching is
    /// exact and case-insensitive.
    pub fn is_hostname_allowed(&self, host: &str) -> Result<(), String> {
        let host_lower = host.to_lowercase();

        if self.blocked_hostnames.contains(&host_lower) {
            return Err(format!("hostname {} is blocked", host_lower));
        }

        if self.blocked_domains.contains(&host_lower) {
            return Err(format!("domain {} is blocked", host_lower));
        }

        Ok(())
    }

    /// Check an IP address against the classifier.
    ///
    /// Returns `Ok(())` if allowed, `Err(reason)` if blocked.
    pub fn is_ip_allowed(&self, ip: IpAddr) -> Result<(), String> {
        if self.allowed_cidrs.iter().any(|net| net.contains(&ip)) {
            return Ok(());
        }

        let embedded = match ip {
            IpAddr::V6(v6) => embedded_ipv4(v6).map(IpAddr::V4),
            IpAddr::V4(_) => None,
        };

        for net in &self.blocked_cidrs {
            if net.contains(&ip) || embedded.is_some_and(|v4| net.contains(&v4)) {
                return Err(format!("blocked by policy range {}", net));
            }
        }

        if let Some(class) = classify_ip(ip) {
            return Err(class.reason().to_string());
        }

        Ok(())
    }

    pub fn allowed_schemes(&self) -> impl Iterator<Item = &str> {
        self.allowed_schemes.iter().map(String::as_str)
    }
}

/// Builder for [`ValidationPolicy`].
///
/// Each method consumes `self`, so a half-built policy can't be reused by
/// accident.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    allowed_schemes: HashSet<String>,
    blocked_hostnames: HashSet<String>,
    blocked_domains: HashSet<String>,
    blocked_cidrs: Vec<IpNet>,
    allowed_cidrs: Vec<IpNet>,
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyBuilder {
    /// Start from the default schemes and deny-lists.
    pub fn new() -> Self {
        let builder = Self::empty();
        let builder = DEFAULT_ALLOWED_SCHEMES
            .iter()
            .fold(builder, |b, s| b.allow_scheme(s));
        let builder = DEFAULT_BLOCKED_HOSTNAMES
            .iter()
            .fold(builder, |b, h| b.block_host(h));
        DEFAULT_BLOCKED_DOMAINS
            .iter()
            .fold(builder, |b, d| b.block_domain(d))
    }

    /// Start with no schemes and no deny-list entries.
    ///
    /// The built-in IP classifier still applies.
    pub fn empty() -> Self {
        Self {
            allowed_schemes: HashSet::new(),
            blocked_hostnames: HashSet::new(),
            blocked_domains: HashSet::new(),
            blocked_cidrs: Vec::new(),
            allowed_cidrs: Vec::new(),
        }
    }

    /// Allow a scheme. Stored lowercase, the form the parser produces.
    pub fn allow_scheme(mut self, scheme: &str) -> Self {
        self.allowed_schemes.insert(scheme.to_ascii_lowercase());
        self
    }

    /// Block a hostname (exact, case-insensitive).
    pub fn block_host(mut self, host: &str) -> Self {
        self.blocked_hostnames.insert(host.to_lowercase());
        self
    }

    /// Block a fully qualified domain name (exact, case-insensitive).
    pub fn block_domain(mut self, domain: &str) -> Self {
        self.blocked_domains
            .insert(domain.trim_end_matches('.').to_lowercase());
        self
    }

    /// Block an IP range (CIDR notation). Invalid input is ignored.
    pub fn block_cidr(self, cidr: &str) -> Self {
        match cidr.parse() {
            Ok(net) => self.block_net(net),
            Err(_) => self,
        }
    }

    /// Allow an IP range (CIDR notation), overriding every block rule.
    /// Invalid input is ignored.
    pub fn allow_cidr(self, cidr: &str) -> Self {
        match cidr.parse() {
            Ok(net) => self.allow_net(net),
            Err(_) => self,
        }
    }

    pub fn block_net(mut self, net: IpNet) -> Self {
        self.blocked_cidrs.push(net);
        self
    }

    pub fn allow_net(mut self, net: IpNet) -> Self {
        self.allowed_cidrs.push(net);
        self
    }

    pub fn build(self) -> ValidationPolicy {
        ValidationPolicy {
            allowed_schemes: self.allowed_schemes,
            blocked_hostnames: self.blocked_hostnames,
            blocked_domains: self.blocked_domains,
            blocked_cidrs: self.blocked_cidrs,
            allowed_cidrs: self.allowed_cidrs,
        }
    }
}
