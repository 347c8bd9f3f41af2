//! Configuration loaded from a TOML file.
//!
//! ```toml
//! [policy]
//! allowed_schemes = ["http", "https"]
//! blocked_hostnames = ["localhost", "nginx-proxy"]
//! blocked_domains = ["metadata.google.internal"]
//! blocked_cidrs = ["192.169.100.0/24"]
//! allowed_cidrs = []
//!
//! [fetch]
//! timeout_secs = 10
//! max_redirects = 5
//! max_body_bytes = 2000
//! ```
//!
//! Missing sections and keys fall back to the defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::{FetchOptions, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT};
use crate::policy::{
    PolicyBuilder, ValidationPolicy, DEFAULT_ALLOWED_SCHEMES, DEFAULT_BLOCKED_DOMAINS,
    DEFAULT_BLOCKED_HOSTNAMES,
};

/// Errors from reading or interpreting a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid CIDR range: {0}")]
    InvalidCidr(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// `[policy]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub allowed_schemes: Vec<String>,
    pub blocked_hostnames: Vec<String>,
    pub blocked_domains: Vec<String>,
    /// Extra ranges to block, e.g. an internal segment with public addresses.
    pub blocked_cidrs: Vec<String>,
    /// Ranges that override every block rule.
    pub allowed_cidrs: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        fn owned(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            allowed_schemes: owned(DEFAULT_ALLOWED_SCHEMES),
            blocked_hostnames: owned(DEFAULT_BLOCKED_HOSTNAMES),
            blocked_domains: owned(DEFAULT_BLOCKED_DOMAINS),
            blocked_cidrs: Vec::new(),
            allowed_cidrs: Vec::new(),
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Overall deadline in seconds.
    pub timeout_secs: u64,
    pub max_redirects: u8,
    pub max_body_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_content_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_content_length: None,
            user_agent: None,
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub policy: PolicyConfig,
    pub fetch: FetchConfig,
}

impl GuardConfig {
    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_toml_str(&data)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(cfg)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        let cfg: GuardConfig = toml::from_str(data)?;
        if cfg.fetch.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "fetch.timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build the immutable policy.
    ///
    /// Unlike [`PolicyBuilder::block_cidr`], a malformed range here is an
    /// error rather than silently dropped.
    pub fn policy(&self) -> Result<ValidationPolicy, ConfigError> {
        let section = &self.policy;

        let mut builder = PolicyBuilder::empty();
        for scheme in &section.allowed_schemes {
            builder = builder.allow_scheme(scheme);
        }
        for host in &section.blocked_hostnames {
            builder = builder.block_host(host);
        }
        for domain in &section.blocked_domains {
            builder = builder.block_domain(domain);
        }
        for cidr in &section.blocked_cidrs {
            builder = builder.block_net(parse_cidr(cidr)?);
        }
        for cidr in &section.allowed_cidrs {
            builder = builder.allow_net(parse_cidr(cidr)?);
        }

        Ok(builder.build())
    }

    pub fn fetch_options(&self) -> FetchOptions {
        let section = &self.fetch;
        let defaults = FetchOptions::default();

        FetchOptions {
            timeout: Duration::from_secs(section.timeout_secs),
            max_redirects: section.max_redirects,
            max_body_bytes: section.max_body_bytes,
            max_content_length: section.max_content_length,
            user_agent: section.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}

fn parse_cidr(value: &str) -> Result<IpNet, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidCidr(value.to_string()))
}
