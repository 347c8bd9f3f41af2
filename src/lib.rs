//! # url-guard
//!
//! SSRF guard for services that fetch user-supplied URLs.
//!
//! `url-guard` decides whether an untrusted URL may be fetched and, if so,
//! fetches it with a deadline, a body limit, and the same checks re-applied
//! to every redirect hop and to every DNS answer before connecting.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use url_guard::{fetch, validate, FetchOptions, ValidationPolicy};
//!
//! # async fn example() -> Result<(), url_guard::Error> {
//! let policy = ValidationPolicy::default();
//! let accepted = validate("https://example.com/api", &policy)?;
//! let result = fetch(&accepted.url, &policy, &FetchOptions::default()).await?;
//! println!("{} truncated={}", result.status_code, result.truncated);
//! # Ok(())
//! # }
//! ```

mod blocklist;
mod config;
mod error;
mod fetch;
mod logging;
mod policy;
mod report;
mod resolve;
mod target;
mod validate;

pub use blocklist::{classify_ip, IpClass};
pub use config::{ConfigError, FetchConfig, GuardConfig, PolicyConfig};
pub use error::{Error, ReasonCode};
pub use fetch::{fetch, fetch_sync, FetchOptions, FetchResult};
pub use logging::{init_logging, sanitize_for_log};
pub use policy::{PolicyBuilder, ValidationPolicy};
pub use report::{handle, Report};
pub use resolve::{check_resolved, resolve_checked};
pub use target::TargetUrl;
pub use validate::{validate, Validated};
