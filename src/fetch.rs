//! Bounded HTTP fetching with redirect re-validation.
//!
//! Every hop, the first included, goes through the validation gates and DNS
//! re-validation before a connection is opened, and the connection is pinned
//! to the address that passed. Redirects are never followed by the HTTP
//! client itself.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, LOCATION};
use reqwest::redirect::Policy as RedirectPolicy;
use reqwest::{Client, Response, StatusCode};
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::logging::sanitize_for_log;
use crate::policy::ValidationPolicy;
use crate::resolve::resolve_checked;
use crate::validate::{revalidate, Validated};

/// Default overall timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of redirects to follow.
pub const DEFAULT_MAX_REDIRECTS: u8 = 5;

/// Default body excerpt size, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2000;

/// Limits for a single [`fetch`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Deadline for the whole operation, all hops and body reads included.
    pub timeout: Duration,

    /// Redirects followed before giving up.
    pub max_redirects: u8,

    /// Bytes of body kept in the excerpt.
    pub max_body_bytes: usize,

    /// Reject responses whose declared Content-Length is larger than this.
    pub max_content_length: Option<u64>,

    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_content_length: None,
            user_agent: concat!("url-guard/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Summary of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Status of the final response.
    pub status_code: u16,

    /// URL of the final response.
    pub final_url: String,

    /// At most `max_body_bytes` of the body.
    pub body_excerpt: Vec<u8>,

    /// Whether the body was longer than the excerpt.
    pub truncated: bool,

    /// Validated URLs that were requested, the first one included.
    pub chain: Vec<Validated>,
}

impl FetchResult {
    /// The excerpt as text. Invalid UTF-8 is replaced.
    ///
    /// When the body was truncated, a character split by the cut is dropped
    /// rather than rendered as U+FFFD.
    pub fn text(&self) -> Cow<'_, str> {
        let bytes = if self.truncated {
            without_split_char(&self.body_excerpt)
        } else {
            &self.body_excerpt
        };
        String::from_utf8_lossy(bytes)
    }

    pub fn redirects(&self) -> usize {
        self.chain.len().saturating_sub(1)
    }
}

/// Fetch a URL, re-validating each redirect hop.
///
/// `url` should be the [`Validated::url`] of an accepted URL. It is checked
/// again here without being percent-decoded a second time, so what was
/// validated is what gets requested.
///
/// When the deadline passes the in-flight request is dropped, which closes
/// its connection.
///
/// # Example
///
/// ```rust,no_run
/// use url_guard::{fetch, validate, FetchOptions, ValidationPolicy};
///
/// # async fn example() -> Result<(), url_guard::Error> {
/// let policy = ValidationPolicy::default();
/// let accepted = validate("https://example.com/", &policy)?;
/// let result = fetch(&accepted.url, &policy, &FetchOptions::default()).await?;
/// println!("{} ({} bytes)", result.status_code, result.body_excerpt.len());
/// # Ok(())
/// # }
/// ```
pub async fn fetch(
    url: &str,
    policy: &ValidationPolicy,
    options: &FetchOptions,
) -> Result<FetchResult, Error> {
    let outcome = match tokio::time::timeout(options.timeout, fetch_chain(url, policy, options)).await
    {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::Timeout {
            url: url.to_string(),
            after: options.timeout,
        }),
    };

    match &outcome {
        Ok(result) => info!(
            url = %sanitize_for_log(url),
            status = result.status_code,
            redirects = result.redirects(),
            bytes = result.body_excerpt.len(),
            truncated = result.truncated,
            "fetch complete"
        ),
        Err(e) => warn!(
            code = %e.code(),
            url = %sanitize_for_log(url),
            error = %sanitize_for_log(&e.to_string()),
            "fetch failed"
        ),
    }

    outcome
}

/// Synchronous version of [`fetch`].
///
/// Works both inside and outside of a Tokio runtime. When called from
/// outside a runtime, it creates a temporary one. A current-thread runtime
/// cannot be blocked in place, so there the fetch runs on a helper thread
/// with its own runtime.
pub fn fetch_sync(
    url: &str,
    policy: &ValidationPolicy,
    options: &FetchOptions,
) -> Result<FetchResult, Error> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| handle.block_on(fetch(url, policy, options)))
        }
        Ok(_) => thread::scope(|scope| {
            scope
                .spawn(|| fetch_on_new_runtime(url, policy, options))
                .join()
                .unwrap_or_else(|_| Err(Error::http_error(url, "fetch thread panicked")))
        }),
        Err(_) => fetch_on_new_runtime(url, policy, options),
    }
}

fn fetch_on_new_runtime(
    url: &str,
    policy: &ValidationPolicy,
    options: &FetchOptions,
) -> Result<FetchResult, Error> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::http_error(url, e.to_string()))?;
    rt.block_on(fetch(url, policy, options))
}

async fn fetch_chain(
    url: &str,
    policy: &ValidationPolicy,
    options: &FetchOptions,
) -> Result<FetchResult, Error> {
    let mut current_url = url.to_string();
    let mut chain: Vec<Validated> = Vec::new();

    loop {
        let (validated, addr) = check_hop(url, &current_url, policy, chain.is_empty()).await?;

        debug!(
            hop = chain.len(),
            url = %sanitize_for_log(&validated.url),
            %addr,
            "requesting"
        );

        let client = build_client(&validated, addr, options)?;
        let mut response = client
            .get(&validated.url)
            .send()
            .await
            .map_err(|e| request_error(&validated.url, options.timeout, &e))?;

        chain.push(validated);
        let base = &chain[chain.len() - 1].url;

        if let Some(location) = redirect_location(&response) {
            if chain.len() > usize::from(options.max_redirects) {
                return Err(Error::TooManyRedirects {
                    url: url.to_string(),
                    max: options.max_redirects,
                });
            }

            current_url = resolve_redirect_url(url, base, &location)?;
            continue;
        }

        if let (Some(limit), Some(declared)) = (options.max_content_length, declared_length(&response))
        {
            if declared > limit {
                return Err(Error::BodyTooLarge {
                    url: base.clone(),
                    declared,
                    limit,
                });
            }
        }

        let status_code = response.status().as_u16();
        let (body_excerpt, truncated) = read_excerpt(&mut response, options.max_body_bytes)
            .await
            .map_err(|e| request_error(base, options.timeout, &e))?;

        return Ok(FetchResult {
            status_code,
            final_url: base.clone(),
            body_excerpt,
            truncated,
            chain,
        });
    }
}

/// Validate and resolve one hop. Policy failures on a redirect target are
/// reported as [`Error::RedirectBlocked`].
async fn check_hop(
    original_url: &str,
    current_url: &str,
    policy: &ValidationPolicy,
    first: bool,
) -> Result<(Validated, SocketAddr), Error> {
    let checked = match revalidate(current_url, policy) {
        Ok(validated) => resolve_checked(&validated, policy)
            .await
            .map(|addr| (validated, addr)),
        Err(e) => Err(e),
    };

    checked.map_err(|e| {
        if first || !e.code().is_rejection() {
            e
        } else {
            Error::RedirectBlocked {
                original_url: original_url.to_string(),
                redirect_url: current_url.to_string(),
                reason: e.to_string(),
            }
        }
    })
}

fn build_client(
    validated: &Validated,
    addr: SocketAddr,
    options: &FetchOptions,
) -> Result<Client, Error> {
    let mut builder = Client::builder()
        .redirect(RedirectPolicy::none())
        .user_agent(options.user_agent.as_str())
        .no_proxy();

    // Pin the hostname to the checked address; TLS SNI still uses the name.
    if validated.ip.is_none() {
        builder = builder.resolve(&validated.host, addr);
    }

    builder
        .build()
        .map_err(|e| Error::http_error(&validated.url, e.to_string()))
}

/// Location of a redirect we should follow, if this is one.
///
/// Redirect statuses without a Location header (and 300/304) are treated as
/// final responses.
fn redirect_location(response: &Response) -> Option<String> {
    match response.status() {
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::SEE_OTHER
        | StatusCode::TEMPORARY_REDIRECT
        | StatusCode::PERMANENT_REDIRECT => {}
        _ => return None,
    }

    response
        .headers()
        .get(LOCATION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

fn declared_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Resolve a redirect target (which may be relative) against the URL that
/// returned it.
fn resolve_redirect_url(original_url: &str, base: &str, location: &str) -> Result<String, Error> {
    let rejected = |reason: String| Error::RedirectBlocked {
        original_url: original_url.to_string(),
        redirect_url: location.to_string(),
        reason,
    };

    let base_url = url::Url::parse(base).map_err(|e| rejected(e.to_string()))?;
    let resolved = base_url
        .join(location)
        .map_err(|e| rejected(format!("Invalid URL: {}", e)))?;

    Ok(resolved.to_string())
}

/// Stream the body, keeping at most `limit` bytes.
///
/// Stops reading as soon as the limit is passed; the rest of the body is
/// never downloaded.
async fn read_excerpt(
    response: &mut Response,
    limit: usize,
) -> Result<(Vec<u8>, bool), reqwest::Error> {
    let mut body = Vec::with_capacity(limit.min(64 * 1024));

    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }

    Ok((body, false))
}

/// Strip an incomplete multi-byte sequence from the end of `bytes`.
fn without_split_char(bytes: &[u8]) -> &[u8] {
    // a stub of a 4-byte sequence is at most 3 bytes long
    let tail_start = bytes.len().saturating_sub(3);
    let Some(lead) = bytes[tail_start..].iter().rposition(|&b| b & 0xC0 != 0x80) else {
        return bytes;
    };
    let lead = tail_start + lead;

    match std::str::from_utf8(&bytes[lead..]) {
        Err(e) if e.error_len().is_none() => &bytes[..lead],
        _ => bytes,
    }
}

fn request_error(url: &str, timeout: Duration, e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        return Error::Timeout {
            url: url.to_string(),
            after: timeout,
        };
    }

    Error::http_error(url, error_chain(e))
}

/// reqwest's top-level message hides the cause (refused, DNS, TLS).
fn error_chain(e: &dyn StdError) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
