//! Immutable transfer configuration shared by every download worker.
//!
//! A [`TransferSession`] is built once at startup from the merged CLI/config
//! values and handed to the [`TransferClient`](crate::download::TransferClient)
//! behind an `Arc`. Nothing mutates it after construction.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::download::constants::{DEFAULT_REQUEST_DELAY, DEFAULT_TIMEOUT};

/// Desktop browser User-Agent sent with every request.
///
/// Some data portals reject requests whose User-Agent does not look like a
/// browser, so the default header set imitates one.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Errors raised while turning a session into an HTTP client.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A configured header name is not a valid HTTP token.
    #[error("invalid header name: {name}")]
    InvalidHeaderName {
        /// The rejected header name.
        name: String,
    },

    /// A configured header or cookie value contains bytes HTTP does not allow.
    #[error("invalid value for header {name}")]
    InvalidHeaderValue {
        /// Header the value was meant for.
        name: String,
    },

    /// A proxy address could not be parsed.
    #[error("invalid proxy address {address}: {source}")]
    InvalidProxy {
        /// The rejected proxy address.
        address: String,
        /// The underlying parse error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client builder rejected the configuration.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Explicit proxy addresses per URL scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy used for `http://` URLs.
    pub http: Option<String>,
    /// Proxy used for `https://` URLs.
    pub https: Option<String>,
}

impl ProxyConfig {
    /// Returns true when no proxy address is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }
}

/// Cookies, headers, proxy and transfer limits used for every request.
#[derive(Debug, Clone)]
pub struct TransferSession {
    /// Cookie name to value; sent as a single `Cookie` header.
    pub cookies: BTreeMap<String, String>,
    /// Header name to value; layered over [`default_browser_headers`].
    pub headers: BTreeMap<String, String>,
    /// Explicit proxies, if any.
    pub proxy: Option<ProxyConfig>,
    /// Whether ambient `HTTP(S)_PROXY` environment settings are honored.
    pub trust_env: bool,
    /// Upper bound for connecting and for each read of the response body.
    pub timeout: Duration,
    /// Pause taken by a worker before each request it issues.
    pub request_delay: Duration,
}

impl Default for TransferSession {
    fn default() -> Self {
        Self {
            cookies: BTreeMap::new(),
            headers: default_browser_headers(),
            proxy: None,
            trust_env: false,
            timeout: DEFAULT_TIMEOUT,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }
}

impl TransferSession {
    /// Renders the cookie map as a `Cookie` header value (`a=1; b=2`).
    ///
    /// Returns `None` when no cookies are configured.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Sets `Referer` to the origin of `link` unless one is already configured.
    ///
    /// Returns true when a header was added.
    pub fn default_referer_from(&mut self, link: &str) -> bool {
        if self
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("referer"))
        {
            return false;
        }
        let Ok(url) = Url::parse(link) else {
            return false;
        };
        let origin = url.origin();
        if !origin.is_tuple() {
            return false;
        }
        self.headers
            .insert("Referer".to_string(), format!("{}/", origin.ascii_serialization()));
        true
    }

    /// Builds the header map attached to every request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if a header name or value is not valid HTTP.
    pub fn header_map(&self) -> Result<HeaderMap, SessionError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SessionError::InvalidHeaderName { name: name.clone() })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| SessionError::InvalidHeaderValue {
                    name: name.clone(),
                })?;
            map.insert(header_name, header_value);
        }
        if let Some(cookies) = self.cookie_header() {
            let mut value =
                HeaderValue::from_str(&cookies).map_err(|_| SessionError::InvalidHeaderValue {
                    name: COOKIE.to_string(),
                })?;
            value.set_sensitive(true);
            map.insert(COOKIE, value);
        }
        Ok(map)
    }
}

/// Browser-like request headers used unless the configuration overrides them.
///
/// `Accept-Encoding` is absent: the HTTP client advertises only
/// the transport encodings it can decode.
#[must_use]
pub fn default_browser_headers() -> BTreeMap<String, String> {
    [
        ("User-Agent", BROWSER_USER_AGENT),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}
