// Content acquisition.
//
// A thin wrapper around reqwest: configurable user agent, timeout, retry
// budget, redirect policy, optional cookie jar and proxy. Responses come
// back raw; decompression and charset conversion live in `decode`, so the
// decoder chain stays inspectable and fallible.

pub(crate) mod decode;

use std::time::Duration;

use reqwest::redirect;

pub use decode::{decode, decode_body, detect_charset};

use crate::error::FetchError;

/// Statuses worth retrying: timeout-ish and transient server conditions.
const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

const DEFAULT_USER_AGENT: &str =
    concat!("webmark/", env!("CARGO_PKG_VERSION"), " (+https://github.com/webmark-rs/webmark)");

/// Proxy configuration with optional basic auth.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub user_agent: String,
    /// Advertise compression support via Accept-Encoding.
    pub compression: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry budget for GET requests hitting retryable statuses.
    pub retries: u32,
    /// Maximum redirects before the request fails.
    pub redirect_limit: usize,
    /// Keep cookies between redirects within one fetch.
    pub cookies: bool,
    pub proxy: Option<ProxyConfig>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            compression: true,
            timeout: Duration::from_secs(30),
            retries: 3,
            redirect_limit: 10,
            cookies: false,
            proxy: None,
        }
    }
}

impl HttpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_redirect_limit(mut self, limit: usize) -> Self {
        self.redirect_limit = limit;
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_cookies(mut self, cookies: bool) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }
}

/// A fetched response, still encoded as it came off the wire.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
}

impl FetchedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Build the underlying client from the options.
pub(crate) fn build_client(options: &HttpOptions) -> Result<reqwest::Client, FetchError> {
    let redirect_limit = options.redirect_limit;
    let mut builder = reqwest::Client::builder()
        .user_agent(options.user_agent.clone())
        .timeout(options.timeout)
        .redirect(redirect::Policy::limited(redirect_limit))
        .cookie_store(options.cookies);

    if let Some(proxy) = &options.proxy {
        let mut proxy_config = reqwest::Proxy::all(&proxy.url)
            .map_err(|e| FetchError::InvalidUrl(proxy.url.clone(), e.to_string()))?;
        if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
            proxy_config = proxy_config.basic_auth(user, pass);
        }
        builder = builder.proxy(proxy_config);
    }

    builder
        .build()
        .map_err(|e| FetchError::Transport(e.to_string()))
}

/// Fetch a URL with the configured retry budget. Only GET requests are
/// issued, so retrying is always safe.
pub async fn fetch(url: &str, options: &HttpOptions) -> Result<FetchedResponse, FetchError> {
    let parsed =
        url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(url.to_string(), e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(
            url.to_string(),
            format!("unsupported scheme `{}`", parsed.scheme()),
        ));
    }

    let client = build_client(options)?;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match fetch_once(&client, &parsed, options).await {
            Ok(response) => {
                if RETRYABLE_STATUSES.contains(&response.status_code)
                    && attempt <= options.retries
                {
                    let backoff = Duration::from_millis(250 * 2u64.pow(attempt - 1));
                    tracing::warn!(
                        status = response.status_code,
                        attempt,
                        ?backoff,
                        "retryable status, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                if response.status_code >= 500 {
                    return Err(FetchError::HttpServer(
                        response.status_code,
                        url.to_string(),
                    ));
                }
                if response.status_code >= 400 {
                    return Err(FetchError::HttpClient(
                        response.status_code,
                        url.to_string(),
                    ));
                }
                return Ok(response);
            }
            Err(error) => {
                let retryable = matches!(error, FetchError::Timeout(_));
                if retryable && attempt <= options.retries {
                    tracing::warn!(%error, attempt, "transport failure, retrying");
                    continue;
                }
                return Err(error);
            }
        }
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    url: &url::Url,
    options: &HttpOptions,
) -> Result<FetchedResponse, FetchError> {
    let mut request = client.get(url.clone());
    if options.compression {
        request = request.header("accept-encoding", "gzip, deflate, br, zstd");
    }

    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(e, url, options))?;

    let status_code = response.status().as_u16();
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let content_type = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.clone());
    let content_encoding = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-encoding"))
        .map(|(_, v)| v.clone());

    let body = response
        .bytes()
        .await
        .map_err(|e| map_transport_error(e, url, options))?
        .to_vec();

    Ok(FetchedResponse {
        status_code,
        headers,
        body,
        content_type,
        content_encoding,
    })
}

/// Map reqwest's error surface onto the fetch error taxonomy.
fn map_transport_error(error: reqwest::Error, url: &url::Url, options: &HttpOptions) -> FetchError {
    if error.is_timeout() {
        return FetchError::Timeout(options.timeout);
    }
    if error.is_redirect() {
        return FetchError::RedirectLoop(options.redirect_limit);
    }
    if error.is_connect() {
        let host = url.host_str().unwrap_or_default().to_string();
        let message = full_error_chain(&error);
        // reqwest folds DNS and connection failures into one connect error;
        // the cause chain text tells them apart.
        if message.contains("dns") || message.contains("resolve") {
            return FetchError::Dns(host);
        }
        return FetchError::Refused(host);
    }
    FetchError::Transport(error.to_string())
}

fn full_error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message.to_ascii_lowercase()
}
