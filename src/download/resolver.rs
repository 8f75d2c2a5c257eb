//! Resource resolution: scheme fallback, header probe and filename selection.

use reqwest::Response;
use reqwest::header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, ETAG, HeaderName};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::HttpClient;
use super::error::DownloadError;
use super::filename::{select_filename, validate_filename};

/// What the probe learned about a remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Fully-qualified URL that answered the probe.
    pub url: String,
    /// Validated destination filename.
    pub name: String,
    /// Content length in bytes, 0 when unknown.
    pub size: u64,
    /// True when the server advertised `Accept-Ranges: bytes`.
    pub accepts_ranges: bool,
    /// ETag, if the server sent one.
    pub version_token: Option<String>,
}

/// Turns user input into a probed [`Resource`].
#[derive(Debug, Clone)]
pub struct Resolver {
    client: HttpClient,
}

impl Resolver {
    /// Creates a resolver sharing `client`'s connection pool.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Probes `raw` and describes the resource behind it.
    ///
    /// Input with an `http`/`https` scheme is probed as-is and probe errors are
    /// returned unchanged. Input without a scheme is tried as `https://` and
    /// then `http://`; if neither answers the result is `UnresolvableUrl`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::UnresolvableUrl`] for unsupported schemes, unparseable
    ///   input, or scheme-less input nobody answered
    /// - network or HTTP status errors from an explicit-scheme probe
    /// - [`DownloadError::InvalidFilename`] if the derived name is unsafe
    #[instrument(skip(self))]
    pub async fn resolve(&self, raw: &str) -> Result<Resource, DownloadError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DownloadError::unresolvable(raw));
        }

        let (url, response) = if raw.contains("://") {
            let url = parse_http_url(raw).ok_or_else(|| DownloadError::unresolvable(raw))?;
            let response = self.client.probe(url.as_str()).await?;
            (url, response)
        } else {
            self.probe_with_fallback(raw).await?
        };

        describe(url, &response)
    }

    async fn probe_with_fallback(&self, raw: &str) -> Result<(Url, Response), DownloadError> {
        for scheme in ["https", "http"] {
            let Some(url) = parse_http_url(&format!("{scheme}://{raw}")) else {
                continue;
            };
            match self.client.probe(url.as_str()).await {
                Ok(response) => {
                    debug!(url = %url, "scheme resolved");
                    return Ok((url, response));
                }
                Err(e) => debug!(url = %url, error = %e, "probe failed, trying next scheme"),
            }
        }
        Err(DownloadError::unresolvable(raw))
    }
}

fn parse_http_url(candidate: &str) -> Option<Url> {
    let url = Url::parse(candidate).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn describe(url: Url, response: &Response) -> Result<Resource, DownloadError> {
    let headers = response.headers();
    let header_str = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    let size = header_str(CONTENT_LENGTH)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let accepts_ranges =
        header_str(ACCEPT_RANGES).is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"));
    let version_token = header_str(ETAG).map(ToString::to_string);

    let name = select_filename(header_str(CONTENT_DISPOSITION), &url);
    if !validate_filename(&name) {
        return Err(DownloadError::invalid_filename(name));
    }

    if version_token.is_none() {
        warn!(url = %url, "server sent no ETag; a changed file cannot be detected on resume");
    }
    if !accepts_ranges {
        warn!(url = %url, "server does not support range requests; using a single segment");
    }
    info!(url = %url, name = %name, size, accepts_ranges, "resource resolved");

    Ok(Resource {
        url: url.to_string(),
        name,
        size,
        accepts_ranges,
        version_token,
    })
}
