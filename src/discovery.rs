use crate::cancel::CancellationToken;
use crate::query::Query;
use crate::DiscoveryError;
use scraper::{ElementRef, Html, Selector};
use std::io::Read;
use url::Url;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.bing.com/images/search";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const ACCEPT_HEADER: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE_HEADER: &str = "en-US,en;q=0.5";

// The provider marks each result with an anchor carrying a JSON metadata
// attribute whose `murl` field is the original image URL.
const RESULT_MARKER_SELECTOR: &str = "a.iusc";
const RESULT_METADATA_ATTR: &str = "m";
const RESULT_IMAGE_URL_FIELD: &str = "murl";

/// One GET against the provider's image-search endpoint, returning the raw
/// results markup. Observes the token before touching the network.
pub fn fetch_search_page(
    agent: &ureq::Agent,
    endpoint: &str,
    query: &Query,
    token: &CancellationToken,
) -> std::result::Result<String, DiscoveryError> {
    if token.is_canceled() {
        return Err(DiscoveryError::Canceled);
    }
    let url = search_url(endpoint, query)?;

    let mut response = agent
        .get(url.as_str())
        .header("Accept", ACCEPT_HEADER)
        .header("Accept-Language", ACCEPT_LANGUAGE_HEADER)
        .call()
        .map_err(fetch_error_to_discovery)?;

    let status = response.status().as_u16();
    if status != 200 {
        return Err(DiscoveryError::Status(status));
    }

    let mut body = Vec::new();
    response
        .body_mut()
        .as_reader()
        .read_to_end(&mut body)
        .map_err(io_error_to_discovery)?;

    Ok(String::from_utf8_lossy(&body).into_owned())
}

pub fn search_url(endpoint: &str, query: &Query) -> std::result::Result<Url, DiscoveryError> {
    Url::parse_with_params(
        endpoint,
        &[("q", query.raw()), ("form", "HDRSC2"), ("first", "1")],
    )
    .map_err(|err| DiscoveryError::Transport(format!("invalid search endpoint: {err}")))
}

/// Every `murl` from a well-formed result marker, in document order. A
/// marker whose metadata attribute is missing, unparsable, or lacking an
/// HTTP(S) `murl` is skipped on its own; the scan never aborts. Checks the
/// token between markers and returns the URLs accumulated so far when it
/// fires (a partial list, not an error).
pub fn extract_image_urls(html: &str, token: &CancellationToken) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(RESULT_MARKER_SELECTOR).expect("result marker selector");

    let mut urls = Vec::new();
    for marker in document.select(&selector) {
        if token.is_canceled() {
            break;
        }
        if let Some(url) = candidate_from_marker(&marker) {
            urls.push(url);
        }
    }
    urls
}

fn candidate_from_marker(marker: &ElementRef<'_>) -> Option<String> {
    let raw = marker.value().attr(RESULT_METADATA_ATTR)?;
    let metadata: serde_json::Value = serde_json::from_str(raw).ok()?;
    let murl = metadata.get(RESULT_IMAGE_URL_FIELD)?.as_str()?;
    if murl.starts_with("http://") || murl.starts_with("https://") {
        Some(murl.to_string())
    } else {
        None
    }
}

pub(crate) fn fetch_error_to_discovery(err: ureq::Error) -> DiscoveryError {
    match err {
        ureq::Error::Timeout(_) => DiscoveryError::Timeout,
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            DiscoveryError::Timeout
        }
        other => DiscoveryError::Transport(other.to_string()),
    }
}

pub(crate) fn io_error_to_discovery(err: std::io::Error) -> DiscoveryError {
    if err.kind() == std::io::ErrorKind::TimedOut {
        DiscoveryError::Timeout
    } else {
        DiscoveryError::Transport(err.to_string())
    }
}

pub(crate) fn redact_url_for_log(value: &str) -> String {
    match Url::parse(value) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            let authority = parsed.host_str().unwrap_or("unknown-host");
            format!("{scheme}://{authority}/...")
        }
        Err(_) => "[invalid-url]".to_string(),
    }
}
