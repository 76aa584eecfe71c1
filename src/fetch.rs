//! Raw document retrieval for `file://` and `http(s)://` links

use std::collections::BTreeMap;
use std::fs;

use tracing::debug;

use crate::config::Settings;
use crate::error::FetchError;
use crate::plan::FILE_PROTOCOL;

/// Content types accepted from remote servers.
pub const SUPPORTED_MIME_TYPES: [&str; 2] = ["text/html", "application/xhtml+xml"];

const USER_AGENT: &str = "User-Agent";

/// Retrieves the raw bytes behind a link.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, link: &str, headers: &BTreeMap<String, String>) -> Result<Vec<u8>, FetchError>;
}

/// True when a `Content-Type` value names an accepted MIME type,
/// parameters such as `charset` included.
pub fn is_supported_content(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    SUPPORTED_MIME_TYPES
        .iter()
        .any(|mime| content_type.contains(mime))
}

/// Reads local files directly and HTTP links through a shared `ureq` agent.
#[derive(Debug, Clone)]
pub struct LinkFetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl LinkFetcher {
    pub fn new(settings: &Settings) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .timeout_global(Some(settings.timeout))
                .http_status_as_error(false)
                .build(),
        );
        Self {
            agent,
            user_agent: settings.user_agent.clone(),
        }
    }

    fn fetch_file(&self, link: &str) -> Result<Vec<u8>, FetchError> {
        let path = link.strip_prefix(FILE_PROTOCOL).unwrap_or(link);
        fs::read(path).map_err(|source| FetchError::File {
            path: path.to_string(),
            source,
        })
    }

    fn fetch_http(
        &self,
        link: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, FetchError> {
        let mut request = self.agent.get(link);
        if !headers.keys().any(|name| name.eq_ignore_ascii_case(USER_AGENT)) {
            request = request.header(USER_AGENT, self.user_agent.as_str());
        }
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.call().map_err(|e| FetchError::Transport {
            link: link.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .ok_or(FetchError::MissingContentType)?
            .to_string();
        if !is_supported_content(&content_type) {
            return Err(FetchError::UnsupportedContent(content_type));
        }
        debug!("Got {} from {}", content_type, link);

        response
            .into_body()
            .read_to_vec()
            .map_err(|e| FetchError::Transport {
                link: link.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Default for LinkFetcher {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl Fetcher for LinkFetcher {
    fn fetch(&self, link: &str, headers: &BTreeMap<String, String>) -> Result<Vec<u8>, FetchError> {
        if link.starts_with(FILE_PROTOCOL) {
            self.fetch_file(link)
        } else {
            self.fetch_http(link, headers)
        }
    }
}
