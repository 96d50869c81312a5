// Bibliographic metadata lookup by free-text article title.
//
// API: https://api.crossref.org/works?query=<title>&rows=1
// The first returned work is taken as the match.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;

const CR_SEARCH_URL: &str = "https://api.crossref.org/works";

/// Journal, ISSN and year of an article. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArticleMetadata {
    pub journal: Option<String>,
    pub issn: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("metadata service returned status {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// `Ok(None)` when the service knows no work matching `title`.
    async fn lookup(&self, title: &str) -> Result<Option<ArticleMetadata>, MetadataError>;
}

#[derive(Debug, Deserialize)]
struct CrossRefResponse {
    message: CrossRefMessage,
}

#[derive(Debug, Deserialize)]
struct CrossRefMessage {
    #[serde(default)]
    items: Vec<CrossRefWork>,
}

#[derive(Debug, Deserialize)]
struct CrossRefWork {
    #[serde(default, rename = "container-title")]
    container_title: Vec<String>,
    #[serde(default, rename = "ISSN")]
    issn: Vec<String>,
    published: Option<CrossRefDate>,
    issued: Option<CrossRefDate>,
}

#[derive(Debug, Deserialize)]
struct CrossRefDate {
    #[serde(default, rename = "date-parts")]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CrossRefDate {
    fn year(&self) -> Option<i32> {
        self.date_parts.first()?.first().copied().flatten()
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl CrossRefWork {
    fn into_metadata(self) -> ArticleMetadata {
        let year = self
            .published
            .as_ref()
            .and_then(CrossRefDate::year)
            .or_else(|| self.issued.as_ref().and_then(CrossRefDate::year));

        ArticleMetadata {
            journal: self.container_title.first().and_then(|j| non_blank(j)),
            issn: self.issn.first().and_then(|i| non_blank(i)),
            year,
        }
    }
}

fn metadata_from_response(response: CrossRefResponse) -> Option<ArticleMetadata> {
    response
        .message
        .items
        .into_iter()
        .next()
        .map(CrossRefWork::into_metadata)
}

pub struct CrossRefClient {
    client: Client,
}

impl CrossRefClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        // CrossRef routes requests carrying a mailto into its polite pool
        let user_agent = match &config.mailto {
            Some(mailto) => format!("quartile_finder/{} (mailto:{})", env!("CARGO_PKG_VERSION"), mailto),
            None => format!("quartile_finder/{}", env!("CARGO_PKG_VERSION")),
        };

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataSource for CrossRefClient {
    #[instrument(skip(self))]
    async fn lookup(&self, title: &str) -> Result<Option<ArticleMetadata>, MetadataError> {
        let response = self
            .client
            .get(CR_SEARCH_URL)
            .query(&[("query", title.trim()), ("rows", "1")])
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MetadataError::Status(response.status()));
        }

        let data: CrossRefResponse = response.json().await?;
        let metadata = metadata_from_response(data);
        debug!(found = metadata.is_some(), "CrossRef lookup finished");
        Ok(metadata)
    }
}
