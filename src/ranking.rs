// Journal quartile history from SCImago Journal Rank.
//
// A lookup searches the site by ISSN. If the search lands directly on a journal
// page its quartile table is read; otherwise the first journal link is followed
// once. Every page request goes through the shared Throttle and is tried with a
// browser-like client first, then with a plain fallback client.

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::record::{self, RawTriple};
use crate::scrape;
use crate::throttle::Throttle;

pub const SJR_BASE: &str = "https://www.scimagojr.com/";

/// Scraped quartile table of one journal, before normalization.
#[derive(Debug, Clone)]
pub struct ScrapedRanking {
    /// Journal page the table was read from.
    pub source_url: String,
    pub triples: Vec<RawTriple>,
}

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("ranking site unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("no journal page found at {url}")]
    NotListed { url: String },
}

impl RankingError {
    /// The last URL that was tried, kept for the user-facing report.
    pub fn attempted_url(&self) -> &str {
        match self {
            RankingError::Unreachable { url, .. } | RankingError::NotListed { url } => url,
        }
    }
}

#[async_trait]
pub trait RankingSource: Send + Sync {
    async fn fetch_ranking(&self, issn: &str) -> Result<ScrapedRanking, RankingError>;

    /// Where a search for `issn` starts; used when no fetch was attempted.
    fn search_url(&self, issn: &str) -> String {
        format!("{}journalsearch.php?q={}", SJR_BASE, normalize_issn(issn))
    }
}

static ISSN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})(\d{3}[\dX])$").unwrap());

/// Regroups an 8-character ISSN as NNNN-NNNN. Anything else is returned trimmed.
pub fn normalize_issn(issn: &str) -> String {
    let compact: String = issn
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    match ISSN_RE.captures(&compact) {
        Some(caps) => format!("{}-{}", &caps[1], &caps[2]),
        None => issn.trim().to_string(),
    }
}

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn browser_headers() -> anyhow::Result<reqwest::header::HeaderMap> {
    use reqwest::header::{HeaderMap, HeaderValue};

    let mut headers = HeaderMap::new();
    for (name, value) in [
        ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
        ("accept-language", "en-US,en;q=0.9"),
        ("dnt", "1"),
        ("upgrade-insecure-requests", "1"),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "none"),
        ("cache-control", "max-age=0"),
        ("referer", "https://www.google.com/search?q=scimago+journal+rank"),
    ] {
        headers.insert(name, HeaderValue::from_str(value)?);
    }
    Ok(headers)
}

pub struct ScimagoClient {
    client: Client,
    fallback: Client,
    throttle: Arc<Throttle>,
    base: Url,
}

impl ScimagoClient {
    pub fn new(config: &Config, throttle: Arc<Throttle>) -> anyhow::Result<Self> {
        Self::with_base(config, throttle, Url::parse(SJR_BASE)?)
    }

    /// Client for a mirror of the site rooted at `base` (which should end in `/`).
    pub fn with_base(config: &Config, throttle: Arc<Throttle>, base: Url) -> anyhow::Result<Self> {
        let user_agent = USER_AGENTS[fastrand::usize(..USER_AGENTS.len())];
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(browser_headers()?)
            .cookie_store(true)
            .timeout(timeout)
            .build()?;

        let fallback = Client::builder()
            .user_agent(FALLBACK_USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            fallback,
            throttle,
            base,
        })
    }

    async fn get_text(client: &Client, url: &str) -> Result<String, String> {
        let response = client.get(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        response.text().await.map_err(|e| e.to_string())
    }

    /// One throttled page fetch, retried once with the fallback client.
    async fn fetch_page(&self, url: &str) -> Result<String, RankingError> {
        self.throttle.wait().await;
        let first = match Self::get_text(&self.client, url).await {
            Ok(body) => return Ok(body),
            Err(reason) => reason,
        };

        warn!(url, reason = %first, "Ranking fetch failed, retrying with fallback client");
        self.throttle.wait().await;
        Self::get_text(&self.fallback, url)
            .await
            .map_err(|reason| RankingError::Unreachable {
                url: url.to_string(),
                reason: format!("{}; fallback: {}", first, reason),
            })
    }
}

#[async_trait]
impl RankingSource for ScimagoClient {
    fn search_url(&self, issn: &str) -> String {
        format!("{}journalsearch.php?q={}", self.base, normalize_issn(issn))
    }

    #[instrument(skip(self))]
    async fn fetch_ranking(&self, issn: &str) -> Result<ScrapedRanking, RankingError> {
        let search_url = self.search_url(issn);
        info!(url = %search_url, "Searching ranking site");
        let search_page = self.fetch_page(&search_url).await?;

        // Only a table with usable rows counts; search pages can carry unrelated tables.
        let triples = scrape::extract_triples(&search_page);
        if !record::normalize(&triples).is_empty() {
            debug!(rows = triples.len(), "Search landed on a journal page");
            return Ok(ScrapedRanking {
                source_url: search_url,
                triples,
            });
        }

        let Some(journal_url) = scrape::find_journal_link(&search_page, &self.base) else {
            return Err(RankingError::NotListed { url: search_url });
        };

        debug!(url = %journal_url, "Following journal link");
        let journal_page = self.fetch_page(journal_url.as_str()).await?;
        let triples = scrape::extract_triples(&journal_page);
        debug!(rows = triples.len(), "Quartile table rows read");

        Ok(ScrapedRanking {
            source_url: journal_url.to_string(),
            triples,
        })
    }
}
