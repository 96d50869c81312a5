// Single-title lookup: metadata, then ranking history, then year resolution.
//
// A failing collaborator never aborts the lookup. Its part of the result is
// left empty and RankingStatus records why.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::metadata::{ArticleMetadata, MetadataSource};
use crate::ranking::{RankingError, RankingSource};
use crate::record::{self, RankingRecord};
use crate::resolve::{self, CategorySpan, YearMatch};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("article title is blank")]
    BlankTitle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStatus {
    /// No ISSN, so the ranking site was never asked.
    Skipped,
    /// The ranking site could not be reached.
    Unreachable,
    /// The ranking site has no page for this ISSN.
    NotListed,
    /// A journal page was read, possibly with an empty table.
    Found,
}

/// Quartile history of one journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JournalRanking {
    pub records: Vec<RankingRecord>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub title: String,
    pub metadata: ArticleMetadata,
    pub status: RankingStatus,
    /// Highest-year record over all categories; `None` when there is no history.
    pub latest: Option<RankingRecord>,
    pub year_matches: Vec<YearMatch>,
    pub spans: Vec<CategorySpan>,
    pub ranking: JournalRanking,
}

impl LookupResult {
    pub fn source_url(&self) -> Option<&str> {
        self.ranking.source_url.as_deref()
    }

    pub fn span(&self, category: &str) -> Option<&CategorySpan> {
        self.spans.iter().find(|s| s.category == category)
    }
}

/// Cheap to clone; clones share the underlying clients.
#[derive(Clone)]
pub struct Lookup {
    metadata: Arc<dyn MetadataSource>,
    ranking: Arc<dyn RankingSource>,
}

impl Lookup {
    pub fn new(metadata: Arc<dyn MetadataSource>, ranking: Arc<dyn RankingSource>) -> Self {
        Self { metadata, ranking }
    }

    async fn fetch_metadata(&self, title: &str) -> ArticleMetadata {
        match self.metadata.lookup(title).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                info!(title, "No bibliographic match");
                ArticleMetadata::default()
            }
            Err(e) => {
                warn!(title, error = %e, "Metadata lookup failed");
                ArticleMetadata::default()
            }
        }
    }

    async fn fetch_ranking(&self, issn: Option<&str>) -> (RankingStatus, JournalRanking) {
        let Some(issn) = issn else {
            return (RankingStatus::Skipped, JournalRanking::default());
        };

        match self.ranking.fetch_ranking(issn).await {
            Ok(scraped) => {
                let records = record::normalize(&scraped.triples);
                info!(issn, rows = scraped.triples.len(), records = records.len(), "Ranking history read");
                (
                    RankingStatus::Found,
                    JournalRanking {
                        records,
                        source_url: Some(scraped.source_url),
                    },
                )
            }
            Err(e) => {
                warn!(issn, error = %e, "Ranking fetch failed");
                let status = match e {
                    RankingError::Unreachable { .. } => RankingStatus::Unreachable,
                    RankingError::NotListed { .. } => RankingStatus::NotListed,
                };
                (
                    status,
                    JournalRanking {
                        records: Vec::new(),
                        source_url: Some(e.attempted_url().to_string()),
                    },
                )
            }
        }
    }

    pub async fn run(&self, title: &str) -> Result<LookupResult, LookupError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(LookupError::BlankTitle);
        }

        let metadata = self.fetch_metadata(title).await;
        let (status, ranking) = self.fetch_ranking(metadata.issn.as_deref()).await;

        let latest = resolve::resolve_latest(&ranking.records).cloned();
        let year_matches = resolve::resolve_for_year(&ranking.records, metadata.year);
        let spans = resolve::category_spans(&ranking.records);

        Ok(LookupResult {
            title: title.to_string(),
            metadata,
            status,
            latest,
            year_matches,
            spans,
            ranking,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metadata::MetadataError;
    use crate::ranking::ScrapedRanking;
    use crate::record::{Quartile, RawTriple};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory metadata service keyed by title. Titles containing "panic" panic.
    #[derive(Default)]
    pub(crate) struct FakeMetadata {
        pub works: HashMap<String, ArticleMetadata>,
        pub failing: bool,
    }

    #[async_trait]
    impl MetadataSource for FakeMetadata {
        async fn lookup(&self, title: &str) -> Result<Option<ArticleMetadata>, MetadataError> {
            if title.contains("panic") {
                panic!("fake metadata source blew up");
            }
            if self.failing {
                return Err(MetadataError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
            }
            Ok(self.works.get(title).cloned())
        }
    }

    pub(crate) enum FakePage {
        Table(Vec<RawTriple>),
        Unreachable,
        NotListed,
    }

    #[derive(Default)]
    pub(crate) struct FakeRanking {
        pub pages: HashMap<String, FakePage>,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl RankingSource for FakeRanking {
        async fn fetch_ranking(&self, issn: &str) -> Result<ScrapedRanking, RankingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let url = self.search_url(issn);
            match self.pages.get(issn) {
                Some(FakePage::Table(triples)) => Ok(ScrapedRanking {
                    source_url: format!("{}&tip=sid", url),
                    triples: triples.clone(),
                }),
                Some(FakePage::Unreachable) => Err(RankingError::Unreachable {
                    url,
                    reason: "timed out".into(),
                }),
                Some(FakePage::NotListed) | None => Err(RankingError::NotListed { url }),
            }
        }
    }

    pub(crate) fn work(journal: &str, issn: &str, year: i32) -> ArticleMetadata {
        ArticleMetadata {
            journal: Some(journal.into()),
            issn: Some(issn.into()),
            year: Some(year),
        }
    }

    pub(crate) fn table(rows: &[(&str, &str, &str)]) -> FakePage {
        FakePage::Table(rows.iter().map(|(c, y, q)| RawTriple::new(*c, *y, *q)).collect())
    }

    fn lookup(metadata: FakeMetadata, ranking: FakeRanking) -> (Lookup, Arc<FakeRanking>) {
        let ranking = Arc::new(ranking);
        (Lookup::new(Arc::new(metadata), ranking.clone()), ranking)
    }

    #[tokio::test]
    async fn resolves_example_paper() {
        let mut metadata = FakeMetadata::default();
        metadata.works.insert("Example Paper".into(), work("J", "1234-5678", 2021));
        let mut ranking = FakeRanking::default();
        ranking.pages.insert(
            "1234-5678".into(),
            table(&[
                ("Category", "Year", "Quartile"),
                ("Medicine", "2020", "Q1"),
                ("Medicine", "2021", "Q2"),
                ("Biology", "2021", "Q1"),
            ]),
        );
        let (lookup, _) = lookup(metadata, ranking);

        let result = lookup.run("  Example Paper ").await.expect("lookup");
        assert_eq!(result.title, "Example Paper");
        assert_eq!(result.metadata, work("J", "1234-5678", 2021));
        assert_eq!(result.status, RankingStatus::Found);
        assert_eq!(result.ranking.records.len(), 3);

        assert_eq!(result.year_matches.len(), 2);
        let medicine = &result.year_matches[0];
        assert_eq!((medicine.category.as_str(), medicine.quartile, medicine.matched_year), ("Medicine", Quartile::Q2, 2021));
        assert!(medicine.is_exact_year);
        let biology = &result.year_matches[1];
        assert_eq!((biology.category.as_str(), biology.quartile, biology.matched_year), ("Biology", Quartile::Q1, 2021));
        assert!(biology.is_exact_year);

        // two records share 2021; Medicine comes first in the table
        assert_eq!(result.latest, Some(RankingRecord::new("Medicine", 2021, Quartile::Q2)));
        assert_eq!(result.source_url(), Some("https://www.scimagojr.com/journalsearch.php?q=1234-5678&tip=sid"));
        assert_eq!(result.span("Medicine").map(|s| s.earliest.year), Some(2020));
    }

    #[tokio::test]
    async fn unreachable_ranking_keeps_metadata() {
        let mut metadata = FakeMetadata::default();
        metadata.works.insert("Paper".into(), work("J", "1234-5678", 2021));
        let mut ranking = FakeRanking::default();
        ranking.pages.insert("1234-5678".into(), FakePage::Unreachable);
        let (lookup, _) = lookup(metadata, ranking);

        let result = lookup.run("Paper").await.expect("lookup");
        assert_eq!(result.metadata, work("J", "1234-5678", 2021));
        assert_eq!(result.status, RankingStatus::Unreachable);
        assert!(result.year_matches.is_empty());
        assert!(result.latest.is_none());
        assert_eq!(result.source_url(), Some("https://www.scimagojr.com/journalsearch.php?q=1234-5678"));
    }

    #[tokio::test]
    async fn unlisted_journal_reports_search_url() {
        let mut metadata = FakeMetadata::default();
        metadata.works.insert("Paper".into(), work("J", "0000-0000", 2021));
        let mut ranking = FakeRanking::default();
        ranking.pages.insert("0000-0000".into(), FakePage::NotListed);
        let (lookup, _) = lookup(metadata, ranking);

        let result = lookup.run("Paper").await.expect("lookup");
        assert_eq!(result.status, RankingStatus::NotListed);
        assert!(result.ranking.records.is_empty());
        assert_eq!(result.source_url(), Some("https://www.scimagojr.com/journalsearch.php?q=0000-0000"));
    }

    #[tokio::test]
    async fn missing_issn_skips_ranking_fetch() {
        let mut metadata = FakeMetadata::default();
        metadata.works.insert(
            "Paper".into(),
            ArticleMetadata {
                journal: Some("J".into()),
                issn: None,
                year: Some(2020),
            },
        );
        let (lookup, ranking) = lookup(metadata, FakeRanking::default());

        let result = lookup.run("Paper").await.expect("lookup");
        assert_eq!(result.status, RankingStatus::Skipped);
        assert_eq!(result.ranking, JournalRanking::default());
        assert_eq!(ranking.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn metadata_failure_degrades_to_not_found() {
        let metadata = FakeMetadata {
            failing: true,
            ..Default::default()
        };
        let (lookup, ranking) = lookup(metadata, FakeRanking::default());

        let result = lookup.run("Paper").await.expect("lookup");
        assert_eq!(result.metadata, ArticleMetadata::default());
        assert_eq!(result.status, RankingStatus::Skipped);
        assert!(result.source_url().is_none());
        assert_eq!(ranking.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn found_page_with_empty_table_is_not_an_error() {
        let mut metadata = FakeMetadata::default();
        metadata.works.insert("Paper".into(), work("J", "1111-2222", 2019));
        let mut ranking = FakeRanking::default();
        ranking.pages.insert("1111-2222".into(), table(&[("Medicine", "2019", "Q9")]));
        let (lookup, _) = lookup(metadata, ranking);

        let result = lookup.run("Paper").await.expect("lookup");
        assert_eq!(result.status, RankingStatus::Found);
        assert!(result.ranking.records.is_empty());
        assert!(result.latest.is_none());
        assert!(result.source_url().is_some());
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let (lookup, _) = lookup(FakeMetadata::default(), FakeRanking::default());
        assert_eq!(lookup.run("   ").await.unwrap_err(), LookupError::BlankTitle);
    }
}
