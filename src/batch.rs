// Batch mode: a spreadsheet of titles in, one row per (title, category) out.
//
// Input is a CSV file or an Excel workbook with a header row and the article
// title in the first column. Rows are looked up with bounded concurrency, but
// output keeps input order.

use calamine::Reader;
use futures::{future, stream, StreamExt};
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use crate::lookup::{Lookup, LookupResult};
use crate::record::RankingRecord;
use crate::resolve::YearMatch;

pub const NOT_FOUND: &str = "Not found";
pub const ERROR: &str = "Error";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("could not read input spreadsheet: {0}")]
    Read(#[source] csv::Error),

    #[error("could not write output spreadsheet: {0}")]
    Write(#[source] csv::Error),

    #[error("could not read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("workbook has no worksheet")]
    NoWorksheet,

    #[error("could not write workbook: {0}")]
    WorkbookWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Excel,
}

const EXCEL_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

impl SheetFormat {
    pub fn from_path(path: &Path) -> Self {
        let is_excel = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXCEL_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)));
        if is_excel {
            SheetFormat::Excel
        } else {
            SheetFormat::Csv
        }
    }

    /// Workbooks are zip (xlsx, ods) or OLE (xls) containers; anything else is read as CSV.
    pub fn sniff(bytes: &[u8]) -> Self {
        const ZIP: &[u8] = b"PK\x03\x04";
        const OLE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
        if bytes.starts_with(ZIP) || bytes.starts_with(OLE) {
            SheetFormat::Excel
        } else {
            SheetFormat::Csv
        }
    }

    /// Extension of files written in this format.
    pub fn extension(self) -> &'static str {
        match self {
            SheetFormat::Csv => "csv",
            SheetFormat::Excel => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            SheetFormat::Csv => "text/csv; charset=utf-8",
            SheetFormat::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    #[serde(rename = "Article Title")]
    pub title: String,
    #[serde(rename = "Journal")]
    pub journal: String,
    #[serde(rename = "ISSN")]
    pub issn: String,
    #[serde(rename = "Publication Year")]
    pub year: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Category First Year")]
    pub first_year: String,
    #[serde(rename = "Category Last Year")]
    pub last_year: String,
    #[serde(rename = "Category First Quartile")]
    pub first_quartile: String,
    #[serde(rename = "Category Last Quartile")]
    pub last_quartile: String,
    #[serde(rename = "Quartile At Publication Year")]
    pub quartile_at_year: String,
    #[serde(rename = "Latest Overall Quartile")]
    pub latest_overall: String,
    #[serde(rename = "Source URL")]
    pub source_url: String,
}

const HEADERS: [&str; 12] = [
    "Article Title",
    "Journal",
    "ISSN",
    "Publication Year",
    "Category",
    "Category First Year",
    "Category Last Year",
    "Category First Quartile",
    "Category Last Quartile",
    "Quartile At Publication Year",
    "Latest Overall Quartile",
    "Source URL",
];

fn or_not_found<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| NOT_FOUND.to_string(), |v| v.to_string())
}

fn year_quartile(record: &RankingRecord) -> String {
    format!("{} - {}", record.year, record.quartile)
}

/// "Q2" for an exact hit, otherwise the year it came from and why.
pub fn describe_match(m: &YearMatch, target: Option<i32>) -> String {
    if m.is_exact_year {
        m.quartile.to_string()
    } else if target.is_some() {
        format!("{} - {} (nearest)", m.matched_year, m.quartile)
    } else {
        format!("{} - {} (latest)", m.matched_year, m.quartile)
    }
}

impl OutputRow {
    /// Field values in HEADERS order.
    fn cells(&self) -> [&str; 12] {
        [
            &self.title,
            &self.journal,
            &self.issn,
            &self.year,
            &self.category,
            &self.first_year,
            &self.last_year,
            &self.first_quartile,
            &self.last_quartile,
            &self.quartile_at_year,
            &self.latest_overall,
            &self.source_url,
        ]
    }

    /// Row for a title whose lookup failed outright.
    pub fn error(title: &str) -> Self {
        let e = || ERROR.to_string();
        Self {
            title: title.to_string(),
            journal: e(),
            issn: e(),
            year: e(),
            category: e(),
            first_year: e(),
            last_year: e(),
            first_quartile: e(),
            last_quartile: e(),
            quartile_at_year: e(),
            latest_overall: e(),
            source_url: e(),
        }
    }

    /// One row per category, or a single row when the journal has no history.
    pub fn from_result(result: &LookupResult) -> Vec<Self> {
        let base = Self {
            title: result.title.clone(),
            journal: or_not_found(result.metadata.journal.as_deref()),
            issn: or_not_found(result.metadata.issn.as_deref()),
            year: or_not_found(result.metadata.year),
            category: NOT_FOUND.to_string(),
            first_year: NOT_FOUND.to_string(),
            last_year: NOT_FOUND.to_string(),
            first_quartile: NOT_FOUND.to_string(),
            last_quartile: NOT_FOUND.to_string(),
            quartile_at_year: NOT_FOUND.to_string(),
            latest_overall: or_not_found(result.latest.as_ref().map(year_quartile)),
            source_url: or_not_found(result.source_url()),
        };

        if result.year_matches.is_empty() {
            return vec![base];
        }

        result
            .year_matches
            .iter()
            .map(|m| {
                let span = result.span(&m.category);
                Self {
                    category: m.category.clone(),
                    first_year: or_not_found(span.map(|s| s.earliest.year)),
                    last_year: or_not_found(span.map(|s| s.latest.year)),
                    first_quartile: or_not_found(span.map(|s| s.earliest.quartile)),
                    last_quartile: or_not_found(span.map(|s| s.latest.quartile)),
                    quartile_at_year: describe_match(m, result.metadata.year),
                    ..base.clone()
                }
            })
            .collect()
    }
}

/// First-column values of every data row, header skipped.
pub fn read_titles<R: Read>(input: R) -> Result<Vec<String>, BatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut titles = Vec::new();
    for record in reader.records() {
        let record = record.map_err(BatchError::Read)?;
        titles.push(record.get(0).unwrap_or_default().trim().to_string());
    }
    Ok(titles)
}

/// First-column values of the first worksheet, header row skipped.
pub fn read_excel_titles(bytes: &[u8]) -> Result<Vec<String>, BatchError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook.worksheet_range_at(0).ok_or(BatchError::NoWorksheet)??;

    Ok(range
        .rows()
        .skip(1)
        .map(|row| row.first().map(|cell| cell.to_string()).unwrap_or_default().trim().to_string())
        .collect())
}

pub fn read_titles_from(format: SheetFormat, bytes: &[u8]) -> Result<Vec<String>, BatchError> {
    match format {
        SheetFormat::Csv => read_titles(bytes),
        SheetFormat::Excel => read_excel_titles(bytes),
    }
}

pub fn write_rows<W: Write>(output: W, rows: &[OutputRow]) -> Result<(), BatchError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(output);
    writer.write_record(HEADERS).map_err(BatchError::Write)?;
    for row in rows {
        writer.serialize(row).map_err(BatchError::Write)?;
    }
    writer.flush()?;
    Ok(())
}

/// A single "Results" worksheet with a bold header row.
pub fn excel_bytes(rows: &[OutputRow]) -> Result<Vec<u8>, BatchError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Results")?;
    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    for (i, row) in rows.iter().enumerate() {
        for (col, value) in row.cells().into_iter().enumerate() {
            sheet.write_string(i as u32 + 1, col as u16, value)?;
        }
    }
    sheet.set_column_width(0, 60)?;

    Ok(workbook.save_to_buffer()?)
}

pub fn encode_rows(format: SheetFormat, rows: &[OutputRow]) -> Result<Vec<u8>, BatchError> {
    match format {
        SheetFormat::Csv => {
            let mut out = Vec::new();
            write_rows(&mut out, rows)?;
            Ok(out)
        }
        SheetFormat::Excel => excel_bytes(rows),
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub rows: Vec<OutputRow>,
    /// Non-blank titles that were looked up.
    pub processed: usize,
    /// Non-blank titles in the input.
    pub total: usize,
}

impl BatchReport {
    pub fn cancelled(&self) -> bool {
        self.processed < self.total
    }
}

pub struct BatchDriver {
    lookup: Lookup,
    workers: usize,
}

impl BatchDriver {
    pub fn new(lookup: Lookup, workers: usize) -> Self {
        Self {
            lookup,
            workers: workers.max(1),
        }
    }

    async fn process(
        lookup: Lookup,
        abort: CancellationToken,
        index: usize,
        total: usize,
        title: String,
    ) -> Vec<OutputRow> {
        info!(row = index + 1, total, title = %title, "Processing title");

        // Spawned so that a panic inside one lookup only costs its own row. The
        // handle aborts the task when this future is dropped.
        let task = AbortOnDropHandle::new(tokio::spawn({
            let title = title.clone();
            async move { lookup.run(&title).await }
        }));

        let outcome = tokio::select! {
            outcome = task => outcome,
            _ = abort.cancelled() => {
                warn!(title = %title, "Lookup abandoned");
                return vec![OutputRow::error(&title)];
            }
        };

        match outcome {
            Ok(Ok(result)) => {
                let rows = OutputRow::from_result(&result);
                debug!(title = %title, rows = rows.len(), status = ?result.status, "Title done");
                rows
            }
            Ok(Err(e)) => {
                warn!(title = %title, error = %e, "Lookup rejected title");
                vec![OutputRow::error(&title)]
            }
            Err(e) => {
                error!(title = %title, error = %e, "Lookup task failed");
                vec![OutputRow::error(&title)]
            }
        }
    }

    /// Looks up every non-blank title. Once `cancel` fires no new title is
    /// started; titles already finished keep their rows.
    pub async fn run(&self, titles: Vec<String>, cancel: &CancellationToken) -> BatchReport {
        self.run_abortable(titles, cancel, &CancellationToken::new()).await
    }

    /// Like `run`, but firing `abort` also gives up on titles in flight. Their
    /// lookups are aborted and each gets an error row.
    pub async fn run_abortable(
        &self,
        titles: Vec<String>,
        cancel: &CancellationToken,
        abort: &CancellationToken,
    ) -> BatchReport {
        let titles: Vec<String> = titles
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let total = titles.len();

        let groups: Vec<Vec<OutputRow>> = stream::iter(titles.into_iter().enumerate())
            .take_while(|_| future::ready(!cancel.is_cancelled() && !abort.is_cancelled()))
            .map(|(index, title)| Self::process(self.lookup.clone(), abort.clone(), index, total, title))
            .buffered(self.workers)
            .collect()
            .await;

        let processed = groups.len();
        if processed < total {
            warn!(processed, total, "Batch cancelled");
        } else {
            info!(total, "Batch finished");
        }

        BatchReport {
            rows: groups.into_iter().flatten().collect(),
            processed,
            total,
        }
    }
}
