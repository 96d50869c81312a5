// HTML heuristics for the ranking site: where the journal link is on a search page and
// where the quartile table is on a journal page. Both are best-effort and site-dependent.

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::record::RawTriple;

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

// First <table> that follows a `heading` element whose text contains `needle`.
fn table_after_heading<'a>(document: &'a Html, heading: &str, needle: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(&format!("{}, table", heading)).ok()?;
    let mut heading_seen = false;

    for element in document.select(&selector) {
        if element.value().name() == "table" {
            if heading_seen {
                return Some(element);
            }
        } else if element_text(&element).contains(needle) {
            heading_seen = true;
        }
    }
    None
}

fn table_mentioning_quartiles(document: &Html) -> Option<ElementRef<'_>> {
    let tables = Selector::parse("table").ok()?;
    let cells = Selector::parse("th, td").ok()?;

    document.select(&tables).find(|table| {
        table.select(&cells).any(|cell| {
            let text = element_text(&cell);
            text.contains("Quartile") || text.contains("Category")
        })
    })
}

fn locate_quartile_table(document: &Html) -> Option<ElementRef<'_>> {
    table_after_heading(document, "h2", "Quartiles")
        .or_else(|| table_after_heading(document, "h3", "Quartile"))
        .or_else(|| table_mentioning_quartiles(document))
}

/// Raw (category, year, quartile) cells of the quartile table, header row skipped.
/// Returns nothing when no table can be located.
pub fn extract_triples(html: &str) -> Vec<RawTriple> {
    let document = Html::parse_document(html);
    let Some(table) = locate_quartile_table(&document) else {
        return Vec::new();
    };

    let (Ok(rows), Ok(cells)) = (Selector::parse("tr"), Selector::parse("td")) else {
        return Vec::new();
    };

    table
        .select(&rows)
        .skip(1)
        .filter_map(|row| {
            let texts: Vec<String> = row.select(&cells).map(|cell| element_text(&cell)).collect();
            match texts.as_slice() {
                [category, year, quartile, ..] => Some(RawTriple::new(category.as_str(), year.as_str(), quartile.as_str())),
                _ => None,
            }
        })
        .collect()
}

/// Link to the journal page on a search results page, resolved against `base`.
pub fn find_journal_link(html: &str, base: &Url) -> Option<Url> {
    let document = Html::parse_document(html);

    let mut href = None;
    if let Ok(selector) = Selector::parse("div.search_results a[href]") {
        href = document
            .select(&selector)
            .next()
            .and_then(|a| a.value().attr("href"));
    }

    if href.is_none() {
        if let Ok(selector) = Selector::parse("a[href]") {
            href = document
                .select(&selector)
                .filter_map(|a| a.value().attr("href"))
                .find(|h| h.contains("journalsearch.php?q=") && h.contains("tip=sid"));
        }
    }

    base.join(href?.trim()).ok()
}
