// Typed ranking records and the normalization pass over scraped table cells.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Quartile {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl FromStr for Quartile {
    type Err = ();

    // Exact, case-sensitive match only. "q1" or "Q 1" are scraped noise.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Q1" => Ok(Quartile::Q1),
            "Q2" => Ok(Quartile::Q2),
            "Q3" => Ok(Quartile::Q3),
            "Q4" => Ok(Quartile::Q4),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Quartile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Quartile::Q1 => "Q1",
            Quartile::Q2 => "Q2",
            Quartile::Q3 => "Q3",
            Quartile::Q4 => "Q4",
        };
        f.write_str(label)
    }
}

/// One (category, year, quartile) entry of a journal's ranking history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingRecord {
    pub category: String,
    pub year: i32,
    pub quartile: Quartile,
}

impl RankingRecord {
    pub fn new(category: impl Into<String>, year: i32, quartile: Quartile) -> Self {
        Self {
            category: category.into(),
            year,
            quartile,
        }
    }
}

/// Cell text exactly as it came out of the ranking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTriple {
    pub category: String,
    pub year: String,
    pub quartile: String,
}

impl RawTriple {
    pub fn new(category: impl Into<String>, year: impl Into<String>, quartile: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            year: year.into(),
            quartile: quartile.into(),
        }
    }
}

fn parse_year(text: &str) -> Option<i32> {
    let text = text.trim();
    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_triple(raw: &RawTriple) -> Option<RankingRecord> {
    let category = raw.category.trim();
    if category.is_empty() {
        return None;
    }
    let year = parse_year(&raw.year)?;
    let quartile = raw.quartile.trim().parse::<Quartile>().ok()?;
    Some(RankingRecord::new(category, year, quartile))
}

/// Keeps every triple with a 4-digit year and a Q1..Q4 quartile, in input order.
///
/// Header rows and malformed cells are dropped without complaint. Duplicate
/// (category, year) pairs are kept; resolution handles them by input order.
pub fn normalize<'a, I>(raw: I) -> Vec<RankingRecord>
where
    I: IntoIterator<Item = &'a RawTriple>,
{
    raw.into_iter().filter_map(parse_triple).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_valid_rows_in_order() {
        let raw = vec![
            RawTriple::new("Category", "Year", "Quartile"),
            RawTriple::new("  Medicine  ", "2020", "Q1"),
            RawTriple::new("Biology", " 2021 ", "Q3"),
            RawTriple::new("Medicine", "2020", "Q2"),
        ];
        let records = normalize(&raw);
        assert_eq!(
            records,
            vec![
                RankingRecord::new("Medicine", 2020, Quartile::Q1),
                RankingRecord::new("Biology", 2021, Quartile::Q3),
                RankingRecord::new("Medicine", 2020, Quartile::Q2),
            ]
        );
    }

    #[test]
    fn drops_invalid_quartile_and_year() {
        let raw = vec![
            RawTriple::new("Medicine", "2020", "Q5"),
            RawTriple::new("Medicine", "abcd", "Q1"),
            RawTriple::new("Medicine", "20200", "Q1"),
            RawTriple::new("Medicine", "999", "Q1"),
            RawTriple::new("Medicine", "2020", "q1"),
            RawTriple::new("", "2020", "Q1"),
        ];
        assert!(normalize(&raw).is_empty());
    }

    #[test]
    fn categories_are_case_sensitive() {
        let raw = vec![
            RawTriple::new("Medicine", "2020", "Q1"),
            RawTriple::new("medicine", "2020", "Q2"),
        ];
        let records = normalize(&raw);
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].category, records[1].category);
    }

    #[test]
    fn quartile_display_matches_parse() {
        for q in [Quartile::Q1, Quartile::Q2, Quartile::Q3, Quartile::Q4] {
            assert_eq!(q.to_string().parse::<Quartile>(), Ok(q));
        }
    }

    #[test]
    fn normalized_output_only_holds_valid_values() {
        proptest::proptest!(|(
            category in "[ A-Za-z()]{0,12}",
            year in "[0-9a-z ]{0,6}",
            quartile in "[Qq0-9 ]{0,3}",
        )| {
            let raw = [RawTriple::new(category.clone(), year.clone(), quartile.clone())];
            let records = normalize(&raw);
            proptest::prop_assert!(records.len() <= 1);
            if let Some(record) = records.first() {
                proptest::prop_assert_eq!(record.category.as_str(), category.trim());
                proptest::prop_assert_eq!(Some(record.year), year.trim().parse::<i32>().ok());
                proptest::prop_assert_eq!(record.quartile.to_string(), quartile.trim().to_string());
            }
        })
    }
}
