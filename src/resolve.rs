// Year resolution over a journal's ranking history.
//
// Every reduction here breaks ties by input order: when two records are equally
// good, the one that appeared first in the scraped table wins. Note that
// `Iterator::max_by_key` returns the *last* maximum, so the "latest" reductions
// use first_max_by_year instead.

use crate::record::{Quartile, RankingRecord};
use serde::Serialize;
use std::collections::HashMap;

/// The record chosen for one category relative to a target year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearMatch {
    pub category: String,
    pub matched_year: i32,
    pub quartile: Quartile,
    pub is_exact_year: bool,
    /// 0 for exact matches and, by convention, when no target year was given.
    pub year_distance: u32,
}

/// Earliest and latest known standing of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySpan {
    pub category: String,
    pub earliest: RankingRecord,
    pub latest: RankingRecord,
}

/// Groups records by category in order of first appearance. Each group keeps
/// its records in input order and is never empty.
fn group_by_category(records: &[RankingRecord]) -> Vec<(&str, Vec<&RankingRecord>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&RankingRecord>)> = Vec::new();

    for record in records {
        match index.get(record.category.as_str()) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(record.category.as_str(), groups.len());
                groups.push((record.category.as_str(), vec![record]));
            }
        }
    }
    groups
}

fn first_max_by_year<'a, I>(records: I) -> Option<&'a RankingRecord>
where
    I: IntoIterator<Item = &'a RankingRecord>,
{
    records
        .into_iter()
        .reduce(|best, r| if r.year > best.year { r } else { best })
}

fn first_min_by_year<'a, I>(records: I) -> Option<&'a RankingRecord>
where
    I: IntoIterator<Item = &'a RankingRecord>,
{
    // min_by_key already keeps the first of equal minima
    records.into_iter().min_by_key(|r| r.year)
}

/// The record with the highest year across all categories, or `None` for an
/// empty history.
pub fn resolve_latest(records: &[RankingRecord]) -> Option<&RankingRecord> {
    first_max_by_year(records)
}

fn match_category(category: &str, group: &[&RankingRecord], target: Option<i32>) -> Option<YearMatch> {
    let (chosen, is_exact_year, year_distance) = match target {
        Some(target) => {
            if let Some(exact) = group.iter().copied().find(|r| r.year == target) {
                (exact, true, 0)
            } else {
                let nearest = group
                    .iter()
                    .copied()
                    .min_by_key(|r| r.year.abs_diff(target))?;
                (nearest, false, nearest.year.abs_diff(target))
            }
        }
        None => (first_max_by_year(group.iter().copied())?, false, 0),
    };

    Some(YearMatch {
        category: category.to_string(),
        matched_year: chosen.year,
        quartile: chosen.quartile,
        is_exact_year,
        year_distance,
    })
}

/// One [`YearMatch`] per distinct category, in order of first appearance.
///
/// With a target year: the first record at that year, else the first record at
/// the smallest distance from it. Without one: the first record at the
/// category's maximum year.
pub fn resolve_for_year(records: &[RankingRecord], target: Option<i32>) -> Vec<YearMatch> {
    group_by_category(records)
        .into_iter()
        .filter_map(|(category, group)| match_category(category, &group, target))
        .collect()
}

/// Earliest and latest record per category, in order of first appearance.
pub fn category_spans(records: &[RankingRecord]) -> Vec<CategorySpan> {
    group_by_category(records)
        .into_iter()
        .filter_map(|(category, group)| {
            let earliest = first_min_by_year(group.iter().copied())?;
            let latest = first_max_by_year(group.iter().copied())?;
            Some(CategorySpan {
                category: category.to_string(),
                earliest: earliest.clone(),
                latest: latest.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::Strategy;

    fn rec(category: &str, year: i32, quartile: Quartile) -> RankingRecord {
        RankingRecord::new(category, year, quartile)
    }

    fn quartile() -> impl Strategy<Value = Quartile> {
        proptest::sample::select(vec![Quartile::Q1, Quartile::Q2, Quartile::Q3, Quartile::Q4])
    }

    fn history() -> impl Strategy<Value = Vec<RankingRecord>> {
        let category = proptest::sample::select(vec!["Medicine", "Biology", "Oncology", "medicine"]);
        proptest::collection::vec(
            (category, 2000i32..2025, quartile()).prop_map(|(c, y, q)| rec(c, y, q)),
            0..24,
        )
    }

    #[test]
    fn exact_year_wins_over_everything_else() {
        let records = vec![
            rec("X", 2019, Quartile::Q1),
            rec("X", 2020, Quartile::Q3),
            rec("X", 2021, Quartile::Q1),
        ];
        let matches = resolve_for_year(&records, Some(2020));
        assert_eq!(
            matches,
            vec![YearMatch {
                category: "X".into(),
                matched_year: 2020,
                quartile: Quartile::Q3,
                is_exact_year: true,
                year_distance: 0,
            }]
        );
    }

    #[test]
    fn duplicate_exact_years_pick_first() {
        let records = vec![
            rec("X", 2020, Quartile::Q4),
            rec("X", 2020, Quartile::Q1),
        ];
        let matches = resolve_for_year(&records, Some(2020));
        assert_eq!(matches[0].quartile, Quartile::Q4);
    }

    #[test]
    fn nearest_year_ties_go_to_input_order() {
        let wide = vec![rec("X", 2018, Quartile::Q2), rec("X", 2022, Quartile::Q1)];
        let m = &resolve_for_year(&wide, Some(2020))[0];
        assert_eq!((m.matched_year, m.quartile, m.is_exact_year, m.year_distance), (2018, Quartile::Q2, false, 2));

        let reversed = vec![rec("X", 2022, Quartile::Q1), rec("X", 2018, Quartile::Q2)];
        let m = &resolve_for_year(&reversed, Some(2020))[0];
        assert_eq!((m.matched_year, m.year_distance), (2022, 2));

        let narrow = vec![rec("X", 2021, Quartile::Q3), rec("X", 2019, Quartile::Q4)];
        let m = &resolve_for_year(&narrow, Some(2020))[0];
        assert_eq!((m.matched_year, m.quartile, m.year_distance), (2021, Quartile::Q3, 1));
    }

    #[test]
    fn nearest_year_prefers_smaller_distance() {
        let records = vec![
            rec("X", 2010, Quartile::Q4),
            rec("X", 2017, Quartile::Q2),
            rec("X", 2023, Quartile::Q1),
        ];
        let m = &resolve_for_year(&records, Some(2020))[0];
        assert_eq!((m.matched_year, m.quartile, m.year_distance), (2017, Quartile::Q2, 3));
    }

    #[test]
    fn latest_is_independent_of_per_category_latest() {
        let records = vec![
            rec("A", 2019, Quartile::Q2),
            rec("B", 2023, Quartile::Q1),
            rec("A", 2023, Quartile::Q3),
        ];

        let latest = resolve_latest(&records).expect("non-empty");
        assert_eq!((latest.category.as_str(), latest.year, latest.quartile), ("B", 2023, Quartile::Q1));

        let matches = resolve_for_year(&records, None);
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].category.as_str(), matches[0].matched_year, matches[0].quartile), ("A", 2023, Quartile::Q3));
        assert_eq!((matches[1].category.as_str(), matches[1].matched_year, matches[1].quartile), ("B", 2023, Quartile::Q1));
        assert!(matches.iter().all(|m| !m.is_exact_year && m.year_distance == 0));
    }

    #[test]
    fn empty_history() {
        assert!(resolve_for_year(&[], Some(2020)).is_empty());
        assert!(resolve_for_year(&[], None).is_empty());
        assert!(resolve_latest(&[]).is_none());
        assert!(category_spans(&[]).is_empty());
    }

    #[test]
    fn spans_track_first_seen_extremes() {
        let records = vec![
            rec("A", 2015, Quartile::Q3),
            rec("A", 2015, Quartile::Q1),
            rec("A", 2022, Quartile::Q2),
            rec("A", 2022, Quartile::Q4),
            rec("B", 2018, Quartile::Q1),
        ];
        let spans = category_spans(&records);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].earliest, rec("A", 2015, Quartile::Q3));
        assert_eq!(spans[0].latest, rec("A", 2022, Quartile::Q2));
        assert_eq!(spans[1].earliest, spans[1].latest);
    }

    #[test]
    fn one_match_per_category_in_first_appearance_order() {
        proptest::proptest!(|(records in history(), target in proptest::option::of(1995i32..2030))| {
            let matches = resolve_for_year(&records, target);
            let mut expected: Vec<&str> = Vec::new();
            for r in &records {
                if !expected.contains(&r.category.as_str()) {
                    expected.push(r.category.as_str());
                }
            }
            let got: Vec<&str> = matches.iter().map(|m| m.category.as_str()).collect();
            proptest::prop_assert_eq!(got, expected);
        })
    }

    #[test]
    fn matches_follow_exact_then_nearest_rule() {
        proptest::proptest!(|(records in history(), target in 1995i32..2030)| {
            for m in resolve_for_year(&records, Some(target)) {
                let group: Vec<&RankingRecord> = records.iter().filter(|r| r.category == m.category).collect();
                let best = group.iter().map(|r| r.year.abs_diff(target)).min().unwrap();
                let first_best = group.iter().find(|r| r.year.abs_diff(target) == best).unwrap();

                proptest::prop_assert_eq!(m.is_exact_year, best == 0);
                proptest::prop_assert_eq!(m.year_distance, best);
                proptest::prop_assert_eq!(m.matched_year, first_best.year);
                proptest::prop_assert_eq!(m.quartile, first_best.quartile);
            }
        })
    }

    #[test]
    fn latest_is_first_record_at_max_year() {
        proptest::proptest!(|(records in history())| {
            match resolve_latest(&records) {
                None => proptest::prop_assert!(records.is_empty()),
                Some(latest) => {
                    let max = records.iter().map(|r| r.year).max().unwrap();
                    let first = records.iter().find(|r| r.year == max).unwrap();
                    proptest::prop_assert!(std::ptr::eq(latest, first));
                }
            }
        })
    }

    #[test]
    fn untargeted_matches_are_per_category_latest() {
        proptest::proptest!(|(records in history())| {
            let spans = category_spans(&records);
            let matches = resolve_for_year(&records, None);
            proptest::prop_assert_eq!(spans.len(), matches.len());
            for (span, m) in spans.iter().zip(&matches) {
                proptest::prop_assert_eq!(&span.category, &m.category);
                proptest::prop_assert_eq!(span.latest.year, m.matched_year);
                proptest::prop_assert_eq!(span.latest.quartile, m.quartile);
                proptest::prop_assert!(span.earliest.year <= span.latest.year);
            }
        })
    }
}
