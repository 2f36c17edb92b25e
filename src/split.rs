//! Page classification and section split accuracy. Works on section
//! metadata only and never consults attribute schemas.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{SectionInput, SplitMetrics};
use crate::util::ratio;

pub const UNKNOWN_CLASS: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSplit {
    pub document_class: String,
    pub page_indices: Vec<u32>,
}

impl SectionSplit {
    pub fn new(document_class: impl Into<String>, page_indices: Vec<u32>) -> Self {
        Self {
            document_class: document_class.into(),
            page_indices,
        }
    }

    fn page_set(&self) -> BTreeSet<u32> {
        self.page_indices.iter().copied().collect()
    }
}

impl From<&SectionInput> for SectionSplit {
    fn from(section: &SectionInput) -> Self {
        Self::new(section.document_class.clone(), section.page_indices.clone())
    }
}

/// Class per page index. A page listed by two sections keeps the first.
fn page_classes(sections: &[SectionSplit]) -> BTreeMap<u32, &str> {
    let mut pages = BTreeMap::<u32, &str>::new();
    for section in sections {
        for page in &section.page_indices {
            pages.entry(*page).or_insert(section.document_class.as_str());
        }
    }
    pages
}

pub fn split_metrics(expected: &[SectionSplit], actual: &[SectionSplit]) -> SplitMetrics {
    let expected_pages = page_classes(expected);
    let actual_pages = page_classes(actual);

    let all_pages = expected_pages
        .keys()
        .chain(actual_pages.keys())
        .copied()
        .collect::<BTreeSet<u32>>();
    let correctly_classified_pages = all_pages
        .iter()
        .filter(|page| {
            let expected_class = expected_pages.get(*page).copied().unwrap_or(UNKNOWN_CLASS);
            let actual_class = actual_pages.get(*page).copied().unwrap_or(UNKNOWN_CLASS);
            expected_class == actual_class
        })
        .count();

    let correctly_split_without_order = expected
        .iter()
        .filter(|section| {
            let pages = section.page_set();
            actual.iter().any(|candidate| {
                candidate.document_class == section.document_class && candidate.page_set() == pages
            })
        })
        .count();
    let correctly_split_with_order = expected
        .iter()
        .filter(|section| {
            actual.iter().any(|candidate| {
                candidate.document_class == section.document_class
                    && candidate.page_indices == section.page_indices
            })
        })
        .count();

    let total_pages = all_pages.len();
    let total_splits = expected.len();
    SplitMetrics {
        page_level_accuracy: ratio(correctly_classified_pages as f64, total_pages as f64),
        split_accuracy_without_order: ratio(
            correctly_split_without_order as f64,
            total_splits as f64,
        ),
        split_accuracy_with_order: ratio(correctly_split_with_order as f64, total_splits as f64),
        total_pages,
        total_splits,
        correctly_classified_pages,
        correctly_split_without_order,
        correctly_split_with_order,
    }
}

#[cfg(test)]
mod tests {
    use super::{SectionSplit, split_metrics};
    use crate::model::SplitMetrics;

    #[test]
    fn reordered_pages_split_correctly_only_without_order() {
        let expected = vec![SectionSplit::new("A", vec![0, 1, 2])];
        let actual = vec![SectionSplit::new("A", vec![2, 0, 1])];
        let metrics = split_metrics(&expected, &actual);

        assert_eq!(metrics.split_accuracy_without_order, 1.0);
        assert_eq!(metrics.split_accuracy_with_order, 0.0);
        assert_eq!(metrics.page_level_accuracy, 1.0);
        assert_eq!(metrics.total_pages, 3);
        assert_eq!(metrics.total_splits, 1);
    }

    #[test]
    fn missing_pages_count_as_unknown() {
        let expected = vec![
            SectionSplit::new("Invoice", vec![0, 1]),
            SectionSplit::new("Receipt", vec![2]),
        ];
        let actual = vec![
            SectionSplit::new("Invoice", vec![0]),
            SectionSplit::new("Receipt", vec![1, 2]),
            SectionSplit::new("Receipt", vec![7]),
        ];
        let metrics = split_metrics(&expected, &actual);

        assert_eq!(metrics.total_pages, 4);
        assert_eq!(metrics.correctly_classified_pages, 2);
        assert_eq!(metrics.page_level_accuracy, 0.5);
        assert_eq!(metrics.correctly_split_without_order, 0);
        assert_eq!(metrics.total_splits, 2);
    }

    #[test]
    fn class_must_match_for_a_correct_split() {
        let expected = vec![SectionSplit::new("Invoice", vec![4, 9])];
        let actual = vec![SectionSplit::new("Receipt", vec![4, 9])];
        let metrics = split_metrics(&expected, &actual);
        assert_eq!(metrics.correctly_split_with_order, 0);
        assert_eq!(metrics.page_level_accuracy, 0.0);

        let recased = vec![SectionSplit::new("invoice", vec![4, 9])];
        let metrics = split_metrics(&expected, &recased);
        assert_eq!(metrics.correctly_split_without_order, 0);
        assert_eq!(metrics.correctly_classified_pages, 0);
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(split_metrics(&[], &[]), SplitMetrics::default());
    }
}
