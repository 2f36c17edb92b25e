use crate::compare::BothAbsentPolicy;
use crate::model::{AccuracyMetrics, ComparisonOutcome, ConfusionCounts, Presence};
use crate::util::ratio;

pub fn confusion_counts(leaves: &[ComparisonOutcome], policy: BothAbsentPolicy) -> ConfusionCounts {
    let mut counts = ConfusionCounts::default();
    for leaf in leaves.iter().filter(|leaf| policy.counts(leaf)) {
        match (leaf.matched, leaf.presence) {
            (_, Presence::Neither) => counts.true_negatives += 1,
            (true, _) => counts.true_positives += 1,
            (false, Presence::Both | Presence::ExpectedOnly) => counts.false_negatives += 1,
            (false, Presence::ActualOnly) => counts.false_positives += 1,
        }
    }
    counts
}

/// `Σ(score·weight) / Σ(weight)` over counted leaves; the plain mean when
/// every counted weight is zero. A set of only excluded leaves scores 1.0,
/// an empty set 0.0.
pub fn weighted_overall_score(leaves: &[ComparisonOutcome], policy: BothAbsentPolicy) -> f64 {
    let counted = leaves
        .iter()
        .filter(|leaf| policy.counts(leaf))
        .collect::<Vec<&ComparisonOutcome>>();
    if counted.is_empty() {
        return if leaves.is_empty() { 0.0 } else { 1.0 };
    }

    let weight_total = counted.iter().map(|leaf| leaf.weight).sum::<f64>();
    if weight_total > 0.0 {
        counted.iter().map(|leaf| leaf.weighted_score).sum::<f64>() / weight_total
    } else {
        counted.iter().map(|leaf| leaf.score).sum::<f64>() / counted.len() as f64
    }
}

pub fn section_metrics(leaves: &[ComparisonOutcome], policy: BothAbsentPolicy) -> AccuracyMetrics {
    let counts = confusion_counts(leaves, policy);
    let counted_fields = leaves.iter().filter(|leaf| policy.counts(leaf)).count();
    metrics_from_counts(counts, weighted_overall_score(leaves, policy), counted_fields)
}

fn metrics_from_counts(
    counts: ConfusionCounts,
    weighted_overall_score: f64,
    counted_fields: usize,
) -> AccuracyMetrics {
    let tp = counts.true_positives as f64;
    let fp = counts.false_positives as f64;
    let fn_ = counts.false_negatives as f64;
    let tn = counts.true_negatives as f64;

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    AccuracyMetrics {
        precision,
        recall,
        f1_score: ratio(2.0 * precision * recall, precision + recall),
        accuracy: ratio(tp + tn, counts.total() as f64),
        false_alarm_rate: ratio(fp, fp + tn),
        false_discovery_rate: ratio(fp, fp + tp),
        weighted_overall_score,
        counts,
        counted_fields,
    }
}

/// Size-weighted mean of section metrics, where a section's size is its
/// counted field count (at least one, so failed and empty sections still
/// pull the mean toward their zero or perfect scores). Counts are summed.
pub fn document_metrics(sections: &[AccuracyMetrics]) -> AccuracyMetrics {
    if sections.is_empty() {
        return AccuracyMetrics::default();
    }

    let mut counts = ConfusionCounts::default();
    let mut counted_fields = 0_usize;
    let mut total_size = 0.0_f64;
    let mut sums = [0.0_f64; 7];
    for section in sections {
        counts.add(&section.counts);
        counted_fields += section.counted_fields;
        let size = section.counted_fields.max(1) as f64;
        total_size += size;
        let values = [
            section.precision,
            section.recall,
            section.f1_score,
            section.accuracy,
            section.false_alarm_rate,
            section.false_discovery_rate,
            section.weighted_overall_score,
        ];
        for (sum, value) in sums.iter_mut().zip(values) {
            *sum += value * size;
        }
    }

    let [precision, recall, f1_score, accuracy, false_alarm_rate, false_discovery_rate, weighted] =
        sums.map(|sum| sum / total_size);
    AccuracyMetrics {
        precision,
        recall,
        f1_score,
        accuracy,
        false_alarm_rate,
        false_discovery_rate,
        weighted_overall_score: weighted,
        counts,
        counted_fields,
    }
}

#[cfg(test)]
mod tests {
    use super::{confusion_counts, document_metrics, section_metrics, weighted_overall_score};
    use crate::compare::BothAbsentPolicy;
    use crate::model::{AccuracyMetrics, ComparisonOutcome};
    use crate::schema::ComparisonMethod;
    use crate::value::FieldValue;
    use proptest::prelude::*;

    fn leaf(
        path: &str,
        expected: FieldValue,
        actual: FieldValue,
        score: f64,
        weight: f64,
    ) -> ComparisonOutcome {
        ComparisonOutcome::new(
            path,
            &expected,
            &actual,
            ComparisonMethod::Fuzzy,
            score,
            score >= 0.7,
            "fixture",
        )
        .with_weight(weight)
    }

    fn present(path: &str, score: f64, weight: f64) -> ComparisonOutcome {
        leaf(path, FieldValue::from("a"), FieldValue::from("b"), score, weight)
    }

    #[test]
    fn weighted_overall_score_uses_field_weights() {
        let leaves = vec![
            present("Vendor", 1.0, 2.0),
            present("Address", 0.8, 1.0),
            present("Memo", 0.6, 0.5),
        ];
        let score = weighted_overall_score(&leaves, BothAbsentPolicy::Exclude);
        assert!((score - 3.1 / 3.5).abs() < 1e-12, "score was {score}");
        assert!((score - 0.886).abs() < 1e-3);
    }

    #[test]
    fn confusion_counts_follow_presence() {
        let leaves = vec![
            present("Matched", 1.0, 1.0),
            present("Wrong", 0.1, 1.0),
            leaf("Missing", FieldValue::from("x"), FieldValue::Null, 0.0, 1.0),
            leaf("Extra", FieldValue::Null, FieldValue::from("x"), 0.0, 1.0),
            leaf("Blank", FieldValue::Null, FieldValue::Null, 1.0, 1.0),
        ];

        let excluded = section_metrics(&leaves, BothAbsentPolicy::Exclude);
        assert_eq!(excluded.counts.true_positives, 1);
        assert_eq!(excluded.counts.false_negatives, 2);
        assert_eq!(excluded.counts.false_positives, 1);
        assert_eq!(excluded.counts.true_negatives, 0);
        assert_eq!(excluded.counted_fields, 4);
        assert!((excluded.precision - 0.5).abs() < 1e-12);
        assert!((excluded.recall - 1.0 / 3.0).abs() < 1e-12);
        assert!((excluded.f1_score - 0.4).abs() < 1e-12);
        assert!((excluded.accuracy - 0.25).abs() < 1e-12);
        assert!((excluded.false_alarm_rate - 1.0).abs() < 1e-12);
        assert!((excluded.false_discovery_rate - 0.5).abs() < 1e-12);

        let counted = confusion_counts(&leaves, BothAbsentPolicy::TrueNegative);
        assert_eq!(counted.true_negatives, 1);
        let with_negatives = section_metrics(&leaves, BothAbsentPolicy::TrueNegative);
        assert!((with_negatives.accuracy - 0.4).abs() < 1e-12);
        assert!((with_negatives.false_alarm_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_and_all_absent_sets() {
        assert_eq!(weighted_overall_score(&[], BothAbsentPolicy::Exclude), 0.0);
        let blank = vec![leaf("Blank", FieldValue::Null, FieldValue::Null, 1.0, 1.0)];
        assert_eq!(weighted_overall_score(&blank, BothAbsentPolicy::Exclude), 1.0);
        let metrics = section_metrics(&blank, BothAbsentPolicy::Exclude);
        assert_eq!(metrics.counted_fields, 0);
        assert_eq!(metrics.precision, 0.0);
    }

    #[test]
    fn zero_weights_fall_back_to_plain_mean() {
        let leaves = vec![present("A", 1.0, 0.0), present("B", 0.5, 0.0)];
        assert_eq!(weighted_overall_score(&leaves, BothAbsentPolicy::Exclude), 0.75);
    }

    #[test]
    fn document_metrics_weight_sections_by_size() {
        let large = AccuracyMetrics {
            precision: 1.0,
            weighted_overall_score: 0.9,
            counted_fields: 3,
            ..AccuracyMetrics::default()
        };
        let failed = AccuracyMetrics::default();
        let document = document_metrics(&[large, failed]);
        assert!((document.precision - 0.75).abs() < 1e-12);
        assert!((document.weighted_overall_score - 0.675).abs() < 1e-12);
        assert_eq!(document.counted_fields, 3);
        assert_eq!(document_metrics(&[]), AccuracyMetrics::default());
    }

    proptest! {
        #[test]
        fn weighted_mean_is_bounded_by_field_scores(
            fields in proptest::collection::vec((0.0_f64..=1.0, 0.0_f64..=5.0), 1..20),
        ) {
            let leaves = fields
                .iter()
                .enumerate()
                .map(|(index, (score, weight))| present(&format!("F{index}"), *score, *weight))
                .collect::<Vec<ComparisonOutcome>>();
            let score = weighted_overall_score(&leaves, BothAbsentPolicy::Exclude);
            let low = fields.iter().map(|(score, _)| *score).fold(f64::INFINITY, f64::min);
            let high = fields.iter().map(|(score, _)| *score).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(
                score >= low - 1e-9 && score <= high + 1e-9,
                "{} outside [{}, {}]",
                score,
                low,
                high
            );
        }

        #[test]
        fn weighted_score_is_score_times_weight(score in -1.0_f64..=2.0, weight in 0.0_f64..=10.0) {
            let outcome = present("F", score, weight);
            prop_assert!((0.0..=1.0).contains(&outcome.score));
            prop_assert!((outcome.weighted_score - outcome.score * weight).abs() < 1e-12);
        }
    }
}
