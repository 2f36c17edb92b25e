use super::{CompareScope, Comparator, FieldRef};
use crate::error::ComparatorIncompatibleError;
use crate::model::ComparisonOutcome;
use crate::path::join_key;
use crate::schema::{ComparisonMethod, FieldType};
use crate::value::FieldValue;

pub struct AggregateObjectComparator;

impl Comparator for AggregateObjectComparator {
    fn method(&self) -> ComparisonMethod {
        ComparisonMethod::AggregateObject
    }

    fn compare(
        &self,
        expected: &FieldValue,
        actual: &FieldValue,
        field: FieldRef<'_>,
        scope: &CompareScope<'_>,
    ) -> Result<ComparisonOutcome, ComparatorIncompatibleError> {
        let node = field.node();
        if node.field_type != FieldType::Object {
            return Err(field.incompatible(
                self.method(),
                format!("field is declared as {}", node.field_type),
            ));
        }
        for (side, value) in [("expected", expected), ("actual", actual)] {
            if !value.is_absent() && value.as_object().is_none() {
                return Err(field.incompatible(
                    self.method(),
                    format!("{side} value is {}, not an object", value.kind()),
                ));
            }
        }

        let details = node
            .properties
            .iter()
            .map(|child| {
                let name = &field.schema.node(*child).name;
                let child_expected = expected.get(name).unwrap_or(&FieldValue::Null);
                let child_actual = actual.get(name).unwrap_or(&FieldValue::Null);
                let child_path = join_key(field.path, name);
                scope.compare_field(*child, &child_path, child_expected, child_actual)
            })
            .collect::<Vec<ComparisonOutcome>>();

        let (score, matched, reason) = summarize_children(&details, scope, expected, actual);
        Ok(ComparisonOutcome::new(
            field.path,
            expected,
            actual,
            self.method(),
            score,
            matched,
            reason,
        )
        .with_details(details))
    }
}

/// Weighted mean of the counted children. Falls back to the plain mean when
/// every counted weight is zero. With nothing counted, the object's own
/// presence decides: a one-sided object is a miss.
pub(super) fn summarize_children(
    details: &[ComparisonOutcome],
    scope: &CompareScope<'_>,
    expected: &FieldValue,
    actual: &FieldValue,
) -> (f64, bool, String) {
    let counted = details
        .iter()
        .filter(|detail| scope.counts(detail))
        .collect::<Vec<&ComparisonOutcome>>();

    if counted.is_empty() {
        let (score, matched, reason) = match (expected.is_absent(), actual.is_absent()) {
            (true, true) => (1.0, true, "both absent"),
            (false, false) => (1.0, true, "no schema fields to compare"),
            (false, true) => (0.0, false, "missing in actual; no schema fields to compare"),
            (true, false) => (0.0, false, "missing in expected; no schema fields to compare"),
        };
        return (score, matched, reason.to_string());
    }

    let weight_total = counted.iter().map(|detail| detail.weight).sum::<f64>();
    let score = if weight_total > 0.0 {
        counted
            .iter()
            .map(|detail| detail.score * detail.weight)
            .sum::<f64>()
            / weight_total
    } else {
        counted.iter().map(|detail| detail.score).sum::<f64>() / counted.len() as f64
    };
    let matched_count = counted.iter().filter(|detail| detail.matched).count();
    let matched = matched_count == counted.len();

    (
        score,
        matched,
        format!("{matched_count}/{} fields matched", counted.len()),
    )
}

#[cfg(test)]
mod tests {
    use crate::aggregate::confusion_counts;
    use crate::compare::{BothAbsentPolicy, ComparatorRegistry, CompareScope};
    use crate::model::Presence;
    use crate::schema::parse_document_schema;
    use crate::value::FieldValue;
    use serde_json::json;

    fn address_schema() -> crate::schema::DocumentSchema {
        parse_document_schema(&json!({
            "document_class": "Letter",
            "properties": {
                "Address": {
                    "type": "object",
                    "properties": {
                        "City": {"type": "string", "weight": 3.0},
                        "Zip": {"type": "string"},
                        "Unit": {"type": "string"}
                    }
                }
            }
        }))
        .expect("schema should load")
    }

    #[test]
    fn object_score_is_weighted_mean_of_children() {
        let schema = address_schema();
        let registry = ComparatorRegistry::default();
        let scope = CompareScope::new(&schema, &registry);
        let root = scope.compare_root(
            &FieldValue::from(json!({"Address": {"City": "Austin", "Zip": "78701"}})),
            &FieldValue::from(json!({"Address": {"City": "Austin", "Zip": "78702"}})),
        );

        let address = &root.field_comparison_details[0];
        assert_eq!(address.path, "Address");
        assert!((address.score - 0.75).abs() < 1e-9, "score was {}", address.score);
        assert!(!address.matched);
        assert_eq!(address.reason, "1/2 fields matched");
        let paths = address
            .field_comparison_details
            .iter()
            .map(|detail| detail.path.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(paths, vec!["Address.City", "Address.Unit", "Address.Zip"]);
    }

    #[test]
    fn both_absent_children_count_under_true_negative_policy() {
        let schema = address_schema();
        let registry = ComparatorRegistry::default();
        let scope =
            CompareScope::new(&schema, &registry).with_policy(BothAbsentPolicy::TrueNegative);
        let root = scope.compare_root(
            &FieldValue::from(json!({"Address": {"City": "Austin", "Zip": "78701"}})),
            &FieldValue::from(json!({"Address": {"City": "Austin", "Zip": "78702"}})),
        );
        let address = &root.field_comparison_details[0];
        assert!((address.score - 0.8).abs() < 1e-9, "score was {}", address.score);
    }

    #[test]
    fn missing_actual_object_reports_each_child() {
        let schema = address_schema();
        let registry = ComparatorRegistry::default();
        let scope = CompareScope::new(&schema, &registry);
        let root = scope.compare_root(
            &FieldValue::from(json!({"Address": {"City": "Austin"}})),
            &FieldValue::from(json!({"Address": null})),
        );
        let address = &root.field_comparison_details[0];
        assert_eq!(address.presence, Presence::ExpectedOnly);
        assert_eq!(address.field_comparison_details[0].reason, "missing in actual");
        assert_eq!(address.score, 0.0);
    }

    #[test]
    fn one_sided_object_without_fields_is_a_false_positive() {
        let schema = parse_document_schema(&json!({
            "document_class": "Letter",
            "properties": {"Metadata": {"type": "object"}}
        }))
        .expect("schema should load");
        let registry = ComparatorRegistry::default();
        let scope = CompareScope::new(&schema, &registry);
        let root = scope.compare_root(
            &FieldValue::from(json!({"Metadata": null})),
            &FieldValue::from(json!({"Metadata": {"Source": "scanner"}})),
        );

        let leaves = crate::tree::flatten(&root);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].presence, Presence::ActualOnly);
        assert!(!leaves[0].matched);
        assert_eq!(leaves[0].score, 0.0);
        let counts = confusion_counts(&leaves, BothAbsentPolicy::Exclude);
        assert_eq!(counts.false_positives, 1);
        assert_eq!(counts.true_positives, 0);
    }

    #[test]
    fn non_object_value_is_skipped_not_fatal() {
        let schema = address_schema();
        let registry = ComparatorRegistry::default();
        let scope = CompareScope::new(&schema, &registry);
        let root = scope.compare_root(
            &FieldValue::from(json!({"Address": {"City": "Austin"}})),
            &FieldValue::from(json!({"Address": "1 Main St, Austin"})),
        );
        let address = &root.field_comparison_details[0];
        assert_eq!(address.score, 0.0);
        assert!(address.reason.contains("not an object"), "unexpected reason: {}", address.reason);
        assert!(address.field_comparison_details.is_empty());
    }
}
