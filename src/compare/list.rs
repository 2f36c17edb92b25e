use tracing::{debug, warn};

use super::{CompareScope, Comparator, FieldRef};
use crate::error::ComparatorIncompatibleError;
use crate::hungarian::{CostMatrix, solve};
use crate::model::ComparisonOutcome;
use crate::path::join_index;
use crate::schema::ComparisonMethod;
use crate::value::FieldValue;

/// Pairs unordered list items by optimal assignment over item similarity.
///
/// Child order in the outcome: one entry per expected item at its own index
/// (paired or unmatched), then unmatched actual items appended after them.
/// A child's path index therefore equals its position in the details list.
pub struct HungarianComparator;

impl Comparator for HungarianComparator {
    fn method(&self) -> ComparisonMethod {
        ComparisonMethod::Hungarian
    }

    fn compare(
        &self,
        expected: &FieldValue,
        actual: &FieldValue,
        field: FieldRef<'_>,
        scope: &CompareScope<'_>,
    ) -> Result<ComparisonOutcome, ComparatorIncompatibleError> {
        let items_id = match field.node().items {
            Some(items_id) if field.schema.is_array_of_objects(field.id) => items_id,
            _ => {
                return Err(field.incompatible(
                    self.method(),
                    "HUNGARIAN requires an array-of-object field",
                ));
            }
        };
        let expected_items = list_items(expected, "expected", &field, self.method())?;
        let actual_items = list_items(actual, "actual", &field, self.method())?;
        let threshold = field.schema.list_match_threshold(field.id);
        let item_weight = field.schema.node(items_id).weight;

        let rows = expected_items.len();
        let cols = actual_items.len();
        if rows == 0 && cols == 0 {
            return Ok(ComparisonOutcome::new(
                field.path,
                expected,
                actual,
                self.method(),
                1.0,
                true,
                "both absent",
            ));
        }
        if rows.saturating_mul(cols) > scope.large_list_cells {
            warn!(
                path = %field.path,
                expected_items = rows,
                actual_items = cols,
                "large list comparison; assignment cost grows cubically"
            );
        }

        let mut pair_outcomes = Vec::<Vec<ComparisonOutcome>>::with_capacity(rows);
        for (row, expected_item) in expected_items.iter().enumerate() {
            let item_path = join_index(field.path, row);
            pair_outcomes.push(
                actual_items
                    .iter()
                    .map(|actual_item| {
                        scope.compare_field(items_id, &item_path, expected_item, actual_item)
                    })
                    .collect(),
            );
        }

        let costs = CostMatrix::from_fn(rows, cols, |row, col| 1.0 - pair_outcomes[row][col].score);
        let assignment = solve(&costs, 1.0);

        let mut details = Vec::<ComparisonOutcome>::with_capacity(rows + cols);
        let mut actual_taken = vec![false; cols];
        let mut accepted_similarity = 0.0_f64;
        let mut accepted = 0_usize;
        let mut rejected_for_actual = vec![None::<(usize, f64)>; cols];

        for (row, expected_item) in expected_items.iter().enumerate() {
            let candidate = assignment.col_for_row(row);
            match candidate {
                Some(col) if pair_outcomes[row][col].score >= threshold => {
                    let similarity = pair_outcomes[row][col].score;
                    let mut pair = pair_outcomes[row][col].clone();
                    pair.matched = true;
                    // The enclosing scope re-applies any schema annotation.
                    pair.schema_inferred = false;
                    pair.reason = format!(
                        "paired with actual[{col}] (similarity {similarity:.3} >= {threshold:.2})"
                    );
                    actual_taken[col] = true;
                    accepted_similarity += similarity;
                    accepted += 1;
                    details.push(pair);
                }
                _ => {
                    let reason = match candidate {
                        Some(col) => {
                            let similarity = pair_outcomes[row][col].score;
                            rejected_for_actual[col] = Some((row, similarity));
                            format!(
                                "unmatched: best candidate actual[{col}] similarity {similarity:.3} below match threshold {threshold:.2}"
                            )
                        }
                        None => "unmatched: no actual item left to pair".to_string(),
                    };
                    details.push(
                        ComparisonOutcome::new(
                            join_index(field.path, row),
                            expected_item,
                            &FieldValue::Null,
                            self.method(),
                            0.0,
                            false,
                            reason,
                        )
                        .with_weight(item_weight),
                    );
                }
            }
        }

        let mut next_index = rows;
        for (col, actual_item) in actual_items.iter().enumerate() {
            if actual_taken[col] {
                continue;
            }
            let reason = match rejected_for_actual[col] {
                Some((row, similarity)) => format!(
                    "unmatched: best candidate expected[{row}] similarity {similarity:.3} below match threshold {threshold:.2}"
                ),
                None => "unmatched: no expected item left to pair".to_string(),
            };
            details.push(
                ComparisonOutcome::new(
                    join_index(field.path, next_index),
                    &FieldValue::Null,
                    actual_item,
                    self.method(),
                    0.0,
                    false,
                    reason,
                )
                .with_weight(item_weight),
            );
            next_index += 1;
        }

        let score = accepted_similarity / rows.max(cols) as f64;
        let matched = accepted == rows && accepted == cols;
        debug!(
            path = %field.path,
            expected_items = rows,
            actual_items = cols,
            accepted,
            score,
            "list items paired"
        );

        Ok(ComparisonOutcome::new(
            field.path,
            expected,
            actual,
            self.method(),
            score,
            matched,
            format!("{accepted} of {rows} expected items paired with {cols} actual items"),
        )
        .with_details(details))
    }
}

fn list_items<'v>(
    value: &'v FieldValue,
    side: &str,
    field: &FieldRef<'_>,
    method: ComparisonMethod,
) -> Result<&'v [FieldValue], ComparatorIncompatibleError> {
    match value {
        FieldValue::Array(items) => Ok(items),
        other if other.is_absent() => Ok(&[]),
        other => Err(field.incompatible(
            method,
            format!("{side} value is {}, not a list", other.kind()),
        )),
    }
}
