use std::sync::LazyLock;

use regex::Regex;

use super::{CompareScope, Comparator, FieldRef};
use crate::error::ComparatorIncompatibleError;
use crate::model::ComparisonOutcome;
use crate::schema::ComparisonMethod;
use crate::value::FieldValue;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("punctuation pattern is valid"));

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

pub fn normalize_for_exact(input: &str) -> String {
    normalize_whitespace(&PUNCTUATION.replace_all(input, ""))
}

/// Strings are equal after [`normalize_for_exact`]; numbers and booleans
/// by value; lists element by element. Mixed kinds fall back to their
/// whitespace-normalized text.
pub fn exact_equal(expected: &FieldValue, actual: &FieldValue) -> bool {
    match (expected, actual) {
        (FieldValue::String(left), FieldValue::String(right)) => {
            normalize_for_exact(left) == normalize_for_exact(right)
        }
        (FieldValue::Number(left), FieldValue::Number(right)) => left == right,
        (FieldValue::Bool(left), FieldValue::Bool(right)) => left == right,
        (FieldValue::Null, FieldValue::Null) => true,
        (FieldValue::Array(left), FieldValue::Array(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right)
                    .all(|(left, right)| exact_equal(left, right))
        }
        (left, right) => {
            normalize_whitespace(&left.comparable_text())
                == normalize_whitespace(&right.comparable_text())
        }
    }
}

pub fn token_sort_key(input: &str) -> String {
    let folded = PUNCTUATION.replace_all(input, " ").to_lowercase();
    let mut tokens = folded.split_whitespace().collect::<Vec<&str>>();
    tokens.sort_unstable();
    tokens.join(" ")
}

pub fn token_sort_similarity(left: &str, right: &str) -> f64 {
    let left_key = token_sort_key(left);
    let right_key = token_sort_key(right);
    if left_key.is_empty() && right_key.is_empty() {
        return 1.0;
    }
    strsim::normalized_levenshtein(&left_key, &right_key)
}

pub fn edit_similarity(left: &str, right: &str) -> f64 {
    let left_norm = normalize_whitespace(left).to_lowercase();
    let right_norm = normalize_whitespace(right).to_lowercase();
    if left_norm.is_empty() && right_norm.is_empty() {
        return 1.0;
    }
    strsim::normalized_levenshtein(&left_norm, &right_norm)
}

pub struct ExactComparator;

impl Comparator for ExactComparator {
    fn method(&self) -> ComparisonMethod {
        ComparisonMethod::Exact
    }

    fn compare(
        &self,
        expected: &FieldValue,
        actual: &FieldValue,
        field: FieldRef<'_>,
        _scope: &CompareScope<'_>,
    ) -> Result<ComparisonOutcome, ComparatorIncompatibleError> {
        field.ensure_scalar(self.method(), expected, actual)?;

        let matched = exact_equal(expected, actual);
        let (score, reason) = if matched {
            (1.0, "exact match")
        } else {
            (0.0, "values differ")
        };
        Ok(ComparisonOutcome::new(
            field.path,
            expected,
            actual,
            self.method(),
            score,
            matched,
            reason,
        ))
    }
}

pub struct FuzzyComparator;

impl Comparator for FuzzyComparator {
    fn method(&self) -> ComparisonMethod {
        ComparisonMethod::Fuzzy
    }

    fn compare(
        &self,
        expected: &FieldValue,
        actual: &FieldValue,
        field: FieldRef<'_>,
        _scope: &CompareScope<'_>,
    ) -> Result<ComparisonOutcome, ComparatorIncompatibleError> {
        field.ensure_scalar(self.method(), expected, actual)?;
        let similarity =
            token_sort_similarity(&expected.comparable_text(), &actual.comparable_text());
        Ok(threshold_outcome(self.method(), expected, actual, field, similarity))
    }
}

pub struct LevenshteinComparator;

impl Comparator for LevenshteinComparator {
    fn method(&self) -> ComparisonMethod {
        ComparisonMethod::Levenshtein
    }

    fn compare(
        &self,
        expected: &FieldValue,
        actual: &FieldValue,
        field: FieldRef<'_>,
        _scope: &CompareScope<'_>,
    ) -> Result<ComparisonOutcome, ComparatorIncompatibleError> {
        field.ensure_scalar(self.method(), expected, actual)?;
        let similarity = edit_similarity(&expected.comparable_text(), &actual.comparable_text());
        Ok(threshold_outcome(self.method(), expected, actual, field, similarity))
    }
}

pub(super) fn threshold_outcome(
    method: ComparisonMethod,
    expected: &FieldValue,
    actual: &FieldValue,
    field: FieldRef<'_>,
    similarity: f64,
) -> ComparisonOutcome {
    let threshold = field
        .schema
        .threshold(field.id)
        .unwrap_or(crate::schema::DEFAULT_SIMILARITY_THRESHOLD);
    let matched = similarity >= threshold;
    let reason = format!(
        "similarity {similarity:.3} {} threshold {threshold:.2}",
        if matched { ">=" } else { "<" }
    );
    ComparisonOutcome::new(field.path, expected, actual, method, similarity, matched, reason)
}
