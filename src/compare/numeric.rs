use std::sync::LazyLock;

use regex::Regex;

use super::{CompareScope, Comparator, FieldRef};
use crate::error::ComparatorIncompatibleError;
use crate::model::ComparisonOutcome;
use crate::schema::{ComparisonMethod, DEFAULT_NUMERIC_TOLERANCE};
use crate::value::{FieldValue, format_number};

static CURRENCY_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Z]{3}\s*)?(?P<amount>.*?)(?:\s*[A-Z]{3})?$")
        .expect("currency code pattern is valid")
});

const CURRENCY_SYMBOLS: [char; 8] = ['$', '€', '£', '¥', '₹', '₩', '₽', '¢'];

/// Parses amounts such as `$1,250.00`, `(25.00)`, `USD 10` or `-3.5e2`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut text = raw.trim();
    let mut negative = false;
    if let Some(inner) = text.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        negative = true;
        text = inner.trim();
    }

    let amount = CURRENCY_CODE
        .captures(text)
        .and_then(|captures| captures.name("amount"))
        .map(|capture| capture.as_str())
        .unwrap_or(text);

    let cleaned = amount
        .chars()
        .filter(|character| {
            !character.is_whitespace()
                && *character != ','
                && !CURRENCY_SYMBOLS.contains(character)
        })
        .collect::<String>();
    let stray_letters = cleaned
        .chars()
        .any(|character| character.is_alphabetic() && !matches!(character, 'e' | 'E'));
    if cleaned.is_empty() || stray_letters {
        return None;
    }

    let value = cleaned.parse::<f64>().ok().filter(|value| value.is_finite())?;
    Some(if negative { -value } else { value })
}

pub fn numeric_value(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Number(number) => Some(*number),
        FieldValue::String(text) => parse_number(text),
        _ => None,
    }
}

pub struct NumericExactComparator;

impl Comparator for NumericExactComparator {
    fn method(&self) -> ComparisonMethod {
        ComparisonMethod::NumericExact
    }

    fn compare(
        &self,
        expected: &FieldValue,
        actual: &FieldValue,
        field: FieldRef<'_>,
        _scope: &CompareScope<'_>,
    ) -> Result<ComparisonOutcome, ComparatorIncompatibleError> {
        field.ensure_scalar(self.method(), expected, actual)?;
        let tolerance = field
            .schema
            .threshold(field.id)
            .unwrap_or(DEFAULT_NUMERIC_TOLERANCE);

        let (score, matched, reason) = match (numeric_value(expected), numeric_value(actual)) {
            (Some(left), Some(right)) => {
                let difference = (left - right).abs();
                // Absorb binary rounding so 0.1 + 0.2 still equals 0.3.
                let matched = difference <= tolerance + 1e-9 * left.abs().max(right.abs()).max(1.0);
                let reason = format!(
                    "difference {} {} tolerance {}",
                    format_number(difference),
                    if matched { "within" } else { "exceeds" },
                    format_number(tolerance)
                );
                (if matched { 1.0 } else { 0.0 }, matched, reason)
            }
            (None, _) => (0.0, false, format!("expected value {expected} is not numeric")),
            (_, None) => (0.0, false, format!("actual value {actual} is not numeric")),
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
