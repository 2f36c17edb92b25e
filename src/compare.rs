//! Comparator strategies and the registry that dispatches to them.
//!
//! Every comparison goes through [`CompareScope::compare_field`], which owns
//! the shared rules: absence handling, weighting, containment of
//! [`ComparatorIncompatibleError`], and the inferred-schema annotation.
//! Strategies only see fields where at least one side carries a value
//! (structural strategies see every field so they can descend into it).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ComparatorIncompatibleError;
use crate::model::{ComparisonOutcome, Presence};
use crate::schema::{ComparisonMethod, DocumentSchema, FieldId, FieldNode, FieldType};
use crate::value::FieldValue;

pub mod backend;
pub mod list;
pub mod numeric;
pub mod structure;
pub mod text;

use self::backend::{Backends, LlmComparator, SemanticComparator};
use self::list::HungarianComparator;
use self::numeric::NumericExactComparator;
use self::structure::AggregateObjectComparator;
use self::text::{ExactComparator, FuzzyComparator, LevenshteinComparator};

pub const DEFAULT_LARGE_LIST_CELLS: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BothAbsentPolicy {
    #[default]
    Exclude,
    TrueNegative,
}

impl BothAbsentPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exclude => "exclude",
            Self::TrueNegative => "true_negative",
        }
    }

    pub fn counts(self, outcome: &ComparisonOutcome) -> bool {
        outcome.presence != Presence::Neither || self == Self::TrueNegative
    }
}

#[derive(Clone, Copy)]
pub struct FieldRef<'a> {
    pub schema: &'a DocumentSchema,
    pub id: FieldId,
    pub path: &'a str,
}

impl<'a> FieldRef<'a> {
    pub fn node(&self) -> &'a FieldNode {
        self.schema.node(self.id)
    }

    pub fn incompatible(
        &self,
        method: ComparisonMethod,
        detail: impl Into<String>,
    ) -> ComparatorIncompatibleError {
        ComparatorIncompatibleError {
            path: self.path.to_string(),
            method,
            detail: detail.into(),
        }
    }

    /// Scalar strategies refuse object fields, lists of objects, and values
    /// whose shape does not fit a scalar comparison.
    pub fn ensure_scalar(
        &self,
        method: ComparisonMethod,
        expected: &FieldValue,
        actual: &FieldValue,
    ) -> Result<(), ComparatorIncompatibleError> {
        let field_type = self.node().field_type;
        if field_type == FieldType::Object {
            return Err(self.incompatible(method, "field is declared as an object"));
        }
        if self.schema.is_array_of_objects(self.id) {
            return Err(self.incompatible(method, "field is declared as an array of objects"));
        }

        for (side, value) in [("expected", expected), ("actual", actual)] {
            match value {
                FieldValue::Object(_) => {
                    return Err(self.incompatible(method, format!("{side} value is an object")));
                }
                FieldValue::Array(_) if field_type != FieldType::Array => {
                    return Err(self.incompatible(
                        method,
                        format!("{side} value is a list but the field is declared as {field_type}"),
                    ));
                }
                FieldValue::Array(items)
                    if items
                        .iter()
                        .any(|item| matches!(item, FieldValue::Object(_) | FieldValue::Array(_))) =>
                {
                    return Err(self.incompatible(
                        method,
                        format!("{side} list holds nested structures"),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

pub trait Comparator: Send + Sync {
    fn method(&self) -> ComparisonMethod;

    fn compare(
        &self,
        expected: &FieldValue,
        actual: &FieldValue,
        field: FieldRef<'_>,
        scope: &CompareScope<'_>,
    ) -> Result<ComparisonOutcome, ComparatorIncompatibleError>;
}

pub struct ComparatorRegistry {
    comparators: BTreeMap<ComparisonMethod, Box<dyn Comparator>>,
}

impl ComparatorRegistry {
    pub fn new(backends: Backends) -> Self {
        let mut registry = Self {
            comparators: BTreeMap::new(),
        };
        registry.register(Box::new(ExactComparator));
        registry.register(Box::new(NumericExactComparator));
        registry.register(Box::new(FuzzyComparator));
        registry.register(Box::new(LevenshteinComparator));
        registry.register(Box::new(SemanticComparator::new(backends.clone())));
        registry.register(Box::new(LlmComparator::new(backends)));
        registry.register(Box::new(AggregateObjectComparator));
        registry.register(Box::new(HungarianComparator));
        registry
    }

    pub fn register(&mut self, comparator: Box<dyn Comparator>) {
        self.comparators.insert(comparator.method(), comparator);
    }

    pub fn get(&self, method: ComparisonMethod) -> Option<&dyn Comparator> {
        self.comparators.get(&method).map(|comparator| comparator.as_ref())
    }
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        Self::new(Backends::none())
    }
}

pub struct CompareScope<'a> {
    pub schema: &'a DocumentSchema,
    pub registry: &'a ComparatorRegistry,
    pub policy: BothAbsentPolicy,
    pub large_list_cells: usize,
}

impl<'a> CompareScope<'a> {
    pub fn new(schema: &'a DocumentSchema, registry: &'a ComparatorRegistry) -> Self {
        Self {
            schema,
            registry,
            policy: BothAbsentPolicy::default(),
            large_list_cells: DEFAULT_LARGE_LIST_CELLS,
        }
    }

    pub fn with_policy(mut self, policy: BothAbsentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_large_list_cells(mut self, cells: usize) -> Self {
        self.large_list_cells = cells;
        self
    }

    pub fn counts(&self, outcome: &ComparisonOutcome) -> bool {
        self.policy.counts(outcome)
    }

    pub fn compare_root(&self, expected: &FieldValue, actual: &FieldValue) -> ComparisonOutcome {
        self.compare_field(self.schema.root(), "", expected, actual)
    }

    pub fn compare_field(
        &self,
        id: FieldId,
        path: &str,
        expected: &FieldValue,
        actual: &FieldValue,
    ) -> ComparisonOutcome {
        let node = self.schema.node(id);
        let method = node.method;
        let structural = matches!(
            method,
            ComparisonMethod::AggregateObject | ComparisonMethod::Hungarian
        );

        let mut outcome = match (structural, expected.is_absent(), actual.is_absent()) {
            (false, true, true) => {
                ComparisonOutcome::new(path, expected, actual, method, 1.0, true, "both absent")
            }
            (false, true, false) => ComparisonOutcome::new(
                path,
                expected,
                actual,
                method,
                0.0,
                false,
                "missing in expected",
            ),
            (false, false, true) => ComparisonOutcome::new(
                path,
                expected,
                actual,
                method,
                0.0,
                false,
                "missing in actual",
            ),
            _ => self.dispatch(id, path, expected, actual),
        };

        outcome = outcome.with_weight(node.weight);
        if self.schema.is_inferred() {
            outcome.mark_schema_inferred();
        }
        outcome
    }

    fn dispatch(
        &self,
        id: FieldId,
        path: &str,
        expected: &FieldValue,
        actual: &FieldValue,
    ) -> ComparisonOutcome {
        let method = self.schema.node(id).method;
        let field = FieldRef {
            schema: self.schema,
            id,
            path,
        };

        let result = match self.registry.get(method) {
            Some(comparator) => comparator.compare(expected, actual, field, self),
            None => Err(field.incompatible(method, "no comparator registered")),
        };

        result.unwrap_or_else(|err| {
            warn!(
                path = %err.path,
                method = %err.method,
                detail = %err.detail,
                "comparator incompatible with field; skipping"
            );
            ComparisonOutcome::new(
                path,
                expected,
                actual,
                method,
                0.0,
                false,
                format!("skipped: {err}"),
            )
        })
    }
}
