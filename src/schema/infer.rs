use std::collections::BTreeMap;

use super::{
    ComparisonMethod, DEFAULT_MATCH_THRESHOLD, DocumentSchema, FieldId, FieldNode, FieldType,
    SchemaArena, SchemaOrigin,
};
use crate::error::SchemaValidationError;
use crate::path::{join_items, join_key};
use crate::value::FieldValue;

pub const INFERRED_STRING_THRESHOLD: f64 = 0.85;
pub const INFERRED_NUMERIC_TOLERANCE: f64 = 0.01;
pub const INFERRED_LIST_MATCH_THRESHOLD: f64 = 0.8;

/// Derives comparison rules from the shape of a baseline tree.
///
/// List item schemas are the union of the fields seen across every object
/// item, so items with differing shapes still get all of their fields
/// compared.
pub fn infer_document_schema(
    document_class: &str,
    baseline: &FieldValue,
) -> Result<DocumentSchema, SchemaValidationError> {
    infer_schema_from_samples(document_class, &[baseline])
}

pub fn infer_schema_from_samples(
    document_class: &str,
    baselines: &[&FieldValue],
) -> Result<DocumentSchema, SchemaValidationError> {
    let mut arena = SchemaArena::default();
    let samples = baselines
        .iter()
        .copied()
        .filter(|baseline| matches!(baseline, FieldValue::Object(_)))
        .collect::<Vec<&FieldValue>>();
    let properties = infer_properties(&mut arena, "", &samples);
    let root = arena.push(FieldNode {
        name: String::new(),
        path: String::new(),
        field_type: FieldType::Object,
        method: ComparisonMethod::AggregateObject,
        threshold: None,
        match_threshold: None,
        weight: 1.0,
        description: None,
        properties,
        items: None,
    });

    DocumentSchema::new(
        document_class,
        arena,
        root,
        DEFAULT_MATCH_THRESHOLD,
        SchemaOrigin::Inferred,
    )
}

fn infer_properties(arena: &mut SchemaArena, path: &str, samples: &[&FieldValue]) -> Vec<FieldId> {
    let mut by_key = BTreeMap::<&str, Vec<&FieldValue>>::new();
    for sample in samples {
        if let FieldValue::Object(fields) = sample {
            for (key, value) in fields {
                by_key.entry(key.as_str()).or_default().push(value);
            }
        }
    }

    by_key
        .into_iter()
        .map(|(key, values)| infer_field(arena, key, &join_key(path, key), &values))
        .collect()
}

fn infer_field(
    arena: &mut SchemaArena,
    name: &str,
    path: &str,
    samples: &[&FieldValue],
) -> FieldId {
    let present = samples
        .iter()
        .copied()
        .filter(|value| !matches!(value, FieldValue::Null))
        .collect::<Vec<&FieldValue>>();

    let mut node = FieldNode {
        name: name.to_string(),
        path: path.to_string(),
        field_type: FieldType::String,
        method: ComparisonMethod::Exact,
        threshold: None,
        match_threshold: None,
        weight: 1.0,
        description: None,
        properties: Vec::new(),
        items: None,
    };

    match present.first() {
        None => {}
        Some(FieldValue::Null) => {}
        Some(FieldValue::Bool(_)) => node.field_type = FieldType::Boolean,
        Some(FieldValue::Number(_)) => {
            let integral = present.iter().all(|value| match value {
                FieldValue::Number(number) => number.fract() == 0.0,
                _ => true,
            });
            node.field_type = if integral {
                FieldType::Integer
            } else {
                FieldType::Number
            };
            node.method = ComparisonMethod::NumericExact;
            node.threshold = Some(INFERRED_NUMERIC_TOLERANCE);
        }
        Some(FieldValue::String(_)) => {
            node.method = ComparisonMethod::Fuzzy;
            node.threshold = Some(INFERRED_STRING_THRESHOLD);
        }
        Some(FieldValue::Object(_)) => {
            node.field_type = FieldType::Object;
            node.method = ComparisonMethod::AggregateObject;
            node.properties = infer_properties(arena, path, &present);
        }
        Some(FieldValue::Array(_)) => {
            node.field_type = FieldType::Array;
            let object_items = present
                .iter()
                .filter_map(|value| value.as_array())
                .flatten()
                .filter(|item| matches!(item, FieldValue::Object(_)))
                .collect::<Vec<&FieldValue>>();

            if !object_items.is_empty() {
                let items_path = join_items(path);
                let properties = infer_properties(arena, &items_path, &object_items);
                node.items = Some(arena.push(FieldNode {
                    name: "[]".to_string(),
                    path: items_path,
                    field_type: FieldType::Object,
                    method: ComparisonMethod::AggregateObject,
                    threshold: None,
                    match_threshold: None,
                    weight: 1.0,
                    description: None,
                    properties,
                    items: None,
                }));
                node.method = ComparisonMethod::Hungarian;
                node.match_threshold = Some(INFERRED_LIST_MATCH_THRESHOLD);
            }
        }
    }

    arena.push(node)
}
