use std::collections::BTreeMap;

use tracing::warn;

use crate::compare::numeric::parse_number;
use crate::error::TypeCoercionWarning;
use crate::path::{join_index, join_key};
use crate::schema::{DocumentSchema, FieldId, FieldType};
use crate::value::{FieldValue, format_number};

pub fn coerce_tree(
    schema: &DocumentSchema,
    value: &FieldValue,
    warnings: &mut Vec<TypeCoercionWarning>,
) -> FieldValue {
    coerce_value(schema, schema.root(), value, "", warnings)
}

/// Never fails: a value that cannot be converted passes through unchanged
/// and a warning is recorded against its path.
pub fn coerce_value(
    schema: &DocumentSchema,
    id: FieldId,
    value: &FieldValue,
    path: &str,
    warnings: &mut Vec<TypeCoercionWarning>,
) -> FieldValue {
    if value.is_absent() {
        return value.clone();
    }

    let node = schema.node(id);
    let converted = match (node.field_type, value) {
        (FieldType::String, FieldValue::String(_)) => Some(value.clone()),
        (FieldType::String, FieldValue::Number(number)) => {
            Some(FieldValue::String(format_number(*number)))
        }
        (FieldType::String, FieldValue::Bool(flag)) => Some(FieldValue::String(flag.to_string())),

        (FieldType::Number | FieldType::Integer, FieldValue::Number(_)) => Some(value.clone()),
        (FieldType::Number | FieldType::Integer, FieldValue::String(text)) => {
            parse_number(text).map(FieldValue::Number)
        }

        (FieldType::Boolean, FieldValue::Bool(_)) => Some(value.clone()),
        (FieldType::Boolean, FieldValue::String(text)) => {
            match text.trim().to_ascii_lowercase().as_str() {
                "true" => Some(FieldValue::Bool(true)),
                "false" => Some(FieldValue::Bool(false)),
                _ => None,
            }
        }

        (FieldType::Object, FieldValue::Object(fields)) => {
            let mut coerced = BTreeMap::<String, FieldValue>::new();
            for (key, child) in fields {
                let child_value = match schema.property(id, key) {
                    Some(child_id) => {
                        coerce_value(schema, child_id, child, &join_key(path, key), warnings)
                    }
                    None => child.clone(),
                };
                coerced.insert(key.clone(), child_value);
            }
            Some(FieldValue::Object(coerced))
        }

        (FieldType::Array, FieldValue::Array(items)) => match node.items {
            Some(items_id) => Some(FieldValue::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        coerce_value(schema, items_id, item, &join_index(path, index), warnings)
                    })
                    .collect(),
            )),
            None => Some(value.clone()),
        },

        _ => None,
    };

    converted.unwrap_or_else(|| {
        let warning = TypeCoercionWarning {
            path: if path.is_empty() {
                "<root>".to_string()
            } else {
                path.to_string()
            },
            target_type: node.field_type,
            original: value.clone(),
        };
        warn!(
            path = %warning.path,
            target_type = %warning.target_type,
            original_type = value.kind(),
            "type coercion failed; comparing original value"
        );
        warnings.push(warning);
        value.clone()
    })
}
