use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    ComparisonMethod, DEFAULT_MATCH_THRESHOLD, DocumentSchema, FieldId, FieldNode, FieldType,
    SchemaArena, SchemaOrigin,
};
use crate::error::SchemaValidationError;
use crate::path::{join_items, join_key};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFieldSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(alias = "method", default, skip_serializing_if = "Option::is_none")]
    pub comparison_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, RawFieldSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<RawFieldSchema>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocumentSchema {
    #[serde(alias = "class")]
    pub document_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, RawFieldSchema>,
}

pub fn parse_document_schema(
    raw: &serde_json::Value,
) -> Result<DocumentSchema, SchemaValidationError> {
    let document: RawDocumentSchema = serde_json::from_value(raw.clone())
        .map_err(|err| SchemaValidationError::new("<document>", err.to_string()))?;
    build_document_schema(&document)
}

pub fn build_document_schema(
    document: &RawDocumentSchema,
) -> Result<DocumentSchema, SchemaValidationError> {
    if document.document_class.trim().is_empty() {
        return Err(SchemaValidationError::new(
            "<document>",
            "document_class must not be empty",
        ));
    }

    let mut arena = SchemaArena::default();
    let mut properties = Vec::<FieldId>::with_capacity(document.properties.len());
    for (name, field) in &document.properties {
        properties.push(build_field(&mut arena, name, &join_key("", name), field)?);
    }

    let root = arena.push(FieldNode {
        name: String::new(),
        path: String::new(),
        field_type: FieldType::Object,
        method: ComparisonMethod::AggregateObject,
        threshold: None,
        match_threshold: None,
        weight: 1.0,
        description: document.description.clone(),
        properties,
        items: None,
    });

    DocumentSchema::new(
        document.document_class.trim(),
        arena,
        root,
        document.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD),
        SchemaOrigin::Configured,
    )
}

fn build_field(
    arena: &mut SchemaArena,
    name: &str,
    path: &str,
    raw: &RawFieldSchema,
) -> Result<FieldId, SchemaValidationError> {
    let field_type = match raw.field_type.as_deref() {
        Some(declared) => declared
            .parse::<FieldType>()
            .map_err(|message| SchemaValidationError::new(path, message))?,
        None if !raw.properties.is_empty() => FieldType::Object,
        None if raw.items.is_some() => FieldType::Array,
        None => FieldType::String,
    };

    let mut properties = Vec::<FieldId>::new();
    if field_type == FieldType::Object {
        for (child_name, child) in &raw.properties {
            properties.push(build_field(
                arena,
                child_name,
                &join_key(path, child_name),
                child,
            )?);
        }
    }

    let items = match (&raw.items, field_type) {
        (Some(items), FieldType::Array) => {
            Some(build_field(arena, "[]", &join_items(path), items)?)
        }
        _ => None,
    };
    let items_are_objects = items
        .map(|items| arena.node(items).field_type == FieldType::Object)
        .unwrap_or(false);

    let method = match raw.comparison_method.as_deref() {
        Some(declared) => declared
            .parse::<ComparisonMethod>()
            .map_err(|message| SchemaValidationError::new(path, message))?,
        None => default_method(field_type, items_are_objects),
    };

    Ok(arena.push(FieldNode {
        name: name.to_string(),
        path: path.to_string(),
        field_type,
        method,
        threshold: raw.threshold,
        match_threshold: raw.match_threshold,
        weight: raw.weight.unwrap_or(1.0),
        description: raw.description.clone(),
        properties,
        items,
    }))
}

fn default_method(field_type: FieldType, items_are_objects: bool) -> ComparisonMethod {
    match field_type {
        FieldType::Number | FieldType::Integer => ComparisonMethod::NumericExact,
        FieldType::Object => ComparisonMethod::AggregateObject,
        FieldType::Array if items_are_objects => ComparisonMethod::Hungarian,
        FieldType::String | FieldType::Boolean | FieldType::Array => ComparisonMethod::Exact,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_document_schema;
    use serde_json::json;

    fn expect_error(raw: serde_json::Value) -> (String, String) {
        let error = parse_document_schema(&raw).expect_err("schema should be rejected");
        (error.path, error.message)
    }

    #[test]
    fn rejects_hungarian_on_scalar_field() {
        let (path, message) = expect_error(json!({
            "document_class": "Invoice",
            "properties": {"Vendor": {"type": "string", "comparison_method": "HUNGARIAN"}}
        }));
        assert_eq!(path, "Vendor");
        assert!(message.contains("array of objects"), "unexpected message: {message}");
    }

    #[test]
    fn rejects_scalar_method_on_object_list() {
        let (path, message) = expect_error(json!({
            "document_class": "Statement",
            "properties": {
                "Account": {
                    "type": "object",
                    "properties": {
                        "Transactions": {
                            "type": "array",
                            "comparison_method": "FUZZY",
                            "items": {"type": "object", "properties": {"Amount": {"type": "number"}}}
                        }
                    }
                }
            }
        }));
        assert_eq!(path, "Account.Transactions");
        assert!(message.contains("FUZZY"), "unexpected message: {message}");
    }

    #[test]
    fn rejects_out_of_range_threshold_and_negative_weight() {
        let (path, message) = expect_error(json!({
            "document_class": "Invoice",
            "properties": {"Vendor": {"comparison_method": "FUZZY", "threshold": 1.5}}
        }));
        assert_eq!(path, "Vendor");
        assert!(message.contains("threshold"));

        let (path, message) = expect_error(json!({
            "document_class": "Invoice",
            "properties": {
                "Lines": {
                    "type": "array",
                    "match_threshold": -0.1,
                    "items": {"properties": {"Sku": {}}}
                }
            }
        }));
        assert_eq!(path, "Lines");
        assert!(message.contains("match_threshold"));

        let (path, message) = expect_error(json!({
            "document_class": "Invoice",
            "properties": {"Lines": {"type": "array", "items": {"properties": {"Sku": {"weight": -1}}}}}
        }));
        assert_eq!(path, "Lines[].Sku");
        assert!(message.contains("weight"));
    }

    #[test]
    fn ignores_unknown_keys_and_accepts_method_alias() {
        let schema = parse_document_schema(&json!({
            "document_class": "Invoice",
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "properties": {
                "Vendor": {"type": "string", "method": "levenshtein", "x-ui-order": 3}
            }
        }))
        .expect("extra keys should be ignored");
        let vendor = schema
            .property(schema.root(), "Vendor")
            .expect("vendor field");
        assert_eq!(schema.node(vendor).method.as_str(), "LEVENSHTEIN");
    }

    #[test]
    fn rejects_unknown_type_naming_path() {
        let (path, message) = expect_error(json!({
            "document_class": "Invoice",
            "properties": {"Meta": {"properties": {"When": {"type": "date"}}}}
        }));
        assert_eq!(path, "Meta.When");
        assert!(message.contains("date"));
    }
}
