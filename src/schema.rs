use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaValidationError;

mod cache;
mod infer;
mod parse;

pub use self::cache::{SchemaCache, SchemaCatalog, class_key};
pub use self::infer::{infer_document_schema, infer_schema_from_samples};
pub use self::parse::{RawDocumentSchema, RawFieldSchema, parse_document_schema};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_NUMERIC_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonMethod {
    Exact,
    NumericExact,
    Fuzzy,
    Levenshtein,
    Semantic,
    Llm,
    Hungarian,
    AggregateObject,
}

impl ComparisonMethod {
    pub const ALL: [ComparisonMethod; 8] = [
        Self::Exact,
        Self::NumericExact,
        Self::Fuzzy,
        Self::Levenshtein,
        Self::Semantic,
        Self::Llm,
        Self::Hungarian,
        Self::AggregateObject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "EXACT",
            Self::NumericExact => "NUMERIC_EXACT",
            Self::Fuzzy => "FUZZY",
            Self::Levenshtein => "LEVENSHTEIN",
            Self::Semantic => "SEMANTIC",
            Self::Llm => "LLM",
            Self::Hungarian => "HUNGARIAN",
            Self::AggregateObject => "AGGREGATE_OBJECT",
        }
    }

    /// Threshold applied when the schema leaves it unset. For NUMERIC_EXACT
    /// this is an absolute tolerance, not a similarity.
    pub fn default_threshold(self) -> Option<f64> {
        match self {
            Self::Fuzzy | Self::Levenshtein | Self::Semantic => Some(DEFAULT_SIMILARITY_THRESHOLD),
            Self::NumericExact => Some(DEFAULT_NUMERIC_TOLERANCE),
            Self::Exact | Self::Llm | Self::Hungarian | Self::AggregateObject => None,
        }
    }
}

impl fmt::Display for ComparisonMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonMethod {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == normalized)
            .ok_or_else(|| format!("unknown comparison method '{raw}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "number" | "float" => Ok(Self::Number),
            "integer" | "int" => Ok(Self::Integer),
            "boolean" | "bool" => Ok(Self::Boolean),
            "object" => Ok(Self::Object),
            "array" => Ok(Self::Array),
            other => Err(format!("unknown field type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub name: String,
    pub path: String,
    pub field_type: FieldType,
    pub method: ComparisonMethod,
    pub threshold: Option<f64>,
    pub match_threshold: Option<f64>,
    pub weight: f64,
    pub description: Option<String>,
    pub properties: Vec<FieldId>,
    pub items: Option<FieldId>,
}

/// Index-addressed storage for a schema tree. Nodes refer to each other by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaArena {
    nodes: Vec<FieldNode>,
}

impl SchemaArena {
    pub fn push(&mut self, node: FieldNode) -> FieldId {
        self.nodes.push(node);
        FieldId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: FieldId) -> &FieldNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &FieldNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (FieldId(index), node))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaOrigin {
    Configured,
    Inferred,
}

#[derive(Debug, Clone)]
pub struct DocumentSchema {
    document_class: String,
    arena: SchemaArena,
    root: FieldId,
    match_threshold: f64,
    origin: SchemaOrigin,
    digest: String,
}

impl DocumentSchema {
    pub fn new(
        document_class: impl Into<String>,
        arena: SchemaArena,
        root: FieldId,
        match_threshold: f64,
        origin: SchemaOrigin,
    ) -> Result<Self, SchemaValidationError> {
        let mut schema = Self {
            document_class: document_class.into(),
            arena,
            root,
            match_threshold,
            origin,
            digest: String::new(),
        };
        schema.validate()?;
        schema.digest = crate::util::sha256_hex(schema.to_config_json().to_string().as_bytes());
        Ok(schema)
    }

    pub fn document_class(&self) -> &str {
        &self.document_class
    }

    pub fn root(&self) -> FieldId {
        self.root
    }

    pub fn node(&self, id: FieldId) -> &FieldNode {
        self.arena.node(id)
    }

    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    pub fn origin(&self) -> SchemaOrigin {
        self.origin
    }

    pub fn is_inferred(&self) -> bool {
        self.origin == SchemaOrigin::Inferred
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn field_count(&self) -> usize {
        self.arena.len()
    }

    pub fn property(&self, parent: FieldId, name: &str) -> Option<FieldId> {
        self.node(parent)
            .properties
            .iter()
            .copied()
            .find(|child| self.node(*child).name == name)
    }

    pub fn is_array_of_objects(&self, id: FieldId) -> bool {
        let node = self.node(id);
        node.field_type == FieldType::Array
            && node
                .items
                .map(|items| self.node(items).field_type == FieldType::Object)
                .unwrap_or(false)
    }

    pub fn threshold(&self, id: FieldId) -> Option<f64> {
        let node = self.node(id);
        node.threshold.or_else(|| node.method.default_threshold())
    }

    pub fn list_match_threshold(&self, id: FieldId) -> f64 {
        self.node(id).match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD)
    }

    fn validate(&self) -> Result<(), SchemaValidationError> {
        check_unit_interval("<document>", "match_threshold", Some(self.match_threshold))?;

        for (id, node) in self.arena.iter() {
            let path = if node.path.is_empty() {
                "<root>"
            } else {
                node.path.as_str()
            };

            let list_of_objects = self.is_array_of_objects(id);
            if node.method == ComparisonMethod::Hungarian && !list_of_objects {
                return Err(SchemaValidationError::new(
                    path,
                    format!(
                        "HUNGARIAN requires an array of objects, field is {}",
                        describe_type(self, id)
                    ),
                ));
            }
            if list_of_objects && node.method != ComparisonMethod::Hungarian {
                return Err(SchemaValidationError::new(
                    path,
                    format!("{} cannot compare an array of objects; use HUNGARIAN", node.method),
                ));
            }

            check_unit_interval(path, "threshold", node.threshold)?;
            check_unit_interval(path, "match_threshold", node.match_threshold)?;

            if !node.weight.is_finite() || node.weight < 0.0 {
                return Err(SchemaValidationError::new(
                    path,
                    format!("weight must be a non-negative number, got {}", node.weight),
                ));
            }
        }

        Ok(())
    }

    pub fn to_config_json(&self) -> serde_json::Value {
        let root = self.node(self.root);
        let raw = RawDocumentSchema {
            document_class: self.document_class.clone(),
            match_threshold: Some(self.match_threshold),
            description: root.description.clone(),
            properties: root
                .properties
                .iter()
                .map(|child| (self.node(*child).name.clone(), self.raw_field(*child)))
                .collect(),
        };
        serde_json::to_value(raw).unwrap_or(serde_json::Value::Null)
    }

    fn raw_field(&self, id: FieldId) -> RawFieldSchema {
        let node = self.node(id);
        RawFieldSchema {
            field_type: Some(node.field_type.as_str().to_string()),
            comparison_method: Some(node.method.as_str().to_string()),
            threshold: node.threshold,
            match_threshold: node.match_threshold,
            weight: Some(node.weight),
            description: node.description.clone(),
            properties: node
                .properties
                .iter()
                .map(|child| (self.node(*child).name.clone(), self.raw_field(*child)))
                .collect(),
            items: node.items.map(|items| Box::new(self.raw_field(items))),
        }
    }
}

fn describe_type(schema: &DocumentSchema, id: FieldId) -> String {
    let node = schema.node(id);
    match (node.field_type, node.items) {
        (FieldType::Array, Some(items)) => format!("array of {}", schema.node(items).field_type),
        (FieldType::Array, None) => "array of primitives".to_string(),
        (field_type, _) => field_type.to_string(),
    }
}

fn check_unit_interval(
    path: &str,
    label: &str,
    value: Option<f64>,
) -> Result<(), SchemaValidationError> {
    match value {
        Some(value) if !(0.0..=1.0).contains(&value) || value.is_nan() => {
            Err(SchemaValidationError::new(
                path,
                format!("{label} must be within [0, 1], got {value}"),
            ))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ComparisonMethod, FieldType, parse_document_schema};
    use serde_json::json;

    #[test]
    fn method_names_parse_case_insensitively() {
        assert_eq!(
            "numeric_exact".parse::<ComparisonMethod>(),
            Ok(ComparisonMethod::NumericExact)
        );
        assert_eq!(
            "Aggregate-Object".parse::<ComparisonMethod>(),
            Ok(ComparisonMethod::AggregateObject)
        );
        assert!("cosine".parse::<ComparisonMethod>().is_err());
        assert_eq!("Integer".parse::<FieldType>(), Ok(FieldType::Integer));
    }

    #[test]
    fn thresholds_fall_back_to_method_defaults() {
        let schema = parse_document_schema(&json!({
            "document_class": "Invoice",
            "properties": {
                "Vendor": {"type": "string", "comparison_method": "FUZZY"},
                "Total": {"type": "number"},
                "Lines": {"type": "array", "items": {"type": "object", "properties": {"Sku": {}}}}
            }
        }))
        .expect("schema should load");

        let root = schema.root();
        let vendor = schema.property(root, "Vendor").expect("vendor field");
        let total = schema.property(root, "Total").expect("total field");
        let lines = schema.property(root, "Lines").expect("lines field");
        assert_eq!(schema.threshold(vendor), Some(0.7));
        assert_eq!(schema.node(total).method, ComparisonMethod::NumericExact);
        assert_eq!(schema.threshold(total), Some(1e-6));
        assert_eq!(schema.node(lines).method, ComparisonMethod::Hungarian);
        assert_eq!(schema.list_match_threshold(lines), 0.8);
        assert!(schema.is_array_of_objects(lines));
    }

    #[test]
    fn config_json_reloads_to_identical_schema() {
        let schema = parse_document_schema(&json!({
            "document_class": "Statement",
            "match_threshold": 0.9,
            "properties": {
                "Account": {"type": "object", "properties": {"Number": {"type": "string", "weight": 2.0}}},
                "Tags": {"type": "array", "items": {"type": "string"}}
            }
        }))
        .expect("schema should load");

        let reloaded =
            parse_document_schema(&schema.to_config_json()).expect("rendered schema should load");
        assert_eq!(reloaded.to_config_json(), schema.to_config_json());
        assert_eq!(reloaded.digest(), schema.digest());
        assert_eq!(reloaded.match_threshold(), 0.9);
    }
}
