use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{DocumentSchema, infer_schema_from_samples, parse_document_schema};
use crate::error::SchemaValidationError;
use crate::value::FieldValue;

pub fn class_key(document_class: &str) -> String {
    document_class.trim().to_ascii_lowercase()
}

/// Generated schemas for classes with no configuration, scoped to one
/// evaluation batch. Schemas are only ever inferred from baseline data.
#[derive(Debug, Default)]
pub struct SchemaCache {
    inner: RwLock<HashMap<String, Arc<DocumentSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, document_class: &str) -> Option<Arc<DocumentSchema>> {
        self.inner.read().get(&class_key(document_class)).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn infer(
        &self,
        document_class: &str,
        baselines: &[&FieldValue],
    ) -> Result<Arc<DocumentSchema>, SchemaValidationError> {
        let schema = Arc::new(infer_schema_from_samples(document_class, baselines)?);
        debug!(
            document_class = %document_class,
            samples = baselines.len(),
            fields = schema.field_count(),
            digest = %schema.digest(),
            "inferred schema for unconfigured document class"
        );
        self.inner
            .write()
            .insert(class_key(document_class), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get_or_infer(
        &self,
        document_class: &str,
        baselines: impl FnOnce() -> Vec<FieldValue>,
    ) -> Result<Arc<DocumentSchema>, SchemaValidationError> {
        if let Some(schema) = self.get(document_class) {
            return Ok(schema);
        }

        let samples = baselines();
        if samples.is_empty() {
            return Err(SchemaValidationError::new(
                "<root>",
                format!(
                    "no schema configured for class `{document_class}` and no baseline section to infer one from"
                ),
            ));
        }
        let mut guard = self.inner.write();
        if let Some(schema) = guard.get(&class_key(document_class)) {
            return Ok(Arc::clone(schema));
        }
        let refs = samples.iter().collect::<Vec<&FieldValue>>();
        let schema = Arc::new(infer_schema_from_samples(document_class, &refs)?);
        debug!(
            document_class = %document_class,
            samples = refs.len(),
            fields = schema.field_count(),
            "inferred schema from one document's baseline"
        );
        guard.insert(class_key(document_class), Arc::clone(&schema));
        Ok(schema)
    }
}

/// Configured schemas keyed by document class. Classes whose schema failed
/// validation keep their error so every section of that class reports it.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    schemas: HashMap<String, Result<Arc<DocumentSchema>, SchemaValidationError>>,
}

impl SchemaCatalog {
    pub fn from_raw(raw_schemas: &[serde_json::Value]) -> Self {
        let mut catalog = Self::default();
        for (index, raw) in raw_schemas.iter().enumerate() {
            let declared_class = raw
                .get("document_class")
                .or_else(|| raw.get("class"))
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| format!("<schema #{index}>"));

            let parsed = parse_document_schema(raw).map(Arc::new);
            if let Err(err) = &parsed {
                warn!(document_class = %declared_class, error = %err, "schema failed validation");
            }
            match catalog.schemas.entry(class_key(&declared_class)) {
                Entry::Vacant(slot) => {
                    slot.insert(parsed);
                }
                Entry::Occupied(mut slot) => {
                    let err = SchemaValidationError::new(
                        "document_class",
                        format!("class `{declared_class}` is configured more than once"),
                    );
                    warn!(
                        document_class = %declared_class,
                        error = %err,
                        "schema failed validation"
                    );
                    slot.insert(Err(err));
                }
            }
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn is_configured(&self, document_class: &str) -> bool {
        self.schemas.contains_key(&class_key(document_class))
    }

    pub fn entries(
        &self,
    ) -> impl Iterator<Item = &Result<Arc<DocumentSchema>, SchemaValidationError>> {
        self.schemas.values()
    }

    pub fn resolve(
        &self,
        document_class: &str,
        cache: &SchemaCache,
        baselines: impl FnOnce() -> Vec<FieldValue>,
    ) -> Result<Arc<DocumentSchema>, SchemaValidationError> {
        match self.schemas.get(&class_key(document_class)) {
            Some(configured) => configured.clone(),
            None => cache.get_or_infer(document_class, baselines),
        }
    }
}
