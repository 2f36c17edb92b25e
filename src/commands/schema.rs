use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use tracing::{error, info};

use crate::cli::{CheckSchemaArgs, InferSchemaArgs};
use crate::config::EvaluationConfig;
use crate::model::DocumentInput;
use crate::schema::{SchemaCatalog, infer_schema_from_samples};
use crate::util::{read_json, write_json_pretty};
use crate::value::FieldValue;

pub fn check(args: CheckSchemaArgs) -> Result<()> {
    let config = EvaluationConfig::load(Some(&args.config))?;
    if config.schemas.is_empty() {
        bail!("no schemas configured in {}", args.config.display());
    }

    let catalog = SchemaCatalog::from_raw(&config.schemas);
    let mut failures = Vec::<String>::new();
    for entry in catalog.entries() {
        match entry {
            Ok(schema) => info!(
                document_class = %schema.document_class(),
                fields = schema.field_count() - 1,
                digest = %schema.digest(),
                "schema valid"
            ),
            Err(err) => failures.push(err.to_string()),
        }
    }
    failures.sort();

    if !failures.is_empty() {
        for failure in &failures {
            error!(error = %failure, "schema invalid");
        }
        bail!(
            "{} of {} schema(s) invalid: {}",
            failures.len(),
            catalog.len(),
            failures.join("; ")
        );
    }

    info!(schemas = catalog.len(), path = %args.config.display(), "schema check passed");
    Ok(())
}

pub fn infer(args: InferSchemaArgs) -> Result<()> {
    let generated = generate_config(&args)?;

    match &args.output {
        Some(path) => {
            write_json_pretty(path, &generated)?;
            info!(path = %path.display(), "wrote inferred schema config");
        }
        None => {
            let rendered = serde_json::to_string_pretty(&generated)
                .context("failed to render inferred schema config")?;
            println!("{rendered}");
        }
    }
    Ok(())
}

pub fn generate_config(args: &InferSchemaArgs) -> Result<serde_json::Value> {
    let raw: serde_json::Value = read_json(&args.baseline)?;
    let wanted_class = args.document_class.as_deref().map(str::trim);

    let mut samples = BTreeMap::<String, Vec<FieldValue>>::new();
    if raw.get("sections").is_some() {
        let document: DocumentInput = serde_json::from_value(raw)
            .with_context(|| format!("failed to parse sections of {}", args.baseline.display()))?;
        for section in document.sections {
            let class = section.document_class.trim().to_string();
            if wanted_class.is_some_and(|wanted| !wanted.eq_ignore_ascii_case(&class)) {
                continue;
            }
            samples
                .entry(class)
                .or_default()
                .push(FieldValue::from(section.attributes));
        }
    } else {
        let class = wanted_class.with_context(|| {
            format!(
                "{} has no sections; pass --document-class for a bare attribute object",
                args.baseline.display()
            )
        })?;
        samples.insert(class.to_string(), vec![FieldValue::from(raw)]);
    }

    if samples.is_empty() {
        bail!("no matching sections found in {}", args.baseline.display());
    }

    let mut schemas = Vec::<serde_json::Value>::with_capacity(samples.len());
    for (class, values) in &samples {
        let refs = values.iter().collect::<Vec<&FieldValue>>();
        let schema = infer_schema_from_samples(class, &refs)
            .with_context(|| format!("failed to infer schema for class `{class}`"))?;
        info!(
            document_class = %class,
            samples = values.len(),
            fields = schema.field_count() - 1,
            "inferred schema"
        );
        schemas.push(schema.to_config_json());
    }

    Ok(serde_json::json!({ "schemas": schemas }))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{check, generate_config};
    use crate::cli::{CheckSchemaArgs, InferSchemaArgs};
    use crate::schema::{ComparisonMethod, SchemaCatalog};
    use crate::util::write_json_pretty;
    use serde_json::json;

    fn write(path: &Path, value: serde_json::Value) {
        write_json_pretty(path, &value).expect("fixture should be written");
    }

    #[test]
    fn check_reports_the_offending_path() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("config.json");
        write(
            &path,
            json!({"schemas": [
                {"document_class": "Invoice", "properties": {"Vendor": {"type": "string"}}},
                {"document_class": "Statement", "properties": {
                    "Lines": {"type": "array", "comparison_method": "FUZZY", "items": {"type": "object", "properties": {"Sku": {}}}}
                }}
            ]}),
        );

        let err = check(CheckSchemaArgs { config: path }).expect_err("invalid schema should fail");
        let message = err.to_string();
        assert!(message.contains("1 of 2"), "unexpected error: {message}");
        assert!(message.contains("`Lines`"), "unexpected error: {message}");
    }

    #[test]
    fn check_accepts_valid_config() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("config.json");
        write(
            &path,
            json!({"schemas": [{
                "document_class": "Invoice",
                "properties": {"Total": {"type": "number", "weight": 2}}
            }]}),
        );
        check(CheckSchemaArgs { config: path }).expect("valid schema should pass");
    }

    #[test]
    fn inferred_config_round_trips_through_the_catalog() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let baseline = temp.path().join("baseline.json");
        write(
            &baseline,
            json!({"sections": [
                {"section_id": "1", "document_class": "Receipt", "page_indices": [0],
                 "attributes": {"Store": "Corner Shop", "Items": [{"Name": "Milk", "Qty": 2}]}},
                {"section_id": "2", "document_class": "Receipt", "page_indices": [1],
                 "attributes": {"Store": "Deli", "Items": [{"Name": "Bread", "Price": 3.25}]}},
                {"section_id": "3", "document_class": "Letter", "page_indices": [2],
                 "attributes": {"Subject": "Hello"}}
            ]}),
        );

        let config = generate_config(&InferSchemaArgs {
            baseline: baseline.clone(),
            document_class: Some("receipt".to_string()),
            output: None,
        })
        .expect("inference should succeed");
        let schemas = config["schemas"].as_array().expect("schemas should be a list").clone();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["properties"]["Items"]["comparison_method"], "HUNGARIAN");
        let item_fields = schemas[0]["properties"]["Items"]["items"]["properties"]
            .as_object()
            .expect("item properties should be an object");
        assert_eq!(item_fields.len(), 3);

        let catalog = SchemaCatalog::from_raw(&schemas);
        let schema = catalog
            .entries()
            .next()
            .expect("one schema")
            .as_ref()
            .expect("generated schema should validate")
            .clone();
        let store = schema
            .property(schema.root(), "Store")
            .expect("Store field should exist");
        assert_eq!(schema.node(store).method, ComparisonMethod::Fuzzy);

        let bare = temp.path().join("bare.json");
        write(&bare, json!({"Subject": "Hello"}));
        assert!(generate_config(&InferSchemaArgs {
            baseline: bare,
            document_class: None,
            output: None,
        })
        .is_err());
    }
}
