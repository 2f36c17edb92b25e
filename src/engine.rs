//! Orchestrates one batch: documents in parallel, sections of a document in
//! parallel, all sharing read-only schemas and one explicit schema cache.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::aggregate::{document_metrics, section_metrics};
use crate::coerce::coerce_tree;
use crate::compare::{BothAbsentPolicy, ComparatorRegistry, CompareScope, DEFAULT_LARGE_LIST_CELLS};
use crate::model::{
    AccuracyMetrics, BatchSummary, DocumentInput, DocumentResult, DocumentStatus, SectionInput,
    SectionResult, SectionStatus, SplitMetrics,
};
use crate::schema::{SchemaCache, SchemaCatalog, class_key};
use crate::split::{SectionSplit, split_metrics};
use crate::tree::ComparedTree;
use crate::util::now_utc_string;
use crate::value::FieldValue;

#[derive(Debug, Clone, Copy)]
pub struct EvaluationOptions {
    pub policy: BothAbsentPolicy,
    pub large_list_cells: usize,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            policy: BothAbsentPolicy::default(),
            large_list_cells: DEFAULT_LARGE_LIST_CELLS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentPair {
    pub document_id: String,
    pub expected: Option<DocumentInput>,
    pub actual: DocumentInput,
}

pub struct Evaluator {
    catalog: SchemaCatalog,
    registry: ComparatorRegistry,
    options: EvaluationOptions,
}

impl Evaluator {
    pub fn new(
        catalog: SchemaCatalog,
        registry: ComparatorRegistry,
        options: EvaluationOptions,
    ) -> Self {
        Self {
            catalog,
            registry,
            options,
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn evaluate_batch(
        &self,
        pairs: &[DocumentPair],
        cache: &SchemaCache,
    ) -> Vec<DocumentResult> {
        self.infer_unconfigured_schemas(pairs, cache);
        pairs
            .par_iter()
            .map(|pair| self.evaluate_document(pair, cache))
            .collect()
    }

    /// Infers one schema per unconfigured class from every baseline section
    /// of that class in the batch, so no document sees a partial schema.
    pub fn infer_unconfigured_schemas(&self, pairs: &[DocumentPair], cache: &SchemaCache) {
        let mut samples = BTreeMap::<String, (&str, Vec<FieldValue>)>::new();
        let baseline_sections = pairs
            .iter()
            .filter_map(|pair| pair.expected.as_ref())
            .flat_map(|document| &document.sections);
        for section in baseline_sections {
            if self.catalog.is_configured(&section.document_class) {
                continue;
            }
            let Ok(tree) = section_tree(Some(section)) else {
                continue;
            };
            samples
                .entry(class_key(&section.document_class))
                .or_insert_with(|| (section.document_class.as_str(), Vec::new()))
                .1
                .push(tree);
        }

        for (class, trees) in samples.values() {
            let refs = trees.iter().collect::<Vec<&FieldValue>>();
            if let Err(err) = cache.infer(class, &refs) {
                warn!(document_class = %class, error = %err, "schema inference failed");
            }
        }
    }

    pub fn evaluate_document(&self, pair: &DocumentPair, cache: &SchemaCache) -> DocumentResult {
        let started = Instant::now();
        let evaluated_at = now_utc_string();

        let Some(expected) = &pair.expected else {
            warn!(document_id = %pair.document_id, "no baseline document; skipping comparison");
            return DocumentResult {
                document_id: pair.document_id.clone(),
                status: DocumentStatus::NoBaseline,
                evaluated_at,
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                metrics: AccuracyMetrics::default(),
                split: SplitMetrics::default(),
                sections: Vec::new(),
                warnings: vec!["no baseline document found".to_string()],
            };
        };

        let (section_pairs, mut warnings) =
            pair_sections(&expected.sections, &pair.actual.sections);
        let sections = section_pairs
            .par_iter()
            .map(|(expected_section, actual_section)| {
                self.evaluate_section(*expected_section, *actual_section, &expected.sections, cache)
            })
            .collect::<Vec<SectionResult>>();

        let metrics = document_metrics(
            &sections
                .iter()
                .map(|section| section.metrics)
                .collect::<Vec<AccuracyMetrics>>(),
        );
        let split = split_metrics(
            &expected.sections.iter().map(SectionSplit::from).collect::<Vec<_>>(),
            &pair.actual.sections.iter().map(SectionSplit::from).collect::<Vec<_>>(),
        );
        let failed = sections
            .iter()
            .filter(|section| section.status == SectionStatus::Failed)
            .count();
        if failed > 0 {
            warnings.push(format!("{failed} section(s) could not be evaluated"));
        }

        info!(
            document_id = %pair.document_id,
            sections = sections.len(),
            failed_sections = failed,
            weighted_overall_score = metrics.weighted_overall_score,
            f1_score = metrics.f1_score,
            page_level_accuracy = split.page_level_accuracy,
            "document evaluated"
        );

        DocumentResult {
            document_id: pair.document_id.clone(),
            status: DocumentStatus::Evaluated,
            evaluated_at,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            metrics,
            split,
            sections,
            warnings,
        }
    }

    fn evaluate_section(
        &self,
        expected: Option<&SectionInput>,
        actual: Option<&SectionInput>,
        baseline_sections: &[SectionInput],
        cache: &SchemaCache,
    ) -> SectionResult {
        let section_id = expected
            .or(actual)
            .map(|section| section.section_id.clone())
            .unwrap_or_default();
        let expected_class = expected.map(|section| section.document_class.clone());
        let actual_class = actual.map(|section| section.document_class.clone());

        let expected_tree = match section_tree(expected) {
            Ok(tree) => tree,
            Err(message) => {
                return SectionResult::failed(section_id, expected_class, actual_class, message);
            }
        };
        let actual_tree = match section_tree(actual) {
            Ok(tree) => tree,
            Err(message) => {
                return SectionResult::failed(section_id, expected_class, actual_class, message);
            }
        };

        // The baseline's class picks the schema. Inference only ever reads
        // baseline sections, even for an extra actual section.
        let class = expected_class
            .as_deref()
            .or(actual_class.as_deref())
            .unwrap_or_default();
        let same_class_baselines = || {
            baseline_sections
                .iter()
                .filter(|section| class_key(&section.document_class) == class_key(class))
                .filter_map(|section| section_tree(Some(section)).ok())
                .collect::<Vec<FieldValue>>()
        };
        let schema = match self.catalog.resolve(class, cache, same_class_baselines) {
            Ok(schema) => schema,
            Err(err) => {
                warn!(
                    section_id = %section_id,
                    document_class = %class,
                    error = %err,
                    "section not evaluated"
                );
                return SectionResult::failed(
                    section_id,
                    expected_class,
                    actual_class,
                    err.to_string(),
                );
            }
        };

        let mut coercion_warnings = Vec::new();
        let expected_coerced = coerce_tree(&schema, &expected_tree, &mut coercion_warnings);
        let expected_warning_count = coercion_warnings.len();
        let actual_coerced = coerce_tree(&schema, &actual_tree, &mut coercion_warnings);
        let warnings = coercion_warnings
            .iter()
            .enumerate()
            .map(|(index, warning)| {
                let side = if index < expected_warning_count { "expected" } else { "actual" };
                format!("{side}: {warning}")
            })
            .collect::<Vec<String>>();

        let scope = CompareScope::new(&schema, &self.registry)
            .with_policy(self.options.policy)
            .with_large_list_cells(self.options.large_list_cells);
        let tree = ComparedTree::build(&scope, &expected_coerced, &actual_coerced);
        let metrics = section_metrics(&tree.flattened, self.options.policy);

        SectionResult {
            section_id,
            expected_class,
            actual_class,
            status: SectionStatus::Evaluated,
            error: None,
            schema_origin: Some(schema.origin()),
            schema_digest: Some(schema.digest().to_string()),
            metrics,
            attributes: tree.attributes().to_vec(),
            flattened: tree.flattened,
            warnings,
        }
    }
}

type SectionPair<'a> = (Option<&'a SectionInput>, Option<&'a SectionInput>);

/// Pairs sections by id in baseline order, then appends unpaired actual
/// sections. Duplicate ids pair in order of appearance.
fn pair_sections<'a>(
    expected: &'a [SectionInput],
    actual: &'a [SectionInput],
) -> (Vec<SectionPair<'a>>, Vec<String>) {
    let mut pairs = Vec::<SectionPair<'a>>::with_capacity(expected.len().max(actual.len()));
    let mut warnings = Vec::<String>::new();
    let mut used = vec![false; actual.len()];

    for section in expected {
        let counterpart = actual
            .iter()
            .enumerate()
            .find(|(index, candidate)| !used[*index] && candidate.section_id == section.section_id);
        match counterpart {
            Some((index, candidate)) => {
                used[index] = true;
                pairs.push((Some(section), Some(candidate)));
            }
            None => {
                warnings.push(format!("section `{}` missing from actual", section.section_id));
                pairs.push((Some(section), None));
            }
        }
    }
    for (index, section) in actual.iter().enumerate() {
        if !used[index] {
            warnings.push(format!("section `{}` missing from baseline", section.section_id));
            pairs.push((None, Some(section)));
        }
    }
    (pairs, warnings)
}

fn section_tree(section: Option<&SectionInput>) -> Result<FieldValue, String> {
    let Some(section) = section else {
        return Ok(FieldValue::Null);
    };
    match &section.attributes {
        serde_json::Value::Null | serde_json::Value::Object(_) => {
            Ok(FieldValue::from(section.attributes.clone()))
        }
        other => Err(format!(
            "attributes of section `{}` must be a JSON object, got {}",
            section.section_id,
            FieldValue::from(other.clone()).kind()
        )),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0_f64, 0_usize), |(sum, count), value| {
        (sum + value, count + 1)
    });
    (count > 0).then(|| sum / count as f64)
}

pub fn summarize(documents: &[DocumentResult]) -> BatchSummary {
    let evaluated = documents
        .iter()
        .filter(|document| document.status == DocumentStatus::Evaluated)
        .collect::<Vec<&DocumentResult>>();

    let mut summary = BatchSummary {
        document_count: documents.len(),
        evaluated_count: evaluated.len(),
        no_baseline_count: documents.len() - evaluated.len(),
        failed_section_count: evaluated
            .iter()
            .flat_map(|document| &document.sections)
            .filter(|section| section.status == SectionStatus::Failed)
            .count(),
        mean_weighted_overall_score: mean(
            evaluated.iter().map(|document| document.metrics.weighted_overall_score),
        ),
        mean_f1_score: mean(evaluated.iter().map(|document| document.metrics.f1_score)),
        mean_page_level_accuracy: mean(
            evaluated.iter().map(|document| document.split.page_level_accuracy),
        ),
        mean_split_accuracy_without_order: mean(
            evaluated
                .iter()
                .map(|document| document.split.split_accuracy_without_order),
        ),
        mean_split_accuracy_with_order: mean(
            evaluated
                .iter()
                .map(|document| document.split.split_accuracy_with_order),
        ),
        ..BatchSummary::default()
    };
    for document in &evaluated {
        summary.counts.add(&document.metrics.counts);
    }
    summary
}
