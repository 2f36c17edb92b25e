use serde::{Deserialize, Serialize};

use crate::schema::{ComparisonMethod, SchemaOrigin};
use crate::value::FieldValue;

pub const INFERRED_SCHEMA_NOTE: &str = "schema inferred (no config)";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInput {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub sections: Vec<SectionInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionInput {
    #[serde(alias = "id")]
    pub section_id: String,
    #[serde(alias = "class")]
    pub document_class: String,
    #[serde(default, alias = "pages")]
    pub page_indices: Vec<u32>,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Both,
    ExpectedOnly,
    ActualOnly,
    Neither,
}

impl Presence {
    pub fn of(expected: &FieldValue, actual: &FieldValue) -> Self {
        match (expected.is_absent(), actual.is_absent()) {
            (false, false) => Self::Both,
            (false, true) => Self::ExpectedOnly,
            (true, false) => Self::ActualOnly,
            (true, true) => Self::Neither,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    pub path: String,
    pub expected: FieldValue,
    pub actual: FieldValue,
    pub matched: bool,
    pub score: f64,
    pub weight: f64,
    pub weighted_score: f64,
    pub method: ComparisonMethod,
    pub reason: String,
    pub presence: Presence,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub schema_inferred: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_comparison_details: Vec<ComparisonOutcome>,
}

impl ComparisonOutcome {
    /// Scores are clamped into `[0, 1]`; NaN becomes zero.
    pub fn new(
        path: impl Into<String>,
        expected: &FieldValue,
        actual: &FieldValue,
        method: ComparisonMethod,
        score: f64,
        matched: bool,
        reason: impl Into<String>,
    ) -> Self {
        let score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        Self {
            path: path.into(),
            expected: expected.clone(),
            actual: actual.clone(),
            matched,
            score,
            weight: 1.0,
            weighted_score: score,
            method,
            reason: reason.into(),
            presence: Presence::of(expected, actual),
            schema_inferred: false,
            field_comparison_details: Vec::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self.weighted_score = self.score * weight;
        self
    }

    pub fn with_details(mut self, details: Vec<ComparisonOutcome>) -> Self {
        self.field_comparison_details = details;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.field_comparison_details.is_empty()
    }

    pub fn mark_schema_inferred(&mut self) {
        if !self.schema_inferred {
            self.schema_inferred = true;
            self.reason = format!("{}; {INFERRED_SCHEMA_NOTE}", self.reason);
        }
        for detail in &mut self.field_comparison_details {
            detail.mark_schema_inferred();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
}

impl ConfusionCounts {
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }

    pub fn add(&mut self, other: &ConfusionCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
        self.true_negatives += other.true_negatives;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
    pub false_alarm_rate: f64,
    pub false_discovery_rate: f64,
    pub weighted_overall_score: f64,
    pub counts: ConfusionCounts,
    pub counted_fields: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Evaluated,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResult {
    pub section_id: String,
    pub expected_class: Option<String>,
    pub actual_class: Option<String>,
    pub status: SectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_origin: Option<SchemaOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_digest: Option<String>,
    pub metrics: AccuracyMetrics,
    pub attributes: Vec<ComparisonOutcome>,
    pub flattened: Vec<ComparisonOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SectionResult {
    pub fn failed(
        section_id: impl Into<String>,
        expected_class: Option<String>,
        actual_class: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            section_id: section_id.into(),
            expected_class,
            actual_class,
            status: SectionStatus::Failed,
            error: Some(error.into()),
            schema_origin: None,
            schema_digest: None,
            metrics: AccuracyMetrics::default(),
            attributes: Vec::new(),
            flattened: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub page_level_accuracy: f64,
    pub split_accuracy_without_order: f64,
    pub split_accuracy_with_order: f64,
    pub total_pages: usize,
    pub total_splits: usize,
    pub correctly_classified_pages: usize,
    pub correctly_split_without_order: usize,
    pub correctly_split_with_order: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Evaluated,
    NoBaseline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub document_id: String,
    pub status: DocumentStatus,
    pub evaluated_at: String,
    pub duration_ms: f64,
    pub metrics: AccuracyMetrics,
    pub split: SplitMetrics,
    pub sections: Vec<SectionResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceHash {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportOptions {
    pub semantic_backend: String,
    pub both_absent: String,
    pub backend_max_concurrency: usize,
    pub backend_timeout_ms: u64,
    pub large_list_cells: usize,
    pub configured_schema_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub document_count: usize,
    pub evaluated_count: usize,
    pub no_baseline_count: usize,
    pub failed_section_count: usize,
    pub mean_weighted_overall_score: Option<f64>,
    pub mean_f1_score: Option<f64>,
    pub mean_page_level_accuracy: Option<f64>,
    pub mean_split_accuracy_without_order: Option<f64>,
    pub mean_split_accuracy_with_order: Option<f64>,
    pub counts: ConfusionCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub command: String,
    pub config_path: Option<String>,
    pub options: ReportOptions,
    pub summary: BatchSummary,
    pub documents: Vec<DocumentResult>,
    pub source_hashes: Vec<SourceHash>,
    pub warnings: Vec<String>,
}
