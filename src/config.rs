use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::EvaluateArgs;
use crate::compare::backend::{DEFAULT_BACKEND_MAX_CONCURRENCY, DEFAULT_BACKEND_TIMEOUT_MS};
use crate::compare::{BothAbsentPolicy, DEFAULT_LARGE_LIST_CELLS};
use crate::util::read_json;

/// Evaluation config file. Every key is optional and unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub schemas: Vec<serde_json::Value>,
    #[serde(default)]
    pub both_absent: Option<BothAbsentPolicy>,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub large_list_cells: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationSettings {
    pub both_absent: BothAbsentPolicy,
    pub large_list_cells: usize,
    pub backend_max_concurrency: usize,
    pub backend_timeout_ms: u64,
}

impl EvaluationConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => read_json(path)
                .with_context(|| format!("failed to load evaluation config {}", path.display())),
            None => Ok(Self::default()),
        }
    }

    pub fn settings(&self, args: &EvaluateArgs) -> EvaluationSettings {
        EvaluationSettings {
            both_absent: args
                .both_absent
                .map(BothAbsentPolicy::from)
                .or(self.both_absent)
                .unwrap_or_default(),
            large_list_cells: args
                .large_list_cells
                .or(self.large_list_cells)
                .unwrap_or(DEFAULT_LARGE_LIST_CELLS),
            backend_max_concurrency: args
                .backend_max_concurrency
                .or(self.backend.max_concurrency)
                .unwrap_or(DEFAULT_BACKEND_MAX_CONCURRENCY),
            backend_timeout_ms: args
                .backend_timeout_ms
                .or(self.backend.timeout_ms)
                .unwrap_or(DEFAULT_BACKEND_TIMEOUT_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::EvaluationConfig;
    use crate::cli::{BothAbsentMode, EvaluateArgs, SemanticBackend};
    use crate::compare::BothAbsentPolicy;
    use crate::util::write_json_pretty;
    use serde_json::json;

    fn args() -> EvaluateArgs {
        EvaluateArgs {
            config: None,
            baseline_dir: PathBuf::from("baseline"),
            actual_dir: PathBuf::from("actual"),
            report_path: None,
            semantic_backend: SemanticBackend::None,
            backend_max_concurrency: None,
            backend_timeout_ms: None,
            both_absent: None,
            large_list_cells: None,
            threads: None,
            dry_run: false,
        }
    }

    #[test]
    fn cli_flags_override_file_values() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("config.json");
        write_json_pretty(
            &path,
            &json!({
                "schemas": [{"document_class": "Invoice", "properties": {}}],
                "both_absent": "true_negative",
                "backend": {"max_concurrency": 2, "timeout_ms": 500},
                "large_list_cells": 50,
                "owner": "ignored"
            }),
        )
        .expect("config should be written");

        let config = EvaluationConfig::load(Some(&path)).expect("config should load");
        assert_eq!(config.schemas.len(), 1);

        let from_file = config.settings(&args());
        assert_eq!(from_file.both_absent, BothAbsentPolicy::TrueNegative);
        assert_eq!(from_file.backend_max_concurrency, 2);
        assert_eq!(from_file.backend_timeout_ms, 500);
        assert_eq!(from_file.large_list_cells, 50);

        let mut overridden = args();
        overridden.both_absent = Some(BothAbsentMode::Exclude);
        overridden.backend_timeout_ms = Some(0);
        let merged = config.settings(&overridden);
        assert_eq!(merged.both_absent, BothAbsentPolicy::Exclude);
        assert_eq!(merged.backend_timeout_ms, 0);
        assert_eq!(merged.backend_max_concurrency, 2);
    }

    #[test]
    fn missing_config_uses_defaults() {
        let settings = EvaluationConfig::load(None)
            .expect("default config should load")
            .settings(&args());
        assert_eq!(settings.both_absent, BothAbsentPolicy::Exclude);
        assert_eq!(settings.large_list_cells, 10_000);
        assert_eq!(settings.backend_max_concurrency, 4);
        assert_eq!(settings.backend_timeout_ms, 10_000);
    }
}
