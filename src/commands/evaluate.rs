use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cli::{EvaluateArgs, SemanticBackend};
use crate::compare::ComparatorRegistry;
use crate::compare::backend::{BackendGate, Backends};
use crate::config::{EvaluationConfig, EvaluationSettings};
use crate::engine::{DocumentPair, EvaluationOptions, Evaluator, summarize};
use crate::model::{DocumentInput, EvaluationReport, ReportOptions, SourceHash};
use crate::schema::{SchemaCache, SchemaCatalog};
use crate::semantic::HashedEmbeddingBackend;
use crate::util::{read_json, run_id_for, sha256_file, write_json_pretty};

pub const REPORT_FILE_NAME: &str = "evaluation_report.json";
const MANIFEST_VERSION: u32 = 1;

pub fn run(args: EvaluateArgs) -> Result<()> {
    let report = build_report(&args)?;

    if args.dry_run {
        info!(
            documents = report.summary.document_count,
            evaluated = report.summary.evaluated_count,
            no_baseline = report.summary.no_baseline_count,
            "evaluation dry-run complete"
        );
        return Ok(());
    }

    let report_path = report_path(&args);
    write_json_pretty(&report_path, &report)?;
    info!(path = %report_path.display(), "wrote evaluation report");
    info!(
        run_id = %report.run_id,
        documents = report.summary.document_count,
        evaluated = report.summary.evaluated_count,
        no_baseline = report.summary.no_baseline_count,
        failed_sections = report.summary.failed_section_count,
        mean_weighted_overall_score =
            report.summary.mean_weighted_overall_score.unwrap_or_default(),
        "evaluation completed"
    );

    Ok(())
}

fn report_path(args: &EvaluateArgs) -> PathBuf {
    args.report_path
        .clone()
        .unwrap_or_else(|| args.actual_dir.join(REPORT_FILE_NAME))
}

pub fn build_report(args: &EvaluateArgs) -> Result<EvaluationReport> {
    let started = Utc::now();
    let config = EvaluationConfig::load(args.config.as_deref())?;
    let settings = config.settings(args);

    let catalog = SchemaCatalog::from_raw(&config.schemas);
    let mut warnings = catalog
        .entries()
        .filter_map(|entry| entry.as_ref().err())
        .map(|err| format!("configured schema rejected: {err}"))
        .collect::<Vec<String>>();
    warnings.sort();

    let options = ReportOptions {
        semantic_backend: args.semantic_backend.as_str().to_string(),
        both_absent: settings.both_absent.as_str().to_string(),
        backend_max_concurrency: settings.backend_max_concurrency,
        backend_timeout_ms: settings.backend_timeout_ms,
        large_list_cells: settings.large_list_cells,
        configured_schema_count: catalog.len(),
    };
    let backends = backends_for(args.semantic_backend, &settings);
    debug!(
        embedding = backends.embedding_name(),
        judge = backends.judge_name(),
        max_concurrency = settings.backend_max_concurrency,
        timeout_ms = settings.backend_timeout_ms,
        "comparator backends configured"
    );
    let evaluator = Evaluator::new(
        catalog,
        ComparatorRegistry::new(backends),
        EvaluationOptions {
            policy: settings.both_absent,
            large_list_cells: settings.large_list_cells,
        },
    );

    let excluded_report = report_path(args);
    let mut actual_paths = discover_documents(&args.actual_dir)?
        .into_iter()
        .filter(|path| !same_file(path, &excluded_report))
        .collect::<Vec<PathBuf>>();
    actual_paths.sort();
    if actual_paths.is_empty() {
        bail!("no JSON documents found in {}", args.actual_dir.display());
    }

    let mut source_hashes = Vec::<SourceHash>::new();
    if let Some(config_path) = &args.config {
        source_hashes.push(hash_entry(config_path)?);
    }
    let mut pairs = Vec::<DocumentPair>::with_capacity(actual_paths.len());
    for actual_path in &actual_paths {
        let pair = load_pair(actual_path, &args.baseline_dir, &mut source_hashes)?;
        if pair.expected.is_none() {
            warnings.push(format!("no baseline for document `{}`", pair.document_id));
        }
        pairs.push(pair);
    }
    info!(
        documents = pairs.len(),
        configured_schemas = options.configured_schema_count,
        both_absent = %options.both_absent,
        semantic_backend = %options.semantic_backend,
        "evaluating documents"
    );

    let cache = SchemaCache::new();
    let documents = match args.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .with_context(|| format!("failed to build a worker pool with {threads} threads"))?
            .install(|| evaluator.evaluate_batch(&pairs, &cache)),
        None => evaluator.evaluate_batch(&pairs, &cache),
    };
    if !cache.is_empty() {
        info!(inferred_schemas = cache.len(), "schemas inferred for unconfigured classes");
    }

    Ok(EvaluationReport {
        manifest_version: MANIFEST_VERSION,
        run_id: run_id_for(started),
        generated_at: crate::util::now_utc_string(),
        command: "evaluate".to_string(),
        config_path: args.config.as_ref().map(|path| path.display().to_string()),
        options,
        summary: summarize(&documents),
        documents,
        source_hashes,
        warnings,
    })
}

fn backends_for(kind: SemanticBackend, settings: &EvaluationSettings) -> Backends {
    let backends = Backends::none().with_gate(BackendGate::new(
        settings.backend_max_concurrency,
        settings.backend_timeout_ms,
    ));
    match kind {
        SemanticBackend::None => backends,
        SemanticBackend::LocalHash => {
            backends.with_embedding(Arc::new(HashedEmbeddingBackend::default()))
        }
    }
}

fn load_pair(
    actual_path: &Path,
    baseline_dir: &Path,
    source_hashes: &mut Vec<SourceHash>,
) -> Result<DocumentPair> {
    let file_name = actual_path
        .file_name()
        .context("document path has no file name")?;
    let stem = actual_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", actual_path.display()))?;

    let actual: DocumentInput = read_json(actual_path)?;
    source_hashes.push(hash_entry(actual_path)?);

    let baseline_path = baseline_dir.join(file_name);
    let expected = if baseline_path.is_file() {
        source_hashes.push(hash_entry(&baseline_path)?);
        Some(read_json::<DocumentInput>(&baseline_path)?)
    } else {
        warn!(path = %baseline_path.display(), "baseline document missing");
        None
    };

    let document_id = actual
        .document_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(stem);
    Ok(DocumentPair {
        document_id,
        expected,
        actual,
    })
}

fn hash_entry(path: &Path) -> Result<SourceHash> {
    Ok(SourceHash {
        path: path.display().to_string(),
        sha256: sha256_file(path)?,
    })
}

fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            documents.push(path);
        }
    }

    Ok(documents)
}

fn same_file(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}
