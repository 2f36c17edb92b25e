use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::compare::BothAbsentPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "doceval",
    version,
    about = "Schema-driven comparison of extracted documents against baselines"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Evaluate(EvaluateArgs),
    CheckSchema(CheckSchemaArgs),
    InferSchema(InferSchemaArgs),
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub baseline_dir: PathBuf,

    #[arg(long)]
    pub actual_dir: PathBuf,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = SemanticBackend::None)]
    pub semantic_backend: SemanticBackend,

    #[arg(long)]
    pub backend_max_concurrency: Option<usize>,

    #[arg(long)]
    pub backend_timeout_ms: Option<u64>,

    #[arg(long, value_enum)]
    pub both_absent: Option<BothAbsentMode>,

    #[arg(long)]
    pub large_list_cells: Option<usize>,

    #[arg(long)]
    pub threads: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SemanticBackend {
    None,
    LocalHash,
}

impl SemanticBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::LocalHash => "local-hash",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum BothAbsentMode {
    Exclude,
    TrueNegative,
}

impl From<BothAbsentMode> for BothAbsentPolicy {
    fn from(mode: BothAbsentMode) -> Self {
        match mode {
            BothAbsentMode::Exclude => Self::Exclude,
            BothAbsentMode::TrueNegative => Self::TrueNegative,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CheckSchemaArgs {
    #[arg(long)]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct InferSchemaArgs {
    /// Baseline document (`{"sections": [...]}`) or a bare attribute object.
    #[arg(long)]
    pub baseline: PathBuf,

    /// Restrict inference to sections of this class.
    #[arg(long)]
    pub document_class: Option<String>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Report written by `evaluate`.
    #[arg(long)]
    pub report: PathBuf,

    #[arg(long)]
    pub document_id: String,

    #[arg(long)]
    pub section_id: Option<String>,

    /// Print only the subtree below this field path, e.g. `Lines[0]`.
    #[arg(long)]
    pub path: Option<String>,
}
