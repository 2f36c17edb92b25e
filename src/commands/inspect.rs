use std::io::{self, Write};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::cli::InspectArgs;
use crate::model::DocumentResult;
use crate::tree::PathTree;
use crate::util::read_json;

#[derive(Debug, Deserialize)]
struct StoredReport {
    documents: Vec<DocumentResult>,
}

pub fn run(args: InspectArgs) -> Result<()> {
    let report: StoredReport = read_json(&args.report)?;
    let document = report
        .documents
        .iter()
        .find(|document| document.document_id == args.document_id)
        .with_context(|| {
            format!(
                "document `{}` not found in {}",
                args.document_id,
                args.report.display()
            )
        })?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    write_document(
        &mut output,
        document,
        args.section_id.as_deref(),
        args.path.as_deref(),
    )?;
    output.flush()?;
    Ok(())
}

/// Re-nests each section's flattened leaves and prints the hierarchy, or only
/// the subtree rooted at `path`.
pub fn write_document(
    output: &mut impl Write,
    document: &DocumentResult,
    section_id: Option<&str>,
    path: Option<&str>,
) -> Result<()> {
    let sections = document
        .sections
        .iter()
        .filter(|section| section_id.is_none_or(|id| section.section_id == id))
        .collect::<Vec<_>>();
    if sections.is_empty() {
        bail!(
            "section `{}` not found in document `{}`",
            section_id.unwrap_or_default(),
            document.document_id
        );
    }

    writeln!(
        output,
        "Document: {} score={:.3} f1={:.3}",
        document.document_id, document.metrics.weighted_overall_score, document.metrics.f1_score
    )?;
    for section in sections {
        let class = section
            .expected_class
            .as_deref()
            .or(section.actual_class.as_deref())
            .unwrap_or_default();
        writeln!(
            output,
            "Section: {} class={} score={:.3}",
            section.section_id, class, section.metrics.weighted_overall_score
        )?;
        if let Some(error) = &section.error {
            writeln!(output, "  error: {error}")?;
            continue;
        }

        let tree = PathTree::renest(&section.flattened)
            .map_err(|err| anyhow!("section `{}`: {err}", section.section_id))?;
        let node = match path {
            Some(path) => tree.find(path).with_context(|| {
                format!("path `{path}` not found in section `{}`", section.section_id)
            })?,
            None => &tree,
        };
        write_node(output, node, 1)?;
    }
    Ok(())
}

fn write_node(output: &mut impl Write, node: &PathTree, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    let mut child_depth = depth + 1;
    match &node.outcome {
        Some(outcome) => writeln!(
            output,
            "{indent}{} [{}] matched={} score={:.3} :: {}",
            node.path, outcome.method, outcome.matched, outcome.score, outcome.reason
        )?,
        None if node.path.is_empty() => child_depth = depth,
        None => {
            let leaves = node.leaves();
            let matched = leaves.iter().filter(|leaf| leaf.matched).count();
            writeln!(
                output,
                "{indent}{} ({matched}/{} leaves matched)",
                node.path,
                leaves.len()
            )?;
        }
    }
    for child in &node.children {
        write_node(output, child, child_depth)?;
    }
    Ok(())
}
