//! Memory commands: add, update, query, defrag, export, import, stats.

use crate::ui;
use adctx_kernel::MemoryKernel;
use adctx_types::memory::{ChunkMetadata, DefragStatus, ExportFormat, SearchHit};
use anyhow::Context;
use colored::Colorize;
use std::io::Write;
use std::path::Path;

pub async fn cmd_add(kernel: &MemoryKernel, ns: &str, text: &str) -> anyhow::Result<()> {
    let outcome = kernel
        .add(ns, text, ChunkMetadata::default())
        .await
        .with_context(|| format!("adding to '{ns}'"))?;
    ui::success(&format!(
        "Memorized in '{}' at position {} (chunk {})",
        outcome.namespace, outcome.position, outcome.chunk_id
    ));
    Ok(())
}

pub async fn cmd_update(
    kernel: &MemoryKernel,
    ns: &str,
    question: &str,
    answer: &str,
) -> anyhow::Result<()> {
    let outcome = kernel
        .update(ns, question, answer)
        .await
        .with_context(|| format!("updating '{ns}'"))?;
    ui::success(&format!(
        "Q/A pair memorized in '{}' (chunk {})",
        outcome.namespace, outcome.chunk_id
    ));
    Ok(())
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }
    for (rank, hit) in hits.iter().enumerate() {
        let source = hit.metadata.source.as_deref().unwrap_or("-");
        println!(
            "  {:>2}. {} {}",
            rank + 1,
            format!("{:.4}", hit.score).bright_cyan(),
            format!("[{source}]").dimmed()
        );
        for line in hit.text.lines() {
            println!("      {line}");
        }
    }
}

pub async fn cmd_query(
    kernel: &MemoryKernel,
    ns: &str,
    query: &str,
    k: usize,
    json: bool,
) -> anyhow::Result<()> {
    let hits = kernel
        .search(ns, query, k)
        .await
        .with_context(|| format!("searching '{ns}'"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        print_hits(&hits);
    }
    Ok(())
}

pub async fn cmd_defrag(kernel: &MemoryKernel, ns: &str) -> anyhow::Result<()> {
    let report = kernel
        .defrag(ns)
        .await
        .with_context(|| format!("defragmenting '{ns}'"))?;
    match report.status {
        DefragStatus::Noop => ui::success(&format!(
            "'{}' has no duplicates ({} chunks)",
            report.namespace, report.before
        )),
        DefragStatus::Done if report.removed == 0 => ui::success(&format!(
            "'{}' durable log rewritten ({} chunks)",
            report.namespace, report.after
        )),
        DefragStatus::Done => ui::success(&format!(
            "'{}' compacted: {} -> {} ({} removed)",
            report.namespace, report.before, report.after, report.removed
        )),
        DefragStatus::Partial => ui::warn_with_fix(
            &format!(
                "'{}' compacted in memory ({} -> {}) but the log rewrite failed: {}",
                report.namespace,
                report.before,
                report.after,
                report.error.as_deref().unwrap_or("unknown error")
            ),
            "check the database and rerun `adctx defrag`",
        ),
    }
    Ok(())
}

pub async fn cmd_export(
    kernel: &MemoryKernel,
    ns: &str,
    format: ExportFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let bytes = kernel
        .export_bytes(ns, format)
        .await
        .with_context(|| format!("exporting '{ns}'"))?;
    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            ui::success(&format!(
                "Exported '{ns}' to {} ({} bytes)",
                path.display(),
                bytes.len()
            ));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            if format == ExportFormat::Json {
                writeln!(stdout)?;
            }
        }
    }
    Ok(())
}

pub async fn cmd_import(
    kernel: &MemoryKernel,
    ns: &str,
    path: &Path,
    format: ExportFormat,
) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let report = kernel
        .import_bytes(ns, &data, format)
        .await
        .with_context(|| format!("importing into '{ns}'"))?;
    ui::success(&format!(
        "Imported {} texts into '{ns}' ({} skipped)",
        report.imported, report.skipped
    ));
    for err in &report.errors {
        ui::warn(err);
    }
    Ok(())
}

pub async fn cmd_stats(kernel: &MemoryKernel, ns: &str) -> anyhow::Result<()> {
    let stats = kernel.stats(ns).await?;
    let pending = kernel.pending(ns).await?;
    ui::section(&format!("Namespace '{}'", stats.namespace));
    ui::kv("Chunks", stats.size);
    ui::kv(
        "Dimension",
        stats
            .dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    ui::kv("Pending", pending);
    if stats.rebuild_required {
        ui::kv(
            "Rebuild",
            "required (chunks from another encoder or not recovered)".bright_yellow(),
        );
    } else {
        ui::kv("Rebuild", "not needed".bright_green());
    }
    Ok(())
}

pub fn cmd_namespaces(kernel: &MemoryKernel) {
    let names = kernel.namespaces();
    if names.is_empty() {
        println!("No namespaces yet.");
        ui::hint("adctx add \"some text\" --ns <name>");
        return;
    }
    for name in names {
        println!("  {name}");
    }
}
