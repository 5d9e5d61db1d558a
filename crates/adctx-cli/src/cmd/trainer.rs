//! Stub trainer: drains a batch from the training queue and previews it.
//!
//! Model refinement itself happens elsewhere; this is the consumer side of
//! the claim hand-off.

use crate::ui;
use adctx_kernel::MemoryKernel;
use adctx_types::memory::{QaPair, TrainingSample};
use anyhow::Context;
use colored::Colorize;

/// Samples shown after a claim.
const PREVIEW_COUNT: usize = 5;
/// Characters shown per previewed sample.
const PREVIEW_CHARS: usize = 80;

/// Parsed view of one claimed batch.
#[derive(Debug, Default)]
pub struct Batch {
    pub pairs: Vec<QaPair>,
    /// Samples not in the two-line question/answer format.
    pub malformed: usize,
}

/// Split a claimed batch into well-formed pairs and a malformed count.
pub fn parse_batch(samples: &[TrainingSample]) -> Batch {
    let mut batch = Batch::default();
    for sample in samples {
        match QaPair::parse(&sample.text) {
            Some(pair) => batch.pairs.push(pair),
            None => batch.malformed += 1,
        }
    }
    batch
}

/// One-line preview: newlines flattened, cut at `PREVIEW_CHARS`.
pub fn preview_line(text: &str) -> String {
    let flat = text.replace('\n', "  ");
    let mut line: String = flat.chars().take(PREVIEW_CHARS).collect();
    if flat.chars().count() > PREVIEW_CHARS {
        line.push('\u{2026}');
    }
    line
}

pub async fn cmd_claim(kernel: &MemoryKernel, ns: &str, batch: usize) -> anyhow::Result<()> {
    let samples = kernel
        .claim(ns, batch)
        .await
        .with_context(|| format!("claiming training batch from '{ns}'"))?;
    let parsed = parse_batch(&samples);

    ui::section(&format!(
        "Claimed {} samples for ns='{ns}' (stub trainer)",
        samples.len()
    ));
    for sample in samples.iter().take(PREVIEW_COUNT) {
        println!("  {} {}", "\u{2022}".dimmed(), preview_line(&sample.text));
    }
    if samples.len() > PREVIEW_COUNT {
        ui::hint(&format!("{} more not shown", samples.len() - PREVIEW_COUNT));
    }
    ui::blank();
    ui::kv("Q/A pairs", parsed.pairs.len());
    if parsed.malformed > 0 {
        ui::kv(
            "Malformed",
            format!("{} skipped", parsed.malformed).bright_yellow(),
        );
    }
    Ok(())
}
