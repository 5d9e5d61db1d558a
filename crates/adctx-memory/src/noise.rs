//! Ingest noise filter.
//!
//! Drops lines made mostly of tokens whose length is far from the local
//! median (hex dumps, hashes, keyboard mashing). Each token is compared
//! against its neighbours in the whole token stream, so a single-token
//! line is still judged against the lines around it.

use adctx_types::error::{AdctxError, AdctxResult};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Neighbours on each side of a token.
const WINDOW: usize = 4;
/// Length deviation from the window median that marks a token anomalous.
const LEN_THRESH: f64 = 6.0;
/// A line is dropped when at least this share of its tokens is anomalous.
const LINE_NOISE_RATIO: f64 = 0.5;

fn token_splitter() -> AdctxResult<&'static Regex> {
    static SPLIT: OnceLock<Result<Regex, String>> = OnceLock::new();
    SPLIT
        .get_or_init(|| Regex::new(r"\W+").map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| AdctxError::Internal(format!("token pattern: {e}")))
}

fn tokenize<'a>(splitter: &Regex, line: &'a str) -> Vec<&'a str> {
    splitter.split(line).filter(|t| !t.is_empty()).collect()
}

fn median(values: &mut [usize]) -> f64 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) as f64 / 2.0
    } else {
        values[mid] as f64
    }
}

/// Remove noisy and empty lines from `text`. Surviving lines are joined
/// with `\n`.
pub fn preprocess(text: &str) -> AdctxResult<String> {
    let splitter = token_splitter()?;
    let lines: Vec<&str> = text.lines().collect();
    // (line index, token length) for every token in reading order.
    let tokens: Vec<(usize, usize)> = lines
        .iter()
        .enumerate()
        .flat_map(|(line_no, line)| {
            tokenize(splitter, line)
                .into_iter()
                .map(move |tok| (line_no, tok.chars().count()))
        })
        .collect();

    let mut totals = vec![0usize; lines.len()];
    let mut anomalies = vec![0usize; lines.len()];
    for (i, &(line_no, len)) in tokens.iter().enumerate() {
        let start = i.saturating_sub(WINDOW);
        let end = (i + WINDOW + 1).min(tokens.len());
        let mut window: Vec<usize> = tokens[start..end].iter().map(|&(_, l)| l).collect();
        totals[line_no] += 1;
        if (len as f64 - median(&mut window)).abs() >= LEN_THRESH {
            anomalies[line_no] += 1;
        }
    }

    Ok(lines
        .iter()
        .enumerate()
        .filter(|&(n, _)| {
            totals[n] > 0 && (anomalies[n] as f64 / totals[n] as f64) < LINE_NOISE_RATIO
        })
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n"))
}
