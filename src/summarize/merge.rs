//! Merging ordered partial summaries into the final summary.

use super::cumulative::PartialSummary;
use crate::error::{Error, Result};
use crate::provider::Usage;
use serde::Serialize;
use std::collections::HashSet;

/// The merged result of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalSummary {
    pub executive_summary: String,
    /// Deduplicated, in order of first appearance.
    pub keywords: Vec<String>,
    /// Per-chunk detailed summaries, each under a `[Part i/n]` header.
    pub detailed_summary: String,
    /// Number of partial summaries merged.
    pub parts: usize,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Keep at most this many keywords.
    pub max_keywords: Option<usize>,
}

/// Merge with default options.
pub fn merge(partials: &[PartialSummary]) -> Result<FinalSummary> {
    merge_with(partials, &MergeOptions::default())
}

/// Merge partials that must be in chunk order, starting at 0.
///
/// The executive summary is taken from the last partial only; the running
/// context already carried earlier executive summaries into it.
pub fn merge_with(partials: &[PartialSummary], options: &MergeOptions) -> Result<FinalSummary> {
    let Some(last) = partials.last() else {
        return Err(Error::EmptyInput("no partial summaries to merge".into()));
    };

    for (expected, partial) in partials.iter().enumerate() {
        if partial.chunk_index != expected {
            return Err(Error::PartialOrder {
                expected,
                found: partial.chunk_index,
            });
        }
    }

    let mut keywords = dedup_keywords(partials.iter().flat_map(|p| &p.keywords));
    if let Some(max) = options.max_keywords {
        keywords.truncate(max);
    }

    let total = partials.len();
    let detailed_summary = partials
        .iter()
        .map(|p| {
            format!(
                "[Part {}/{}]\n{}",
                p.chunk_index + 1,
                total,
                p.detailed_summary.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut usage = Usage::default();
    for partial in partials {
        usage += partial.usage;
    }

    Ok(FinalSummary {
        executive_summary: last.executive_summary.trim().to_string(),
        keywords,
        detailed_summary,
        parts: total,
        usage,
    })
}

/// Case-insensitive dedup that keeps the first spelling seen.
fn dedup_keywords<'a>(keywords: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .map(|kw| kw.trim())
        .filter(|kw| !kw.is_empty())
        .filter(|kw| seen.insert(kw.to_lowercase()))
        .map(str::to_string)
        .collect()
}
