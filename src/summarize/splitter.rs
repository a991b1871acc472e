//! Token-budgeted document splitting.
//!
//! A document is cut into ordered chunks whose spans partition the text
//! exactly. Cuts prefer natural boundaries, trying each [`SplitStrategy`] in
//! priority order: whole paragraphs, then sentences, then whitespace between
//! words, and only as a last resort a cut between characters of a single
//! oversized word. A segment that cannot fit the budget on its own is handed
//! to the next strategy; everything else is packed greedily at the current
//! level.

use super::counter::TokenCounter;
use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

/// Blank-line run separating paragraphs (tolerates CRLF and indented blanks).
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n[ \t\r]*\n\s*").expect("PARAGRAPH_BREAK must be a valid regex")
});

/// A word with its trailing whitespace.
static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+\s*").expect("WORD must be a valid regex"));

/// One budget-sized piece of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the chunk sequence, from 0 without gaps.
    pub index: usize,
    /// Byte offset of the span start in the document text.
    pub start: usize,
    /// Byte offset one past the span end.
    pub end: usize,
    /// The span with surrounding whitespace trimmed; what gets summarized.
    pub text: String,
    /// Tokens in `text`.
    pub token_count: usize,
}

impl Chunk {
    #[must_use]
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Boundary kinds, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    Paragraph,
    Sentence,
    Whitespace,
    Character,
}

impl SplitStrategy {
    /// All strategies, highest priority first.
    pub const PRIORITY: [Self; 4] = [
        Self::Paragraph,
        Self::Sentence,
        Self::Whitespace,
        Self::Character,
    ];

    /// The strategy to defer to when a segment is too large for this one.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let pos = Self::PRIORITY.iter().position(|s| *s == self)?;
        Self::PRIORITY.get(pos + 1).copied()
    }

    /// Cut `range` of `text` into segments that partition it exactly.
    ///
    /// Whitespace between segments is attached to the segment before it, so
    /// no segment is blank unless the whole range is.
    fn segments(self, text: &str, range: Range<usize>) -> Vec<Range<usize>> {
        let slice = &text[range.clone()];
        let base = range.start;

        let mut starts: Vec<usize> = match self {
            Self::Paragraph => std::iter::once(0)
                .chain(PARAGRAPH_BREAK.find_iter(slice).map(|m| m.end()))
                .collect(),
            Self::Sentence => slice
                .split_sentence_bound_indices()
                .map(|(offset, _)| offset)
                .collect(),
            Self::Whitespace => std::iter::once(0)
                .chain(WORD.find_iter(slice).map(|m| m.start()))
                .collect(),
            Self::Character => slice.char_indices().map(|(offset, _)| offset).collect(),
        };
        starts.retain(|&s| s < slice.len());
        starts.dedup();

        let mut segments: Vec<Range<usize>> = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(slice.len());
            segments.push(base + start..base + end);
        }
        absorb_blank(text, segments)
    }
}

/// Merge whitespace-only segments into the previous segment (or the next one
/// when the blank segment comes first).
fn absorb_blank(text: &str, segments: Vec<Range<usize>>) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(segments.len());
    let mut leading: Option<Range<usize>> = None;

    for seg in segments {
        if !text[seg.clone()].trim().is_empty() {
            let start = leading.take().map_or(seg.start, |blank| blank.start);
            merged.push(start..seg.end);
            continue;
        }
        match merged.last_mut() {
            Some(last) => last.end = seg.end,
            None => leading.get_or_insert(seg.clone()).end = seg.end,
        }
    }

    // Only reachable when the whole range is blank.
    merged.extend(leading);
    merged
}

/// Outcome of trying to start a chunk at one segment.
enum Step {
    /// Segments `i..next` fit together; emit their span.
    Fits { span: Range<usize>, next: usize },
    /// Segment `i` alone is over budget; hand it to the next strategy.
    Defer { span: Range<usize>, next: usize },
}

struct Splitter<'a> {
    text: &'a str,
    max_tokens: usize,
    counter: &'a dyn TokenCounter,
}

impl Splitter<'_> {
    /// Tokens the chunk for `range` would carry.
    fn measure(&self, range: Range<usize>) -> usize {
        self.counter.count_tokens(self.text[range].trim())
    }

    fn fits(&self, range: Range<usize>) -> bool {
        self.measure(range) <= self.max_tokens
    }

    fn pack(
        &self,
        range: Range<usize>,
        strategy: SplitStrategy,
        out: &mut Vec<Range<usize>>,
    ) -> Result<()> {
        if strategy == SplitStrategy::Character {
            return self.cut_characters(range, out);
        }

        let segments = strategy.segments(self.text, range);
        let estimates: Vec<usize> = segments
            .iter()
            .map(|seg| self.counter.count_tokens(&self.text[seg.clone()]))
            .collect();

        let mut i = 0;
        while i < segments.len() {
            match self.take_run(&segments, &estimates, i) {
                Step::Fits { span, next } => {
                    out.push(span);
                    i = next;
                }
                Step::Defer { span, next } => {
                    tracing::trace!(
                        ?strategy,
                        start = span.start,
                        end = span.end,
                        "segment over budget, deferring"
                    );
                    match strategy.next() {
                        Some(finer) => self.pack(span, finer, out)?,
                        None => self.cut_characters(span, out)?,
                    }
                    i = next;
                }
            }
        }
        Ok(())
    }

    /// Largest run of whole segments starting at `i` that fits the budget.
    ///
    /// Summed per-segment estimates pick the first candidate; the assembled
    /// candidate is then measured, shrunk one segment at a time while over
    /// budget, or grown while the next segment still fits.
    fn take_run(&self, segments: &[Range<usize>], estimates: &[usize], i: usize) -> Step {
        let first = segments[i].clone();
        if !self.fits(first.clone()) {
            return Step::Defer {
                span: first,
                next: i + 1,
            };
        }

        let mut j = i + 1;
        let mut estimate = estimates[i];
        while j < segments.len() && estimate + estimates[j] <= self.max_tokens {
            estimate += estimates[j];
            j += 1;
        }

        let mut shrunk = false;
        while j > i + 1 && !self.fits(first.start..segments[j - 1].end) {
            j -= 1;
            shrunk = true;
        }

        if !shrunk {
            while j < segments.len() && self.fits(first.start..segments[j].end) {
                j += 1;
            }
        }

        Step::Fits {
            span: first.start..segments[j - 1].end,
            next: j,
        }
    }

    /// Hard cut between characters: longest fitting prefix, repeatedly.
    fn cut_characters(&self, range: Range<usize>, out: &mut Vec<Range<usize>>) -> Result<()> {
        let mut start = range.start;
        while start < range.end {
            let bounds: Vec<usize> = self.text[start..range.end]
                .char_indices()
                .skip(1)
                .map(|(offset, _)| start + offset)
                .chain(std::iter::once(range.end))
                .collect();

            if !self.fits(start..bounds[0]) {
                return Err(Error::Configuration(format!(
                    "chunk budget of {} tokens cannot hold a single character",
                    self.max_tokens
                )));
            }

            // Token counts grow with the prefix almost everywhere; verify the
            // binary-search pick and step back if the tokenizer disagrees.
            let mut k = bounds
                .partition_point(|&end| self.fits(start..end))
                .max(1);
            while k > 1 && !self.fits(start..bounds[k - 1]) {
                k -= 1;
            }

            let end = bounds[k - 1];
            out.push(start..end);
            start = end;
        }
        Ok(())
    }
}

/// Split `text` into ordered chunks of at most `max_tokens` tokens each.
///
/// Empty (or whitespace-only) text yields no chunks. Chunk spans are
/// contiguous and cover the whole text; each chunk's `text` is its span
/// trimmed.
pub fn split(text: &str, max_tokens: usize, counter: &dyn TokenCounter) -> Result<Vec<Chunk>> {
    if max_tokens == 0 {
        return Err(Error::Configuration(
            "chunk budget must be at least one token".into(),
        ));
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let splitter = Splitter {
        text,
        max_tokens,
        counter,
    };
    let mut spans = Vec::new();
    splitter.pack(0..text.len(), SplitStrategy::PRIORITY[0], &mut spans)?;

    let chunks: Vec<Chunk> = absorb_blank(text, spans)
        .into_iter()
        .enumerate()
        .map(|(index, span)| {
            let chunk_text = text[span.clone()].trim().to_string();
            let token_count = counter.count_tokens(&chunk_text);
            debug_assert!(token_count <= max_tokens);
            Chunk {
                index,
                start: span.start,
                end: span.end,
                text: chunk_text,
                token_count,
            }
        })
        .collect();

    tracing::debug!(
        chunks = chunks.len(),
        max_tokens,
        counter = counter.name(),
        "document split"
    );
    Ok(chunks)
}
