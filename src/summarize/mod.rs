//! Token-budgeted chunking and cumulative summarization.
//!
//! A document is split into chunks that fit the per-call budget, summarized
//! one chunk at a time with a running context carried forward, and the partial
//! summaries are merged into one [`FinalSummary`].

mod budget;
mod counter;
mod cumulative;
mod merge;
mod prompt;
mod retry;
mod splitter;

pub use budget::{
    DEFAULT_CONTEXT_CARRY, DEFAULT_RESERVED_OUTPUT, DEFAULT_RESERVED_OVERHEAD, ModelProfile,
    TokenBudget, known_context_window, plan,
};
pub use counter::{BpeTokenCounter, Encoding, EstimateTokenCounter, TokenCounter};
pub use cumulative::{PartialSummary, RunningContext, Summarizer, SummarizerSettings};
pub use merge::{FinalSummary, MergeOptions, merge, merge_with};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, PromptBuilder, PromptInput, Sections, parse_sections};
pub use retry::RetryPolicy;
pub use splitter::{Chunk, SplitStrategy, split};

#[cfg(test)]
pub(crate) use counter::test_support::WordCounter;
#[cfg(test)]
pub(crate) use cumulative::test_support::reply;
#[cfg(test)]
pub(crate) use retry::test_support::ScriptedProvider;
