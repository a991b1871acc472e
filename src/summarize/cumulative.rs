//! Sequential summarization with context carried from chunk to chunk.
//!
//! Each step is `(context, chunk) -> (partial, context')`: the chunk is
//! summarized alongside what came before, and the new executive summary is
//! folded into the running context that the next chunk sees.

use super::budget::{ModelProfile, TokenBudget};
use super::counter::TokenCounter;
use super::merge::{FinalSummary, MergeOptions, merge_with};
use super::prompt::{DEFAULT_SYSTEM_PROMPT, PromptBuilder, PromptInput, Sections, parse_sections};
use super::retry::{RetryPolicy, complete_with_retry};
use super::splitter::{self, Chunk};
use crate::error::{Error, Result};
use crate::provider::{ChatRequest, Completion, LlmApi, Usage};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Condensed carry-forward of every chunk summarized so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningContext {
    text: String,
    tokens: usize,
}

impl RunningContext {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Seed context, trimmed to `budget` tokens.
    #[must_use]
    pub fn new(text: &str, budget: usize, counter: &dyn TokenCounter) -> Self {
        let text = keep_tail(text, budget, counter);
        let tokens = counter.count_tokens(&text);
        Self { text, tokens }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn tokens(&self) -> usize {
        self.tokens
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Append a new executive summary and trim to `budget` tokens, oldest first.
    #[must_use]
    pub fn fold(&self, executive_summary: &str, budget: usize, counter: &dyn TokenCounter) -> Self {
        let combined = if self.is_empty() {
            executive_summary.trim().to_string()
        } else {
            format!("{} {}", self.text, executive_summary.trim())
        };
        Self::new(&combined, budget, counter)
    }
}

/// Longest suffix of `text` within `budget` tokens.
///
/// Whole leading sentences are dropped first; when the last sentence alone is
/// too long, leading characters of it are dropped instead.
fn keep_tail(text: &str, budget: usize, counter: &dyn TokenCounter) -> String {
    let text = text.trim();
    if counter.count_tokens(text) <= budget {
        return text.to_string();
    }

    let starts: Vec<usize> = text
        .split_sentence_bound_indices()
        .map(|(start, _)| start)
        .filter(|&start| start > 0)
        .collect();
    let fits = |from: usize| counter.count_tokens(text[from..].trim()) <= budget;

    let idx = starts.partition_point(|&start| !fits(start));
    if let Some(&start) = starts.get(idx) {
        return text[start..].trim().to_string();
    }

    let last = &text[starts.last().copied().unwrap_or(0)..];
    let bounds: Vec<usize> = last.char_indices().map(|(i, _)| i).collect();
    let idx = bounds.partition_point(|&i| counter.count_tokens(last[i..].trim()) > budget);
    bounds
        .get(idx)
        .map_or_else(String::new, |&i| last[i..].trim().to_string())
}

/// Structured summary of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialSummary {
    pub chunk_index: usize,
    pub executive_summary: String,
    pub keywords: Vec<String>,
    pub detailed_summary: String,
    /// Provider usage across every call spent on this chunk.
    pub usage: Usage,
}

impl PartialSummary {
    #[must_use]
    pub fn new(
        chunk_index: usize,
        executive_summary: impl Into<String>,
        keywords: Vec<String>,
        detailed_summary: impl Into<String>,
    ) -> Self {
        Self {
            chunk_index,
            executive_summary: executive_summary.into(),
            keywords,
            detailed_summary: detailed_summary.into(),
            usage: Usage::default(),
        }
    }

    fn from_sections(chunk_index: usize, sections: Sections, usage: Usage) -> Self {
        Self {
            chunk_index,
            executive_summary: sections.executive,
            keywords: sections.keywords,
            detailed_summary: sections.detailed,
            usage,
        }
    }
}

/// Prompt and request settings shared by every chunk of a run.
#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub system_prompt: String,
    /// Extra instruction appended to every chunk prompt.
    pub prompt_focus: Option<String>,
    pub temperature: Option<f32>,
    pub context_carry_tokens: usize,
    pub max_keywords: Option<usize>,
    pub retry: RetryPolicy,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt_focus: None,
            temperature: Some(0.7),
            context_carry_tokens: super::budget::DEFAULT_CONTEXT_CARRY,
            max_keywords: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Summarizes chunks of one document at a time. Holds no per-run state, so
/// one instance can serve several documents concurrently.
pub struct Summarizer {
    provider: Arc<dyn LlmApi>,
    counter: Arc<dyn TokenCounter>,
    prompts: PromptBuilder,
    profile: ModelProfile,
    budget: TokenBudget,
    settings: SummarizerSettings,
}

impl Summarizer {
    /// Plan the budget for `profile` and check the instructions fit their reservation.
    pub fn new(
        provider: Arc<dyn LlmApi>,
        counter: Arc<dyn TokenCounter>,
        profile: ModelProfile,
        settings: SummarizerSettings,
    ) -> Result<Self> {
        let budget = TokenBudget::new(&profile, settings.context_carry_tokens)?;
        let prompts = PromptBuilder::new(
            settings.system_prompt.clone(),
            settings.prompt_focus.clone(),
        );

        let overhead = prompts.overhead_tokens(counter.as_ref())?;
        if overhead > profile.reserved_overhead {
            return Err(Error::Configuration(format!(
                "prompt instructions take {overhead} tokens but only {} are reserved; raise `reserved_overhead` or shorten the system prompt",
                profile.reserved_overhead
            )));
        }

        debug!(
            "Budget for {}: input {} (chunk {}, context {}), output {}, instructions {}/{}",
            profile.model,
            budget.max_input_tokens,
            budget.chunk_tokens,
            budget.context_tokens,
            budget.output_tokens,
            overhead,
            profile.reserved_overhead
        );

        Ok(Self {
            provider,
            counter,
            prompts,
            profile,
            budget,
            settings,
        })
    }

    #[must_use]
    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    #[must_use]
    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    #[must_use]
    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    #[must_use]
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            max_keywords: self.settings.max_keywords,
        }
    }

    /// Split `text` into chunks sized for this summarizer's budget.
    pub fn split(&self, text: &str) -> Result<Vec<Chunk>> {
        splitter::split(text, self.budget.chunk_tokens, self.counter())
    }

    /// Summarize one chunk given the context so far; returns the partial and
    /// the context for the next chunk.
    pub async fn summarize_chunk(
        &self,
        context: &RunningContext,
        chunk: &Chunk,
        part_count: usize,
        cancel: &CancellationToken,
    ) -> Result<(PartialSummary, RunningContext)> {
        if chunk.token_count > self.budget.chunk_tokens {
            return Err(Error::Configuration(format!(
                "chunk {} has {} tokens, over the {}-token chunk budget",
                chunk.index, chunk.token_count, self.budget.chunk_tokens
            )));
        }

        let mut input = PromptInput {
            context: context.text(),
            chunk: &chunk.text,
            part: chunk.index + 1,
            part_count,
            strict: false,
        };

        let completion = self.complete(&input, chunk.index, cancel).await?;
        let mut usage = completion.usage;

        let sections = match parse_completion(&completion) {
            Ok(sections) => sections,
            Err(reason) => {
                warn!(
                    "Chunk {}: {}; retrying with reformat instructions",
                    chunk.index, reason
                );
                input.strict = true;
                let retried = self.complete(&input, chunk.index, cancel).await?;
                usage += retried.usage;
                parse_completion(&retried).map_err(|reason| Error::ResponseFormat {
                    chunk_index: chunk.index,
                    reason,
                })?
            }
        };

        let next = context.fold(
            &sections.executive,
            self.budget.context_tokens,
            self.counter(),
        );
        info!(
            "Summarized chunk {}/{} ({} tokens, context now {} tokens)",
            chunk.index + 1,
            part_count,
            chunk.token_count,
            next.tokens()
        );

        Ok((PartialSummary::from_sections(chunk.index, sections, usage), next))
    }

    /// Fold over `chunks` in order, one completion in flight at a time.
    pub async fn summarize(
        &self,
        chunks: &[Chunk],
        initial: RunningContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<PartialSummary>> {
        if let Some((expected, chunk)) = chunks
            .iter()
            .enumerate()
            .find(|(position, chunk)| chunk.index != *position)
        {
            return Err(Error::PartialOrder {
                expected,
                found: chunk.index,
            });
        }

        let mut context = if initial.tokens() > self.budget.context_tokens {
            RunningContext::new(initial.text(), self.budget.context_tokens, self.counter())
        } else {
            initial
        };

        let mut partials = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let (partial, next) = self
                .summarize_chunk(&context, chunk, chunks.len(), cancel)
                .await?;
            partials.push(partial);
            context = next;
        }
        Ok(partials)
    }

    /// Split, summarize and merge one text.
    pub async fn summarize_text(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<FinalSummary> {
        let chunks = self.split(text)?;
        if chunks.is_empty() {
            return Err(Error::EmptyInput("document has no text to summarize".into()));
        }
        let partials = self
            .summarize(&chunks, RunningContext::empty(), cancel)
            .await?;
        merge_with(&partials, &self.merge_options())
    }

    async fn complete(
        &self,
        input: &PromptInput<'_>,
        chunk_index: usize,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let request = ChatRequest {
            model: self.profile.model.clone(),
            system: Some(self.prompts.system().to_string()),
            prompt: self.prompts.chunk_prompt(input)?,
            max_tokens: Some(u32::try_from(self.budget.output_tokens).unwrap_or(u32::MAX)),
            temperature: self.settings.temperature,
        };
        complete_with_retry(
            self.provider.as_ref(),
            &request,
            &self.settings.retry,
            cancel,
            chunk_index,
        )
        .await
    }
}

fn parse_completion(completion: &Completion) -> std::result::Result<Sections, String> {
    if completion.is_truncated() {
        return Err("reply was cut off at the output token limit".into());
    }
    parse_sections(&completion.text)
}


#[cfg(test)]
mod tests {
    use super::test_support::reply;
    use super::*;
    use crate::provider::FinishReason;
    use crate::summarize::counter::test_support::WordCounter;
    use crate::summarize::retry::test_support::ScriptedProvider;
    use std::time::Duration;

    fn settings() -> SummarizerSettings {
        SummarizerSettings {
            context_carry_tokens: 20,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                timeout: Duration::from_secs(5),
            },
            ..SummarizerSettings::default()
        }
    }

    fn summarizer(provider: Arc<ScriptedProvider>) -> Summarizer {
        let profile = ModelProfile::new("test-model", 1_000, 100, 400);
        Summarizer::new(provider, Arc::new(WordCounter), profile, settings()).unwrap()
    }

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            start: 0,
            end: text.len(),
            text: text.to_string(),
            token_count: WordCounter.count_tokens(text),
        }
    }

    #[test]
    fn test_context_fold_appends() {
        let ctx = RunningContext::empty().fold("First point.", 50, &WordCounter);
        assert_eq!(ctx.text(), "First point.");
        assert_eq!(ctx.tokens(), 2);

        let ctx = ctx.fold("  Second point.  ", 50, &WordCounter);
        assert_eq!(ctx.text(), "First point. Second point.");
    }

    #[test]
    fn test_context_drops_oldest_sentences() {
        let ctx = RunningContext::new(
            "One two three. Four five six. Seven eight nine.",
            6,
            &WordCounter,
        );
        assert_eq!(ctx.text(), "Four five six. Seven eight nine.");
        assert!(ctx.tokens() <= 6);
    }

    #[test]
    fn test_context_cuts_long_sentence() {
        let ctx = RunningContext::new("a b c d e f g h", 3, &WordCounter);
        assert_eq!(ctx.text(), "f g h");
    }

    #[test]
    fn test_context_budget_never_exceeded() {
        let mut ctx = RunningContext::empty();
        for i in 0..20 {
            ctx = ctx.fold(&format!("Summary number {i} of the text."), 15, &WordCounter);
            assert!(ctx.tokens() <= 15);
        }
        assert!(ctx.text().ends_with("Summary number 19 of the text."));
    }

    #[test]
    fn test_overhead_check_rejects_small_reservation() {
        let provider = Arc::new(ScriptedProvider::default());
        let profile = ModelProfile::new("test-model", 1_000, 100, 10);
        let result = Summarizer::new(provider, Arc::new(WordCounter), profile, settings());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_chunk_step_parses_and_folds() {
        let provider = Arc::new(ScriptedProvider::new([Ok(reply(1, "Alpha, Beta"))]));
        let summarizer = summarizer(provider.clone());

        let (partial, next) = summarizer
            .summarize_chunk(
                &RunningContext::empty(),
                &chunk(0, "Some text."),
                1,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(partial.chunk_index, 0);
        assert_eq!(partial.executive_summary, "Exec 1.");
        assert_eq!(partial.keywords, vec!["Alpha", "Beta"]);
        assert_eq!(partial.detailed_summary, "Detail 1.");
        assert_eq!(next.text(), "Exec 1.");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].max_tokens, Some(100));
        assert_eq!(requests[0].system.as_deref(), Some(DEFAULT_SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_oversized_chunk_rejected() {
        let provider = Arc::new(ScriptedProvider::default());
        let summarizer = summarizer(provider.clone());
        let big = "w ".repeat(summarizer.budget().chunk_tokens + 1);

        let err = summarizer
            .summarize_chunk(&RunningContext::empty(), &chunk(0, &big), 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_reply_gets_one_reformat_retry() {
        let provider = Arc::new(ScriptedProvider::new([
            Ok(Completion::text("Here is a nice summary without headings.")),
            Ok(reply(1, "Gamma")),
        ]));
        let summarizer = summarizer(provider.clone());

        let (partial, _) = summarizer
            .summarize_chunk(&RunningContext::empty(), &chunk(0, "Text."), 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(partial.keywords, vec!["Gamma"]);
        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("could not be parsed"));
        assert!(prompts[1].contains("could not be parsed"));
    }

    #[tokio::test]
    async fn test_response_format_error_after_reformat() {
        let truncated = Completion {
            text: "EXECUTIVE SUMMARY:\nCut".into(),
            finish_reason: Some(FinishReason::Length),
            usage: Usage::default(),
        };
        let provider = Arc::new(ScriptedProvider::new([
            Ok(truncated.clone()),
            Ok(truncated),
        ]));
        let summarizer = summarizer(provider.clone());

        let err = summarizer
            .summarize_chunk(&RunningContext::empty(), &chunk(3, "Text."), 4, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ResponseFormat { chunk_index: 3, .. }));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_usage_summed_across_reformat() {
        let mut bad = Completion::text("nonsense");
        bad.usage = Usage {
            input_tokens: 10,
            output_tokens: 2,
        };
        let mut good = reply(1, "k");
        good.usage = Usage {
            input_tokens: 12,
            output_tokens: 8,
        };
        let provider = Arc::new(ScriptedProvider::new([Ok(bad), Ok(good)]));
        let summarizer = summarizer(provider);

        let (partial, _) = summarizer
            .summarize_chunk(&RunningContext::empty(), &chunk(0, "Text."), 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            partial.usage,
            Usage {
                input_tokens: 22,
                output_tokens: 10
            }
        );
    }

    #[tokio::test]
    async fn test_summarize_rejects_unordered_chunks() {
        let provider = Arc::new(ScriptedProvider::default());
        let summarizer = summarizer(provider.clone());
        let chunks = vec![chunk(0, "a"), chunk(2, "b")];

        let err = summarizer
            .summarize(&chunks, RunningContext::empty(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PartialOrder {
                expected: 1,
                found: 2
            }
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_stops_later_chunks() {
        let provider = Arc::new(ScriptedProvider::new([
            Ok(reply(1, "a")),
            Err(crate::provider::Error::Api("HTTP 400 Bad Request: nope".into())),
            Ok(reply(3, "c")),
        ]));
        let summarizer = summarizer(provider.clone());
        let chunks = vec![chunk(0, "a"), chunk(1, "b"), chunk(2, "c")];

        let err = summarizer
            .summarize(&chunks, RunningContext::empty(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.chunk_index(), Some(1));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_issues_no_calls() {
        let provider = Arc::new(ScriptedProvider::new([Ok(reply(1, "a"))]));
        let summarizer = summarizer(provider.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = summarizer
            .summarize(&[chunk(0, "a")], RunningContext::empty(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_seed_context_reaches_first_prompt() {
        let provider = Arc::new(ScriptedProvider::new([Ok(reply(1, "a"))]));
        let summarizer = summarizer(provider.clone());
        let seed = RunningContext::new("Prior issue covered pricing.", 20, &WordCounter);

        summarizer
            .summarize(&[chunk(0, "New text.")], seed, &CancellationToken::new())
            .await
            .unwrap();
        assert!(provider.prompts()[0].contains("Background context: ####Prior issue covered pricing.####"));
    }

    #[tokio::test]
    async fn test_summarize_text_rejects_blank_document() {
        let provider = Arc::new(ScriptedProvider::default());
        let summarizer = summarizer(provider);
        let err = summarizer
            .summarize_text(" \n\n ", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyInput(_)));
    }
}
