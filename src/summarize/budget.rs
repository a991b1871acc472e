//! Token budget planning for one model.
//!
//! Every completion call must fit `instructions + running context + chunk +
//! response` into the model's context window. The profile reserves room for
//! the response and the instructions; what is left is split between the
//! carried-over context and the chunk itself.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default tokens reserved for the model's reply.
pub const DEFAULT_RESERVED_OUTPUT: usize = 2_048;
/// Default tokens reserved for the system prompt and instructions.
pub const DEFAULT_RESERVED_OVERHEAD: usize = 768;
/// Default carry-over budget for the running context.
pub const DEFAULT_CONTEXT_CARRY: usize = 512;

/// Context windows of common models, longest prefix first.
const KNOWN_WINDOWS: &[(&str, usize)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4.5", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-32k", 32_768),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("gpt-5", 400_000),
    ("o1", 200_000),
    ("o3", 200_000),
    ("o4", 200_000),
];

/// Context window and reservations for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub model: String,
    /// Maximum combined input and output tokens per call.
    pub context_window: usize,
    /// Tokens kept free for the response.
    pub reserved_output: usize,
    /// Tokens kept free for the system prompt and instructions.
    pub reserved_overhead: usize,
}

impl ModelProfile {
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        context_window: usize,
        reserved_output: usize,
        reserved_overhead: usize,
    ) -> Self {
        Self {
            model: model.into(),
            context_window,
            reserved_output,
            reserved_overhead,
        }
    }

    /// Profile with default reservations for a model whose window is known.
    #[must_use]
    pub fn for_model(model: &str) -> Option<Self> {
        let window = known_context_window(model)?;
        Some(Self::new(
            model,
            window,
            DEFAULT_RESERVED_OUTPUT,
            DEFAULT_RESERVED_OVERHEAD,
        ))
    }
}

/// Context window for a known model id (provider prefix ignored).
#[must_use]
pub fn known_context_window(model: &str) -> Option<usize> {
    let name = model.rsplit_once('/').map_or(model, |(_, name)| name);
    KNOWN_WINDOWS
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map(|(_, window)| *window)
}

/// Maximum input tokens available per call for `profile`.
///
/// `context_window - reserved_output - reserved_overhead`; fails when the
/// reservations leave nothing for input.
pub fn plan(profile: &ModelProfile) -> Result<usize> {
    let reserved = profile
        .reserved_output
        .saturating_add(profile.reserved_overhead);
    let available = profile.context_window.saturating_sub(reserved);
    if available == 0 {
        return Err(Error::Configuration(format!(
            "model '{}': reserved output ({}) + overhead ({}) leave no input room in a {}-token window",
            profile.model, profile.reserved_output, profile.reserved_overhead, profile.context_window
        )));
    }
    Ok(available)
}

/// Per-call budget split between carried context and chunk text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Input allowance after reservations.
    pub max_input_tokens: usize,
    /// Ceiling for the running context.
    pub context_tokens: usize,
    /// Ceiling for one chunk; what the splitter should be given.
    pub chunk_tokens: usize,
    /// Response ceiling passed to the provider as `max_tokens`.
    pub output_tokens: usize,
}

impl TokenBudget {
    /// Plan `profile` and reserve `context_carry` tokens of the input for context.
    pub fn new(profile: &ModelProfile, context_carry: usize) -> Result<Self> {
        let max_input_tokens = plan(profile)?;
        if context_carry == 0 || context_carry >= max_input_tokens {
            return Err(Error::Configuration(format!(
                "context carry-over budget must be between 1 and {} tokens, got {context_carry}",
                max_input_tokens.saturating_sub(1)
            )));
        }

        Ok(Self {
            max_input_tokens,
            context_tokens: context_carry,
            chunk_tokens: max_input_tokens - context_carry,
            output_tokens: profile.reserved_output,
        })
    }
}
