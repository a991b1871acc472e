use crate::error::{Error, Result};
use std::fmt;

/// Token counting consistent with a model's tokenizer, so budget checks hold.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a string.
    fn count_tokens(&self, text: &str) -> usize;

    /// Model or encoding the counts are valid for.
    fn name(&self) -> &str;
}

/// BPE encoding family used by an `OpenAI` model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Cl100kBase,
    O200kBase,
}

impl Encoding {
    /// Pick the encoding for a model identifier, by prefix.
    ///
    /// Provider-prefixed ids (`openai/gpt-4o`) are accepted.
    #[must_use]
    pub fn for_model(model: &str) -> Option<Self> {
        let name = model.rsplit_once('/').map_or(model, |(_, name)| name);

        const O200K: &[&str] = &["gpt-4o", "gpt-4.1", "gpt-4.5", "gpt-5", "o1", "o3", "o4"];
        const CL100K: &[&str] = &["gpt-4", "gpt-3.5", "text-embedding-"];

        if O200K.iter().any(|p| name.starts_with(p)) {
            Some(Self::O200kBase)
        } else if CL100K.iter().any(|p| name.starts_with(p)) {
            Some(Self::Cl100kBase)
        } else {
            None
        }
    }

    fn tokenizer(self) -> &'static bpe_openai::Tokenizer {
        match self {
            Self::Cl100kBase => bpe_openai::cl100k_base(),
            Self::O200kBase => bpe_openai::o200k_base(),
        }
    }
}

/// Exact token counter backed by the model's BPE tables.
pub struct BpeTokenCounter {
    model: String,
    encoding: Encoding,
    bpe: &'static bpe_openai::Tokenizer,
}

impl fmt::Debug for BpeTokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BpeTokenCounter")
            .field("model", &self.model)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl BpeTokenCounter {
    /// Counter for `model`; unknown models have no tokenizer and are a config error.
    pub fn for_model(model: &str) -> Result<Self> {
        let encoding = Encoding::for_model(model).ok_or_else(|| {
            Error::Configuration(format!(
                "no tokenizer known for model '{model}'; use an OpenAI model id or set `tokenizer`"
            ))
        })?;
        Ok(Self::with_encoding(model, encoding))
    }

    /// Counter for `model` using an explicit encoding.
    #[must_use]
    pub fn with_encoding(model: &str, encoding: Encoding) -> Self {
        Self {
            model: model.to_string(),
            encoding,
            bpe: encoding.tokenizer(),
        }
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.count(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Fast estimate without tokenization (~4 chars per token).
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimateTokenCounter;

impl TokenCounter for EstimateTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }

    fn name(&self) -> &str {
        "estimate"
    }
}
