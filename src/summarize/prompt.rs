//! Per-chunk prompt rendering and response section parsing.

use super::counter::TokenCounter;
use crate::error::Result;
use minijinja::{Environment, context};
use regex::Regex;
use std::sync::LazyLock;

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an expert assistant that summarizes articles into a well-structured format.";

/// Delimiter wrapped around context and source text inside the prompt.
const DELIMITER: &str = "####";

const CHUNK_TEMPLATE: &str = r#"
{% if strict %}
Your previous reply could not be parsed. Follow the output format below exactly: plain text only, no markdown, no HTML, no code fences, and every heading on its own line.

{% endif %}
Summarize the text delimited by {{ delimiter }}.
{% if focus %}
{{ focus }}
{% endif %}
Reply with exactly these sections, in this order:

EXECUTIVE SUMMARY:
A one to two sentence high-level summary.

KEYWORDS:
A comma-separated list of the key concepts.

DETAILED SUMMARY:
A one to three paragraph summary.

END OF SUMMARY
{% if context %}

The background context delimited by {{ delimiter }} summarizes the earlier parts of the same document. Use it to keep the summary coherent; it is not a separate section.
Background context: {{ delimiter }}{{ context }}{{ delimiter }}
{% endif %}
{% if part_count > 1 %}

This is part {{ part }} of {{ part_count }}.
{% endif %}

Original text: {{ delimiter }}{{ chunk }}{{ delimiter }}
"#;

/// Values for one rendered chunk prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub context: &'a str,
    pub chunk: &'a str,
    /// 1-based part number.
    pub part: usize,
    pub part_count: usize,
    /// Add the reformatting instruction used after an unparseable reply.
    pub strict: bool,
}

pub struct PromptBuilder {
    env: Environment<'static>,
    system: String,
    focus: Option<String>,
}

impl PromptBuilder {
    #[must_use]
    pub fn new(system: impl Into<String>, focus: Option<String>) -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("chunk", CHUNK_TEMPLATE)
            .expect("CHUNK_TEMPLATE must be valid minijinja syntax");

        Self {
            env,
            system: system.into(),
            focus: focus.filter(|f| !f.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn chunk_prompt(&self, input: &PromptInput<'_>) -> Result<String> {
        let template = self.env.get_template("chunk")?;
        let rendered = template.render(context! {
            delimiter => DELIMITER,
            focus => self.focus.as_deref(),
            context => input.context,
            chunk => input.chunk,
            part => input.part,
            part_count => input.part_count,
            strict => input.strict,
        })?;
        Ok(rendered.trim().to_string())
    }

    /// Tokens spent on everything except context and chunk text, taking the
    /// largest variant (strict, with context and part line).
    pub fn overhead_tokens(&self, counter: &dyn TokenCounter) -> Result<usize> {
        let skeleton = self.chunk_prompt(&PromptInput {
            context: " ",
            chunk: "",
            part: 9_999,
            part_count: 9_999,
            strict: true,
        })?;
        Ok(counter.count_tokens(&self.system) + counter.count_tokens(&skeleton))
    }
}

/// The three parts of a structured summary reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections {
    pub executive: String,
    pub keywords: Vec<String>,
    pub detailed: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heading {
    Executive,
    Keywords,
    Detailed,
    End,
}

/// Section headings at line start, tolerating markdown decoration.
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t#*_>]*(executive summary|keywords|detailed summary|end of summary)\b[ \t*_]*:?[ \t*_]*",
    )
    .expect("HEADING must be a valid regex")
});

/// Bullet or numbered list prefix on a keyword line.
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*]|\d+[.)])\s+").expect("LIST_MARKER must be a valid regex")
});

/// Split a reply into its three sections.
///
/// Every heading must appear in order and the `END OF SUMMARY` line must
/// follow; a reply without it was cut off and is rejected. Returns the reason
/// on failure.
pub fn parse_sections(text: &str) -> std::result::Result<Sections, String> {
    let headings: Vec<(Heading, usize, usize)> = HEADING
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let heading = match caps.get(1)?.as_str().to_lowercase().as_str() {
                "executive summary" => Heading::Executive,
                "keywords" => Heading::Keywords,
                "detailed summary" => Heading::Detailed,
                _ => Heading::End,
            };
            Some((heading, whole.start(), whole.end()))
        })
        .collect();

    let find = |heading: Heading, after: usize| {
        headings
            .iter()
            .find(|(h, start, _)| *h == heading && *start >= after)
            .map(|(_, start, end)| (*start, *end))
    };

    let (_, exec_body) =
        find(Heading::Executive, 0).ok_or("missing EXECUTIVE SUMMARY section")?;
    let (kw_start, kw_body) =
        find(Heading::Keywords, exec_body).ok_or("missing KEYWORDS section")?;
    let (detail_start, detail_body) =
        find(Heading::Detailed, kw_body).ok_or("missing DETAILED SUMMARY section")?;
    let (end_start, _) = find(Heading::End, detail_body)
        .ok_or("missing END OF SUMMARY marker; the reply looks truncated")?;

    let executive = clean_body(&text[exec_body..kw_start]);
    let keywords = parse_keywords(&text[kw_body..detail_start]);
    let detailed = clean_body(&text[detail_body..end_start]);

    if executive.is_empty() {
        return Err("EXECUTIVE SUMMARY section is empty".into());
    }
    if detailed.is_empty() {
        return Err("DETAILED SUMMARY section is empty".into());
    }

    Ok(Sections {
        executive,
        keywords,
        detailed,
    })
}

/// Drop code fences and surrounding blank lines.
fn clean_body(body: &str) -> String {
    body.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn parse_keywords(body: &str) -> Vec<String> {
    clean_body(body)
        .split([',', ';', '\n', '•', '|'])
        .map(|kw| {
            LIST_MARKER
                .replace(kw.trim(), "")
                .trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | '"' | '\'' | '`'))
                .to_string()
        })
        .filter(|kw| !kw.is_empty())
        .collect()
}
