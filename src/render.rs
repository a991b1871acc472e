//! Rendering a finished summary for delivery.

use crate::document::Document;
use crate::error::Result;
use crate::summarize::FinalSummary;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Output format of a rendered summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Text,
    Markdown,
    Html,
    Json,
}

impl Format {
    /// File extension used when writing to a directory.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

// The `.html` suffix turns on auto-escaping.
const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{{ title }}</title></head>
<body>
<h1>{{ title }}</h1>
{% if sender or received %}
<p class="meta">{% if sender %}From: {{ sender }}{% endif %}{% if sender and received %} | {% endif %}{% if received %}Received: {{ received }}{% endif %}</p>
{% endif %}
<h2>Executive Summary</h2>
<p>{{ summary.executive_summary }}</p>
{% if summary.keywords %}
<h2>Keywords</h2>
<ul>
{% for keyword in summary.keywords %}
<li>{{ keyword }}</li>
{% endfor %}
</ul>
{% endif %}
<h2>Detailed Summary</h2>
{% for paragraph in paragraphs %}
<p>{{ paragraph }}</p>
{% endfor %}
</body>
</html>
"#;

static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.add_template("summary.html", HTML_TEMPLATE)
        .expect("HTML_TEMPLATE must be valid minijinja syntax");
    env
});

#[derive(Serialize)]
struct JsonReport<'a> {
    id: &'a str,
    #[serde(flatten)]
    meta: &'a crate::document::DocumentMeta,
    summary: &'a FinalSummary,
}

pub fn render(format: Format, document: &Document, summary: &FinalSummary) -> Result<String> {
    match format {
        Format::Text => Ok(render_text(document, summary)),
        Format::Markdown => Ok(render_markdown(document, summary)),
        Format::Html => render_html(document, summary),
        Format::Json => Ok(serde_json::to_string_pretty(&JsonReport {
            id: document.id(),
            meta: document.meta(),
            summary,
        })?),
    }
}

fn render_text(document: &Document, summary: &FinalSummary) -> String {
    let mut out = format!("{}\n", document.title());
    if let Some(sender) = &document.meta().sender {
        out.push_str(&format!("From: {sender}\n"));
    }
    out.push_str(&format!(
        "\nEXECUTIVE SUMMARY\n{}\n\nKEYWORDS\n{}\n\nDETAILED SUMMARY\n{}\n",
        summary.executive_summary,
        summary.keywords.join(", "),
        summary.detailed_summary
    ));
    out
}

fn render_markdown(document: &Document, summary: &FinalSummary) -> String {
    let mut out = format!("# {}\n\n", document.title());
    if let Some(sender) = &document.meta().sender {
        out.push_str(&format!("*From: {sender}*\n\n"));
    }
    out.push_str(&format!(
        "## Executive Summary\n\n{}\n\n",
        summary.executive_summary
    ));
    if !summary.keywords.is_empty() {
        out.push_str("## Keywords\n\n");
        for keyword in &summary.keywords {
            out.push_str(&format!("- {keyword}\n"));
        }
        out.push('\n');
    }
    // Part headers become bold lines
    let detailed = summary
        .detailed_summary
        .lines()
        .map(|line| {
            if line.starts_with("[Part ") && line.ends_with(']') {
                format!("**{line}**")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    out.push_str(&format!("## Detailed Summary\n\n{detailed}\n"));
    out
}

fn render_html(document: &Document, summary: &FinalSummary) -> Result<String> {
    let meta = document.meta();
    let paragraphs: Vec<&str> = summary
        .detailed_summary
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let template = TEMPLATES.get_template("summary.html")?;
    Ok(template.render(context! {
        title => document.title(),
        sender => meta.sender.as_deref(),
        received => meta.received.map(|r| r.to_rfc2822()),
        summary => summary,
        paragraphs => paragraphs,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentMeta;
    use crate::summarize::{PartialSummary, merge};

    fn fixture() -> (Document, FinalSummary) {
        let document = Document::new(
            "issue.txt",
            "body",
            DocumentMeta {
                subject: Some("Tips & <Tricks>".into()),
                sender: Some("news@example.com".into()),
                received: None,
            },
        );
        let summary = merge(&[
            PartialSummary::new(0, "First.", vec!["AI".into()], "One."),
            PartialSummary::new(1, "Both <b>parts</b>.", vec!["Cloud".into()], "Two."),
        ])
        .unwrap();
        (document, summary)
    }

    #[test]
    fn test_text() {
        let (document, summary) = fixture();
        let text = render(Format::Text, &document, &summary).unwrap();
        assert!(text.starts_with("Tips & <Tricks>\nFrom: news@example.com\n"));
        assert!(text.contains("EXECUTIVE SUMMARY\nBoth <b>parts</b>."));
        assert!(text.contains("KEYWORDS\nAI, Cloud"));
        assert!(text.contains("[Part 1/2]\nOne.\n\n[Part 2/2]\nTwo."));
    }

    #[test]
    fn test_markdown() {
        let (document, summary) = fixture();
        let md = render(Format::Markdown, &document, &summary).unwrap();
        assert!(md.starts_with("# Tips & <Tricks>\n"));
        assert!(md.contains("- AI\n- Cloud\n"));
        assert!(md.contains("**[Part 2/2]**\nTwo."));
    }

    #[test]
    fn test_html_escapes_content() {
        let (document, summary) = fixture();
        let html = render(Format::Html, &document, &summary).unwrap();
        assert!(html.contains("<h1>Tips &amp; &lt;Tricks&gt;</h1>"));
        assert!(html.contains("Both &lt;b&gt;parts"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("<li>AI</li>"));
        assert!(html.contains("From: news@example.com"));
        assert!(!html.contains("Received:"));
    }

    #[test]
    fn test_json() {
        let (document, summary) = fixture();
        let json = render(Format::Json, &document, &summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], "issue.txt");
        assert_eq!(value["subject"], "Tips & <Tricks>");
        assert_eq!(value["summary"]["keywords"][1], "Cloud");
        assert_eq!(value["summary"]["parts"], 2);
    }

    #[test]
    fn test_extension() {
        assert_eq!(Format::Markdown.extension(), "md");
        assert_eq!(Format::Json.extension(), "json");
    }
}
