//! Documents to summarize, where they come from and where summaries go.

mod eml;
mod sink;
mod source;

pub use sink::{SinkTarget, WriterSink};
pub use source::FileSource;

use crate::error::{Error, Result};
use crate::summarize::FinalSummary;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Wrap width for HTML conversion; wide enough that paragraphs stay on one line.
const HTML_TEXT_WIDTH: usize = 10_000;

/// Envelope data carried alongside the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentMeta {
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub received: Option<DateTime<Utc>>,
}

/// One text to summarize, such as a newsletter body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    id: String,
    text: String,
    meta: DocumentMeta,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, meta: DocumentMeta) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            meta,
        }
    }

    /// Build from an HTML body, keeping the readable text.
    pub fn from_html(id: impl Into<String>, html: &str, meta: DocumentMeta) -> Result<Self> {
        let text = html2text::from_read(html.as_bytes(), HTML_TEXT_WIDTH)
            .map_err(|e| Error::Html(e.to_string()))?;
        Ok(Self::new(id, text, meta))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    /// Subject if known, otherwise the id.
    #[must_use]
    pub fn title(&self) -> &str {
        self.meta.subject.as_deref().unwrap_or(&self.id)
    }
}

/// Supplies the documents for one run (files, a mailbox, ...).
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Document>>;
}

/// Receives each finished summary (stdout, files, a reply email, ...).
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, document: &Document, summary: &FinalSummary) -> Result<()>;
}
