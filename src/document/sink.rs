use super::{DeliverySink, Document};
use crate::error::Result;
use crate::render::{Format, render};
use crate::summarize::FinalSummary;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Where rendered summaries are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Stdout,
    /// One file per document, named after the document.
    Directory(PathBuf),
}

/// Renders each summary and writes it to stdout or a directory.
#[derive(Debug)]
pub struct WriterSink {
    target: SinkTarget,
    format: Format,
    /// Output paths handed out so far; no two documents share a file.
    claimed: Mutex<HashSet<PathBuf>>,
}

impl WriterSink {
    #[must_use]
    pub fn new(target: SinkTarget, format: Format) -> Self {
        Self {
            target,
            format,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Reserve the output path for `document` under `dir`.
    ///
    /// Named after the document's file stem. Later documents with the same
    /// stem get `-2`, `-3`, ... appended.
    pub fn claim_path(&self, dir: &Path, document: &Document) -> PathBuf {
        let stem = file_stem(document.id());
        let extension = self.format.extension();
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);

        let mut n = 1usize;
        loop {
            let name = if n == 1 {
                format!("{stem}.summary.{extension}")
            } else {
                format!("{stem}-{n}.summary.{extension}")
            };
            let path = dir.join(name);
            if claimed.insert(path.clone()) {
                return path;
            }
            n += 1;
        }
    }
}

#[async_trait]
impl DeliverySink for WriterSink {
    async fn deliver(&self, document: &Document, summary: &FinalSummary) -> Result<()> {
        let rendered = render(self.format, document, summary)?;
        match &self.target {
            SinkTarget::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(rendered.as_bytes())?;
                if !rendered.ends_with('\n') {
                    stdout.write_all(b"\n")?;
                }
                stdout.flush()?;
            }
            SinkTarget::Directory(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                let path = self.claim_path(dir, document);
                tokio::fs::write(&path, rendered).await?;
                info!("Wrote summary of {} to {}", document.id(), path.display());
            }
        }
        Ok(())
    }
}

/// File-name-safe stem from a document id.
fn file_stem(id: &str) -> String {
    let name = Path::new(id)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(id);
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentMeta;
    use crate::summarize::{PartialSummary, merge};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_directory_sink_writes_one_file_per_document() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let sink = WriterSink::new(SinkTarget::Directory(out.clone()), Format::Markdown);
        let summary = merge(&[PartialSummary::new(0, "Exec.", vec![], "Detail.")]).unwrap();

        for id in ["/tmp/mail/weekly issue.eml", "stdin"] {
            let doc = Document::new(id, "body", DocumentMeta::default());
            sink.deliver(&doc, &summary).await.unwrap();
        }

        let written = std::fs::read_to_string(out.join("weekly_issue.summary.md")).unwrap();
        assert!(written.contains("## Executive Summary\n\nExec."));
        assert!(out.join("stdin.summary.md").exists());
    }

    #[tokio::test]
    async fn test_shared_stem_gets_distinct_files() {
        let dir = TempDir::new().unwrap();
        let sink = WriterSink::new(
            SinkTarget::Directory(dir.path().to_path_buf()),
            Format::Text,
        );

        for (id, exec) in [
            ("a/issue.txt", "A-exec"),
            ("b/issue.txt", "B-exec"),
            ("issue.html", "C-exec"),
        ] {
            let summary = merge(&[PartialSummary::new(0, exec, vec![], "Detail.")]).unwrap();
            let doc = Document::new(id, "body", DocumentMeta::default());
            sink.deliver(&doc, &summary).await.unwrap();
        }

        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert!(read("issue.summary.txt").contains("A-exec"));
        assert!(read("issue-2.summary.txt").contains("B-exec"));
        assert!(read("issue-3.summary.txt").contains("C-exec"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("news/2025-07-01.html"), "2025-07-01");
        assert_eq!(file_stem("a b:c.txt"), "a_b_c");
        assert_eq!(file_stem(""), "document");
    }
}
