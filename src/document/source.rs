use super::{Document, DocumentMeta, DocumentSource, eml};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Reads documents from files, or stdin for `-`.
///
/// `.html`/`.htm` files go through HTML extraction, `.eml` files through
/// MIME decoding; anything else is plain text.
#[derive(Debug, Clone)]
pub struct FileSource {
    paths: Vec<PathBuf>,
}

impl FileSource {
    #[must_use]
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl DocumentSource for FileSource {
    async fn fetch(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            documents.push(load(path).await?);
        }
        Ok(documents)
    }
}

async fn load(path: &Path) -> Result<Document> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        return Ok(Document::new("stdin", text, DocumentMeta::default()));
    }

    let id = path.display().to_string();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    // Email bodies declare their own charset
    if extension.as_deref() == Some("eml") {
        let raw = tokio::fs::read(path).await?;
        debug!("Loaded {} ({} bytes)", id, raw.len());
        let message = eml::parse(&raw);
        return if message.is_html {
            Document::from_html(id, &message.body, message.meta)
        } else {
            Ok(Document::new(id, message.body, message.meta))
        };
    }

    let raw = tokio::fs::read_to_string(path).await?;
    debug!("Loaded {} ({} bytes)", id, raw.len());
    match extension.as_deref() {
        Some("html" | "htm") => Document::from_html(id, &raw, DocumentMeta::default()),
        _ => Ok(Document::new(id, raw, DocumentMeta::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_mixed_formats_in_order() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("plain.txt");
        let html = dir.path().join("issue.HTML");
        let eml = dir.path().join("mail.eml");
        std::fs::write(&txt, "Plain body.").unwrap();
        std::fs::write(&html, "<p>Html <i>body</i>.</p>").unwrap();
        std::fs::write(&eml, "Subject: Weekly\nFrom: a@b.c\n\nEmail body.").unwrap();

        let source = FileSource::new(vec![txt.clone(), html, eml]);
        let docs = source.fetch().await.unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].id(), txt.display().to_string());
        assert_eq!(docs[0].text(), "Plain body.");
        assert!(docs[1].text().contains("Html"));
        assert!(!docs[1].text().contains("<p>"));
        assert_eq!(docs[2].text(), "Email body.");
        assert_eq!(docs[2].meta().subject.as_deref(), Some("Weekly"));
        assert_eq!(docs[2].title(), "Weekly");
    }

    #[tokio::test]
    async fn test_html_email_is_extracted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("digest.eml");
        std::fs::write(
            &path,
            "Subject: Digest\r\n\
             Content-Type: multipart/alternative; boundary=\"b1\"\r\n\r\n\
             --b1\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n\
             PHA+RmlzY2FsIDxiPnVwZGF0ZTwvYj48L3A+\r\n\
             --b1--\r\n",
        )
        .unwrap();

        let docs = FileSource::new(vec![path]).fetch().await.unwrap();
        assert_eq!(docs[0].title(), "Digest");
        assert!(docs[0].text().contains("Fiscal"));
        assert!(docs[0].text().contains("update"));
        assert!(!docs[0].text().contains("<p>"));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let source = FileSource::new(vec![dir.path().join("absent.txt")]);
        assert!(matches!(source.fetch().await, Err(Error::Io(_))));
    }
}
