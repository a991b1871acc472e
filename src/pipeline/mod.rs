//! Running the summarizer over documents and delivering the results.

use crate::document::{DeliverySink, Document};
use crate::error::{Error, Result};
use crate::summarize::{FinalSummary, Summarizer};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// Default number of documents summarized at once.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// What happened to one document.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub document: Document,
    /// The summary, or why the document was skipped.
    pub result: Result<FinalSummary>,
    pub elapsed: Duration,
}

impl DocumentOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of one run, in input order.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcomes: Vec<DocumentOutcome>,
}

impl RunReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Split, summarize and merge one document.
pub async fn summarize_document(
    summarizer: &Summarizer,
    document: &Document,
    cancel: &CancellationToken,
) -> Result<FinalSummary> {
    info!(
        "Summarizing {} ({} tokens)",
        document.id(),
        summarizer.counter().count_tokens(document.text())
    );
    let summary = summarizer.summarize_text(document.text(), cancel).await?;
    info!(
        "Summarized {} in {} part(s), {} keywords",
        document.id(),
        summary.parts,
        summary.keywords.len()
    );
    Ok(summary)
}

/// Summarize `documents` with up to `concurrency` in flight and deliver each
/// summary in input order.
///
/// A failed document is logged and reported in its outcome; the others carry
/// on. Nothing is delivered for a failed or cancelled document.
pub async fn summarize_all(
    summarizer: &Summarizer,
    documents: Vec<Document>,
    sink: &dyn DeliverySink,
    concurrency: usize,
    cancel: &CancellationToken,
) -> RunReport {
    let run_id = Uuid::new_v4();
    info!(
        "Run {}: {} document(s), concurrency {}",
        run_id,
        documents.len(),
        concurrency.max(1)
    );

    let mut results = futures::stream::iter(documents)
        .map(|document| async move {
            let started = Instant::now();
            let result = summarize_document(summarizer, &document, cancel).await;
            (document, result, started)
        })
        .buffered(concurrency.max(1));

    let mut outcomes = Vec::new();
    while let Some((document, mut result, started)) = results.next().await {
        let delivered = match &result {
            Ok(summary) => deliver(sink, &document, summary, cancel).await,
            Err(_) => Ok(()),
        };
        if let Err(e) = delivered {
            result = Err(e);
        }
        if let Err(e) = &result {
            error!("Skipping {}: {}", document.id(), e);
        }
        outcomes.push(DocumentOutcome {
            document,
            result,
            elapsed: started.elapsed(),
        });
    }

    let report = RunReport { run_id, outcomes };
    info!(
        "Run {} finished: {} succeeded, {} failed",
        run_id,
        report.succeeded(),
        report.failed()
    );
    report
}

async fn deliver(
    sink: &dyn DeliverySink,
    document: &Document,
    summary: &FinalSummary,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    sink.deliver(document, summary).await
}
