//! Streaming processing API: emit page outcomes as they complete.
//!
//! ## Why stream?
//!
//! Large documents take a while to merge. A stream-based API lets callers
//! display partial results immediately, wire up progress bars, or index
//! pages incrementally instead of buffering the entire document in memory.
//!
//! Unlike the eager [`crate::document::process_document`] which returns
//! only after all pages finish, [`process_stream`] yields one
//! [`PageOutcome`] per page as each page completes. Pages arrive in
//! completion order, not page order — sort by `page_number` if order
//! matters. Degraded pages are items like any other, with their `error`
//! field set; the stream itself never errors after it has been returned.

use crate::config::PipelineConfig;
use crate::document::{self, PagePasses};
use crate::error::Pdf2RefError;
use crate::model::{ExtractionPass, PageOutcome};
use crate::pipeline::input;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page outcomes.
pub type PageOutcomeStream = Pin<Box<dyn Stream<Item = PageOutcome> + Send>>;

/// Process a document, streaming page outcomes as they are ready.
///
/// Dump-level validation happens up front, so a defective dump fails fast
/// here rather than mid-stream. A driver task fans pages out over the
/// blocking pool and feeds a bounded channel; dropping the returned stream
/// stops the driver once the channel's buffer drains.
///
/// # Returns
/// - `Ok(PageOutcomeStream)` — a stream of [`PageOutcome`]s
/// - `Err(Pdf2RefError)` — fatal error (duplicate passes, bad pixel dims)
///
/// # Example
/// ```rust,no_run
/// use pdf2ref::{process_stream, PipelineConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let passes = pdf2ref::load_dump("document.json").await?;
/// let config = PipelineConfig::default();
/// let mut pages = process_stream(passes, &config).await?;
/// while let Some(page) = pages.next().await {
///     println!("page {}: {} elements", page.page_number, page.elements.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn process_stream(
    passes: Vec<ExtractionPass>,
    config: &PipelineConfig,
) -> Result<PageOutcomeStream, Pdf2RefError> {
    input::validate_passes(&passes)?;
    let by_page = document::group_by_page(passes);
    let total_pages = by_page.len();
    info!(total_pages, "starting streaming document processing");

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(total_pages);
    }

    let (tx, rx) = mpsc::channel::<PageOutcome>(config.concurrency.max(1));
    let config = config.clone();

    tokio::spawn(async move {
        let mut merged = stream::iter(by_page.into_iter().map(|(page, passes)| {
            let cfg = config.clone();
            run_page(page, passes, total_pages, cfg)
        }))
        .buffer_unordered(config.concurrency);

        let mut clean = 0usize;
        while let Some(outcome) = merged.next().await {
            if let Some(o) = &outcome {
                if !o.is_degraded() {
                    clean += 1;
                }
            }
            match outcome {
                // A panicked merge task has no outcome to report; skip it.
                None => continue,
                Some(o) => {
                    // Receiver dropped; stop merging the remaining pages.
                    if tx.send(o).await.is_err() {
                        return;
                    }
                }
            }
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_complete(total_pages, clean);
        }
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

async fn run_page(
    page: u32,
    passes: PagePasses,
    total_pages: usize,
    config: PipelineConfig,
) -> Option<PageOutcome> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page, total_pages);
    }
    let cfg = config.clone();
    let outcome = tokio::task::spawn_blocking(move || document::process_page(page, passes, &cfg))
        .await
        .ok()?;
    if let Some(ref cb) = config.progress_callback {
        match &outcome.error {
            None => cb.on_page_complete(page, total_pages, outcome.elements.len()),
            Some(e) => cb.on_page_degraded(page, total_pages, &e.to_string()),
        }
    }
    Some(outcome)
}
