//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline reconciles and merges each page.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a database
//! record, or a terminal progress bar — without the library knowing anything
//! about how the host application communicates. The trait is `Send + Sync`
//! so it works correctly when pages are merged concurrently.
//!
//! # Example
//!
//! ```rust
//! use pdf2ref::{PipelineProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: u32, total_pages: usize, element_count: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("Page {}/{} merged ({} elements, {} done)", page_num, total_pages, element_count, done);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it reconciles and merges each page.
///
/// Implementations must be `Send + Sync` (pages are merged concurrently on
/// the blocking pool). All methods have default no-op implementations so
/// callers only override what they care about.
///
/// # Thread safety
///
/// `on_page_start`, `on_page_complete`, and `on_page_degraded` may be called
/// concurrently from different threads. Implementations must protect shared
/// mutable state with appropriate synchronisation primitives (`Mutex`,
/// `AtomicUsize`).
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before any page is processed.
    ///
    /// # Arguments
    /// * `total_pages` — number of pages that will be processed
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page's reconcile/merge begins.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — total pages in the document
    fn on_page_start(&self, page_num: u32, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page merges without degradation.
    ///
    /// # Arguments
    /// * `page_num`      — 1-indexed page number
    /// * `total_pages`   — total pages
    /// * `element_count` — canonical elements produced for the page
    fn on_page_complete(&self, page_num: u32, total_pages: usize, element_count: usize) {
        let _ = (page_num, total_pages, element_count);
    }

    /// Called when a page falls back to degraded output (invalid geometry or
    /// resolution mismatch). The page still contributes elements.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — total pages
    /// * `error`       — human-readable description of the degradation
    fn on_page_degraded(&self, page_num: u32, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been processed.
    ///
    /// # Arguments
    /// * `total_pages` — total pages in the document
    /// * `clean_count` — pages that merged without degradation
    fn on_document_complete(&self, total_pages: usize, clean_count: usize) {
        let _ = (total_pages, clean_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
