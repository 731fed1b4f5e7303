//! Error types for the pdf2ref library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2RefError`] — **Fatal**: the run cannot proceed at all (unreadable
//!   extraction dump, corrupt index store, invalid configuration). Returned
//!   as `Err(Pdf2RefError)` from the top-level entry points.
//!
//! * [`PageError`] — **Non-fatal**: a single page's geometry could not be
//!   reconciled or merged, but all other pages are fine. Stored inside
//!   [`crate::model::PageOutcome`] so callers can inspect partial success
//!   rather than losing the whole document to one bad page.
//!
//! The separation lets callers decide their own tolerance: abort on the first
//! degraded page, log and continue, or collect all errors for a post-run
//! report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2ref library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::model::PageOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2RefError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Extraction dump was not found at the given path.
    #[error("Extraction dump not found: '{path}'\nCheck the path exists and is readable.")]
    DumpNotFound { path: PathBuf },

    /// Process does not have read permission on the dump.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The dump was read but is not valid JSON for a list of extraction passes.
    #[error("Extraction dump '{path}' could not be parsed: {detail}")]
    DumpParse { path: PathBuf, detail: String },

    /// The dump parsed but violates the extraction contract.
    #[error("Extraction dump is invalid: {detail}")]
    InvalidDump { detail: String },

    // ── Store errors ──────────────────────────────────────────────────────
    /// Reading or writing the chunk store failed at the filesystem level.
    #[error("Chunk store I/O failed at '{path}': {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document file in the store directory is unreadable as chunk records.
    ///
    /// Raised by [`crate::index::ChunkIndex::open`]; corruption in the
    /// backing store is the one condition the pipeline never recovers from.
    #[error("Chunk store is corrupt: '{path}': {detail}\nRemove or restore the file, then reopen the store.")]
    IndexCorrupt { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error scoped to a single page.
///
/// Stored alongside [`crate::model::PageOutcome`] when a page degrades.
/// Document processing continues; the page falls back as described in the
/// variant docs.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// A rectangle on this page is malformed (x1 > x2, y1 > y2, non-finite
    /// coordinates, or non-positive page dimensions).
    ///
    /// The page's merge step is abandoned; the page falls back to its
    /// unreconciled fast-pass text elements.
    #[error("Page {page}: invalid geometry: {detail}")]
    InvalidGeometry { page: u32, detail: String },

    /// The two extraction passes report pixel dimensions whose width and
    /// height ratios disagree beyond tolerance.
    ///
    /// The page is processed with fast-pass geometry only; hi-res detections
    /// are dropped for this page.
    #[error(
        "Page {page}: resolution ratios disagree beyond tolerance: \
         width {width_ratio:.4} vs height {height_ratio:.4}"
    )]
    ResolutionMismatch {
        page: u32,
        width_ratio: f64,
        height_ratio: f64,
    },
}

impl PageError {
    /// Page this error is scoped to.
    pub fn page(&self) -> u32 {
        match self {
            PageError::InvalidGeometry { page, .. } => *page,
            PageError::ResolutionMismatch { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_geometry_display() {
        let e = PageError::InvalidGeometry {
            page: 3,
            detail: "x1 (10) > x2 (4)".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 3"), "got: {msg}");
        assert!(msg.contains("x1 (10)"), "got: {msg}");
    }

    #[test]
    fn resolution_mismatch_display() {
        let e = PageError::ResolutionMismatch {
            page: 7,
            width_ratio: 2.78,
            height_ratio: 2.01,
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 7"));
        assert!(msg.contains("2.7800"));
        assert!(msg.contains("2.0100"));
    }

    #[test]
    fn page_accessor() {
        let e = PageError::ResolutionMismatch {
            page: 12,
            width_ratio: 1.0,
            height_ratio: 2.0,
        };
        assert_eq!(e.page(), 12);
    }

    #[test]
    fn index_corrupt_display_names_path() {
        let e = Pdf2RefError::IndexCorrupt {
            path: PathBuf::from("/tmp/store/doc.json"),
            detail: "expected value at line 1".into(),
        };
        assert!(e.to_string().contains("doc.json"));
    }
}
