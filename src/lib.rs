//! # pdf2ref
//!
//! Reconcile dual-resolution PDF extraction output into one canonical
//! layout, index it as chunk references, and resolve citation markers in
//! chat answers back to page regions.
//!
//! ## Why this crate?
//!
//! Document-chat systems that highlight their sources need two extraction
//! passes per page: a hi-res pass for figure/table detection and a fast
//! pass for text. The passes rasterize at different pixel dimensions, so
//! their bounding boxes live in different coordinate spaces, they re-detect
//! each other's elements, and their figure/table tags disagree. This crate
//! reconciles the two passes into a single canonical space, deduplicates
//! and merges the elements, and keeps enough geometry per chunk that an
//! answer's citations can be drawn as highlight boxes on the page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! extraction dump (JSON)
//!  │
//!  ├─ 1. Input      load and validate the per-page passes
//!  ├─ 2. Reconcile  per-page scale factor, hi-res rects → canonical space
//!  ├─ 3. Merge      dedup, same-kind merge, captions, reclassification
//!  ├─ 4. Index      chunk references in a directory-backed store
//!  └─ 5. Resolve    [[ref:N]] markers in answers → [N] + cited regions
//! ```
//!
//! Stages 1–3 run per page on the blocking pool, concurrently across pages;
//! a bad page degrades alone (see [`error::PageError`]) and the rest of the
//! document comes through clean.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2ref::{load_dump, process_document, build_chunk_references, PipelineConfig};
//! use pdf2ref::ChunkIndex;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let passes = load_dump("document.json").await?;
//!     let layout = process_document(passes, &config).await?;
//!     eprintln!("{} pages, {} degraded",
//!         layout.stats.total_pages, layout.stats.degraded_pages);
//!
//!     let index = ChunkIndex::open("./store").await?;
//!     let chunks = build_chunk_references("doc-1", &layout, &config);
//!     index.put_document("doc-1", chunks).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2ref` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pdf2ref = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod geometry;
pub mod index;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod resolve;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{build_chunk_references, process_document, process_document_sync, process_dump};
pub use error::{PageError, Pdf2RefError};
pub use geometry::BoundingRect;
pub use index::ChunkIndex;
pub use model::{
    CanonicalElement, ChunkReference, DocumentLayout, DocumentStats, ElementKind, ExtractionPass,
    ImageData, PageOutcome, RawElement, Reference, ResolutionTag, ResolvedAnswer,
};
pub use pipeline::input::{load_dump, load_dump_stdin};
pub use pipeline::reconcile::PageScale;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use resolve::resolve;
pub use stream::{process_stream, PageOutcomeStream};
