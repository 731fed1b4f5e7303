//! The per-page processing stages.
//!
//! Each submodule implements one transformation step; keeping them separate
//! makes each independently testable.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ reconcile ──▶ merge ──▶ canonical elements
//! (dump)    (PageScale)   (dedup, captions, reclassify)
//! ```
//!
//! 1. [`input`] — load and validate an extraction dump (JSON, file or stdin)
//! 2. [`reconcile`] — compute the per-page scale factor between the two
//!    passes and convert hi-res rects into the canonical space
//! 3. [`merge`] — dedup/merge reconciled elements into canonical elements
//! 4. [`caption`] / [`classify`] — the ordered heuristic rules [`merge`]
//!    applies for caption association and kind correction
//!
//! Document-level orchestration lives in [`crate::document`] (eager) and
//! [`crate::stream`] (streaming); both drive these stages page by page.

pub mod caption;
pub mod classify;
pub mod input;
pub mod merge;
pub mod reconcile;
