//! Eager (full-document) processing entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: reconcile and merge every page,
//! then return one [`DocumentLayout`]. Pages fan out over the blocking pool
//! and are reassembled in page-number order at the end. Use
//! [`crate::stream::process_stream`] instead when you want per-page
//! outcomes progressively on large documents.
//!
//! Failure policy: a page that cannot be reconciled
//! degrades — it falls back to whatever its fast pass can still offer and
//! records a [`PageError`] in its outcome — but never takes the rest of the
//! document down with it. Only dump-level defects are fatal here.

use crate::config::PipelineConfig;
use crate::error::{PageError, Pdf2RefError};
use crate::geometry::BoundingRect;
use crate::model::{
    CanonicalElement, ChunkReference, DocumentLayout, DocumentStats, ElementKind, ExtractionPass,
    PageOutcome, RawElement,
};
use crate::pipeline::input;
use crate::pipeline::merge;
use crate::pipeline::reconcile::PageScale;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The (up to) two passes extraction produced for one page.
#[derive(Debug, Clone, Default)]
pub(crate) struct PagePasses {
    pub hi: Option<ExtractionPass>,
    pub fast: Option<ExtractionPass>,
}

/// Reconcile and merge a whole document.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(DocumentLayout)` even when some pages degraded (check
/// `layout.stats.degraded_pages` and each page's `error`).
///
/// # Errors
/// `Err(Pdf2RefError)` only for dump-level defects: duplicate passes,
/// impossible pixel dimensions, page/pass mismatches.
pub async fn process_document(
    passes: Vec<ExtractionPass>,
    config: &PipelineConfig,
) -> Result<DocumentLayout, Pdf2RefError> {
    let total_start = Instant::now();
    input::validate_passes(&passes)?;

    // ── Step 1: shard by page ────────────────────────────────────────────
    let by_page = group_by_page(passes);
    let total_pages = by_page.len();
    info!(total_pages, "starting document processing");

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(total_pages);
    }

    // ── Step 2: reconcile + merge per page on the blocking pool ─────────
    let mut pages = process_concurrent(by_page, config).await?;

    // ── Step 3: restore page order ───────────────────────────────────────
    // Pages complete in any order; final ordering is by page number, never
    // by completion order.
    pages.sort_by_key(|p| p.page_number);

    // ── Step 4: stats ────────────────────────────────────────────────────
    let stats = compute_stats(&pages, total_start.elapsed().as_millis() as u64);
    info!(
        clean = stats.clean_pages,
        degraded = stats.degraded_pages,
        elements = stats.text_elements + stats.figure_elements + stats.table_elements,
        duration_ms = stats.total_duration_ms,
        "document processing complete"
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_complete(total_pages, stats.clean_pages);
    }

    Ok(DocumentLayout { pages, stats })
}

/// Load an extraction dump from `path` and process it.
pub async fn process_dump(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<DocumentLayout, Pdf2RefError> {
    let passes = input::load_dump(path).await?;
    process_document(passes, config).await
}

/// Synchronous wrapper around [`process_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_document_sync(
    passes: Vec<ExtractionPass>,
    config: &PipelineConfig,
) -> Result<DocumentLayout, Pdf2RefError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2RefError::Internal(format!("failed to create tokio runtime: {e}")))?
        .block_on(process_document(passes, config))
}

/// Turn a processed layout into indexable chunk references.
///
/// Chunk ids are `{document_id}:{page}:{ordinal}`, the ordinal assigned per
/// page in reading order, so re-running indexing over identical input
/// produces identical ids — the property `put` idempotence rests on.
pub fn build_chunk_references(
    document_id: &str,
    layout: &DocumentLayout,
    config: &PipelineConfig,
) -> Vec<ChunkReference> {
    let mut chunks = Vec::new();
    for page in &layout.pages {
        for (ordinal, el) in page.elements.iter().enumerate() {
            // Visual chunks preview their caption when they have one; the
            // caption is what a human would recognize the element by.
            let preview_source = match (&el.caption, el.kind.is_visual()) {
                (Some(caption), true) => caption.as_str(),
                _ => el.content.as_str(),
            };
            chunks.push(ChunkReference {
                chunk_id: format!("{document_id}:{}:{ordinal}", page.page_number),
                document_id: document_id.to_string(),
                page_number: page.page_number,
                rect: el.rect,
                text_preview: truncate_chars(preview_source, config.preview_chars),
                content: el.content.clone(),
                images: el.images.clone(),
                relevance_score: None,
            });
        }
    }
    chunks
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) fn group_by_page(passes: Vec<ExtractionPass>) -> BTreeMap<u32, PagePasses> {
    let mut by_page: BTreeMap<u32, PagePasses> = BTreeMap::new();
    for pass in passes {
        let entry = by_page.entry(pass.page_number).or_default();
        match pass.resolution {
            crate::model::ResolutionTag::Hi => entry.hi = Some(pass),
            crate::model::ResolutionTag::Fast => entry.fast = Some(pass),
        }
    }
    by_page
}

async fn process_concurrent(
    by_page: BTreeMap<u32, PagePasses>,
    config: &PipelineConfig,
) -> Result<Vec<PageOutcome>, Pdf2RefError> {
    let total_pages = by_page.len();
    let results: Vec<Result<PageOutcome, Pdf2RefError>> =
        stream::iter(by_page.into_iter().map(|(page, passes)| {
            let config = config.clone();
            async move {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_start(page, total_pages);
                }
                let cfg = config.clone();
                let outcome = tokio::task::spawn_blocking(move || process_page(page, passes, &cfg))
                    .await
                    .map_err(|e| {
                        Pdf2RefError::Internal(format!("page {page} merge task failed: {e}"))
                    })?;
                if let Some(ref cb) = config.progress_callback {
                    match &outcome.error {
                        None => cb.on_page_complete(page, total_pages, outcome.elements.len()),
                        Some(e) => cb.on_page_degraded(page, total_pages, &e.to_string()),
                    }
                }
                Ok(outcome)
            }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;
    results.into_iter().collect()
}

/// Reconcile and merge a single page. Runs in isolation: nothing here reads
/// any other page's elements.
pub(crate) fn process_page(page: u32, passes: PagePasses, config: &PipelineConfig) -> PageOutcome {
    let start = Instant::now();
    let (elements, scale_factor, error) = match (passes.hi, passes.fast) {
        (Some(hi), Some(fast)) => reconcile_both(page, &hi, &fast, config),
        // Single-pass pages are already in a single space; identity scale.
        (Some(single), None) | (None, Some(single)) => {
            match canonical_raws(&single, &PageScale::identity(page)) {
                Ok(raws) => (merge::merge_page(page, raws, config), None, None),
                Err(e) => {
                    warn!(page, error = %e, "page degraded to text-only elements");
                    (text_only_fallback(&single), None, Some(e))
                }
            }
        }
        (None, None) => (Vec::new(), None, None),
    };

    PageOutcome {
        page_number: page,
        elements,
        scale_factor,
        error,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

type PageStageResult = (Vec<CanonicalElement>, Option<f64>, Option<PageError>);

fn reconcile_both(
    page: u32,
    hi: &ExtractionPass,
    fast: &ExtractionPass,
    config: &PipelineConfig,
) -> PageStageResult {
    match PageScale::compute(hi, fast, config.resolution_tolerance) {
        Ok(scale) => {
            let combined = canonical_raws(fast, &PageScale::identity(page)).and_then(|mut all| {
                all.extend(canonical_raws(hi, &scale)?);
                Ok(all)
            });
            match combined {
                Ok(all) => {
                    debug!(page, factor = scale.factor, "page reconciled");
                    (merge::merge_page(page, all, config), Some(scale.factor), None)
                }
                Err(e) => {
                    // Geometry failure aborts the merge step; the page keeps
                    // its unreconciled fast-pass text.
                    warn!(page, error = %e, "page degraded to text-only elements");
                    (text_only_fallback(fast), None, Some(e))
                }
            }
        }
        Err(e) => {
            // The passes disagree about the page's shape; trust the fast
            // pass and drop the hi-res detections for this page.
            warn!(page, error = %e, "page degraded to fast-pass-only geometry");
            let elements = match canonical_raws(fast, &PageScale::identity(page)) {
                Ok(raws) => merge::merge_page(page, raws, config),
                Err(_) => text_only_fallback(fast),
            };
            (elements, None, Some(e))
        }
    }
}

/// Re-validate each element's rect and convert it into the canonical space.
///
/// Rects arriving from a dump bypassed [`BoundingRect::new`] (serde fills
/// fields directly), so the construction invariants are re-checked here
/// before any geometry runs over them.
fn canonical_raws(pass: &ExtractionPass, scale: &PageScale) -> Result<Vec<RawElement>, PageError> {
    pass.elements
        .iter()
        .map(|el| {
            let r = el.rect;
            let validated = BoundingRect::new(
                r.x1,
                r.y1,
                r.x2,
                r.y2,
                r.page_width,
                r.page_height,
                r.page_number,
            )?;
            Ok(RawElement {
                rect: scale.to_canonical(&validated)?,
                ..el.clone()
            })
        })
        .collect()
}

/// Last-resort page output: the pass's text elements with salvageable
/// rects, unreconciled and unmerged. Classification ambiguity never drops
/// content, and neither does another element's bad geometry.
fn text_only_fallback(pass: &ExtractionPass) -> Vec<CanonicalElement> {
    let raws: Vec<RawElement> = pass
        .elements
        .iter()
        .filter(|el| el.kind == ElementKind::Text)
        .filter_map(|el| {
            let r = el.rect;
            BoundingRect::new(r.x1, r.y1, r.x2, r.y2, r.page_width, r.page_height, r.page_number)
                .ok()
                .map(|rect| RawElement {
                    rect,
                    ..el.clone()
                })
        })
        .collect();
    merge::canonicalize(pass.page_number, raws)
}

fn compute_stats(pages: &[PageOutcome], total_duration_ms: u64) -> DocumentStats {
    let mut stats = DocumentStats {
        total_pages: pages.len(),
        total_duration_ms,
        ..Default::default()
    };
    for page in pages {
        if page.is_degraded() {
            stats.degraded_pages += 1;
        } else {
            stats.clean_pages += 1;
        }
        for el in &page.elements {
            match el.kind {
                ElementKind::Text => stats.text_elements += 1,
                ElementKind::Figure => stats.figure_elements += 1,
                ElementKind::Table => stats.table_elements += 1,
            }
        }
    }
    stats
}

/// Truncate on a char boundary; never splits a multi-byte character.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResolutionTag;

    fn rect(x1: f64, y1: f64, x2: f64, y2: f64, pw: f64, ph: f64, page: u32) -> BoundingRect {
        BoundingRect::new(x1, y1, x2, y2, pw, ph, page).unwrap()
    }

    fn text(page: u32, res: ResolutionTag, r: BoundingRect, content: &str) -> RawElement {
        RawElement {
            kind: ElementKind::Text,
            rect: r,
            resolution: res,
            content: content.into(),
            caption: None,
            images: vec![],
        }
    }

    fn fast_pass(page: u32, elements: Vec<RawElement>) -> ExtractionPass {
        ExtractionPass {
            page_number: page,
            resolution: ResolutionTag::Fast,
            pixel_width: 1000.0,
            pixel_height: 1400.0,
            elements,
        }
    }

    #[test]
    fn single_pass_page_uses_identity_scale() {
        let r = rect(100.0, 100.0, 400.0, 140.0, 1000.0, 1400.0, 1);
        let pass = fast_pass(1, vec![text(1, ResolutionTag::Fast, r, "hello")]);
        let outcome = process_page(
            1,
            PagePasses {
                hi: None,
                fast: Some(pass),
            },
            &PipelineConfig::default(),
        );
        assert!(outcome.error.is_none());
        assert_eq!(outcome.scale_factor, None);
        assert_eq!(outcome.elements.len(), 1);
        assert_eq!(outcome.elements[0].rect, r);
    }

    #[test]
    fn resolution_mismatch_drops_hi_detections() {
        let fast_rect = rect(100.0, 100.0, 400.0, 140.0, 1000.0, 1400.0, 1);
        let fast = fast_pass(1, vec![text(1, ResolutionTag::Fast, fast_rect, "prose")]);
        let hi = ExtractionPass {
            page_number: 1,
            resolution: ResolutionTag::Hi,
            pixel_width: 2000.0,
            pixel_height: 4200.0, // height tripled: ratios disagree
            elements: vec![RawElement {
                kind: ElementKind::Figure,
                rect: rect(200.0, 200.0, 800.0, 800.0, 2000.0, 4200.0, 1),
                resolution: ResolutionTag::Hi,
                content: "chart".into(),
                caption: None,
                images: vec![],
            }],
        };
        let outcome = process_page(
            1,
            PagePasses {
                hi: Some(hi),
                fast: Some(fast),
            },
            &PipelineConfig::default(),
        );
        assert!(matches!(
            outcome.error,
            Some(PageError::ResolutionMismatch { .. })
        ));
        assert_eq!(outcome.elements.len(), 1);
        assert_eq!(outcome.elements[0].content, "prose");
    }

    #[test]
    fn invalid_geometry_falls_back_to_text_only() {
        let good = rect(100.0, 100.0, 400.0, 140.0, 1000.0, 1400.0, 1);
        let mut bad = good;
        bad.x1 = 500.0; // x1 > x2, bypassing the constructor like serde does
        let pass = fast_pass(
            1,
            vec![
                text(1, ResolutionTag::Fast, good, "survives"),
                text(1, ResolutionTag::Fast, bad, "broken rect"),
            ],
        );
        let outcome = process_page(
            1,
            PagePasses {
                hi: None,
                fast: Some(pass),
            },
            &PipelineConfig::default(),
        );
        assert!(matches!(outcome.error, Some(PageError::InvalidGeometry { .. })));
        assert_eq!(outcome.elements.len(), 1);
        assert_eq!(outcome.elements[0].content, "survives");
    }

    #[tokio::test]
    async fn pages_come_back_in_page_order() {
        let passes: Vec<ExtractionPass> = (1..=6)
            .rev()
            .map(|page| {
                let r = rect(10.0, 10.0, 200.0, 40.0, 1000.0, 1400.0, page);
                fast_pass(page, vec![text(page, ResolutionTag::Fast, r, "line")])
            })
            .collect();
        let config = PipelineConfig::builder().concurrency(4).build().unwrap();
        let layout = process_document(passes, &config).await.unwrap();
        let order: Vec<u32> = layout.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(layout.stats.clean_pages, 6);
    }

    #[test]
    fn chunk_ids_are_stable_and_page_scoped() {
        let r = rect(10.0, 10.0, 200.0, 40.0, 1000.0, 1400.0, 2);
        let el = CanonicalElement {
            id: "abc".into(),
            kind: ElementKind::Text,
            rect: r,
            caption: None,
            page_number: 2,
            content: "hello world".into(),
            images: vec![],
        };
        let layout = DocumentLayout {
            pages: vec![PageOutcome {
                page_number: 2,
                elements: vec![el.clone(), el],
                scale_factor: None,
                error: None,
                duration_ms: 0,
            }],
            stats: DocumentStats::default(),
        };
        let config = PipelineConfig::default();
        let chunks = build_chunk_references("doc-1", &layout, &config);
        assert_eq!(chunks[0].chunk_id, "doc-1:2:0");
        assert_eq!(chunks[1].chunk_id, "doc-1:2:1");
        let again = build_chunk_references("doc-1", &layout, &config);
        assert_eq!(chunks, again);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(truncate_chars("日本語のテキスト", 3), "日本語");
        assert_eq!(truncate_chars("short", 200), "short");
    }
}
