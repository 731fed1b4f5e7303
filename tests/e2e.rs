//! End-to-end integration tests for pdf2ref.
//!
//! Everything here runs against synthetic extraction dumps built in-process,
//! so the suite needs no fixtures, network, or external tools:
//!
//!   cargo test --test e2e -- --nocapture

use pdf2ref::{
    build_chunk_references, load_dump, process_document, process_stream, resolve, BoundingRect,
    ChunkIndex, DocumentLayout, ElementKind, ExtractionPass, PipelineConfig, RawElement,
    ResolutionTag,
};
use std::collections::HashMap;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Fast-pass page dimensions used throughout. The hi pass is 2.78x larger,
/// a realistic DPI pairing.
const FAST_W: f64 = 1000.0;
const FAST_H: f64 = 1400.0;
const FACTOR: f64 = 2.78;

fn fast_rect(page: u32, x1: f64, y1: f64, x2: f64, y2: f64) -> BoundingRect {
    BoundingRect::new(x1, y1, x2, y2, FAST_W, FAST_H, page).expect("valid fast rect")
}

fn hi_rect(page: u32, x1: f64, y1: f64, x2: f64, y2: f64) -> BoundingRect {
    BoundingRect::new(
        x1 * FACTOR,
        y1 * FACTOR,
        x2 * FACTOR,
        y2 * FACTOR,
        FAST_W * FACTOR,
        FAST_H * FACTOR,
        page,
    )
    .expect("valid hi rect")
}

fn text(rect: BoundingRect, res: ResolutionTag, content: &str) -> RawElement {
    RawElement {
        kind: ElementKind::Text,
        rect,
        resolution: res,
        content: content.into(),
        caption: None,
        images: vec![],
    }
}

fn visual(kind: ElementKind, rect: BoundingRect, res: ResolutionTag, content: &str) -> RawElement {
    RawElement {
        kind,
        rect,
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
        pixel_width: FAST_W,
        pixel_height: FAST_H,
        elements,
    }
}

fn hi_pass(page: u32, elements: Vec<RawElement>) -> ExtractionPass {
    ExtractionPass {
        page_number: page,
        resolution: ResolutionTag::Hi,
        pixel_width: FAST_W * FACTOR,
        pixel_height: FAST_H * FACTOR,
        elements,
    }
}

/// A two-page dual-pass document: page 1 has a figure with a caption, page 2
/// is prose.
fn sample_document() -> Vec<ExtractionPass> {
    vec![
        fast_pass(
            1,
            vec![
                text(
                    fast_rect(1, 100.0, 100.0, 900.0, 180.0),
                    ResolutionTag::Fast,
                    "Quarterly revenue grew twelve percent year over year.",
                ),
                text(
                    fast_rect(1, 150.0, 620.0, 850.0, 660.0),
                    ResolutionTag::Fast,
                    "Figure 1: Revenue by region",
                ),
            ],
        ),
        hi_pass(
            1,
            vec![visual(
                ElementKind::Figure,
                hi_rect(1, 150.0, 250.0, 850.0, 600.0),
                ResolutionTag::Hi,
                "bar chart",
            )],
        ),
        fast_pass(
            2,
            vec![text(
                fast_rect(2, 100.0, 100.0, 900.0, 300.0),
                ResolutionTag::Fast,
                "Methodology notes and assumptions.",
            )],
        ),
        hi_pass(2, vec![]),
    ]
}

fn assert_layout_clean(layout: &DocumentLayout, context: &str) {
    assert_eq!(
        layout.stats.degraded_pages, 0,
        "[{context}] no page should degrade"
    );
    for page in &layout.pages {
        assert!(
            page.error.is_none(),
            "[{context}] page {} carries an error: {:?}",
            page.page_number,
            page.error
        );
    }
}

// ── Full pipeline: reconcile + merge ─────────────────────────────────────────

#[tokio::test]
async fn dual_pass_document_reconciles_and_merges() {
    let layout = process_document(sample_document(), &PipelineConfig::default())
        .await
        .expect("processing should succeed");

    assert_layout_clean(&layout, "dual-pass");
    assert_eq!(layout.stats.total_pages, 2);

    let page1 = &layout.pages[0];
    assert!(
        (page1.scale_factor.unwrap() - FACTOR).abs() < 0.01,
        "page 1 scale factor should be ~{FACTOR}, got {:?}",
        page1.scale_factor
    );

    // The hi-res figure must land in fast-space coordinates.
    let figure = page1
        .elements
        .iter()
        .find(|e| e.kind == ElementKind::Figure)
        .expect("figure should survive the merge");
    assert!(
        (figure.rect.x1 - 150.0).abs() < 1.0 && (figure.rect.y2 - 600.0).abs() < 1.0,
        "figure rect should be in canonical space, got {:?}",
        figure.rect
    );

    // The caption line is consumed into the figure, not kept as text.
    assert_eq!(
        figure.caption.as_deref(),
        Some("Figure 1: Revenue by region"),
        "figure should have adopted its caption"
    );
    assert_eq!(
        page1.elements.len(),
        2,
        "page 1 should hold prose + captioned figure, got {:?}",
        page1.elements.iter().map(|e| &e.content).collect::<Vec<_>>()
    );

    println!(
        "[dual-pass] {} elements across {} pages",
        layout.elements().count(),
        layout.stats.total_pages
    );
}

#[tokio::test]
async fn processing_is_deterministic_across_runs() {
    let config = PipelineConfig::default();
    let a = process_document(sample_document(), &config).await.unwrap();
    let b = process_document(sample_document(), &config).await.unwrap();

    assert_eq!(a.pages.len(), b.pages.len());
    for (pa, pb) in a.pages.iter().zip(&b.pages) {
        assert_eq!(pa.elements, pb.elements, "page {} differs", pa.page_number);
    }
}

#[tokio::test]
async fn concurrency_does_not_change_output() {
    let serial_cfg = PipelineConfig::builder().concurrency(1).build().unwrap();
    let parallel_cfg = PipelineConfig::builder().concurrency(8).build().unwrap();

    let mut passes = sample_document();
    for page in 3..=10 {
        passes.push(fast_pass(
            page,
            vec![text(
                fast_rect(page, 50.0, 50.0, 950.0, 200.0),
                ResolutionTag::Fast,
                "filler paragraph",
            )],
        ));
    }

    let serial = process_document(passes.clone(), &serial_cfg).await.unwrap();
    let parallel = process_document(passes, &parallel_cfg).await.unwrap();

    assert_eq!(serial.pages.len(), parallel.pages.len());
    for (a, b) in serial.pages.iter().zip(&parallel.pages) {
        assert_eq!(a.page_number, b.page_number, "page order must not depend on completion order");
        assert_eq!(a.elements, b.elements);
    }
}

// ── Degradation: bad pages stay contained ────────────────────────────────────

#[tokio::test]
async fn mismatched_page_degrades_alone() {
    let mut passes = sample_document();
    // Page 3's hi pass reports a height that contradicts its width ratio.
    passes.push(fast_pass(
        3,
        vec![text(
            fast_rect(3, 100.0, 100.0, 900.0, 200.0),
            ResolutionTag::Fast,
            "survivor text",
        )],
    ));
    passes.push(ExtractionPass {
        page_number: 3,
        resolution: ResolutionTag::Hi,
        pixel_width: FAST_W * 2.0,
        pixel_height: FAST_H * 3.0,
        elements: vec![visual(
            ElementKind::Figure,
            BoundingRect::new(200.0, 200.0, 900.0, 900.0, FAST_W * 2.0, FAST_H * 3.0, 3).unwrap(),
            ResolutionTag::Hi,
            "untrustworthy detection",
        )],
    });

    let layout = process_document(passes, &PipelineConfig::default())
        .await
        .expect("document must not abort on one bad page");

    assert_eq!(layout.stats.degraded_pages, 1);
    assert_eq!(layout.stats.clean_pages, 2);

    let page3 = layout.pages.iter().find(|p| p.page_number == 3).unwrap();
    assert!(page3.is_degraded());
    assert!(page3.scale_factor.is_none());
    assert_eq!(
        page3.elements.len(),
        1,
        "fast-pass text survives; the hi-res detection is dropped"
    );
    assert_eq!(page3.elements[0].content, "survivor text");

    // Pages 1 and 2 are untouched by page 3's failure.
    assert!(layout.pages[0].elements.iter().any(|e| e.kind == ElementKind::Figure));
}

#[tokio::test]
async fn duplicate_pass_is_fatal() {
    let passes = vec![fast_pass(1, vec![]), fast_pass(1, vec![])];
    let err = process_document(passes, &PipelineConfig::default())
        .await
        .expect_err("duplicate passes violate the dump contract");
    assert!(err.to_string().contains("duplicate"), "got: {err}");
}

// ── Merge semantics across resolutions ───────────────────────────────────────

#[tokio::test]
async fn cross_resolution_redetection_collapses() {
    // Both passes saw the same paragraph; after reconciliation the rects
    // overlap and the two detections merge into one element.
    let passes = vec![
        fast_pass(
            1,
            vec![text(
                fast_rect(1, 100.0, 100.0, 500.0, 160.0),
                ResolutionTag::Fast,
                "the same paragraph",
            )],
        ),
        hi_pass(
            1,
            vec![text(
                hi_rect(1, 105.0, 102.0, 495.0, 158.0),
                ResolutionTag::Hi,
                "the same paragraph",
            )],
        ),
    ];

    let layout = process_document(passes, &PipelineConfig::default()).await.unwrap();
    assert_layout_clean(&layout, "redetection");
    assert_eq!(
        layout.pages[0].elements.len(),
        1,
        "re-detected paragraph should collapse to one element, got {:?}",
        layout.pages[0].elements
    );
    assert_eq!(layout.pages[0].elements[0].content, "the same paragraph");
}

#[tokio::test]
async fn text_inside_hi_res_figure_is_dropped() {
    // An axis label the fast pass extracted sits entirely inside the figure
    // the hi pass detected; containment is evaluated after reconciliation.
    let passes = vec![
        fast_pass(
            1,
            vec![
                text(
                    fast_rect(1, 220.0, 300.0, 400.0, 330.0),
                    ResolutionTag::Fast,
                    "Q3",
                ),
                text(
                    fast_rect(1, 100.0, 700.0, 900.0, 800.0),
                    ResolutionTag::Fast,
                    "Discussion paragraph below the chart.",
                ),
            ],
        ),
        hi_pass(
            1,
            vec![visual(
                ElementKind::Figure,
                hi_rect(1, 150.0, 250.0, 850.0, 600.0),
                ResolutionTag::Hi,
                "chart",
            )],
        ),
    ];

    let layout = process_document(passes, &PipelineConfig::default()).await.unwrap();
    assert_layout_clean(&layout, "containment");

    let contents: Vec<&str> = layout.pages[0]
        .elements
        .iter()
        .map(|e| e.content.as_str())
        .collect();
    assert!(
        !contents.contains(&"Q3"),
        "axis label inside the figure should be dropped, got {contents:?}"
    );
    assert!(contents.iter().any(|c| c.starts_with("Discussion")));
}

// ── Chunk references and the store ───────────────────────────────────────────

#[tokio::test]
async fn index_and_citation_round_trip() {
    let config = PipelineConfig::default();
    let layout = process_document(sample_document(), &config).await.unwrap();
    let chunks = build_chunk_references("report-2024", &layout, &config);
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| c.chunk_id.starts_with("report-2024:")));

    let dir = tempfile::tempdir().unwrap();
    let index = ChunkIndex::open(dir.path()).await.unwrap();
    index.put_document("report-2024", chunks.clone()).await.unwrap();

    // Present two chunks to an imaginary answer generator, then resolve the
    // markers it produced.
    let ordinals: HashMap<u32, String> = [
        (1, chunks[0].chunk_id.clone()),
        (2, chunks[1].chunk_id.clone()),
    ]
    .into();
    let resolved = index
        .resolve_answer(
            "Revenue grew [[ref:1]], as shown in [[ref:2]]. See [[ref:1]] again.",
            &ordinals,
        )
        .await;

    assert_eq!(
        resolved.clean_text,
        "Revenue grew [1], as shown in [2]. See [1] again."
    );
    assert_eq!(
        resolved.references.len(),
        2,
        "repeated citation must not duplicate its reference"
    );
    assert_eq!(resolved.references[0].chunk_id, chunks[0].chunk_id);
    assert_eq!(
        resolved.references[0].page_number,
        chunks[0].page_number,
        "reference must carry the page for highlighting"
    );

    println!(
        "[round-trip] {} chunks indexed, {} references resolved",
        chunks.len(),
        resolved.references.len()
    );
}

#[tokio::test]
async fn unknown_marker_stays_inert() {
    let dir = tempfile::tempdir().unwrap();
    let index = ChunkIndex::open(dir.path()).await.unwrap();
    let ordinals: HashMap<u32, String> = [(1, "ghost:1:0".to_string())].into();

    let resolved = index.resolve_answer("Cited [[ref:1]] and [[ref:4]].", &ordinals).await;
    assert_eq!(
        resolved.clean_text, "Cited [[ref:1]] and [[ref:4]].",
        "markers that cannot resolve must pass through untouched"
    );
    assert!(resolved.references.is_empty());
}

#[tokio::test]
async fn reindexing_after_reprocessing_is_stable() {
    let config = PipelineConfig::default();
    let dir = tempfile::tempdir().unwrap();
    let index = ChunkIndex::open(dir.path()).await.unwrap();

    for _ in 0..2 {
        let layout = process_document(sample_document(), &config).await.unwrap();
        let chunks = build_chunk_references("doc", &layout, &config);
        index.put_document("doc", chunks).await.unwrap();
    }

    let layout = process_document(sample_document(), &config).await.unwrap();
    let expected = build_chunk_references("doc", &layout, &config).len();
    assert_eq!(
        index.len().await,
        expected,
        "re-indexing identical input must not grow the store"
    );

    // Survives a reopen as well.
    drop(index);
    let reopened = ChunkIndex::open(dir.path()).await.unwrap();
    assert_eq!(reopened.len().await, expected);
    assert_eq!(reopened.document_ids().await, vec!["doc".to_string()]);
}

#[tokio::test]
async fn deleting_a_document_removes_its_citations() {
    let config = PipelineConfig::default();
    let layout = process_document(sample_document(), &config).await.unwrap();
    let chunks = build_chunk_references("doc", &layout, &config);
    let first_id = chunks[0].chunk_id.clone();

    let dir = tempfile::tempdir().unwrap();
    let index = ChunkIndex::open(dir.path()).await.unwrap();
    index.put_document("doc", chunks).await.unwrap();
    assert!(index.delete_document("doc").await.unwrap());

    let ordinals: HashMap<u32, String> = [(1, first_id)].into();
    let resolved = index.resolve_answer("See [[ref:1]].", &ordinals).await;
    assert_eq!(resolved.clean_text, "See [[ref:1]].");
    assert!(resolved.references.is_empty());
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn streaming_matches_eager_output() {
    use futures::StreamExt;

    let config = PipelineConfig::builder().concurrency(4).build().unwrap();
    let eager = process_document(sample_document(), &config).await.unwrap();

    let stream = process_stream(sample_document(), &config).await.unwrap();
    let mut streamed: Vec<_> = stream.collect().await;
    streamed.sort_by_key(|p| p.page_number);

    assert_eq!(streamed.len(), eager.pages.len());
    for (s, e) in streamed.iter().zip(&eager.pages) {
        assert_eq!(s.page_number, e.page_number);
        assert_eq!(s.elements, e.elements, "page {} differs from eager", s.page_number);
    }
}

// ── Dump I/O and serialization ───────────────────────────────────────────────

#[tokio::test]
async fn dump_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.json");
    let passes = sample_document();
    std::fs::write(&path, serde_json::to_vec_pretty(&passes).unwrap()).unwrap();

    let loaded = load_dump(&path).await.expect("dump should load");
    assert_eq!(loaded, passes);

    let layout = process_document(loaded, &PipelineConfig::default()).await.unwrap();
    assert_layout_clean(&layout, "dump-file");
}

#[tokio::test]
async fn layout_json_round_trips() {
    let layout = process_document(sample_document(), &PipelineConfig::default())
        .await
        .unwrap();

    let json = serde_json::to_string_pretty(&layout).expect("layout must serialise");
    let back: DocumentLayout = serde_json::from_str(&json).expect("layout must deserialise");
    assert_eq!(back.stats.total_pages, layout.stats.total_pages);
    assert_eq!(back.pages, layout.pages);
}

#[test]
fn resolver_works_without_a_store() {
    // The pure function is usable directly for callers that hold chunks
    // in memory.
    let resolved = resolve("No markers here.", &HashMap::new(), &HashMap::new());
    assert_eq!(resolved.clean_text, "No markers here.");
    assert!(resolved.references.is_empty());
}
