//! Domain and boundary types for the reference-resolution pipeline.
//!
//! The types here mirror the pipeline's data flow: an extraction
//! collaborator hands us [`ExtractionPass`]es full of [`RawElement`]s, the
//! reconcile/merge stages turn them into [`CanonicalElement`]s collected in
//! [`PageOutcome`]s and a [`DocumentLayout`], indexing persists them as
//! [`ChunkReference`]s, and citation resolution emits a [`ResolvedAnswer`].
//!
//! Everything is `Serialize + Deserialize` because every one of these types
//! crosses a process boundary somewhere: extraction dumps come in as JSON,
//! layouts and resolved answers go out as JSON, and chunk references live in
//! the store's document files.

use crate::geometry::BoundingRect;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a detected region contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Figure,
    Table,
}

impl ElementKind {
    /// Figures and tables are highlight targets with images and captions;
    /// text is running prose.
    pub fn is_visual(&self) -> bool {
        matches!(self, ElementKind::Figure | ElementKind::Table)
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Text => write!(f, "text"),
            ElementKind::Figure => write!(f, "figure"),
            ElementKind::Table => write!(f, "table"),
        }
    }
}

/// Which extraction pass produced an element.
///
/// `Hi` is the high-resolution rasterization used for visual-element
/// detection; `Fast` is the low-resolution/no-OCR pass used for clean text.
/// The fast pass defines the canonical coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTag {
    Hi,
    Fast,
}

impl std::fmt::Display for ResolutionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionTag::Hi => write!(f, "hi"),
            ResolutionTag::Fast => write!(f, "fast"),
        }
    }
}

/// Opaque image payload carried from extraction through to references.
///
/// `data` is whatever the extraction collaborator produced (base64 or a URI);
/// the pipeline never decodes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub data: String,
}

/// An as-detected region from one extraction pass.
///
/// Lives only between extraction and merge; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    pub kind: ElementKind,
    /// Rect in the source pass's coordinate space.
    pub rect: BoundingRect,
    pub resolution: ResolutionTag,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
}

/// One extraction run over one page at one resolution.
///
/// This is the payload the out-of-process extractor emits. A page may
/// arrive with one or both passes; the pipeline reconciles when both are
/// present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionPass {
    /// 1-indexed page number.
    pub page_number: u32,
    pub resolution: ResolutionTag,
    /// Pixel width the page rasterized to in this pass.
    pub pixel_width: f64,
    /// Pixel height the page rasterized to in this pass.
    pub pixel_height: f64,
    pub elements: Vec<RawElement>,
}

/// A post-merge, post-dedup element in the canonical coordinate space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalElement {
    /// Stable content-derived fingerprint; identical input yields the same
    /// id across runs.
    pub id: String,
    pub kind: ElementKind,
    /// Rect normalized into the canonical (fast-pass) space.
    pub rect: BoundingRect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub page_number: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
}

impl CanonicalElement {
    /// Derive the stable element id from kind, page, and a content prefix.
    ///
    /// Truncated SHA-256 rather than a full digest: 16 hex chars is plenty
    /// to avoid collisions within one document and keeps ids readable in
    /// logs and dumps.
    pub fn derive_id(kind: ElementKind, page_number: u32, content: &str) -> String {
        let prefix: String = content.chars().take(128).collect();
        let mut hasher = Sha256::new();
        hasher.update(kind.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(page_number.to_le_bytes());
        hasher.update(b":");
        hasher.update(prefix.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

/// Result of reconciling and merging one page.
///
/// `error` is `Some` when the page degraded (invalid geometry or resolution
/// mismatch); the page still contributes whatever elements survived the
/// fallback described on the [`crate::error::PageError`] variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    pub page_number: u32,
    pub elements: Vec<CanonicalElement>,
    /// Hi-over-fast scale factor applied to this page, when both passes were
    /// present and agreed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::error::PageError>,
    pub duration_ms: u64,
}

impl PageOutcome {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate counters for one processed document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    pub total_pages: usize,
    pub clean_pages: usize,
    pub degraded_pages: usize,
    pub text_elements: usize,
    pub figure_elements: usize,
    pub table_elements: usize,
    pub total_duration_ms: u64,
}

/// Document-level pipeline result: pages in page-number order plus stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub pages: Vec<PageOutcome>,
    pub stats: DocumentStats,
}

impl DocumentLayout {
    /// All canonical elements across pages, in page then reading order.
    pub fn elements(&self) -> impl Iterator<Item = &CanonicalElement> {
        self.pages.iter().flat_map(|p| p.elements.iter())
    }
}

/// Indexing-time record for one retrievable chunk.
///
/// Read-only after creation; replaced wholesale by a re-index, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReference {
    /// `{document_id}:{page_number}:{ordinal}` with the ordinal assigned per
    /// page in reading order.
    pub chunk_id: String,
    pub document_id: String,
    pub page_number: u32,
    /// Geometry in the canonical space, ready for the viewer at scale 1.0.
    pub rect: BoundingRect,
    pub text_preview: String,
    /// Full chunk content, kept for prompt construction by the caller.
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
    /// Query-time field filled by the retrieval layer; never stored as Some.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// One resolved citation in a chat answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub chunk_id: String,
    pub page_number: u32,
    pub rect: BoundingRect,
    pub text_preview: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl Reference {
    pub fn from_chunk(chunk: &ChunkReference) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            page_number: chunk.page_number,
            rect: chunk.rect,
            text_preview: chunk.text_preview.clone(),
            images: chunk.images.clone(),
            relevance_score: chunk.relevance_score,
        }
    }
}

/// The presentation-facing payload for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAnswer {
    /// Answer text with internal markers rewritten to the external format.
    pub clean_text: String,
    /// Distinct cited chunks in first-occurrence order.
    pub references: Vec<Reference>,
}
