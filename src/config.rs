//! Configuration types for the reference-resolution pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across threads and to diff two runs to
//! understand why their outputs differ.
//!
//! The merge thresholds here are empirically tuned values, not derived
//! constants: they were fitted against a sample document corpus and carry no
//! claim of universality. That is exactly why they are configuration —
//! callers working with unusual layouts (dense academic two-column, scanned
//! forms) should re-tune rather than accept the defaults.

use crate::error::Pdf2RefError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Configuration for document processing and reference resolution.
///
/// Built via [`PipelineConfig::builder()`] or with
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2ref::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .containment_threshold(0.85)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Containment ratio at or above which a text element inside a
    /// figure/table is dropped as detector noise. Range: 0.5–1.0. Default: 0.9.
    ///
    /// At 0.9 a text box must be almost entirely inside the visual element
    /// before it is considered an internal label. Lowering this drops more
    /// aggressively and risks eating captions that overlap their figure.
    pub containment_threshold: f64,

    /// Overlap ratio (relative to the smaller rect) at or above which two
    /// same-kind elements merge. Range: 0.05–1.0. Default: 0.3.
    ///
    /// Two passes detecting the same paragraph rarely agree exactly; 0.3
    /// catches re-detections while leaving genuinely adjacent columns alone.
    pub overlap_threshold: f64,

    /// Maximum horizontal gap, in canonical-space pixels, for two same-kind
    /// elements on the same visual line to merge as adjacent. Default: 100.0.
    pub adjacency_gap: f64,

    /// Maximum vertical distance, in canonical-space pixels, between a
    /// caption candidate and its figure/table. Default: 50.0.
    pub caption_gap: f64,

    /// Minimum horizontal overlap ratio (of the narrower rect) between a
    /// caption candidate and its figure/table. Range: 0.0–1.0. Default: 0.3.
    pub caption_overlap: f64,

    /// Minimum confidence a caption/classification rule must report to take
    /// effect. Range: 0.0–1.0. Default: 0.5.
    ///
    /// Rules below the cutoff are treated as not firing; an element no rule
    /// is confident about keeps its detected kind (and `text` keeps no
    /// caption). Ambiguity never drops content.
    pub rule_confidence: f64,

    /// Maximum relative disagreement between the width- and height-derived
    /// resolution ratios of a page's two passes. Default: 0.01 (1%).
    ///
    /// Beyond this the page's passes do not describe the same layout
    /// (rotation, per-page DPI change) and reconciliation fails for the page
    /// rather than silently averaging the ratios.
    pub resolution_tolerance: f64,

    /// Minimum width in canonical-space pixels for a figure/table detection
    /// to stay visual. Smaller detections are downgraded to text. Default: 100.0.
    pub min_visual_width: f64,

    /// Minimum height counterpart of [`min_visual_width`](Self::min_visual_width). Default: 100.0.
    pub min_visual_height: f64,

    /// Minimum area counterpart, in canonical-space square pixels. Default: 20000.0.
    ///
    /// Hi-res detectors emit specks around line art; a 100×100 box at 150 DPI
    /// is about 17 mm square, below which nothing is a usable highlight
    /// target. The content survives the downgrade — only the kind changes.
    pub min_visual_area: f64,

    /// Characters of chunk content kept as `text_preview` on a reference.
    /// Default: 200.
    pub preview_chars: usize,

    /// Number of pages merged concurrently. Default: 4.
    ///
    /// Page merges are CPU-bound and independent; the useful ceiling is the
    /// core count, not a network limit.
    pub concurrency: usize,

    /// Progress callback fired per page. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            containment_threshold: 0.9,
            overlap_threshold: 0.3,
            adjacency_gap: 100.0,
            caption_gap: 50.0,
            caption_overlap: 0.3,
            rule_confidence: 0.5,
            resolution_tolerance: 0.01,
            min_visual_width: 100.0,
            min_visual_height: 100.0,
            min_visual_area: 20_000.0,
            preview_chars: 200,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("containment_threshold", &self.containment_threshold)
            .field("overlap_threshold", &self.overlap_threshold)
            .field("adjacency_gap", &self.adjacency_gap)
            .field("caption_gap", &self.caption_gap)
            .field("caption_overlap", &self.caption_overlap)
            .field("rule_confidence", &self.rule_confidence)
            .field("resolution_tolerance", &self.resolution_tolerance)
            .field("min_visual_width", &self.min_visual_width)
            .field("min_visual_height", &self.min_visual_height)
            .field("min_visual_area", &self.min_visual_area)
            .field("preview_chars", &self.preview_chars)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn containment_threshold(mut self, v: f64) -> Self {
        self.config.containment_threshold = v.clamp(0.5, 1.0);
        self
    }

    pub fn overlap_threshold(mut self, v: f64) -> Self {
        self.config.overlap_threshold = v.clamp(0.05, 1.0);
        self
    }

    pub fn adjacency_gap(mut self, px: f64) -> Self {
        self.config.adjacency_gap = px.max(0.0);
        self
    }

    pub fn caption_gap(mut self, px: f64) -> Self {
        self.config.caption_gap = px.max(0.0);
        self
    }

    pub fn caption_overlap(mut self, v: f64) -> Self {
        self.config.caption_overlap = v.clamp(0.0, 1.0);
        self
    }

    pub fn rule_confidence(mut self, v: f64) -> Self {
        self.config.rule_confidence = v.clamp(0.0, 1.0);
        self
    }

    pub fn resolution_tolerance(mut self, v: f64) -> Self {
        self.config.resolution_tolerance = v.clamp(0.0001, 0.5);
        self
    }

    pub fn min_visual_width(mut self, px: f64) -> Self {
        self.config.min_visual_width = px.max(0.0);
        self
    }

    pub fn min_visual_height(mut self, px: f64) -> Self {
        self.config.min_visual_height = px.max(0.0);
        self
    }

    pub fn min_visual_area(mut self, px2: f64) -> Self {
        self.config.min_visual_area = px2.max(0.0);
        self
    }

    pub fn preview_chars(mut self, n: usize) -> Self {
        self.config.preview_chars = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Re-checks ranges even though the setters clamp, because the struct
    /// fields are public and callers can also mutate a `Default` directly.
    pub fn build(self) -> Result<PipelineConfig, Pdf2RefError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.containment_threshold)
            || !(0.0..=1.0).contains(&c.overlap_threshold)
        {
            return Err(Pdf2RefError::InvalidConfig(format!(
                "thresholds must be within 0..=1, got containment {} / overlap {}",
                c.containment_threshold, c.overlap_threshold
            )));
        }
        if c.containment_threshold < c.overlap_threshold {
            return Err(Pdf2RefError::InvalidConfig(format!(
                "containment_threshold ({}) must be at least overlap_threshold ({}) — \
                 containment is the stricter test",
                c.containment_threshold, c.overlap_threshold
            )));
        }
        if c.resolution_tolerance <= 0.0 {
            return Err(Pdf2RefError::InvalidConfig(
                "resolution_tolerance must be positive".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Pdf2RefError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.preview_chars == 0 {
            return Err(Pdf2RefError::InvalidConfig("preview_chars must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
