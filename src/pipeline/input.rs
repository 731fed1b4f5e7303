//! Extraction-dump loading and validation.
//!
//! The extraction collaborator (rasterizer + detector, out of process)
//! writes its per-page output as a JSON list of passes. This module turns a
//! path (or stdin) into validated [`ExtractionPass`]es.
//!
//! Validation here is structural only: duplicate passes, impossible pixel
//! dimensions, and elements claiming a different page than their pass are
//! dump-level defects and fatal. Per-rect geometry problems are *page*
//! problems — they degrade one page with [`crate::error::PageError`] during
//! processing rather than rejecting the whole dump.

use crate::error::Pdf2RefError;
use crate::model::ExtractionPass;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Load and validate an extraction dump from a file.
pub async fn load_dump(path: impl AsRef<Path>) -> Result<Vec<ExtractionPass>, Pdf2RefError> {
    let path = path.as_ref();
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Pdf2RefError::DumpNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2RefError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(Pdf2RefError::DumpParse {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })
        }
    };
    let passes = parse_dump(path, &bytes)?;
    validate_passes(&passes)?;
    debug!(path = %path.display(), passes = passes.len(), "loaded extraction dump");
    Ok(passes)
}

/// Load and validate an extraction dump piped to stdin.
pub async fn load_dump_stdin() -> Result<Vec<ExtractionPass>, Pdf2RefError> {
    // Stdin reads block; keep them off the async executor.
    let bytes = tokio::task::spawn_blocking(|| {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).map(|_| buf)
    })
    .await
    .map_err(|e| Pdf2RefError::Internal(format!("stdin reader task failed: {e}")))?
    .map_err(|e| Pdf2RefError::DumpParse {
        path: "<stdin>".into(),
        detail: e.to_string(),
    })?;
    let passes = parse_dump(Path::new("<stdin>"), &bytes)?;
    validate_passes(&passes)?;
    Ok(passes)
}

fn parse_dump(path: &Path, bytes: &[u8]) -> Result<Vec<ExtractionPass>, Pdf2RefError> {
    serde_json::from_slice(bytes).map_err(|e| Pdf2RefError::DumpParse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Check the extraction contract across a set of passes.
///
/// # Errors
/// [`Pdf2RefError::InvalidDump`] on zero page numbers, non-positive pixel
/// dimensions, duplicate `(page, resolution)` pairs, or elements whose rect
/// claims a different page or resolution than the pass that carries them.
pub fn validate_passes(passes: &[ExtractionPass]) -> Result<(), Pdf2RefError> {
    let mut seen: HashSet<(u32, crate::model::ResolutionTag)> = HashSet::new();
    for pass in passes {
        if pass.page_number == 0 {
            return Err(Pdf2RefError::InvalidDump {
                detail: "page numbers are 1-indexed; got page 0".into(),
            });
        }
        if !pass.pixel_width.is_finite()
            || !pass.pixel_height.is_finite()
            || pass.pixel_width <= 0.0
            || pass.pixel_height <= 0.0
        {
            return Err(Pdf2RefError::InvalidDump {
                detail: format!(
                    "page {} ({}) reports pixel dimensions {}x{}",
                    pass.page_number, pass.resolution, pass.pixel_width, pass.pixel_height
                ),
            });
        }
        if !seen.insert((pass.page_number, pass.resolution)) {
            return Err(Pdf2RefError::InvalidDump {
                detail: format!(
                    "duplicate {} pass for page {}",
                    pass.resolution, pass.page_number
                ),
            });
        }
        for el in &pass.elements {
            if el.rect.page_number != pass.page_number {
                return Err(Pdf2RefError::InvalidDump {
                    detail: format!(
                        "element on page {} carried by a pass for page {}",
                        el.rect.page_number, pass.page_number
                    ),
                });
            }
            if el.resolution != pass.resolution {
                return Err(Pdf2RefError::InvalidDump {
                    detail: format!(
                        "{} element carried by a {} pass on page {}",
                        el.resolution, pass.resolution, pass.page_number
                    ),
                });
            }
        }
    }
    Ok(())
}
