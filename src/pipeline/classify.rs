//! Reclassification rules for mis-tagged visual elements.
//!
//! Hi-res layout detectors confuse figures and tables often enough to
//! matter: a boxed diagram with gridlines comes back as `table`, a dense
//! results table rendered as an image comes back as `figure`. These rules
//! retag using the evidence the merge stage has already gathered — the
//! associated caption and the element's own content — in a fixed priority
//! order, first confident rule wins. A wrong retag costs a mislabeled
//! highlight, not lost content, so false positives are acceptable and the
//! stage never fails.

use crate::model::ElementKind;
use crate::pipeline::caption;

/// Outcome of one reclassification rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reclassification {
    /// The kind the element should become.
    pub kind: ElementKind,
    pub confidence: f64,
    /// Name of the rule that fired, for rule-level logging.
    pub rule: &'static str,
}

/// Run the ordered reclassification rules over one visual element.
///
/// Returns `None` when no rule proposes a change; ambiguity keeps the
/// detected kind. Text elements are never retyped here — only the merge
/// stage's tiny-detection filter moves things into `text`.
pub fn reclassify(
    kind: ElementKind,
    caption_text: Option<&str>,
    content: &str,
) -> Option<Reclassification> {
    if !kind.is_visual() {
        return None;
    }

    // Rule 1: the caption's own vocabulary. "Table 3" under an element
    // tagged `figure` is near-certain evidence the detector mislabeled it;
    // the caption was written by the document's author, the tag by a vision
    // model. A caption that names a kind settles the question either way,
    // so an agreeing caption also stops the weaker content rule from
    // second-guessing it.
    if let Some(hint) = caption_text
        .and_then(caption::match_caption)
        .and_then(|m| m.kind_hint)
    {
        if hint == kind {
            return None;
        }
        return Some(Reclassification {
            kind: hint,
            confidence: 0.85,
            rule: "caption-vocabulary",
        });
    }

    content_signal_rule(kind, content).filter(|r| r.kind != kind)
}

/// Rule 2: the element's extracted content contradicts the detected kind.
///
/// Tables that survived text extraction show cell separators on several
/// lines; figures show little or no tabular structure. Weaker evidence than
/// the caption, hence the lower confidence.
fn content_signal_rule(kind: ElementKind, content: &str) -> Option<Reclassification> {
    let tabular_lines = content
        .lines()
        .filter(|l| l.matches('|').count() >= 2 || l.matches('\t').count() >= 2)
        .count();
    match kind {
        ElementKind::Figure if tabular_lines >= 2 => Some(Reclassification {
            kind: ElementKind::Table,
            confidence: 0.6,
            rule: "content-signal",
        }),
        ElementKind::Table if tabular_lines == 0 && !content.trim().is_empty() => {
            Some(Reclassification {
                kind: ElementKind::Figure,
                confidence: 0.6,
                rule: "content-signal",
            })
        }
        _ => None,
    }
}
