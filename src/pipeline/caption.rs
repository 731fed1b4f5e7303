//! Caption-pattern rules: is this short text line a figure/table caption?
//!
//! Each rule is an independent check over the candidate text that reports a
//! confidence and, where the vocabulary implies one, the kind of element the
//! caption belongs to. Rules run in a fixed priority order and the first
//! match wins; the caller compares the reported confidence against its
//! configured cutoff. Keeping the rules separate makes each one testable on
//! its own instead of burying the policy in one match arm.
//!
//! Vocabulary covers the English and Japanese label families the source
//! corpus uses. A table check is deliberately case-insensitive ("table",
//! "TABLE 2") while the figure check matches the conventional capitalised
//! labels, mirroring how real documents write them.

use crate::model::ElementKind;
use once_cell::sync::Lazy;
use regex::Regex;

/// Labels that open a figure caption.
const FIGURE_LABELS: &[&str] = &["Figure", "Fig.", "Image", "Diagram", "図"];

/// Labels that open a table caption (matched case-insensitively).
const TABLE_LABELS: &[&str] = &["table", "表", "テーブル", "tab.", "tbl"];

/// A caption line is short; beyond this it is body prose that happens to
/// mention a figure.
const MAX_CAPTION_CHARS: usize = 160;

/// Outcome of one caption rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionMatch {
    /// Kind the caption vocabulary implies, when it implies one.
    pub kind_hint: Option<ElementKind>,
    /// How confident the rule is that this line is a caption, in `[0, 1]`.
    pub confidence: f64,
    /// Name of the rule that fired, for rule-level logging.
    pub rule: &'static str,
}

/// Run the ordered caption rules over `text`; first match wins.
///
/// Returns `None` when no rule fires at all. Never fails: a line the rules
/// cannot read is simply not a caption.
pub fn match_caption(text: &str) -> Option<CaptionMatch> {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > MAX_CAPTION_CHARS {
        return None;
    }
    table_label_rule(text)
        .or_else(|| figure_label_rule(text))
        .or_else(|| numeral_lead_rule(text))
}

/// Rule 1: the line opens with (or contains) a table label.
///
/// Checked before the figure rule because table vocabulary is the more
/// specific of the two ("Table 3" lines routinely go on to mention figures).
fn table_label_rule(text: &str) -> Option<CaptionMatch> {
    let lower = text.to_lowercase();
    if TABLE_LABELS.iter().any(|label| lower.contains(label)) {
        return Some(CaptionMatch {
            kind_hint: Some(ElementKind::Table),
            confidence: 0.9,
            rule: "table-label",
        });
    }
    None
}

/// Rule 2: the line contains a figure label.
fn figure_label_rule(text: &str) -> Option<CaptionMatch> {
    if FIGURE_LABELS.iter().any(|label| text.contains(label)) {
        return Some(CaptionMatch {
            kind_hint: Some(ElementKind::Figure),
            confidence: 0.9,
            rule: "figure-label",
        });
    }
    None
}

static RE_NUMERAL_LEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+([.\-:]\d+)*[.:)]?\s+\S").unwrap());

/// Rule 3: a short line whose leading token is a numeral followed by
/// descriptive text ("1.2 Throughput under load"). Language-agnostic, but
/// weaker evidence than an explicit label, so it carries no kind hint and a
/// lower confidence.
fn numeral_lead_rule(text: &str) -> Option<CaptionMatch> {
    if RE_NUMERAL_LEAD.is_match(text) {
        return Some(CaptionMatch {
            kind_hint: None,
            confidence: 0.6,
            rule: "numeral-lead",
        });
    }
    None
}
