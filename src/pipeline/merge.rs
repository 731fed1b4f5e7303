//! Element deduplication and merging for one page.
//!
//! Input is the unified list of raw elements for a single page, already
//! reconciled into the canonical coordinate space. The stage runs a fixed
//! sequence of rules — tiny-detection downgrade, containment removal,
//! duplicate-content removal, same-kind merge to a fixed point, caption
//! association, reclassification, duplicate-caption removal — and emits the
//! page's canonical elements in reading order.
//!
//! Two properties shape everything here:
//!
//! * **Never drop content over ambiguity.** An element no rule is confident
//!   about stays `text` with no caption. The only removals are duplicates
//!   and detector noise whose content survives elsewhere.
//! * **Idempotence.** Running the stage on its own output changes nothing;
//!   the same-kind merge iterates to a fixed point to guarantee it.

use crate::config::PipelineConfig;
use crate::model::{CanonicalElement, ElementKind, RawElement};
use crate::pipeline::{caption, classify};
use tracing::debug;

/// Merge one page's reconciled elements into canonical elements.
///
/// Total: never fails and never drops an element for being unclassifiable.
pub fn merge_page(
    page_number: u32,
    elements: Vec<RawElement>,
    config: &PipelineConfig,
) -> Vec<CanonicalElement> {
    let mut elements = elements;
    downgrade_tiny_detections(page_number, &mut elements, config);
    let elements = drop_contained_elements(page_number, elements, config);
    let elements = drop_duplicate_content(page_number, elements, config);
    let mut elements = merge_same_kind(page_number, elements, config);
    associate_captions(page_number, &mut elements, config);
    reclassify_visuals(page_number, &mut elements, config);
    let elements = drop_duplicate_captions(page_number, elements);
    canonicalize(page_number, elements)
}

/// Figure/table detections below the configured minima are detector specks
/// (hi-res models emit them around line art). The content survives as text;
/// only the kind changes, so nothing downstream treats the speck as a
/// highlightable visual.
fn downgrade_tiny_detections(page: u32, elements: &mut [RawElement], config: &PipelineConfig) {
    for el in elements.iter_mut() {
        if !el.kind.is_visual() {
            continue;
        }
        let r = &el.rect;
        if r.width() < config.min_visual_width
            || r.height() < config.min_visual_height
            || r.area() < config.min_visual_area
        {
            debug!(
                page,
                kind = %el.kind,
                width = r.width(),
                height = r.height(),
                "downgrading tiny visual detection to text"
            );
            el.kind = ElementKind::Text;
        }
    }
}

/// An element almost entirely inside a figure or table is not a standalone
/// detection. Text inside a visual is that element's internal labelling. A
/// visual inside a visual is a nested re-detection of the same region: the
/// outer element wins and absorbs the inner one's images (and caption, if
/// the outer has none), so no two canonical elements end up with one rect
/// containing the other.
fn drop_contained_elements(
    page: u32,
    mut elements: Vec<RawElement>,
    config: &PipelineConfig,
) -> Vec<RawElement> {
    let mut keep = vec![true; elements.len()];
    let mut absorbed: Vec<(usize, usize)> = Vec::new();

    for i in 0..elements.len() {
        if !keep[i] {
            continue;
        }
        for j in 0..elements.len() {
            if i == j || !keep[j] || !elements[j].kind.is_visual() {
                continue;
            }
            let (inner, outer) = (&elements[i], &elements[j]);
            if outer.rect.containment_ratio(&inner.rect) < config.containment_threshold {
                continue;
            }
            let drop_inner = match inner.kind {
                ElementKind::Text => true,
                // Near-identical rects contain each other; keep the larger,
                // breaking ties toward the earlier detection.
                _ => {
                    inner.rect.area() < outer.rect.area()
                        || (inner.rect.area() == outer.rect.area() && i > j)
                }
            };
            if drop_inner {
                debug!(
                    page,
                    kind = %inner.kind,
                    content_len = inner.content.len(),
                    "dropping element contained in visual"
                );
                keep[i] = false;
                if inner.kind.is_visual() {
                    absorbed.push((j, i));
                }
                break;
            }
        }
    }

    for (outer, inner) in absorbed {
        let images = std::mem::take(&mut elements[inner].images);
        let caption = elements[inner].caption.take();
        elements[outer].images.extend(images);
        if elements[outer].caption.is_none() {
            elements[outer].caption = caption;
        }
    }

    elements
        .into_iter()
        .zip(keep)
        .filter_map(|(el, k)| k.then_some(el))
        .collect()
}

/// Two same-kind elements overlapping above the merge threshold where one's
/// content is a substring of (or identical to) the other are the two passes
/// describing the same span with different completeness; only the longer
/// survives, so the later merge step never concatenates a span with itself.
fn drop_duplicate_content(
    page: u32,
    elements: Vec<RawElement>,
    config: &PipelineConfig,
) -> Vec<RawElement> {
    let mut keep = vec![true; elements.len()];
    for i in 0..elements.len() {
        if !keep[i] {
            continue;
        }
        for j in 0..elements.len() {
            if i == j || !keep[j] {
                continue;
            }
            let (a, b) = (&elements[i], &elements[j]);
            if a.kind != b.kind
                || a.rect.overlap_ratio(&b.rect) < config.overlap_threshold
            {
                continue;
            }
            let (short, long) = (a.content.trim(), b.content.trim());
            if !short.is_empty() && short.len() <= long.len() && long.contains(short) {
                debug!(page, "dropping duplicate-content element");
                keep[i] = false;
                break;
            }
        }
    }
    elements
        .into_iter()
        .zip(keep)
        .filter_map(|(el, k)| k.then_some(el))
        .collect()
}

/// Do `a` and `b` sit on the same visual line? Their y-ranges must share at
/// least half of the shorter element's height.
fn same_line(a: &RawElement, b: &RawElement) -> bool {
    let overlap = (a.rect.y2.min(b.rect.y2) - a.rect.y1.max(b.rect.y1)).max(0.0);
    let min_height = a.rect.height().min(b.rect.height());
    min_height > 0.0 && overlap / min_height >= 0.5
}

fn should_merge(a: &RawElement, b: &RawElement, config: &PipelineConfig) -> bool {
    if a.kind != b.kind {
        return false;
    }
    if a.rect.overlap_ratio(&b.rect) >= config.overlap_threshold {
        return true;
    }
    same_line(a, b) && a.rect.horizontal_gap(&b.rect) <= config.adjacency_gap
}

/// Merge overlapping or line-adjacent same-kind elements until no pair
/// qualifies. The fixed point is what makes the whole stage idempotent: the
/// output contains no mergeable pair by construction.
fn merge_same_kind(
    page: u32,
    elements: Vec<RawElement>,
    config: &PipelineConfig,
) -> Vec<RawElement> {
    let mut elements = elements;
    loop {
        let mut merged_any = false;
        'outer: for i in 0..elements.len() {
            for j in (i + 1)..elements.len() {
                if !should_merge(&elements[i], &elements[j], config) {
                    continue;
                }
                let Ok(union) = elements[i].rect.union(&elements[j].rect) else {
                    continue;
                };
                let b = elements.remove(j);
                let a = elements.remove(i);
                debug!(page, kind = %a.kind, "merging same-kind elements");

                // Left-to-right reading order within the merged span.
                let (first, second) = if a.rect.x1 <= b.rect.x1 { (&a, &b) } else { (&b, &a) };
                let content = match (first.content.trim(), second.content.trim()) {
                    (f, "") => f.to_string(),
                    ("", s) => s.to_string(),
                    (f, s) => format!("{f} {s}"),
                };
                let mut images = first.images.clone();
                images.extend(second.images.iter().cloned());

                elements.push(RawElement {
                    kind: a.kind,
                    rect: union,
                    resolution: a.resolution,
                    content,
                    caption: first.caption.clone().or_else(|| second.caption.clone()),
                    images,
                });
                merged_any = true;
                break 'outer;
            }
        }
        if !merged_any {
            return elements;
        }
    }
}

/// Attach caption-pattern text elements to the figure/table they sit
/// against, removing them from the standalone text list. Elements that
/// already carry a caption are left alone, which also keeps re-running the
/// stage from re-consuming anything.
fn associate_captions(page: u32, elements: &mut Vec<RawElement>, config: &PipelineConfig) {
    let mut consumed: Vec<usize> = Vec::new();

    for vi in 0..elements.len() {
        if !elements[vi].kind.is_visual() || elements[vi].caption.is_some() {
            continue;
        }

        let mut best: Option<(usize, f64, &'static str)> = None;
        for (ti, candidate) in elements.iter().enumerate() {
            if ti == vi || candidate.kind != ElementKind::Text || consumed.contains(&ti) {
                continue;
            }
            let visual_rect = elements[vi].rect;
            let gap = visual_rect.vertical_gap(&candidate.rect);
            if gap > config.caption_gap
                || visual_rect.horizontal_overlap_ratio(&candidate.rect) < config.caption_overlap
            {
                continue;
            }
            let Some(m) = caption::match_caption(&candidate.content) else {
                continue;
            };
            if m.confidence < config.rule_confidence {
                continue;
            }
            if best.is_none_or(|(bi, _, _)| gap < visual_rect.vertical_gap(&elements[bi].rect)) {
                best = Some((ti, m.confidence, m.rule));
            }
        }

        if let Some((ti, confidence, rule)) = best {
            debug!(page, rule, confidence, "associating caption");
            elements[vi].caption = Some(elements[ti].content.trim().to_string());
            consumed.push(ti);
        }
    }

    consumed.sort_unstable();
    for ti in consumed.into_iter().rev() {
        elements.remove(ti);
    }
}

/// Apply the ordered reclassification rules to each visual element.
fn reclassify_visuals(page: u32, elements: &mut [RawElement], config: &PipelineConfig) {
    for el in elements.iter_mut() {
        let Some(r) = classify::reclassify(el.kind, el.caption.as_deref(), &el.content) else {
            continue;
        };
        if r.confidence < config.rule_confidence {
            continue;
        }
        debug!(page, rule = r.rule, from = %el.kind, to = %r.kind, "reclassifying element");
        el.kind = r.kind;
    }
}

/// When two same-kind visuals carry an identical caption, the smaller one
/// is a partial re-detection of the other and is dropped.
fn drop_duplicate_captions(page: u32, elements: Vec<RawElement>) -> Vec<RawElement> {
    let mut keep = vec![true; elements.len()];
    for i in 0..elements.len() {
        if !keep[i] {
            continue;
        }
        for j in 0..elements.len() {
            if i == j || !keep[j] {
                continue;
            }
            let (a, b) = (&elements[i], &elements[j]);
            if a.kind != b.kind || !a.kind.is_visual() {
                continue;
            }
            let duplicate = matches!(
                (&a.caption, &b.caption),
                (Some(ca), Some(cb)) if ca == cb
            );
            if duplicate && a.rect.area() < b.rect.area() {
                debug!(page, "dropping smaller duplicate-caption visual");
                keep[i] = false;
                break;
            }
        }
    }
    elements
        .into_iter()
        .zip(keep)
        .filter_map(|(el, k)| k.then_some(el))
        .collect()
}

/// Sort into reading order and assign stable ids.
pub(crate) fn canonicalize(page_number: u32, mut elements: Vec<RawElement>) -> Vec<CanonicalElement> {
    elements.sort_by(|a, b| {
        a.rect
            .y1
            .total_cmp(&b.rect.y1)
            .then_with(|| a.rect.x1.total_cmp(&b.rect.x1))
    });
    elements
        .into_iter()
        .map(|el| CanonicalElement {
            id: CanonicalElement::derive_id(el.kind, page_number, &el.content),
            kind: el.kind,
            rect: el.rect,
            caption: el.caption,
            page_number,
            content: el.content,
            images: el.images,
        })
        .collect()
}
