//! Citation-marker resolution.
//!
//! Chat answers arrive carrying internal markers of the form `[[ref:N]]`,
//! where `N` is the 1-based position of a chunk in the context that was
//! presented alongside the question. This module rewrites the markers to
//! the plain `[N]` readers expect and collects the cited chunks, each
//! distinct chunk once, in first-occurrence order.
//!
//! Resolution is deliberately forgiving: a marker whose ordinal is not in
//! the map, or whose chunk is missing from the store, is left in the text
//! untouched. Answer text is user-facing; mangling it over a stale
//! reference is worse than showing an unresolved marker.

use crate::model::{ChunkReference, Reference, ResolvedAnswer};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use tracing::debug;

static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[ref:(\d+)\]\]").unwrap());

/// Rewrite `[[ref:N]]` markers in `answer_text` and collect the cited
/// chunks.
///
/// `ordinal_map` maps marker ordinals to chunk ids; `chunks` maps chunk ids
/// to their stored references. The same chunk cited through several markers
/// appears once in the result, at its first citation's position.
pub fn resolve(
    answer_text: &str,
    ordinal_map: &HashMap<u32, String>,
    chunks: &HashMap<String, ChunkReference>,
) -> ResolvedAnswer {
    let mut references: Vec<Reference> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unresolved = 0usize;

    let clean_text = MARKER.replace_all(answer_text, |caps: &Captures<'_>| {
        // Ordinals in answer text are bounded by context size in practice;
        // anything that overflows u32 is not a real citation.
        let ordinal: u32 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => {
                unresolved += 1;
                return caps[0].to_string();
            }
        };
        let chunk = ordinal_map.get(&ordinal).and_then(|id| chunks.get(id.as_str()));
        match chunk {
            Some(chunk) => {
                if seen.insert(chunk.chunk_id.as_str()) {
                    references.push(Reference::from_chunk(chunk));
                }
                format!("[{ordinal}]")
            }
            None => {
                unresolved += 1;
                caps[0].to_string()
            }
        }
    });

    if unresolved > 0 {
        debug!(unresolved, "answer contained markers that did not resolve");
    }
    ResolvedAnswer {
        clean_text: clean_text.into_owned(),
        references,
    }
}
