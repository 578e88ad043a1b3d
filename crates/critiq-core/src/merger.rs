//! Merging supplementary suggestions into the primary citation list.

use std::collections::HashSet;

use crate::matching::dedup_key;
use crate::CitationRecord;

/// Append supplementary records to the primary list, dropping any whose
/// normalized title collides with a primary record or an earlier supplement.
///
/// Primary records always survive unchanged and keep their order. Surviving
/// supplements are marked `is_supplementary` and stripped of any sequence
/// id; they live outside the document's numbering.
pub fn merge_citations(
    primary: Vec<CitationRecord>,
    supplementary: Vec<CitationRecord>,
) -> Vec<CitationRecord> {
    let mut seen: HashSet<String> = primary
        .iter()
        .map(|r| dedup_key(&r.title))
        .filter(|k| !k.is_empty())
        .collect();

    let mut merged = primary;
    for mut record in supplementary {
        let key = dedup_key(&record.title);
        // An unparseable suggestion with no title carries no information.
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        record.is_supplementary = true;
        record.sequence_id = None;
        merged.push(record);
    }
    merged
}
