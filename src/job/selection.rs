//! Row selection expressions for batch runs.
//!
//! The user names target rows with 1-based positions: the literal `all`
//! (case-insensitive, blank input counts too), comma-separated single
//! numbers, and `a to b` inclusive spans. Spans may be given in either order
//! and are clamped to the dataset bounds. Invalid items are ignored rather
//! than rejected.

use std::collections::BTreeSet;

/// Parse a selection expression into sorted, de-duplicated 0-based indices.
pub fn parse_selection(input: &str, dataset_len: usize) -> Vec<usize> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
        return (0..dataset_len).collect();
    }

    let mut indices = BTreeSet::new();

    for part in trimmed.split(',') {
        let part = part.trim();

        if let Some((a, b)) = part.split_once("to") {
            let (Ok(a), Ok(b)) = (a.trim().parse::<i64>(), b.trim().parse::<i64>()) else {
                continue;
            };
            let start = (a.min(b) - 1).max(0);
            let end = (a.max(b) - 1).min(dataset_len as i64 - 1);
            let mut i = start;
            while i <= end {
                indices.insert(i as usize);
                i += 1;
            }
        } else if let Ok(n) = part.parse::<i64>() {
            let idx = n - 1;
            if idx >= 0 && (idx as usize) < dataset_len {
                indices.insert(idx as usize);
            }
        }
        // Anything else is silently ignored.
    }

    indices.into_iter().collect()
}
