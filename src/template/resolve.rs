//! Range resolution engine and template interpolator.
//!
//! Turns parsed references into substitution strings against a dataset
//! snapshot, and whole templates into fully resolved prompts. Resolution is
//! a pure function of its inputs: the same template re-resolved against the
//! job's running snapshot yields exactly the values committed so far.
//!
//! All failure modes resolve to empty strings (unknown column, unknown
//! function, malformed position token, out-of-range index). A bad reference
//! degrades one substitution, never a whole run.

use crate::model::Dataset;
use crate::template::parser::{parse_template, RangeCall, Reference, Segment};
use crate::template::position::PositionToken;

/// Separator used when joining multiple cell values.
const JOIN_SEPARATOR: &str = ", ";

/// Resolve one reference against a snapshot.
pub fn resolve_reference(reference: &Reference, snapshot: &Dataset, current_row: usize) -> String {
    match &reference.call {
        None => {
            if current_row < snapshot.len() {
                snapshot.cell(current_row, &reference.column).to_string()
            } else {
                String::new()
            }
        }
        Some(call) => resolve_call(&reference.column, call, snapshot, current_row),
    }
}

/// Resolve a range call. Unknown functions and malformed parameter lists
/// yield an empty string.
fn resolve_call(column: &str, call: &RangeCall, snapshot: &Dataset, current_row: usize) -> String {
    match call.function.as_str() {
        "at" => {
            let [pos] = call.params.as_slice() else {
                return String::new();
            };
            let Some(token) = PositionToken::parse(pos) else {
                return String::new();
            };
            let idx = token.resolve(current_row, snapshot.len());
            cell_at(snapshot, column, idx).unwrap_or_default()
        }
        "range" => {
            let [start, end] = call.params.as_slice() else {
                return String::new();
            };
            let (Some(start), Some(end)) = (PositionToken::parse(start), PositionToken::parse(end))
            else {
                return String::new();
            };
            let from = start.resolve(current_row, snapshot.len());
            // END-terminated ranges scan through the last row inclusive;
            // explicit ends are exclusive. Preserved asymmetry.
            let to = if end == PositionToken::End {
                snapshot.len() as i64
            } else {
                end.resolve(current_row, snapshot.len())
            };
            join_values(snapshot, column, from, to, None)
        }
        "exclusive_range" => {
            let [start, end] = call.params.as_slice() else {
                return String::new();
            };
            let (Some(start), Some(end)) = (PositionToken::parse(start), PositionToken::parse(end))
            else {
                return String::new();
            };
            let from = start.resolve(current_row, snapshot.len());
            let to = end.resolve(current_row, snapshot.len());
            join_values(snapshot, column, from, to, Some(current_row as i64))
        }
        _ => String::new(),
    }
}

/// Read a single cell, treating any index outside `[0, len)` as absent.
fn cell_at(snapshot: &Dataset, column: &str, idx: i64) -> Option<String> {
    if idx < 0 || idx >= snapshot.len() as i64 {
        return None;
    }
    Some(snapshot.cell(idx as usize, column).to_string())
}

/// Join non-empty cell values over `[from, to)`, skipping out-of-range
/// indices and, when given, the excluded row.
fn join_values(
    snapshot: &Dataset,
    column: &str,
    from: i64,
    to: i64,
    exclude: Option<i64>,
) -> String {
    let len = snapshot.len() as i64;
    let mut values = Vec::new();

    let mut idx = from;
    while idx < to {
        if idx >= 0 && idx < len && Some(idx) != exclude {
            let value = snapshot.cell(idx as usize, column);
            if !value.is_empty() {
                values.push(value.to_string());
            }
        }
        idx += 1;
    }

    values.join(JOIN_SEPARATOR)
}

/// Resolve a whole template into a prompt string.
///
/// Parses once, substitutes every reference in order, and concatenates.
/// Templates with no references come back unchanged.
pub fn interpolate(template: &str, snapshot: &Dataset, current_row: usize) -> String {
    let mut out = String::with_capacity(template.len());
    for segment in parse_template(template) {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Reference(reference) => {
                out.push_str(&resolve_reference(&reference, snapshot, current_row));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Row;

    fn dataset(values: &[&str]) -> Dataset {
        let mut ds = Dataset::new(vec!["c".into()]);
        for v in values {
            ds.rows.push(Row::from_pairs([("c", *v)]));
        }
        ds
    }

    #[test]
    fn test_no_references_returns_template_unchanged() {
        let ds = dataset(&["a"]);
        assert_eq!(interpolate("plain text, no refs", &ds, 0), "plain text, no refs");
    }

    #[test]
    fn test_bare_reference_reads_current_row() {
        let ds = dataset(&["a", "b", "c"]);
        assert_eq!(interpolate("value: @[c]", &ds, 1), "value: b");
    }

    #[test]
    fn test_unknown_column_resolves_empty_everywhere() {
        let ds = dataset(&["a", "b", "c"]);
        assert_eq!(interpolate("@[nope]", &ds, 0), "");
        assert_eq!(interpolate("@[nope].at(1)", &ds, 0), "");
        assert_eq!(interpolate("@[nope].range(1, END)", &ds, 0), "");
        assert_eq!(interpolate("@[nope].exclusive_range(1, 3)", &ds, 1), "");
    }

    #[test]
    fn test_at_this_equals_current_value() {
        let ds = dataset(&["a", "b", "c"]);
        for i in 0..3 {
            assert_eq!(
                interpolate("@[c].at(THIS)", &ds, i),
                ds.cell(i, "c").to_string()
            );
        }
    }

    #[test]
    fn test_at_out_of_range_is_empty() {
        let ds = dataset(&["a", "b"]);
        assert_eq!(interpolate("@[c].at(9)", &ds, 0), "");
        assert_eq!(interpolate("@[c].at(THIS-1)", &ds, 0), "");
        assert_eq!(interpolate("@[c].at(HEADER)", &ds, 1), "");
    }

    #[test]
    fn test_range_to_end_includes_all_rows() {
        let ds = dataset(&["a", "b", "c"]);
        for i in 0..3 {
            assert_eq!(interpolate("@[c].range(1, END)", &ds, i), "a, b, c");
        }
    }

    #[test]
    fn test_range_explicit_end_is_exclusive() {
        let ds = dataset(&["a", "b", "c"]);
        assert_eq!(interpolate("@[c].range(1, 3)", &ds, 0), "a, b");
    }

    #[test]
    fn test_range_around_current_row() {
        let ds = dataset(&["a", "b", "c"]);
        assert_eq!(interpolate("@[c].range(THIS-1, THIS+1)", &ds, 1), "a, b");
        assert_eq!(interpolate("@[c].range(THIS-1, END)", &ds, 1), "a, b, c");
    }

    #[test]
    fn test_range_skips_empty_cells() {
        let ds = dataset(&["a", "", "c"]);
        assert_eq!(interpolate("@[c].range(1, END)", &ds, 0), "a, c");
    }

    #[test]
    fn test_range_skips_out_of_range_indices() {
        let ds = dataset(&["a", "b"]);
        // THIS-2 resolves to -2 at row 0; negatives contribute nothing.
        assert_eq!(interpolate("@[c].range(THIS-2, END)", &ds, 0), "a, b");
    }

    #[test]
    fn test_exclusive_range_skips_current_row() {
        let ds = dataset(&["a", "b", "c"]);
        assert_eq!(interpolate("@[c].exclusive_range(1, 4)", &ds, 1), "a, c");
        // Explicit last index stands in for END; the current row still
        // never appears.
        assert_eq!(interpolate("@[c].exclusive_range(1, 4)", &ds, 0), "b, c");
    }

    #[test]
    fn test_exclusive_range_end_token_not_special() {
        // END resolves to the last index and stays exclusive here.
        let ds = dataset(&["a", "b", "c"]);
        assert_eq!(interpolate("@[c].exclusive_range(1, END)", &ds, 1), "a");
    }

    #[test]
    fn test_unknown_function_resolves_empty() {
        let ds = dataset(&["a", "b"]);
        assert_eq!(interpolate("x@[c].median(1,2)y", &ds, 0), "xy");
    }

    #[test]
    fn test_malformed_params_resolve_empty() {
        let ds = dataset(&["a", "b"]);
        assert_eq!(interpolate("@[c].at(banana)", &ds, 0), "");
        assert_eq!(interpolate("@[c].range(1)", &ds, 0), "");
        assert_eq!(interpolate("@[c].at(1, 2)", &ds, 0), "");
    }

    #[test]
    fn test_interpolation_preserves_order() {
        let ds = dataset(&["a", "b", "c"]);
        assert_eq!(
            interpolate("first=@[c].at(1), all=[@[c].range(1, END)]", &ds, 2),
            "first=a, all=[a, b, c]"
        );
    }

    #[test]
    fn test_interpolate_is_deterministic() {
        let ds = dataset(&["a", "b", "c"]);
        let one = interpolate("@[c].range(1, END)", &ds, 1);
        let two = interpolate("@[c].range(1, END)", &ds, 1);
        assert_eq!(one, two);
    }
}
