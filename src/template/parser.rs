//! Tokenizer for prompt templates with embedded column references.
//!
//! A reference is written `@[column]`, optionally followed by a mention
//! display part `(label)` (inserted by editing surfaces and ignored here),
//! optionally followed by a dotted range call `.function(p1, p2)`.
//!
//! The parser is a small explicit scanner producing a typed segment list,
//! not a regex. Failure modes are lenient by design:
//!
//! - an unterminated `@[` marker is plain literal text;
//! - a dot that is not followed by a well-formed `name(...)` call stays
//!   literal and the reference is treated as bare;
//! - unknown function names and malformed parameters are kept on the node
//!   and resolve to an empty string downstream, never to an error.

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, emitted unchanged.
    Literal(String),
    /// A column reference, substituted at resolution time.
    Reference(Reference),
}

/// A column reference with an optional range call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Referenced column name. Unknown columns resolve to empty string.
    pub column: String,
    /// Optional range call; a bare reference reads the current row's value.
    pub call: Option<RangeCall>,
}

/// A dotted function call suffix on a reference.
///
/// Parameters are kept as raw position tokens; they are typed during
/// resolution so that a malformed token degrades that one reference instead
/// of failing the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeCall {
    /// Function name as written (`at`, `range`, `exclusive_range`, ...).
    pub function: String,
    /// Raw comma-separated parameters, trimmed.
    pub params: Vec<String>,
}

/// Parse a template into literal and reference segments.
///
/// Templates with no references come back as a single literal segment.
pub fn parse_template(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(at) = rest.find("@[") {
        let (before, marker) = rest.split_at(at);
        literal.push_str(before);

        match parse_reference(marker) {
            Some((reference, consumed)) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Reference(reference));
                rest = &marker[consumed..];
            }
            None => {
                // Unterminated marker: not a reference at all.
                literal.push_str("@[");
                rest = &marker[2..];
            }
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

/// Parse one reference at the start of `input` (which begins with `@[`).
///
/// Returns the reference and the number of bytes consumed, or `None` when
/// the column marker never closes.
fn parse_reference(input: &str) -> Option<(Reference, usize)> {
    debug_assert!(input.starts_with("@["));

    let close = input.find(']')?;
    if close == 2 {
        // "@[]" carries no column name.
        return None;
    }
    let column = input[2..close].to_string();
    let mut pos = close + 1;

    // Mention display part: "(label)", ignored.
    if input[pos..].starts_with('(') {
        match input[pos..].find(')') {
            Some(end) => pos += end + 1,
            // Unterminated display part stays literal; the reference is bare.
            None => {
                return Some((
                    Reference {
                        column,
                        call: None,
                    },
                    pos,
                ))
            }
        }
    }

    let call = match parse_call(&input[pos..]) {
        Some((call, len)) => {
            pos += len;
            Some(call)
        }
        None => None,
    };

    Some((Reference { column, call }, pos))
}

/// Parse a dotted call suffix: `.name(p1, p2)`.
///
/// Returns `None` when the shape is incomplete, in which case the dot and
/// everything after it remain literal text.
fn parse_call(input: &str) -> Option<(RangeCall, usize)> {
    let rest = input.strip_prefix('.')?;

    let name_len = rest
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    let function = rest[..name_len].to_string();

    let after_name = &rest[name_len..];
    if !after_name.starts_with('(') {
        return None;
    }
    let params_end = after_name.find(')')?;
    let params_raw = &after_name[1..params_end];

    let params: Vec<String> = if params_raw.trim().is_empty() {
        Vec::new()
    } else {
        params_raw.split(',').map(|p| p.trim().to_string()).collect()
    };

    // 1 for '.', name, 1 for '(', params, 1 for ')'
    let consumed = 1 + name_len + params_end + 1;
    Some((
        RangeCall { function, params },
        consumed,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(column: &str, call: Option<RangeCall>) -> Segment {
        Segment::Reference(Reference {
            column: column.to_string(),
            call,
        })
    }

    fn call(function: &str, params: &[&str]) -> RangeCall {
        RangeCall {
            function: function.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_plain_text_is_one_literal() {
        let segments = parse_template("no references here");
        assert_eq!(segments, vec![Segment::Literal("no references here".into())]);
    }

    #[test]
    fn test_bare_reference() {
        let segments = parse_template("Hello @[name]!");
        assert_eq!(
            segments,
            vec![
                Segment::Literal("Hello ".into()),
                reference("name", None),
                Segment::Literal("!".into()),
            ]
        );
    }

    #[test]
    fn test_mention_display_part_ignored() {
        let segments = parse_template("@[city](city) is nice");
        assert_eq!(
            segments,
            vec![reference("city", None), Segment::Literal(" is nice".into())]
        );
    }

    #[test]
    fn test_range_call() {
        let segments = parse_template("@[title].range(1, END)");
        assert_eq!(
            segments,
            vec![reference("title", Some(call("range", &["1", "END"])))]
        );
    }

    #[test]
    fn test_call_with_display_part() {
        let segments = parse_template("@[title](title).at(THIS-1)");
        assert_eq!(
            segments,
            vec![reference("title", Some(call("at", &["THIS-1"])))]
        );
    }

    #[test]
    fn test_whitespace_in_params_trimmed() {
        let segments = parse_template("@[c].exclusive_range( 2 , THIS + 1 )");
        assert_eq!(
            segments,
            vec![reference("c", Some(call("exclusive_range", &["2", "THIS + 1"])))]
        );
    }

    #[test]
    fn test_unknown_function_kept_on_node() {
        // Resolution turns this into an empty string; parsing keeps it.
        let segments = parse_template("@[c].median(1,2)");
        assert_eq!(segments, vec![reference("c", Some(call("median", &["1", "2"])))]);
    }

    #[test]
    fn test_unterminated_marker_is_literal() {
        let segments = parse_template("mail me @[ sometime");
        assert_eq!(segments, vec![Segment::Literal("mail me @[ sometime".into())]);
    }

    #[test]
    fn test_dot_without_call_stays_literal() {
        let segments = parse_template("@[name]. And more.");
        assert_eq!(
            segments,
            vec![reference("name", None), Segment::Literal(". And more.".into())]
        );
    }

    #[test]
    fn test_multiple_references() {
        let segments = parse_template("@[a] then @[b].at(2) end");
        assert_eq!(
            segments,
            vec![
                reference("a", None),
                Segment::Literal(" then ".into()),
                reference("b", Some(call("at", &["2"]))),
                Segment::Literal(" end".into()),
            ]
        );
    }

    #[test]
    fn test_empty_marker_is_literal() {
        let segments = parse_template("@[] nothing");
        assert_eq!(segments, vec![Segment::Literal("@[] nothing".into())]);
    }

    #[test]
    fn test_empty_template() {
        assert!(parse_template("").is_empty());
    }
}
