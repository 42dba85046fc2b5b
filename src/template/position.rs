//! Row position tokens and their resolution to concrete indices.
//!
//! Positions are written 1-based in templates (`3`, `THIS`, `THIS+2`, `END`,
//! `HEADER`) and converted to 0-based indices immediately before indexing.
//! Resolution never clamps and never fails: out-of-range results are handed
//! back as-is and treated as "no data row" by the range resolution engine.

use std::fmt;

/// Index returned for the `HEADER` sentinel. Never a data row.
pub const HEADER_INDEX: i64 = -1;

/// A parsed position token from a reference parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionToken {
    /// Absolute 1-based row number.
    Absolute(u32),
    /// The row currently being resolved.
    This,
    /// Offset from the current row, n >= 1.
    ThisPlus(u32),
    /// Offset from the current row, n >= 1.
    ThisMinus(u32),
    /// The last row of the dataset.
    End,
    /// Reserved sentinel distinct from any data row.
    Header,
}

impl PositionToken {
    /// Parse a raw parameter token.
    ///
    /// Whitespace is insignificant and keywords are case-insensitive.
    /// Returns `None` for anything unrecognized; the caller then resolves
    /// the whole reference to an empty string.
    pub fn parse(raw: &str) -> Option<Self> {
        let token: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        match token.as_str() {
            "THIS" => return Some(PositionToken::This),
            "END" => return Some(PositionToken::End),
            "HEADER" => return Some(PositionToken::Header),
            _ => {}
        }

        if let Some(rest) = token.strip_prefix("THIS+") {
            let n: u32 = rest.parse().ok()?;
            if n == 0 {
                return None;
            }
            return Some(PositionToken::ThisPlus(n));
        }
        if let Some(rest) = token.strip_prefix("THIS-") {
            let n: u32 = rest.parse().ok()?;
            if n == 0 {
                return None;
            }
            return Some(PositionToken::ThisMinus(n));
        }

        token.parse::<u32>().ok().map(PositionToken::Absolute)
    }

    /// Resolve to a 0-based row index.
    ///
    /// The result may fall outside `[0, dataset_len)`; callers must treat any
    /// such index as absent. `HEADER` resolves to [`HEADER_INDEX`] and is
    /// never clamped into range.
    pub fn resolve(&self, current_row: usize, dataset_len: usize) -> i64 {
        match self {
            PositionToken::Absolute(k) => *k as i64 - 1,
            PositionToken::This => current_row as i64,
            PositionToken::ThisPlus(n) => current_row as i64 + *n as i64,
            PositionToken::ThisMinus(n) => current_row as i64 - *n as i64,
            PositionToken::End => dataset_len as i64 - 1,
            PositionToken::Header => HEADER_INDEX,
        }
    }
}

impl fmt::Display for PositionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionToken::Absolute(k) => write!(f, "{}", k),
            PositionToken::This => write!(f, "THIS"),
            PositionToken::ThisPlus(n) => write!(f, "THIS+{}", n),
            PositionToken::ThisMinus(n) => write!(f, "THIS-{}", n),
            PositionToken::End => write!(f, "END"),
            PositionToken::Header => write!(f, "HEADER"),
        }
    }
}
