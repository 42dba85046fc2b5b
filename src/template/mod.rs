//! Prompt template resolution: position tokens, reference parsing, and
//! interpolation against a dataset snapshot.
//!
//! - [`position`] - position tokens (`THIS`, `THIS±n`, `END`, `HEADER`, absolute)
//! - [`parser`] - tokenizer producing the literal/reference segment list
//! - [`resolve`] - range resolution engine and template interpolator

pub mod parser;
pub mod position;
pub mod resolve;

pub use parser::{parse_template, RangeCall, Reference, Segment};
pub use position::{PositionToken, HEADER_INDEX};
pub use resolve::{interpolate, resolve_reference};
