//! Domain models for the rowgen generation engine.
//!
//! This module contains the core data structures used throughout the engine:
//!
//! - [`Dataset`] - Ordered rows plus an ordered column catalog
//! - [`Row`] - One record: a stable id plus column-name → value cells
//!
//! Row order is semantically meaningful: it defines the positional indices
//! that prompt-template references resolve against. The row id exists for
//! presentation and undo layers; the resolution engine addresses rows purely
//! by position within the snapshot it is given.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// Row
// =============================================================================

/// A single dataset row.
///
/// Cells map column names to textual values. A column absent from the map is
/// *missing*, which is distinct from present-but-empty for round-trip
/// fidelity; both read back as `""` through [`Row::cell`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    /// Stable identifier, independent of the row's position.
    pub id: Uuid,
    /// Column name → value.
    pub cells: BTreeMap<String, String>,
}

impl Row {
    /// Create an empty row with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cells: BTreeMap::new(),
        }
    }

    /// Build a row from (column, value) pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut row = Self::new();
        for (k, v) in pairs {
            row.cells.insert(k.into(), v.into());
        }
        row
    }

    /// Read a cell value; missing cells read as the empty string.
    pub fn cell(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Read a cell distinguishing missing from empty.
    pub fn cell_opt(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// Write a cell value.
    pub fn set_cell(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(column.into(), value.into());
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// An ordered sequence of rows sharing one column catalog.
///
/// During a batch job the job's running copy of the dataset serves as the
/// snapshot every template resolution reads, so rows processed earlier in the
/// run are visible to later rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Dataset {
    /// Ordered column names. Order is preserved for CSV output.
    pub columns: Vec<String>,
    /// Ordered rows.
    pub rows: Vec<Row>,
}

impl Dataset {
    /// Create an empty dataset with the given column catalog.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether a column exists in the catalog.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Add a column to the catalog if it is not already present.
    pub fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }

    /// Read a cell by 0-based row index; out-of-range or missing reads as "".
    pub fn cell(&self, row: usize, column: &str) -> &str {
        self.rows.get(row).map(|r| r.cell(column)).unwrap_or("")
    }

    /// Write a cell by 0-based row index. Out-of-range writes are ignored.
    pub fn set_cell(&mut self, row: usize, column: &str, value: impl Into<String>) {
        if let Some(r) = self.rows.get_mut(row) {
            r.set_cell(column, value);
        }
    }
}
