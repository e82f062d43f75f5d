//! Column/cell arithmetic.
//!
//! The engine treats columns as a flat range `0..number_of_columns` (the
//! product of `column_dimensions`, as in the original multi-dimensional
//! topology this is flattened from) and addresses cells as
//! `column * cells_per_column + offset`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TmError};

/// The column/cell shape of a [`TemporalMemory`](crate::temporal_memory::TemporalMemory).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    number_of_columns: usize,
    cells_per_column: usize,
}

impl Topology {
    /// Build from a flattened column count and a per-column cell count.
    pub fn new(number_of_columns: usize, cells_per_column: usize) -> Self {
        Self {
            number_of_columns,
            cells_per_column,
        }
    }

    /// Total number of columns.
    #[inline]
    pub fn number_of_columns(&self) -> usize {
        self.number_of_columns
    }

    /// Cells grown per column.
    #[inline]
    pub fn cells_per_column(&self) -> usize {
        self.cells_per_column
    }

    /// Total number of cells (`number_of_columns * cells_per_column`).
    #[inline]
    pub fn number_of_cells(&self) -> usize {
        self.number_of_columns * self.cells_per_column
    }

    /// The column a cell belongs to.
    pub fn column_for_cell(&self, cell: u32) -> Result<usize> {
        let cell = cell as usize;
        if cell >= self.number_of_cells() {
            return Err(TmError::OutOfRange {
                what: "cell",
                index: cell,
                length: self.number_of_cells(),
            });
        }
        Ok(cell / self.cells_per_column)
    }

    /// The cells grown under `column`, in increasing order.
    pub fn cells_for_column(&self, column: usize) -> Result<Vec<u32>> {
        if column >= self.number_of_columns {
            return Err(TmError::OutOfRange {
                what: "column",
                index: column,
                length: self.number_of_columns,
            });
        }
        let base = (column * self.cells_per_column) as u32;
        Ok((0..self.cells_per_column as u32).map(|i| base + i).collect())
    }

    /// Map each cell in `cells` to its column, in the same order, without
    /// deduplicating.
    pub fn map_cells_to_columns(&self, cells: &[u32]) -> Result<Vec<usize>> {
        cells.iter().map(|&c| self.column_for_cell(c)).collect()
    }
}
