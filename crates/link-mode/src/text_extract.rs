//! Logical line reconstruction
//!
//! Pattern matching needs contiguous text, but a URL may be wrapped over
//! several rows and cells may hold composed characters or wide-character
//! spacers. This module rebuilds the logical lines of the view as UTF-8
//! and remembers, for every byte, the grid cell it came from.

use log::debug;

use crate::composed::ComposedStore;
use crate::error::{LinkModeError, Result};
use crate::grid::{CellContent, Coord, GridView};

/// One logical (unwrapped) line of the view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogicalLine {
    pub text: String,
    /// `map[ofs]` is the grid cell that produced `text.as_bytes()[ofs]`.
    pub map: Vec<Coord>,
}

impl LogicalLine {
    fn push(&mut self, c: char, coord: Coord) {
        let start = self.text.len();
        self.text.push(c);
        let added = self.text.len() - start;
        self.map.extend(std::iter::repeat_n(coord, added));
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Grid span of the byte range `start..end`; `end` is exclusive.
    pub fn span(&self, start: usize, end: usize) -> Option<(Coord, Coord)> {
        if start >= end {
            return None;
        }
        Some((*self.map.get(start)?, *self.map.get(end - 1)?))
    }
}

/// Rebuild the logical lines of the current view, top to bottom.
///
/// A row with the linebreak flag set ends the current line; wrapped rows
/// continue it. Empty lines are dropped, so there are never more lines
/// than visible rows.
pub fn extract_lines(grid: &impl GridView, store: &ComposedStore) -> Result<Vec<LogicalLine>> {
    let num_rows = grid.num_rows();
    let num_cols = grid.num_cols();
    let view = grid.view();

    let mut lines = Vec::with_capacity(num_rows);
    let mut line = LogicalLine::default();

    for r in 0..num_rows {
        let Some(row) = grid.row_in_view(r) else {
            break;
        };

        for (col, cell) in row.cells.iter().enumerate().take(num_cols) {
            let coord = Coord::new(view + r, col);
            match cell.content() {
                CellContent::Spacer => {}
                CellContent::Empty => line.push(' ', coord),
                CellContent::Char(c) => line.push(c, coord),
                CellContent::Composed(key) => {
                    let composed = store.lookup(key).ok_or_else(|| {
                        LinkModeError::invariant(format!(
                            "cell {coord:?} references unknown composed key {key:#x}"
                        ))
                    })?;
                    for &c in &composed.chars {
                        line.push(c, coord);
                    }
                }
            }
        }

        if row.linebreak && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }

    debug!("extracted {} logical lines from {num_rows} rows", lines.len());
    Ok(lines)
}
