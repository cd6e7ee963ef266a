//! Grid reader over an alacritty terminal
//!
//! Copies the scrollback and screen of a `Term` into a link-mode `Grid`.
//! Zero-width characters attached to a cell are interned in the composed
//! store, and runs of cells sharing an OSC-8 hyperlink become row ranges.

use std::hash::{Hash, Hasher};

use alacritty_terminal::{
    event::EventListener,
    grid::Dimensions,
    index::{Column, Line},
    term::cell::{Cell as AlacCell, Flags, Hyperlink},
    Term,
};
use rustc_hash::FxHasher;

use crate::composed::{ComposedStore, CELL_COMB_CHARS_LO, CELL_SPACER};
use crate::error::Result;
use crate::grid::{Grid, Row, RowHyperlink};

const WIDE_CHAR_SPACERS: Flags =
    Flags::from_bits(Flags::LEADING_WIDE_CHAR_SPACER.bits() | Flags::WIDE_CHAR_SPACER.bits())
        .unwrap();

/// Build a grid from the terminal's scrollback and screen.
///
/// The resulting view matches the terminal's current display offset.
pub fn grid_from_term<T: EventListener>(term: &Term<T>, store: &mut ComposedStore) -> Result<Grid> {
    let grid = term.grid();
    let num_cols = grid.columns();
    let history = grid.history_size();
    let screen_lines = grid.screen_lines();

    let mut rows = Vec::with_capacity(history + screen_lines);
    for index in 0..history + screen_lines {
        let line = Line(index as i32 - history as i32);
        let alac_row = &grid[line];
        let mut row = Row::new(num_cols);
        let mut run: Option<(Hyperlink, usize)> = None;

        for col in 0..num_cols {
            let cell = &alac_row[Column(col)];
            row.cells[col].wc = cell_codepoint(cell, store)?;

            let link = cell.hyperlink();
            if run.as_ref().map(|(current, _)| current) != link.as_ref() {
                if let Some((current, start)) = run.take() {
                    row.hyperlinks.push(row_hyperlink(&current, start, col - 1));
                }
                run = link.map(|link| (link, col));
            }
        }
        if let Some((current, start)) = run {
            row.hyperlinks.push(row_hyperlink(&current, start, num_cols - 1));
        }

        row.linebreak = num_cols == 0
            || !alac_row[Column(num_cols - 1)]
                .flags
                .contains(Flags::WRAPLINE);
        rows.push(row);
    }

    let mut converted = Grid::from_rows(num_cols, screen_lines, rows);
    converted.scroll_to(history.saturating_sub(grid.display_offset()));
    Ok(converted)
}

fn cell_codepoint(cell: &AlacCell, store: &mut ComposedStore) -> Result<u32> {
    if cell.flags.intersects(WIDE_CHAR_SPACERS) {
        return Ok(CELL_SPACER);
    }

    match cell.zerowidth() {
        Some(zerowidth) if !zerowidth.is_empty() => {
            let mut chars = Vec::with_capacity(zerowidth.len() + 1);
            chars.push(cell.c);
            let mut key = 0;
            for &c in zerowidth {
                key = store.compose(&chars, c, None)?;
                chars.push(c);
            }
            Ok(CELL_COMB_CHARS_LO + key)
        }
        _ => Ok(cell.c as u32),
    }
}

fn row_hyperlink(link: &Hyperlink, start: usize, end: usize) -> RowHyperlink {
    let mut hasher = FxHasher::default();
    link.id().hash(&mut hasher);

    RowHyperlink {
        id: hasher.finish(),
        uri: link.uri().to_owned(),
        start,
        end,
    }
}
