//! Grid model consumed by link-mode
//!
//! Grid mutation belongs to the terminal; this module only describes what
//! link-mode reads (rows, cells, linebreak flags and OSC-8 ranges) plus an
//! in-memory grid used for snapshots, tests and the CLI.

use unicode_width::UnicodeWidthChar;

use crate::composed::{is_composed, ComposedStore, CELL_COMB_CHARS_LO, CELL_SPACER};
use crate::error::Result;

const TAB_WIDTH: usize = 8;

/// A grid position. `row` is absolute, i.e. it counts scrollback rows too.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub fn new(row: usize, col: usize) -> Self {
        Coord { row, col }
    }

    /// Collapse to a single ordinal for span comparisons.
    pub fn linearize(self, num_cols: usize) -> u64 {
        self.row as u64 * num_cols as u64 + self.col as u64
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellAttrs {
    /// Highlighted as a link while link-mode is active.
    pub url: bool,
}

/// What a cell holds, decoded from its raw codepoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellContent {
    Empty,
    Char(char),
    /// Offset into the composed-character store.
    Composed(u32),
    /// Trailing half of a double-width character.
    Spacer,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    pub wc: u32,
    pub attrs: CellAttrs,
}

impl Cell {
    pub fn from_char(c: char) -> Self {
        Cell {
            wc: c as u32,
            attrs: CellAttrs::default(),
        }
    }

    pub fn content(&self) -> CellContent {
        match self.wc {
            0 => CellContent::Empty,
            CELL_SPACER => CellContent::Spacer,
            wc if is_composed(wc) => CellContent::Composed(wc - CELL_COMB_CHARS_LO),
            wc => char::from_u32(wc).map_or(CellContent::Empty, CellContent::Char),
        }
    }
}

/// An OSC-8 hyperlink attached to part of a row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowHyperlink {
    pub id: u64,
    pub uri: String,
    /// First column, inclusive.
    pub start: usize,
    /// Last column, inclusive.
    pub end: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
    /// The row ends a line of output; false when it wraps into the next row.
    pub linebreak: bool,
    pub hyperlinks: Vec<RowHyperlink>,
    /// Needs repainting.
    pub dirty: bool,
}

impl Row {
    pub fn new(num_cols: usize) -> Self {
        Row {
            cells: vec![Cell::default(); num_cols],
            linebreak: true,
            hyperlinks: Vec::new(),
            dirty: false,
        }
    }
}

/// Read access to a terminal grid.
///
/// Rows are addressed by absolute index. The view is the `num_rows()` rows
/// starting at `view()`.
pub trait GridView {
    fn num_cols(&self) -> usize;
    fn num_rows(&self) -> usize;
    fn view(&self) -> usize;
    fn row(&self, index: usize) -> Option<&Row>;

    /// An immutable copy, decoupled from further terminal output.
    fn snapshot(&self) -> Grid;

    fn row_in_view(&self, r: usize) -> Option<&Row> {
        self.row(self.view() + r)
    }
}

/// In-memory grid: scrollback followed by the visible rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Grid {
    num_cols: usize,
    num_rows: usize,
    view: usize,
    rows: Vec<Row>,
}

impl Grid {
    /// An empty grid with `num_rows` visible rows and no scrollback.
    pub fn new(num_cols: usize, num_rows: usize) -> Self {
        Grid {
            num_cols,
            num_rows,
            view: 0,
            rows: (0..num_rows).map(|_| Row::new(num_cols)).collect(),
        }
    }

    /// Wrap pre-built rows; the view covers the last `num_rows` of them.
    pub fn from_rows(num_cols: usize, num_rows: usize, rows: Vec<Row>) -> Self {
        let num_rows = num_rows.min(rows.len());
        Grid {
            num_cols,
            num_rows,
            view: rows.len() - num_rows,
            rows,
        }
    }

    /// Lay `text` out the way a terminal prints it: rows wrap at `num_cols`,
    /// `\n` ends a line, `\t` moves to the next tab stop, other control
    /// characters are dropped, double-width characters take a spacer cell and
    /// zero-width characters are folded into the previous cell through
    /// `store`. A double-width character that does not fit leaves spacers at
    /// the end of the row. Every produced row is part of the view.
    pub fn from_text(text: &str, num_cols: usize, store: &mut ComposedStore) -> Result<Self> {
        let num_cols = num_cols.max(1);
        let mut rows = vec![Row::new(num_cols)];
        let mut col = 0;
        let mut last: Option<(usize, usize)> = None;

        for c in text.chars() {
            if c == '\n' {
                rows.push(Row::new(num_cols));
                col = 0;
                last = None;
                continue;
            }
            if c == '\t' {
                if col < num_cols {
                    col = ((col / TAB_WIDTH + 1) * TAB_WIDTH).min(num_cols - 1);
                }
                last = None;
                continue;
            }
            if c.is_control() {
                continue;
            }

            let width = c.width().unwrap_or(0);
            if width == 0 {
                if let Some((r, cl)) = last {
                    let cell = &mut rows[r].cells[cl];
                    let prefix: Vec<char> = match cell.content() {
                        CellContent::Char(base) => vec![base],
                        CellContent::Composed(key) => store
                            .lookup(key)
                            .map(|composed| composed.chars.clone())
                            .unwrap_or_default(),
                        _ => Vec::new(),
                    };
                    if !prefix.is_empty() {
                        let key = store.compose(&prefix, c, None)?;
                        cell.wc = CELL_COMB_CHARS_LO + key;
                    }
                }
                continue;
            }

            if col + width > num_cols {
                let current = rows.len() - 1;
                for cell in rows[current].cells.iter_mut().skip(col) {
                    cell.wc = CELL_SPACER;
                }
                rows[current].linebreak = false;
                rows.push(Row::new(num_cols));
                col = 0;
            }

            let r = rows.len() - 1;
            rows[r].cells[col] = Cell::from_char(c);
            last = Some((r, col));
            if width == 2 && col + 1 < num_cols {
                rows[r].cells[col + 1].wc = CELL_SPACER;
            }
            col += width;
        }

        let num_rows = rows.len();
        Ok(Grid::from_rows(num_cols, num_rows, rows))
    }

    /// Move the view so it starts at absolute row `view`, clamped to the grid.
    pub fn scroll_to(&mut self, view: usize) {
        self.view = view.min(self.rows.len() - self.num_rows);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut Row> {
        self.rows.get_mut(index)
    }

    pub fn cell_mut(&mut self, coord: Coord) -> Option<&mut Cell> {
        self.rows
            .get_mut(coord.row)
            .and_then(|row| row.cells.get_mut(coord.col))
    }

    /// Attach an OSC-8 hyperlink to an absolute row.
    pub fn add_hyperlink(&mut self, row: usize, hyperlink: RowHyperlink) -> bool {
        match self.rows.get_mut(row) {
            Some(row) => {
                row.hyperlinks.push(hyperlink);
                true
            }
            None => false,
        }
    }
}

impl GridView for Grid {
    fn num_cols(&self) -> usize {
        self.num_cols
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn view(&self) -> usize {
        self.view
    }

    fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    fn snapshot(&self) -> Grid {
        self.clone()
    }
}
