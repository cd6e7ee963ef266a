//! Link Mode - keyboard-driven link selection for terminal grids
//!
//! This crate finds URLs and OSC-8 hyperlinks in a terminal grid, labels
//! them with short key sequences and runs the selection session that copies
//! or launches the picked link. Multi-codepoint cells are kept in a
//! composed-character store.

pub mod composed;
pub mod error;
pub mod events;
pub mod grid;
pub mod hint_labels;
pub mod keys;
pub mod launch_protocol;
pub mod launcher;
pub mod patterns;
pub mod settings;
pub mod term_grid;
pub mod text_extract;
pub mod url_collect;
pub mod url_mode;

pub use alacritty_terminal;

pub use composed::{Composed, ComposedStore, Slot};
pub use error::{LinkModeError, Result};
pub use events::{EventProxy, UrlModeEvent};
pub use grid::{Cell, CellAttrs, CellContent, Coord, Grid, GridView, Row, RowHyperlink};
pub use hint_labels::{assign_hints, generate_labels};
pub use keys::{KeyBinding, Keystroke, Modifiers};
pub use launch_protocol::LaunchRequest;
pub use launcher::{expand_template, ProcessLauncher};
pub use patterns::UrlPatterns;
pub use settings::{LinkModeSettings, Osc8Underline};
pub use term_grid::grid_from_term;
pub use text_extract::{extract_lines, LogicalLine};
pub use url_collect::{
    remove_overlapping, Target, TargetCollector, TargetKind, TargetRange, UrlAction,
};
pub use url_mode::{JumpLabel, KeyOutcome, UrlMode, UrlModeConfig, UrlModeHost};

/// Collect every target in the current view of `grid`.
pub fn collect_targets(
    grid: &impl GridView,
    store: &ComposedStore,
    settings: &LinkModeSettings,
    action: UrlAction,
) -> Result<Vec<Target>> {
    TargetCollector::from_settings(settings)?.collect(grid, store, action)
}
