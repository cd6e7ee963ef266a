//! Target collection - OSC-8 hyperlinks and regex-detected URLs

use std::fmt;
use std::str::FromStr;

use log::debug;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::composed::ComposedStore;
use crate::error::{LinkModeError, Result};
use crate::grid::{Coord, GridView};
use crate::patterns::UrlPatterns;
use crate::settings::{LinkModeSettings, Osc8Underline};
use crate::text_extract::extract_lines;

/// What happens when a target's label is typed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UrlAction {
    /// Hand the URL to the clipboard and leave link-mode.
    Copy,
    /// Open the URL with the launcher and leave link-mode.
    #[default]
    Launch,
    /// Open the URL and stay in link-mode for further picks.
    Persistent,
}

impl fmt::Display for UrlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UrlAction::Copy => "copy",
            UrlAction::Launch => "launch",
            UrlAction::Persistent => "persistent",
        })
    }
}

impl FromStr for UrlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" => Ok(UrlAction::Copy),
            "launch" => Ok(UrlAction::Launch),
            "persistent" => Ok(UrlAction::Persistent),
            other => Err(format!("unknown url action {other:?}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    AutoDetected,
    ExplicitHyperlink,
}

/// Inclusive span of grid cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetRange {
    pub start: Coord,
    pub end: Coord,
}

impl TargetRange {
    pub fn new(start: Coord, end: Coord) -> Self {
        TargetRange { start, end }
    }

    fn linear(&self, num_cols: usize) -> (u64, u64) {
        (self.start.linearize(num_cols), self.end.linearize(num_cols))
    }

    /// Either span touches the other's start or end, or one contains the other.
    pub fn overlaps(&self, other: &TargetRange, num_cols: usize) -> bool {
        let (in_start, in_end) = self.linear(num_cols);
        let (out_start, out_end) = other.linear(num_cols);

        (in_start <= out_start && in_end >= out_start)
            || (in_start <= out_end && in_end >= out_end)
            || (in_start >= out_start && in_end <= out_end)
    }
}

/// A selectable link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub id: u64,
    pub text: String,
    pub kind: TargetKind,
    pub action: UrlAction,
    pub range: TargetRange,
    pub hint: Option<String>,
    pub marked_for_removal: bool,
    /// Leave the cells' url attribute alone while highlighting.
    pub keep_cell_attrs: bool,
}

impl Target {
    pub fn is_explicit(&self) -> bool {
        self.kind == TargetKind::ExplicitHyperlink
    }
}

/// Collects targets from a grid. The random source supplies ids for
/// auto-detected URLs.
pub struct TargetCollector<R = StdRng> {
    patterns: UrlPatterns,
    osc8_underline: Osc8Underline,
    rng: R,
}

impl TargetCollector<StdRng> {
    pub fn from_settings(settings: &LinkModeSettings) -> Result<Self> {
        Ok(Self::new(
            settings.url_patterns()?,
            settings.osc8_underline,
            StdRng::from_os_rng(),
        ))
    }
}

impl<R: RngCore> TargetCollector<R> {
    pub fn new(patterns: UrlPatterns, osc8_underline: Osc8Underline, rng: R) -> Self {
        Self {
            patterns,
            osc8_underline,
            rng,
        }
    }

    pub fn patterns(&self) -> &UrlPatterns {
        &self.patterns
    }

    /// Every OSC-8 hyperlink and detected URL in the view, overlaps resolved.
    pub fn collect(
        &mut self,
        grid: &impl GridView,
        store: &ComposedStore,
        action: UrlAction,
    ) -> Result<Vec<Target>> {
        let mut targets = Vec::new();
        self.osc8_uris(grid, action, &mut targets);
        self.regex_detected(grid, store, action, &mut targets)?;
        remove_overlapping(&mut targets, grid.num_cols())?;

        debug!("collected {} targets", targets.len());
        Ok(targets)
    }

    fn osc8_uris(&self, grid: &impl GridView, action: UrlAction, targets: &mut Vec<Target>) {
        let keep_cell_attrs = self.osc8_underline == Osc8Underline::Always;

        for r in 0..grid.num_rows() {
            let Some(row) = grid.row_in_view(r) else {
                break;
            };
            let row_index = grid.view() + r;

            targets.extend(row.hyperlinks.iter().map(|link| Target {
                id: link.id,
                text: link.uri.clone(),
                kind: TargetKind::ExplicitHyperlink,
                action,
                range: TargetRange::new(
                    Coord::new(row_index, link.start),
                    Coord::new(row_index, link.end),
                ),
                hint: None,
                marked_for_removal: false,
                keep_cell_attrs,
            }));
        }
    }

    fn regex_detected(
        &mut self,
        grid: &impl GridView,
        store: &ComposedStore,
        action: UrlAction,
        targets: &mut Vec<Target>,
    ) -> Result<()> {
        for line in extract_lines(grid, store)? {
            for found in self.patterns.find_matches(&line.text) {
                let Some((start, end)) = line.span(found.start, found.end) else {
                    continue;
                };

                let text = line.text[found].to_string();
                debug!("regex match {text:?} at {start:?}..={end:?}");

                targets.push(Target {
                    id: self.rng.next_u64(),
                    text,
                    kind: TargetKind::AutoDetected,
                    action,
                    range: TargetRange::new(start, end),
                    hint: None,
                    marked_for_removal: false,
                    keep_cell_attrs: false,
                });
            }
        }
        Ok(())
    }
}

/// Drop auto-detected targets that overlap an OSC-8 hyperlink.
///
/// Targets of the same kind never overlap when the grid metadata is sane;
/// if they do, the whole collection is rejected.
pub fn remove_overlapping(targets: &mut Vec<Target>, num_cols: usize) -> Result<()> {
    for outer in 0..targets.len() {
        for inner in 0..targets.len() {
            if outer == inner {
                continue;
            }

            let (out, inn) = (&targets[outer], &targets[inner]);
            if !inn.range.overlaps(&out.range, num_cols) {
                continue;
            }

            let victim = match (out.kind, inn.kind) {
                (TargetKind::ExplicitHyperlink, TargetKind::AutoDetected) => inner,
                (TargetKind::AutoDetected, TargetKind::ExplicitHyperlink) => outer,
                (kind, _) => {
                    return Err(LinkModeError::invariant(format!(
                        "overlapping {kind:?} targets {:?} and {:?}",
                        out.text, inn.text
                    )));
                }
            };
            targets[victim].marked_for_removal = true;
        }
    }

    targets.retain(|target| !target.marked_for_removal);
    Ok(())
}
