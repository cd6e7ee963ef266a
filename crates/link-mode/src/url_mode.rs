//! Link selection session
//!
//! While a session is active the UI shows a hint label next to every
//! target and feeds key presses to [`UrlMode::handle_key`]. Typing a full
//! label activates its target. The session works on a snapshot of the grid
//! taken when it started, so terminal output arriving meanwhile cannot move
//! targets out from under the labels.

use log::{debug, error, warn};
use rand::RngCore;

use crate::composed::ComposedStore;
use crate::error::Result;
use crate::events::{EventProxy, UrlModeEvent};
use crate::grid::{Coord, Grid, GridView};
use crate::hint_labels::assign_hints;
use crate::keys::{KeyBinding, Keystroke};
use crate::launcher::expand_template;
use crate::patterns::local_file_path;
use crate::settings::LinkModeSettings;
use crate::url_collect::{Target, TargetCollector, UrlAction};

/// Side effects a session needs from its embedder.
pub trait UrlModeHost {
    /// Start `argv` without waiting for it.
    fn spawn(&mut self, argv: &[String], activation_token: Option<&str>) -> Result<()>;

    /// Take ownership of `text` as the clipboard selection.
    fn set_clipboard(&mut self, text: String, serial: u32) -> Result<()>;

    /// A startup-notification token for a process launched by the key press
    /// with this input serial.
    fn activation_token(&mut self, _serial: u32) -> Option<String> {
        None
    }

    fn ime_enabled(&self) -> bool {
        false
    }

    fn set_ime_enabled(&mut self, _enabled: bool) {}
}

/// What a key press did to the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    /// No session, or the key matches no label.
    Ignored,
    /// The typed prefix changed.
    Narrowed,
    /// A target was activated.
    Activated,
    /// The session was cancelled.
    Cancelled,
    /// URIs were shown or hidden next to the labels.
    LabelsToggled,
}

/// A label still reachable with the typed prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JumpLabel {
    pub start: Coord,
    /// The part of the label not typed yet.
    pub remaining: String,
    pub uri: Option<String>,
}

#[derive(Clone, Debug)]
pub struct UrlModeConfig {
    pub label_alphabet: Vec<char>,
    pub launch: Vec<String>,
    pub cancel_bindings: Vec<KeyBinding>,
    pub toggle_uri_binding: Option<KeyBinding>,
}

impl UrlModeConfig {
    pub fn from_settings(settings: &LinkModeSettings) -> Self {
        Self {
            label_alphabet: settings.label_alphabet(),
            launch: settings.launch.clone(),
            cancel_bindings: settings.cancel_key_bindings(),
            toggle_uri_binding: settings.toggle_key_binding(),
        }
    }
}

impl Default for UrlModeConfig {
    fn default() -> Self {
        Self::from_settings(&LinkModeSettings::default())
    }
}

struct Session {
    snapshot: Grid,
    targets: Vec<Target>,
    /// Lowercased.
    typed: Vec<char>,
    show_uri_on_label: bool,
    ime_suspended: bool,
}

enum State {
    Inactive,
    Active(Box<Session>),
}

pub struct UrlMode {
    config: UrlModeConfig,
    state: State,
    events: Option<EventProxy>,
}

impl UrlMode {
    pub fn new(config: UrlModeConfig) -> Self {
        Self {
            config,
            state: State::Inactive,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventProxy) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &UrlModeConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// The grid labels are drawn over while a session is active.
    pub fn snapshot(&self) -> Option<&Grid> {
        self.session().map(|session| &session.snapshot)
    }

    pub fn targets(&self) -> &[Target] {
        self.session()
            .map(|session| session.targets.as_slice())
            .unwrap_or_default()
    }

    pub fn typed_prefix(&self) -> String {
        self.session()
            .map(|session| session.typed.iter().collect())
            .unwrap_or_default()
    }

    pub fn show_uri_on_label(&self) -> bool {
        self.session()
            .is_some_and(|session| session.show_uri_on_label)
    }

    fn session(&self) -> Option<&Session> {
        match &self.state {
            State::Active(session) => Some(session),
            State::Inactive => None,
        }
    }

    fn notify(&self, event: UrlModeEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    /// Collect and label the targets in `grid`, then start a session.
    ///
    /// Detection failures are logged and treated as "no targets". Returns
    /// whether a session was started.
    pub fn enter<R: RngCore>(
        &mut self,
        grid: &impl GridView,
        store: &ComposedStore,
        collector: &mut TargetCollector<R>,
        action: UrlAction,
        host: &mut impl UrlModeHost,
    ) -> bool {
        let targets = match collector.collect(grid, store, action) {
            Ok(targets) => targets,
            Err(err) => {
                error!("failed to collect link targets: {err}");
                return false;
            }
        };
        self.begin_labelled(grid, targets, host)
    }

    /// Label `targets` and start a session; errors degrade to "no targets".
    pub fn begin_labelled(
        &mut self,
        grid: &impl GridView,
        mut targets: Vec<Target>,
        host: &mut impl UrlModeHost,
    ) -> bool {
        if let Err(err) = assign_hints(&self.config.label_alphabet, &mut targets) {
            error!("failed to assign hint labels: {err}");
            return false;
        }
        self.begin_session(grid, targets, host)
    }

    /// Snapshot `grid`, highlight the targets' cells and start taking keys.
    ///
    /// Targets are expected to carry their labels already. Nothing happens
    /// when there are none.
    pub fn begin_session(
        &mut self,
        grid: &impl GridView,
        targets: Vec<Target>,
        host: &mut impl UrlModeHost,
    ) -> bool {
        if self.is_active() {
            self.end_session(host);
        }
        if targets.is_empty() {
            debug!("no link targets, not entering link-mode");
            return false;
        }

        let mut snapshot = grid.snapshot();
        for target in targets.iter().filter(|target| !target.keep_cell_attrs) {
            tag_cells(&mut snapshot, target, true);
        }

        let ime_suspended = host.ime_enabled();
        if ime_suspended {
            host.set_ime_enabled(false);
        }

        let labelled = targets.iter().filter(|target| target.hint.is_some()).count();
        debug!(
            "entering link-mode with {} targets ({labelled} labels)",
            targets.len()
        );

        self.state = State::Active(Box::new(Session {
            snapshot,
            targets,
            typed: Vec::new(),
            show_uri_on_label: false,
            ime_suspended,
        }));
        self.notify(UrlModeEvent::Entered(labelled));
        self.notify(UrlModeEvent::Redraw);
        true
    }

    /// Leave link-mode, dropping the snapshot and all targets.
    pub fn end_session(&mut self, host: &mut impl UrlModeHost) {
        let State::Active(session) = std::mem::replace(&mut self.state, State::Inactive) else {
            return;
        };

        if session.ime_suspended {
            host.set_ime_enabled(true);
        }
        debug!("leaving link-mode");
        self.notify(UrlModeEvent::Exited);
    }

    pub fn handle_key(
        &mut self,
        keystroke: &Keystroke,
        serial: u32,
        host: &mut impl UrlModeHost,
    ) -> KeyOutcome {
        let State::Active(session) = &mut self.state else {
            return KeyOutcome::Ignored;
        };

        if self
            .config
            .cancel_bindings
            .iter()
            .any(|binding| binding.matches(keystroke))
        {
            self.end_session(host);
            return KeyOutcome::Cancelled;
        }

        if self
            .config
            .toggle_uri_binding
            .as_ref()
            .is_some_and(|binding| binding.matches(keystroke))
        {
            session.show_uri_on_label = !session.show_uri_on_label;
            self.notify(UrlModeEvent::Redraw);
            return KeyOutcome::LabelsToggled;
        }

        if keystroke.is_backspace() {
            if session.typed.pop().is_none() {
                return KeyOutcome::Ignored;
            }
            self.notify(UrlModeEvent::Redraw);
            return KeyOutcome::Narrowed;
        }

        let Some(c) = keystroke.typed_char() else {
            return KeyOutcome::Ignored;
        };

        let mut candidate = session.typed.clone();
        candidate.extend(c.to_lowercase());

        let mut is_valid = false;
        let mut matched = None;
        for target in &session.targets {
            let Some(hint) = &target.hint else {
                continue;
            };
            let hint: Vec<char> = hint.chars().flat_map(char::to_lowercase).collect();
            if hint.starts_with(&candidate) {
                is_valid = true;
                if hint.len() == candidate.len() {
                    matched = Some(target.clone());
                    break;
                }
            }
        }

        if let Some(target) = matched {
            self.activate(&target, serial, host);
            return KeyOutcome::Activated;
        }
        if !is_valid {
            return KeyOutcome::Ignored;
        }

        session.typed = candidate;
        self.notify(UrlModeEvent::Redraw);
        KeyOutcome::Narrowed
    }

    fn activate(&mut self, target: &Target, serial: u32, host: &mut impl UrlModeHost) {
        let text = local_file_path(&target.text).unwrap_or_else(|| target.text.clone());
        debug!("activating {:?} ({})", target.text, target.action);

        match target.action {
            UrlAction::Copy => {
                if let Err(err) = host.set_clipboard(text, serial) {
                    warn!("failed to copy link to the clipboard: {err}");
                }
                self.end_session(host);
            }
            UrlAction::Launch => {
                self.launch(&text, serial, host);
                self.end_session(host);
            }
            UrlAction::Persistent => {
                self.launch(&text, serial, host);
                if let State::Active(session) = &mut self.state {
                    session.typed.clear();
                }
                self.notify(UrlModeEvent::Redraw);
            }
        }
    }

    fn launch(&self, url: &str, serial: u32, host: &mut impl UrlModeHost) {
        let argv = match expand_template(&self.config.launch, &[("url", url)]) {
            Ok(argv) => argv,
            Err(err) => {
                error!("failed to build launch command for {url:?}: {err}");
                return;
            }
        };

        let token = host.activation_token(serial);
        if let Err(err) = host.spawn(&argv, token.as_deref()) {
            error!("failed to launch {url:?}: {err}");
        }
    }

    /// Labels to draw, given what has been typed so far.
    pub fn jump_labels(&self) -> Vec<JumpLabel> {
        let Some(session) = self.session() else {
            return Vec::new();
        };

        session
            .targets
            .iter()
            .filter_map(|target| {
                let hint: Vec<char> = target
                    .hint
                    .as_ref()?
                    .chars()
                    .flat_map(char::to_lowercase)
                    .collect();
                hint.starts_with(&session.typed).then(|| JumpLabel {
                    start: target.range.start,
                    remaining: hint[session.typed.len()..].iter().collect(),
                    uri: session.show_uri_on_label.then(|| target.text.clone()),
                })
            })
            .collect()
    }
}

impl Drop for UrlMode {
    fn drop(&mut self) {
        if self.is_active() {
            debug!("link-mode dropped with an active session");
            self.notify(UrlModeEvent::Exited);
        }
    }
}

/// Set the url attribute on every cell of `target`, following wrapped rows.
fn tag_cells(grid: &mut Grid, target: &Target, value: bool) {
    let num_cols = grid.num_cols();
    let start = target.range.start;
    let end = target.range.end;

    let mut row_index = start.row;
    let mut col = start.col;
    while let Some(row) = grid.row_mut(row_index) {
        row.dirty = true;
        while col < num_cols {
            if let Some(cell) = row.cells.get_mut(col) {
                cell.attrs.url = value;
            }
            if row_index == end.row && col == end.col {
                return;
            }
            col += 1;
        }
        if row_index >= end.row {
            return;
        }
        row_index += 1;
        col = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyOutcome, UrlMode, UrlModeConfig, UrlModeHost};
    use crate::composed::ComposedStore;
    use crate::error::{LinkModeError, Result};
    use crate::events::{EventProxy, UrlModeEvent};
    use crate::grid::{Coord, Grid, GridView};
    use crate::keys::{Keystroke, Modifiers};
    use crate::patterns::UrlPatterns;
    use crate::settings::Osc8Underline;
    use crate::url_collect::{Target, TargetCollector, TargetKind, TargetRange, UrlAction};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Default)]
    struct RecordingHost {
        spawned: Vec<(Vec<String>, Option<String>)>,
        clipboard: Vec<(String, u32)>,
        ime: bool,
        ime_changes: Vec<bool>,
        token: Option<String>,
        fail_spawn: bool,
    }

    impl UrlModeHost for RecordingHost {
        fn spawn(&mut self, argv: &[String], activation_token: Option<&str>) -> Result<()> {
            if self.fail_spawn {
                return Err(LinkModeError::Spawn {
                    program: argv[0].clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            self.spawned
                .push((argv.to_vec(), activation_token.map(str::to_string)));
            Ok(())
        }

        fn set_clipboard(&mut self, text: String, serial: u32) -> Result<()> {
            self.clipboard.push((text, serial));
            Ok(())
        }

        fn activation_token(&mut self, _serial: u32) -> Option<String> {
            self.token.clone()
        }

        fn ime_enabled(&self) -> bool {
            self.ime
        }

        fn set_ime_enabled(&mut self, enabled: bool) {
            self.ime = enabled;
            self.ime_changes.push(enabled);
        }
    }

    fn target(id: u64, text: &str, hint: &str, action: UrlAction, row: usize) -> Target {
        Target {
            id,
            text: text.to_string(),
            kind: TargetKind::AutoDetected,
            action,
            range: TargetRange::new(Coord::new(row, 0), Coord::new(row, 3)),
            hint: Some(hint.to_string()),
            marked_for_removal: false,
            keep_cell_attrs: false,
        }
    }

    fn three_targets(action: UrlAction) -> Vec<Target> {
        vec![
            target(1, "https://a.example", "a", action, 0),
            target(2, "https://sa.example", "sa", action, 1),
            target(3, "https://sb.example", "sb", action, 2),
        ]
    }

    fn grid() -> Grid {
        Grid::new(10, 3)
    }

    fn key(c: char) -> Keystroke {
        Keystroke::from_char(c)
    }

    #[test]
    fn typing_narrows_then_activates_launch_target() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost::default();
        assert!(mode.begin_session(&grid(), three_targets(UrlAction::Launch), &mut host));

        assert_eq!(mode.handle_key(&key('s'), 1, &mut host), KeyOutcome::Narrowed);
        assert!(mode.is_active());
        assert_eq!(mode.typed_prefix(), "s");
        assert_eq!(mode.jump_labels().len(), 2);

        assert_eq!(mode.handle_key(&key('a'), 2, &mut host), KeyOutcome::Activated);
        assert!(!mode.is_active());
        assert_eq!(
            host.spawned,
            vec![(
                vec!["xdg-open".to_string(), "https://sa.example".to_string()],
                None
            )]
        );
    }

    #[test]
    fn persistent_activation_clears_prefix_and_stays_active() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost::default();
        mode.begin_session(&grid(), three_targets(UrlAction::Persistent), &mut host);

        mode.handle_key(&key('s'), 1, &mut host);
        assert_eq!(mode.handle_key(&key('b'), 2, &mut host), KeyOutcome::Activated);
        assert!(mode.is_active());
        assert_eq!(mode.typed_prefix(), "");

        assert_eq!(mode.handle_key(&key('a'), 3, &mut host), KeyOutcome::Activated);
        assert_eq!(host.spawned.len(), 2);
    }

    #[test]
    fn copy_hands_text_to_the_clipboard_with_serial() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost::default();
        mode.begin_session(&grid(), three_targets(UrlAction::Copy), &mut host);

        assert_eq!(mode.handle_key(&key('A'), 7, &mut host), KeyOutcome::Activated);
        assert_eq!(host.clipboard, vec![("https://a.example".to_string(), 7)]);
        assert!(host.spawned.is_empty());
        assert!(!mode.is_active());
    }

    #[test]
    fn local_file_targets_launch_with_their_path() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost {
            token: Some("tok".to_string()),
            ..Default::default()
        };
        let targets = vec![target(
            1,
            "file:///tmp/notes.txt",
            "a",
            UrlAction::Launch,
            0,
        )];
        mode.begin_session(&grid(), targets, &mut host);

        mode.handle_key(&key('a'), 1, &mut host);
        assert_eq!(
            host.spawned,
            vec![(
                vec!["xdg-open".to_string(), "/tmp/notes.txt".to_string()],
                Some("tok".to_string())
            )]
        );
    }

    #[test]
    fn unmatched_keys_are_ignored() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost::default();
        mode.begin_session(&grid(), three_targets(UrlAction::Launch), &mut host);

        assert_eq!(mode.handle_key(&key('z'), 1, &mut host), KeyOutcome::Ignored);
        assert_eq!(
            mode.handle_key(&Keystroke::new("s", Modifiers::control()), 1, &mut host),
            KeyOutcome::Ignored
        );
        assert_eq!(mode.typed_prefix(), "");
        assert!(mode.is_active());
    }

    #[test]
    fn backspace_pops_the_last_typed_character() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost::default();
        mode.begin_session(&grid(), three_targets(UrlAction::Launch), &mut host);

        let backspace = Keystroke::named("backspace");
        assert_eq!(mode.handle_key(&backspace, 1, &mut host), KeyOutcome::Ignored);
        mode.handle_key(&key('s'), 1, &mut host);
        assert_eq!(mode.handle_key(&backspace, 1, &mut host), KeyOutcome::Narrowed);
        assert_eq!(mode.typed_prefix(), "");
        assert!(mode.is_active());
    }

    #[test]
    fn cancel_bindings_end_the_session_and_restore_ime() {
        for cancel in [
            Keystroke::named("escape"),
            Keystroke::new("g", Modifiers::control()),
        ] {
            let mut mode = UrlMode::new(UrlModeConfig::default());
            let mut host = RecordingHost {
                ime: true,
                ..Default::default()
            };
            mode.begin_session(&grid(), three_targets(UrlAction::Launch), &mut host);
            assert!(!host.ime);

            assert_eq!(mode.handle_key(&cancel, 1, &mut host), KeyOutcome::Cancelled);
            assert!(!mode.is_active());
            assert!(mode.snapshot().is_none());
            assert_eq!(host.ime_changes, vec![false, true]);
        }
    }

    #[test]
    fn ime_is_left_alone_when_it_was_disabled() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost::default();
        mode.begin_session(&grid(), three_targets(UrlAction::Launch), &mut host);
        mode.end_session(&mut host);
        assert!(host.ime_changes.is_empty());
    }

    #[test]
    fn toggle_binding_shows_uris_on_labels() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost::default();
        mode.begin_session(&grid(), three_targets(UrlAction::Launch), &mut host);

        assert!(mode.jump_labels().iter().all(|label| label.uri.is_none()));
        assert_eq!(mode.handle_key(&key('t'), 1, &mut host), KeyOutcome::LabelsToggled);
        assert!(mode.show_uri_on_label());
        assert_eq!(
            mode.jump_labels()[0].uri.as_deref(),
            Some("https://a.example")
        );
    }

    #[test]
    fn snapshot_highlights_target_cells_across_wrapped_rows() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost::default();
        let mut wrapped = target(1, "https://a.example", "a", UrlAction::Launch, 0);
        wrapped.range = TargetRange::new(Coord::new(0, 8), Coord::new(1, 1));
        let mut kept = target(2, "https://b.example", "d", UrlAction::Launch, 2);
        kept.keep_cell_attrs = true;

        let live = grid();
        mode.begin_session(&live, vec![wrapped, kept], &mut host);

        let snapshot = mode.snapshot().expect("snapshot");
        let rows = snapshot.rows();
        assert!(!rows[0].cells[7].attrs.url);
        assert!(rows[0].cells[8].attrs.url && rows[0].cells[9].attrs.url);
        assert!(rows[1].cells[0].attrs.url && rows[1].cells[1].attrs.url);
        assert!(!rows[1].cells[2].attrs.url);
        assert!(rows[2].cells.iter().all(|cell| !cell.attrs.url));
        assert!(live.rows().iter().all(|row| row.cells.iter().all(|c| !c.attrs.url)));
    }

    #[test]
    fn empty_target_list_does_not_start_a_session() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost::default();
        assert!(!mode.begin_session(&grid(), Vec::new(), &mut host));
        assert!(!mode.is_active());
        assert_eq!(mode.handle_key(&key('a'), 1, &mut host), KeyOutcome::Ignored);
    }

    #[test]
    fn spawn_failure_still_ends_a_launch_session() {
        let mut mode = UrlMode::new(UrlModeConfig::default());
        let mut host = RecordingHost {
            fail_spawn: true,
            ..Default::default()
        };
        mode.begin_session(&grid(), three_targets(UrlAction::Launch), &mut host);

        assert_eq!(mode.handle_key(&key('a'), 1, &mut host), KeyOutcome::Activated);
        assert!(!mode.is_active());
    }

    #[test]
    fn enter_collects_labels_and_notifies_the_ui() {
        let mut store = ComposedStore::new();
        let grid = Grid::from_text(
            "one https://one.example two https://two.example",
            80,
            &mut store,
        )
        .expect("grid");
        let mut collector = TargetCollector::new(
            UrlPatterns::builtin().expect("builtin regex"),
            Osc8Underline::UrlMode,
            StdRng::seed_from_u64(3),
        );
        let (proxy, receiver) = EventProxy::channel(8);
        let mut mode = UrlMode::new(UrlModeConfig::default()).with_events(proxy);
        let mut host = RecordingHost::default();

        assert!(mode.enter(&grid, &store, &mut collector, UrlAction::Copy, &mut host));
        assert_eq!(mode.targets().len(), 2);
        assert_eq!(receiver.try_recv(), Ok(UrlModeEvent::Entered(2)));
        assert_eq!(receiver.try_recv(), Ok(UrlModeEvent::Redraw));

        let labels = mode.jump_labels();
        assert_eq!(labels[0].start, Coord::new(0, 4));
        let first = labels[0].remaining.chars().next().expect("label");
        assert_eq!(mode.handle_key(&key(first), 9, &mut host), KeyOutcome::Activated);
        assert_eq!(host.clipboard[0].0, "https://one.example");
        assert_eq!(receiver.try_recv(), Ok(UrlModeEvent::Exited));
        assert_eq!(grid.num_rows(), 1);
    }

    #[test]
    fn enter_degrades_to_no_targets_on_bad_alphabet() {
        let mut store = ComposedStore::new();
        let grid = Grid::from_text("https://a.example https://b.example", 80, &mut store)
            .expect("grid");
        let mut collector = TargetCollector::new(
            UrlPatterns::builtin().expect("builtin regex"),
            Osc8Underline::UrlMode,
            StdRng::seed_from_u64(4),
        );
        let config = UrlModeConfig {
            label_alphabet: vec!['x'],
            ..UrlModeConfig::default()
        };
        let mut mode = UrlMode::new(config);
        let mut host = RecordingHost::default();

        assert!(!mode.enter(&grid, &store, &mut collector, UrlAction::Launch, &mut host));
        assert!(!mode.is_active());
    }
}
