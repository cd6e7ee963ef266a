//! Link Mode - command line front end
//!
//! `scan` lays text out on an in-memory grid and lists the labelled links,
//! optionally feeding keys to a selection session. `launch` forwards a
//! command line to a running terminal server.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use link_mode::{
    assign_hints, ComposedStore, Grid, KeyOutcome, Keystroke, LinkModeSettings, ProcessLauncher,
    TargetCollector, UrlAction, UrlMode, UrlModeConfig, UrlModeHost,
};
use log::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "link-mode", version, about = "Keyboard-driven link selection")]
struct Cli {
    /// Settings file (defaults to ~/.link-mode/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the links found in FILE (or stdin)
    Scan {
        file: Option<PathBuf>,

        /// Grid width used to wrap the text
        #[arg(long, default_value_t = 80)]
        cols: usize,

        /// What activating a link does: copy, launch or persistent
        #[arg(long, default_value_t = UrlAction::Launch)]
        action: UrlAction,

        /// Keys typed into the selection session
        #[arg(long)]
        select: Option<String>,
    },
    /// Ask a terminal server to run ARGS
    Launch {
        /// TERM for the new terminal
        #[arg(long)]
        term: Option<String>,

        /// Server socket path
        #[arg(long)]
        server_socket: Option<PathBuf>,

        #[arg(last = true)]
        args: Vec<String>,
    },
}

/// Copies go to stdout; launches are spawned detached.
struct CliHost {
    launcher: ProcessLauncher,
}

impl UrlModeHost for CliHost {
    fn spawn(&mut self, argv: &[String], activation_token: Option<&str>) -> link_mode::Result<()> {
        self.launcher.spawn(argv, activation_token).map(|_| ())
    }

    fn set_clipboard(&mut self, text: String, _serial: u32) -> link_mode::Result<()> {
        println!("{text}");
        Ok(())
    }

    fn activation_token(&mut self, _serial: u32) -> Option<String> {
        std::env::var("XDG_ACTIVATION_TOKEN").ok()
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => LinkModeSettings::load(path),
        None => LinkModeSettings::load_or_create(&LinkModeSettings::config_path()),
    };

    match cli.command {
        Command::Scan {
            file,
            cols,
            action,
            select,
        } => scan(&settings, file, cols, action, select.as_deref()),
        Command::Launch {
            term,
            server_socket,
            args,
        } => {
            let code = launch(&settings, term, server_socket, args)?;
            std::process::exit(code);
        }
    }
}

fn read_input(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn scan(
    settings: &LinkModeSettings,
    file: Option<PathBuf>,
    cols: usize,
    action: UrlAction,
    select: Option<&str>,
) -> Result<()> {
    let text = read_input(file)?;

    let mut store = ComposedStore::with_capacity(settings.composed_capacity);
    let grid = Grid::from_text(&text, cols, &mut store).context("failed to lay out text")?;

    let mut collector =
        TargetCollector::from_settings(settings).context("invalid url detection settings")?;
    let mut targets = collector
        .collect(&grid, &store, action)
        .context("failed to collect links")?;
    assign_hints(&settings.label_alphabet(), &mut targets).context("failed to label links")?;

    if targets.is_empty() {
        info!("no links found");
        return Ok(());
    }

    let Some(keys) = select else {
        for target in &targets {
            if let Some(hint) = &target.hint {
                println!("{hint:<4} {}", target.text);
            }
        }
        return Ok(());
    };

    let mut host = CliHost {
        launcher: ProcessLauncher::new(),
    };
    let mut mode = UrlMode::new(UrlModeConfig::from_settings(settings));
    mode.begin_session(&grid, targets, &mut host);

    for (serial, c) in (1u32..).zip(keys.chars()) {
        let outcome = mode.handle_key(&Keystroke::from_char(c), serial, &mut host);
        debug!("key {c:?}: {outcome:?}");
        if outcome == KeyOutcome::Ignored {
            info!("{c:?} matches no label");
        }
        if !mode.is_active() {
            break;
        }
    }

    mode.end_session(&mut host);
    Ok(())
}

#[cfg(unix)]
fn launch(
    settings: &LinkModeSettings,
    term: Option<String>,
    server_socket: Option<PathBuf>,
    args: Vec<String>,
) -> Result<i32> {
    use link_mode::launch_protocol::send_request;
    use link_mode::LaunchRequest;

    let request = LaunchRequest::new(term.unwrap_or_else(|| settings.term.clone()), args);
    let socket = server_socket.or_else(|| settings.server_socket.clone());

    send_request(socket.as_deref(), &request)
        .context("failed to send launch request (is the server running?)")
}

#[cfg(not(unix))]
fn launch(
    _settings: &LinkModeSettings,
    _term: Option<String>,
    _server_socket: Option<PathBuf>,
    _args: Vec<String>,
) -> Result<i32> {
    anyhow::bail!("launch requests need Unix domain sockets")
}
