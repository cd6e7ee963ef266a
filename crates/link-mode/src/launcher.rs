//! URL launcher - template expansion and fire-and-forget process spawning

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use log::{debug, warn};

use crate::error::{LinkModeError, Result};

pub const DEFAULT_LAUNCH_TEMPLATE: &[&str] = &["xdg-open", "${url}"];

pub fn default_launch_template() -> Vec<String> {
    DEFAULT_LAUNCH_TEMPLATE.iter().map(|s| s.to_string()).collect()
}

/// Replace every `${name}` in `template` with its value from `vars`.
/// Unknown placeholders are left untouched.
pub fn expand_template(template: &[String], vars: &[(&str, &str)]) -> Result<Vec<String>> {
    if template.is_empty() {
        return Err(LinkModeError::invariant("launch template is empty"));
    }

    Ok(template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |arg, (name, value)| {
                arg.replace(&format!("${{{name}}}"), value)
            })
        })
        .collect())
}

/// Spawns launcher processes detached from the caller.
///
/// Standard streams go to `/dev/null`. The child is waited on from a
/// background thread so it never lingers as a zombie.
#[derive(Clone, Debug, Default)]
pub struct ProcessLauncher {
    cwd: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run launched processes from `cwd` instead of the current directory.
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }

    /// Start `argv` and return its pid without waiting for it.
    pub fn spawn(&self, argv: &[String], activation_token: Option<&str>) -> Result<u32> {
        let Some((program, args)) = argv.split_first() else {
            return Err(LinkModeError::invariant("cannot spawn an empty argv"));
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        if let Some(token) = activation_token {
            command.env("XDG_ACTIVATION_TOKEN", token);
        }

        let mut child = command.spawn().map_err(|source| LinkModeError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!("spawned {program} (pid {pid})");

        let reaper = thread::Builder::new()
            .name("link-mode-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) => debug!("launcher pid {pid} exited: {status}"),
                Err(err) => warn!("failed to wait for launcher pid {pid}: {err}"),
            });
        if let Err(err) = reaper {
            warn!("failed to start reaper for pid {pid}: {err}");
        }

        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::{default_launch_template, expand_template, ProcessLauncher};
    use crate::error::LinkModeError;

    #[test]
    fn expands_url_placeholder() {
        let argv = expand_template(&default_launch_template(), &[("url", "https://a.example")])
            .expect("expand");
        assert_eq!(argv, vec!["xdg-open", "https://a.example"]);
    }

    #[test]
    fn expands_placeholders_inside_arguments() {
        let template = vec!["open".to_string(), "--url=${url}".to_string(), "${other}".to_string()];
        let argv = expand_template(&template, &[("url", "x")]).expect("expand");
        assert_eq!(argv, vec!["open", "--url=x", "${other}"]);
    }

    #[test]
    fn empty_template_is_rejected() {
        assert!(matches!(
            expand_template(&[], &[("url", "x")]),
            Err(LinkModeError::InvariantViolation(_))
        ));
    }

    #[test]
    fn missing_program_reports_spawn_error() {
        let launcher = ProcessLauncher::new();
        let err = launcher
            .spawn(&["link-mode-no-such-program-4242".to_string()], None)
            .unwrap_err();
        assert!(matches!(err, LinkModeError::Spawn { program, .. } if program == "link-mode-no-such-program-4242"));
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(ProcessLauncher::new().spawn(&[], None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn spawns_without_waiting() {
        let launcher = ProcessLauncher::with_cwd(std::env::temp_dir());
        let pid = launcher
            .spawn(&["true".to_string()], Some("token"))
            .expect("spawn true");
        assert!(pid > 0);
    }
}
