//! TOML settings for `dumpsessions`.
//!
//! ```toml
//! [watcher]
//! queue_capacity = 64
//! stop_timeout = 2000
//!
//! [[hook]]
//! on = ["start", "logon", "unlock"]
//! command = ["notepad.exe"]
//! as_user = true
//! ```
//!
//! `as_user` hooks are started in the user's session and require Windows.

use std::{fs, path::Path};

use serde::Deserialize;
use session_watch::WatcherConfig;

use crate::{
    Error, Result,
    hooks::{Hook, Trigger},
};

/// Everything a settings file can specify.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Watcher tunables.
    pub watcher: WatcherConfig,
    /// Commands to run on matching events.
    #[serde(rename = "hook")]
    pub hooks: Vec<HookSpec>,
}

/// A hook as written in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookSpec {
    /// Event names that fire the hook.
    pub on: Vec<String>,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Launch inside the user session instead of as a child process.
    #[serde(default)]
    pub as_user: bool,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text).map_err(|e| Error::Parse(e.to_string()))?;
        settings.watcher.validate()?;
        settings.compile_hooks()?;
        Ok(settings)
    }

    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    /// Validate hook specs and turn them into runnable hooks.
    pub fn compile_hooks(&self) -> Result<Vec<Hook>> {
        self.hooks
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                if spec.on.is_empty() {
                    return Err(Error::InvalidHook {
                        index: i,
                        message: "`on` must name at least one event".into(),
                    });
                }
                if spec.as_user && !cfg!(windows) {
                    return Err(Error::InvalidHook {
                        index: i,
                        message: "`as_user` is only supported on Windows".into(),
                    });
                }
                let triggers = spec
                    .on
                    .iter()
                    .map(|name| {
                        name.parse::<Trigger>().map_err(|e| Error::InvalidHook {
                            index: i,
                            message: e.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Hook::new(triggers, spec.command.clone(), spec.as_user).ok_or_else(|| Error::InvalidHook {
                    index: i,
                    message: "`command` must not be empty".into(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let s = Settings::from_toml("").unwrap();
        assert_eq!(s, Settings::default());
        assert!(s.compile_hooks().unwrap().is_empty());
    }

    #[test]
    fn parses_watcher_and_hooks() {
        let s = Settings::from_toml(
            r#"
            [watcher]
            class_prefix = "Dump"
            queue_capacity = 8
            stop_timeout = 250

            [[hook]]
            on = ["unlock", "query-end-session"]
            command = ["echo", "hi"]
            "#,
        )
        .unwrap();
        assert_eq!(s.watcher.class_prefix, "Dump");
        assert_eq!(s.watcher.queue_capacity, 8);
        assert_eq!(s.watcher.stop_timeout, Duration::from_millis(250));
        let hooks = s.compile_hooks().unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].program(), "echo");
    }

    #[test]
    fn start_trigger_and_as_user_flag() {
        let text = r#"
            [[hook]]
            on = ["start", "unlock"]
            command = ["notepad.exe"]
            as_user = true
            "#;
        let parsed = Settings::from_toml(text);
        if cfg!(windows) {
            let hooks = parsed.unwrap().compile_hooks().unwrap();
            assert!(hooks[0].as_user());
            assert!(hooks[0].on_start());
        } else {
            assert!(matches!(parsed, Err(Error::InvalidHook { index: 0, .. })));
        }

        let plain = Settings::from_toml("[[hook]]\non = [\"start\"]\ncommand = [\"x\"]\n").unwrap();
        let hooks = plain.compile_hooks().unwrap();
        assert!(!hooks[0].as_user());
        assert!(hooks[0].on_start());
    }

    #[test]
    fn rejects_unknown_event_names() {
        let err = Settings::from_toml(
            r#"
            [[hook]]
            on = ["reboot"]
            command = ["x"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidHook { index: 0, .. }), "{err}");
    }

    #[test]
    fn rejects_empty_commands_and_bad_watcher_values() {
        assert!(matches!(
            Settings::from_toml("[[hook]]\non = [\"lock\"]\ncommand = []\n"),
            Err(Error::InvalidHook { .. })
        ));
        assert!(matches!(
            Settings::from_toml("[watcher]\nqueue_capacity = 0\n"),
            Err(Error::Watcher(_))
        ));
        assert!(matches!(
            Settings::from_toml("[watcher]\nbogus = 1\n"),
            Err(Error::Parse(_))
        ));
    }
}
