//! Configuration file management
//!
//! Loads TOML configuration files and provides run settings.
//! Default config path: ~/.config/keyprobe/config.toml
//!
//! Command line options are applied on top with [`Config::apply_args`].

use crate::console::KbMode;
use crate::constants::{DEFAULT_TIMEOUT_SECS, MAX_QUIT_KEYCODE, MAX_SCANCODE_QUIT_KEYCODE};
use crate::report::Presentation;
use crate::session::SessionSettings;
use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Console device settings
    pub console: ConsoleConfig,
    /// Session settings
    pub session: SessionConfig,
}

/// Console device settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Console device path (None = probe the usual console nodes)
    pub device: Option<String>,
}

/// What to show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Interpreted keycodes (MEDIUMRAW)
    #[default]
    Keycodes,
    /// Raw scancodes (RAW)
    Scancodes,
    /// Byte values typed on stdin, no keyboard mode change
    Ascii,
}

impl Mode {
    /// Keyboard mode the console is switched to, `None` for ASCII mode
    pub fn kb_mode(self) -> Option<KbMode> {
        match self {
            Mode::Keycodes => Some(KbMode::MediumRaw),
            Mode::Scancodes => Some(KbMode::Raw),
            Mode::Ascii => None,
        }
    }

    pub fn presentation(self) -> Presentation {
        match self {
            Mode::Scancodes => Presentation::Scancodes,
            Mode::Keycodes | Mode::Ascii => Presentation::Keycodes,
        }
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Output mode
    pub mode: Mode,
    /// Seconds without input before exiting (default: 10)
    pub timeout: i64,
    /// Keycode whose release exits (0 = disabled)
    pub quit_keycode: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Keycodes,
            timeout: i64::from(DEFAULT_TIMEOUT_SECS),
            quit_keycode: 0,
        }
    }
}

impl SessionConfig {
    /// Effective timeout: anything below one second means the default
    pub fn timeout_secs(&self) -> u32 {
        match u32::try_from(self.timeout) {
            Ok(secs) if secs >= 1 => secs,
            _ => DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Effective quit keycode: out of range values disable quitting, and
    /// raw scancodes stop at 83
    pub fn quit_keycode(&self) -> u16 {
        let limit = match self.mode {
            Mode::Scancodes => MAX_SCANCODE_QUIT_KEYCODE,
            Mode::Keycodes | Mode::Ascii => MAX_QUIT_KEYCODE,
        };
        match u16::try_from(self.quit_keycode) {
            Ok(code) if code <= limit => code,
            _ => 0,
        }
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            timeout_secs: self.timeout_secs(),
            quit_keycode: self.quit_keycode(),
        }
    }
}

/// What the command line asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Help,
    Version,
}

impl Config {
    /// Read the config file, falling back to built-in defaults
    ///
    /// `KEYPROBE_CONFIG` names the file explicitly; otherwise the per-user
    /// file is used when it exists. A file that was asked for but cannot be
    /// read, or any file that does not parse, is reported and ignored.
    pub fn load() -> Self {
        Self::load_with(
            std::env::var_os("KEYPROBE_CONFIG").map(PathBuf::from),
            default_config_path(),
        )
    }

    fn load_with(explicit: Option<PathBuf>, user: Option<PathBuf>) -> Self {
        let path = match (explicit, user) {
            (Some(path), _) => path,
            (None, Some(path)) if path.exists() => path,
            _ => {
                debug!("No config file, using built-in defaults");
                return Self::default();
            }
        };

        match Self::load_from_file(&path) {
            Ok(config) => {
                info!("Loaded config: {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load settings from specified path
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        Self::parse(&content).context("Failed to parse config file")
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command line options (without the program name)
    ///
    /// Options override the config file. Later options win, and the quit
    /// keycode limit is checked against the final mode.
    pub fn apply_args<I, S>(&mut self, args: I) -> Result<Command>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let (name, inline_value) = match arg.split_once('=') {
                Some((name, value)) if name.starts_with("--") => (name, Some(value.to_string())),
                _ => (arg.as_str(), None),
            };

            match name {
                "-h" | "--help" => return Ok(Command::Help),
                "-V" | "--version" => return Ok(Command::Version),
                "-a" | "--ascii" => self.session.mode = Mode::Ascii,
                "-s" | "--scancodes" => self.session.mode = Mode::Scancodes,
                "-k" | "--keycodes" => self.session.mode = Mode::Keycodes,
                "-t" | "--timeout" => {
                    let value = option_value(name, inline_value, &mut iter)?;
                    // Unparsable values fall back to the default like values < 1
                    self.session.timeout = value.trim().parse().unwrap_or(0);
                }
                "-q" | "--quit-keycode" => {
                    let value = option_value(name, inline_value, &mut iter)?;
                    self.session.quit_keycode = value.trim().parse().unwrap_or(0);
                }
                "-C" | "--console" => {
                    let value = option_value(name, inline_value, &mut iter)?;
                    self.console.device = Some(value);
                }
                other if other.starts_with('-') => {
                    return Err(anyhow!("unrecognized option '{}'", other));
                }
                other => return Err(anyhow!("unexpected argument '{}'", other)),
            }
        }

        Ok(Command::Run)
    }
}

fn option_value<'a>(
    name: &str,
    inline_value: Option<String>,
    iter: &mut impl Iterator<Item = &'a String>,
) -> Result<String> {
    match inline_value {
        Some(value) => Ok(value),
        None => iter
            .next()
            .cloned()
            .ok_or_else(|| anyhow!("option '{}' requires an argument", name)),
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("keyprobe").join("config.toml"))
}
