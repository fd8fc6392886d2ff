//! Session error taxonomy
//!
//! Setup failures (`NoDevice`, `NotAConsole`, `NoConsole`, `ModeQuery`,
//! `AttrQuery`) happen before anything on the console has been changed.
//! `ModeRestore` is the one that can leave the keyboard unusable.

use nix::errno::Errno;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot open {path}: {source}")]
    NoDevice {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a console keyboard")]
    NotAConsole { path: String },

    #[error("couldn't get a file descriptor referring to the console")]
    NoConsole,

    #[error("unable to read keyboard mode: {0}")]
    ModeQuery(#[source] Errno),

    #[error("unable to read terminal attributes: {0}")]
    AttrQuery(#[source] Errno),

    #[error("unable to set keyboard mode {mode}: {source}")]
    ModeSet {
        mode: &'static str,
        #[source]
        source: Errno,
    },

    #[error("unable to restore keyboard mode {mode}: {source}")]
    ModeRestore {
        mode: &'static str,
        #[source]
        source: Errno,
    },

    #[error("read from console failed: {0}")]
    Read(#[source] Errno),
}

impl SessionError {
    /// True when the console may have been left in a non-interactive mode.
    pub fn leaves_console_unusable(&self) -> bool {
        matches!(self, SessionError::ModeRestore { .. })
    }
}
