//! Console device handle
//!
//! Opens a console TTY and implements [`Console`] on it with ioctls and
//! termios calls.

use super::ioctl_helpers::{ioctl_read_byte, ioctl_read_int, ioctl_with_int_arg};
use super::{Console, KbMode, TerminalAttrs};
use crate::error::SessionError;
use log::{debug, info};
use nix::poll::{ppoll, PollFd, PollFlags};
use nix::sys::signal::SigSet;
use nix::sys::termios::{
    self, InputFlags, LocalFlags, SetArg, SpecialCharacterIndices, Termios,
};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsFd, AsRawFd, RawFd};
use std::path::{Path, PathBuf};

// Keyboard ioctl constants (from linux/kd.h)
const KDGKBTYPE: libc::c_ulong = 0x4B33;
const KDGKBMODE: libc::c_ulong = 0x4B44;
pub(crate) const KDSKBMODE: libc::c_ulong = 0x4B45;

// KDGKBTYPE results
const KB_84: u8 = 0x01;
const KB_101: u8 = 0x02;

/// Places a console may be reachable from, tried in order
const CONSOLE_CANDIDATES: &[&str] = &[
    "/proc/self/fd/0",
    "/dev/tty",
    "/dev/tty0",
    "/dev/vc/0",
    "/dev/systty",
    "/dev/console",
];

/// Open console device
pub struct ConsoleDevice {
    file: File,
    path: PathBuf,
}

impl ConsoleDevice {
    /// Open `path` and make sure it is a console keyboard
    ///
    /// Tries read/write first, then write-only, then read-only, since some
    /// console nodes are only accessible one way.
    pub fn open(path: &Path) -> Result<Self, SessionError> {
        let file = open_any_access(path).map_err(|source| SessionError::NoDevice {
            path: path.display().to_string(),
            source,
        })?;

        let device = Self {
            file,
            path: path.to_path_buf(),
        };
        if !device.is_console() {
            return Err(SessionError::NotAConsole {
                path: path.display().to_string(),
            });
        }

        info!("Opened console {}", path.display());
        Ok(device)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_console(&self) -> bool {
        if !nix::unistd::isatty(self.file.as_raw_fd()).unwrap_or(false) {
            return false;
        }
        match ioctl_read_byte(self.file.as_raw_fd(), KDGKBTYPE, "KDGKBTYPE") {
            Ok(kb_type) => kb_type == KB_84 || kb_type == KB_101,
            Err(_) => false,
        }
    }
}

impl AsRawFd for ConsoleDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Wait for `fd` to become readable, swapping in `sigmask` while blocked
///
/// Signals kept blocked outside the wait are delivered only here, so a
/// trigger raised just before blocking still interrupts with `EINTR`.
pub fn wait_readable<Fd: AsFd>(fd: &Fd, sigmask: Option<SigSet>) -> nix::Result<()> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    ppoll(&mut fds, None, sigmask).map(drop)
}

fn open_any_access(path: &Path) -> std::io::Result<File> {
    let attempts = [(true, true), (false, true), (true, false)];
    let mut last_err = None;
    for (read, write) in attempts {
        match OpenOptions::new()
            .read(read)
            .write(write)
            .custom_flags(libc::O_NOCTTY | libc::O_CLOEXEC)
            .open(path)
        {
            Ok(file) => return Ok(file),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound)))
}

/// Locate the console keyboard
///
/// With an explicit path only that path is tried. Otherwise the usual
/// console nodes are probed and the first one that is a keyboard wins.
pub fn find_console(explicit: Option<&Path>) -> Result<ConsoleDevice, SessionError> {
    if let Some(path) = explicit {
        return ConsoleDevice::open(path);
    }

    for candidate in CONSOLE_CANDIDATES {
        match ConsoleDevice::open(Path::new(candidate)) {
            Ok(device) => return Ok(device),
            Err(e) => debug!("Console candidate rejected: {}", e),
        }
    }
    Err(SessionError::NoConsole)
}

impl Console for ConsoleDevice {
    type Attrs = Termios;

    fn keyboard_mode(&self) -> nix::Result<KbMode> {
        ioctl_read_int(self.file.as_raw_fd(), KDGKBMODE, "KDGKBMODE").map(KbMode::from_raw)
    }

    fn set_keyboard_mode(&self, mode: KbMode) -> nix::Result<()> {
        ioctl_with_int_arg(self.file.as_raw_fd(), KDSKBMODE, mode.as_raw(), "KDSKBMODE")
    }

    fn terminal_attrs(&self) -> nix::Result<Termios> {
        termios::tcgetattr(self.file.as_fd())
    }

    fn set_terminal_attrs(&self, attrs: &Termios, when: SetArg) -> nix::Result<()> {
        termios::tcsetattr(self.file.as_fd(), when, attrs)
    }

    fn wait_readable(&self, sigmask: Option<SigSet>) -> nix::Result<()> {
        wait_readable(&self.file, sigmask)
    }

    fn read(&self, buf: &mut [u8]) -> nix::Result<usize> {
        nix::unistd::read(self.file.as_raw_fd(), buf)
    }
}

impl TerminalAttrs for Termios {
    fn diagnostic(&self, min_read: u8, inter_byte_ds: u8) -> Self {
        let mut raw = self.clone();
        raw.local_flags
            .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG);
        raw.input_flags = InputFlags::empty();
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = min_read;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = inter_byte_ds;
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_termios() -> Termios {
        let mut raw: libc::termios = unsafe { std::mem::zeroed() };
        raw.c_lflag = libc::ICANON | libc::ECHO | libc::ISIG | libc::IEXTEN;
        raw.c_iflag = libc::ICRNL | libc::IXON;
        Termios::from(raw)
    }

    #[test]
    fn test_diagnostic_attrs() {
        let orig = blank_termios();
        let raw = orig.diagnostic(18, 1);

        assert!(!raw.local_flags.contains(LocalFlags::ICANON));
        assert!(!raw.local_flags.contains(LocalFlags::ECHO));
        assert!(!raw.local_flags.contains(LocalFlags::ISIG));
        assert!(raw.local_flags.contains(LocalFlags::IEXTEN));
        assert!(raw.input_flags.is_empty());
        assert_eq!(raw.control_chars[SpecialCharacterIndices::VMIN as usize], 18);
        assert_eq!(raw.control_chars[SpecialCharacterIndices::VTIME as usize], 1);

        // Snapshot itself is untouched
        assert!(orig.local_flags.contains(LocalFlags::ICANON));
        assert!(orig.input_flags.contains(InputFlags::ICRNL));
    }

    #[test]
    fn test_open_missing_device() {
        let err = ConsoleDevice::open(Path::new("/nonexistent/keyprobe-console"))
            .err()
            .map(|e| e.to_string());
        assert!(err.unwrap_or_default().contains("/nonexistent/keyprobe-console"));
    }

    #[test]
    fn test_regular_file_is_not_a_console() {
        let result = ConsoleDevice::open(Path::new("/proc/self/status"));
        assert!(matches!(result, Err(SessionError::NotAConsole { .. })));
    }

    // Requires a Linux VT and root
    #[test]
    #[ignore]
    fn test_find_console() {
        let device = find_console(None);
        assert!(device.is_ok(), "No console found");
    }
}
