//! ASCII echo mode
//!
//! Put the TTY on stdin into non-canonical mode and show the value of every
//! byte typed until Ctrl-D. The kernel keyboard mode is not touched, so
//! there are no signal handlers or idle timer here.

use crate::constants::ASCII_EOT;
use crate::report::Reporter;
use log::{info, warn};
use nix::sys::termios::{self, InputFlags, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, BorrowedFd};

/// stdin in byte-at-a-time echo mode
pub struct AsciiEcho {
    /// stdin file descriptor
    fd: i32,
    /// Original termios settings (for restoration)
    orig_termios: Option<Termios>,
}

impl AsciiEcho {
    /// Switch stdin to byte-at-a-time mode with echo
    ///
    /// Failures are only warnings: the mode still works, just less tidily,
    /// on something that is not a terminal.
    pub fn new() -> Self {
        let fd = io::stdin().as_raw_fd();
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };

        let orig_termios = match termios::tcgetattr(borrowed) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("tcgetattr failed: {}", e);
                None
            }
        };

        if let Some(orig) = &orig_termios {
            let echo = echo_attrs(orig);
            if let Err(e) = termios::tcsetattr(borrowed, SetArg::TCSAFLUSH, &echo) {
                warn!("tcsetattr failed: {}", e);
            }
        }

        info!("stdin switched to ASCII echo mode");
        Self { fd, orig_termios }
    }

    /// Echo byte values until Ctrl-D or end of input
    pub fn run<W: Write>(&self, reporter: &mut Reporter<W>) -> io::Result<usize> {
        reporter.ascii_prompt()?;
        echo_until_eot(|buf| nix::unistd::read(self.fd, buf), reporter)
    }
}

/// Settings for echo mode: no line editing or signal keys, echo on with
/// control characters shown as `^X`, one byte per read.
fn echo_attrs(orig: &Termios) -> Termios {
    let mut echo = orig.clone();
    echo.local_flags.remove(LocalFlags::ICANON | LocalFlags::ISIG);
    echo.local_flags.insert(LocalFlags::ECHO | LocalFlags::ECHOCTL);
    echo.input_flags = InputFlags::empty();
    echo.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    echo.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    echo
}

/// Report bytes from `read` one at a time; stops after Ctrl-D, at end of
/// input or on a read error. Returns the number of bytes shown.
fn echo_until_eot<R, W>(mut read: R, reporter: &mut Reporter<W>) -> io::Result<usize>
where
    R: FnMut(&mut [u8]) -> nix::Result<usize>,
    W: Write,
{
    let mut buf = [0u8; 1];
    let mut shown = 0;
    loop {
        match read(&mut buf) {
            Ok(1) => {
                reporter.ascii_byte(buf[0])?;
                shown += 1;
                if buf[0] == ASCII_EOT {
                    break;
                }
            }
            Ok(_) => break,
            Err(e) => {
                warn!("read from stdin failed: {}", e);
                break;
            }
        }
    }
    Ok(shown)
}

impl Drop for AsciiEcho {
    fn drop(&mut self) {
        if let Some(orig) = &self.orig_termios {
            let borrowed = unsafe { BorrowedFd::borrow_raw(self.fd) };
            if let Err(e) = termios::tcsetattr(borrowed, SetArg::TCSANOW, orig) {
                warn!("tcsetattr failed: {}", e);
            } else {
                info!("stdin settings restored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Presentation;
    use nix::errno::Errno;
    use std::collections::VecDeque;

    fn scripted(bytes: &[u8]) -> impl FnMut(&mut [u8]) -> nix::Result<usize> {
        let mut queue: VecDeque<u8> = bytes.iter().copied().collect();
        move |buf| match queue.pop_front() {
            Some(b) => {
                buf[0] = b;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    #[test]
    fn test_stops_after_ctrl_d() {
        let mut reporter = Reporter::new(Vec::new(), Presentation::Keycodes);
        let shown = echo_until_eot(scripted(b"a\x04b"), &mut reporter).unwrap();
        assert_eq!(shown, 2);
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(text, " \t 97 0141 0x61\n \t  4 0004 0x04\n");
    }

    #[test]
    fn test_stops_at_end_of_input() {
        let mut reporter = Reporter::new(Vec::new(), Presentation::Keycodes);
        assert_eq!(echo_until_eot(scripted(b"xy"), &mut reporter).unwrap(), 2);
    }

    #[test]
    fn test_stops_on_read_error() {
        let mut reporter = Reporter::new(Vec::new(), Presentation::Keycodes);
        let shown = echo_until_eot(|_buf: &mut [u8]| Err(Errno::EIO), &mut reporter).unwrap();
        assert_eq!(shown, 0);
    }

    #[test]
    fn test_echo_attrs() {
        let mut raw: libc::termios = unsafe { std::mem::zeroed() };
        raw.c_lflag = libc::ICANON | libc::ISIG;
        raw.c_iflag = libc::ICRNL;
        let echo = echo_attrs(&Termios::from(raw));

        assert!(!echo.local_flags.contains(LocalFlags::ICANON));
        assert!(!echo.local_flags.contains(LocalFlags::ISIG));
        assert!(echo.local_flags.contains(LocalFlags::ECHO | LocalFlags::ECHOCTL));
        assert!(echo.input_flags.is_empty());
        assert_eq!(echo.control_chars[SpecialCharacterIndices::VMIN as usize], 1);
        assert_eq!(echo.control_chars[SpecialCharacterIndices::VTIME as usize], 0);
    }
}
