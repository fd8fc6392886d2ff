//! Operator-facing output
//!
//! Line-oriented text on stdout. Diagnostics go through `log` instead.

use crate::console::KbMode;
use crate::input::KeyEvent;
use crate::session::TerminationTrigger;
use std::io::{self, Write};

/// How read buffers are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Decoded `keycode N press|release` lines
    Keycodes,
    /// Raw bytes in hex
    Scancodes,
}

pub struct Reporter<W: Write> {
    out: W,
    presentation: Presentation,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, presentation: Presentation) -> Self {
        Self { out, presentation }
    }

    /// Startup line naming the keyboard mode found on the console
    pub fn original_mode(&mut self, mode: KbMode) -> io::Result<()> {
        writeln!(self.out, "kb mode was {}", mode)?;
        if mode != KbMode::Xlate {
            writeln!(
                self.out,
                "[ if you are trying this under X, it might not work\n\
                 since the X server is also reading /dev/console ]"
            )?;
        }
        writeln!(self.out)
    }

    pub fn prompt(&mut self, timeout_secs: u32, quit_keycode: u16) -> io::Result<()> {
        if quit_keycode == 0 {
            writeln!(
                self.out,
                "press any key (program terminates {}s after last keypress)...",
                timeout_secs
            )?;
        } else {
            writeln!(
                self.out,
                "press any key (program terminates {}s after last keypress\n\
                 or after pressing the key with keycode {})...",
                timeout_secs, quit_keycode
            )?;
        }
        self.out.flush()
    }

    /// Hex dump of one read buffer; only shown in scancode presentation
    pub fn scancodes(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.presentation != Presentation::Scancodes {
            return Ok(());
        }
        for byte in bytes {
            write!(self.out, "0x{:02x} ", byte)?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    /// One decoded event; only shown in keycode presentation
    pub fn key_event(&mut self, event: &KeyEvent) -> io::Result<()> {
        if self.presentation != Presentation::Keycodes {
            return Ok(());
        }
        let action = if event.released { "release" } else { "press" };
        writeln!(self.out, "keycode {:3} {}", event.keycode, action)?;
        self.out.flush()
    }

    pub fn ascii_prompt(&mut self) -> io::Result<()> {
        writeln!(self.out, "\nPress any keys - Ctrl-D will terminate this program\n")?;
        self.out.flush()
    }

    /// Decimal, octal and hex value of one input byte
    pub fn ascii_byte(&mut self, byte: u8) -> io::Result<()> {
        writeln!(self.out, " \t{:3} 0{:03o} 0x{:02x}", byte, byte, byte)?;
        self.out.flush()
    }

    /// Notice printed before the console is restored
    pub fn termination(&mut self, trigger: &TerminationTrigger, timeout_secs: u32) -> io::Result<()> {
        match trigger {
            TerminationTrigger::Signal { signal, .. } => {
                writeln!(self.out, "caught signal {}, cleaning up...", *signal as i32)?
            }
            TerminationTrigger::Idle => {
                writeln!(self.out, "no key pressed for {}s, exiting", timeout_secs)?
            }
            TerminationTrigger::QuitKey(_) | TerminationTrigger::EndOfInput => {}
        }
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
