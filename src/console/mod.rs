//! Console keyboard device
//!
//! Everything that touches the kernel lives behind the [`Console`] trait:
//! keyboard mode (KDGKBMODE/KDSKBMODE), termios, and the bounded read.

pub mod device;
mod ioctl_helpers;
pub mod kbmode;

pub use device::{find_console, ConsoleDevice};
pub use kbmode::KbMode;

use nix::sys::signal::SigSet;
use nix::sys::termios::SetArg;

/// Line-discipline settings that can be snapshotted and re-applied
pub trait TerminalAttrs: Clone {
    /// Derive the settings used while decoding: canonical mode, echo and
    /// signal generation off, input processing cleared, a read returning
    /// after `min_read` bytes or `inter_byte_ds` deciseconds of silence.
    fn diagnostic(&self, min_read: u8, inter_byte_ds: u8) -> Self;
}

/// Operations a session needs from the console device
pub trait Console {
    type Attrs: TerminalAttrs;

    fn keyboard_mode(&self) -> nix::Result<KbMode>;

    fn set_keyboard_mode(&self, mode: KbMode) -> nix::Result<()>;

    fn terminal_attrs(&self) -> nix::Result<Self::Attrs>;

    fn set_terminal_attrs(&self, attrs: &Self::Attrs, when: SetArg) -> nix::Result<()>;

    /// Block until a read would return, with `sigmask` as the signal mask
    /// for the duration of the wait
    ///
    /// Fails with `EINTR` when a signal handler ran. Consoles without a
    /// pollable descriptor go straight to `read`.
    fn wait_readable(&self, _sigmask: Option<SigSet>) -> nix::Result<()> {
        Ok(())
    }

    /// Blocking read, governed by VMIN/VTIME
    fn read(&self, buf: &mut [u8]) -> nix::Result<usize>;
}
