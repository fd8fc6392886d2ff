//! Diagnostic session lifecycle
//!
//! A [`Session`] owns the console handle together with the keyboard mode
//! and terminal attributes found on it. It can only be built by taking that
//! snapshot, so the original state is always known before anything is
//! changed, and [`Session::restore`] is the single place that hands the
//! console back.

pub mod read_loop;
pub mod triggers;

pub use read_loop::run;
pub use triggers::{SignalKind, SignalTriggers, TerminationTrigger, TriggerSource};

use crate::console::{Console, KbMode, TerminalAttrs};
use crate::constants::INTER_BYTE_TIMEOUT_DS;
use crate::error::SessionError;
use log::{debug, error, info, warn};
use nix::sys::signal::SigSet;
use nix::sys::termios::SetArg;

/// Per-run settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Seconds without input before the session ends
    pub timeout_secs: u32,
    /// Keycode whose release ends the session (0 = disabled)
    pub quit_keycode: u16,
}

/// State captured before the session touched the console
#[derive(Debug, Clone)]
struct Snapshot<A> {
    mode: KbMode,
    attrs: A,
}

/// One attached diagnostic run
pub struct Session<C: Console> {
    /// Console handle; `None` once restored
    console: Option<C>,
    /// Written once in `snapshot`, read-only afterwards
    original: Snapshot<C::Attrs>,
    /// Mode applied by `arm`
    active_mode: Option<KbMode>,
    settings: SessionSettings,
}

impl<C: Console> Session<C> {
    /// Capture the current keyboard mode and terminal attributes
    ///
    /// Nothing on the console is modified here, so a failure leaves
    /// nothing to restore.
    pub fn snapshot(console: C, settings: SessionSettings) -> Result<Self, SessionError> {
        let mode = console.keyboard_mode().map_err(SessionError::ModeQuery)?;
        let attrs = console.terminal_attrs().map_err(SessionError::AttrQuery)?;
        debug!("Snapshot: keyboard mode {}", mode);

        Ok(Self {
            console: Some(console),
            original: Snapshot { mode, attrs },
            active_mode: None,
            settings,
        })
    }

    pub fn original_mode(&self) -> KbMode {
        self.original.mode
    }

    pub fn original_attrs(&self) -> &C::Attrs {
        &self.original.attrs
    }

    #[cfg(test)]
    pub fn active_mode(&self) -> Option<KbMode> {
        self.active_mode
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// True once `restore` has released the console
    #[cfg(test)]
    pub fn is_restored(&self) -> bool {
        self.console.is_none()
    }

    /// Switch the console into the decoding configuration
    ///
    /// Terminal attributes go first: canonical mode, echo and signals off,
    /// `VMIN = read_capacity` and a 0.1s inter-byte timer, so a read returns
    /// on a full buffer or after a short pause. Failing to set them is only
    /// a warning. Failing to set the keyboard mode is fatal.
    pub fn arm(&mut self, mode: KbMode, read_capacity: usize) -> Result<(), SessionError> {
        let Some(console) = self.console.as_ref() else {
            return Ok(());
        };

        let min_read = u8::try_from(read_capacity).unwrap_or(u8::MAX);
        let raw = self.original.attrs.diagnostic(min_read, INTER_BYTE_TIMEOUT_DS);
        if let Err(e) = console.set_terminal_attrs(&raw, SetArg::TCSAFLUSH) {
            warn!("tcsetattr failed: {}", e);
        }

        console
            .set_keyboard_mode(mode)
            .map_err(|source| SessionError::ModeSet {
                mode: mode.name(),
                source,
            })?;
        self.active_mode = Some(mode);
        info!("Keyboard mode {} -> {}", self.original.mode, mode);
        Ok(())
    }

    /// Block until the console has input, with `sigmask` in effect
    ///
    /// Returns at once after `restore`; the following `read` then reports
    /// end of input.
    pub fn wait_input(&self, sigmask: Option<SigSet>) -> nix::Result<()> {
        match self.console.as_ref() {
            Some(console) => console.wait_readable(sigmask),
            None => Ok(()),
        }
    }

    /// Bounded read from the console
    ///
    /// After `restore` there is no device left and this reports end of input.
    pub fn read(&self, buf: &mut [u8]) -> nix::Result<usize> {
        match self.console.as_ref() {
            Some(console) => console.read(buf),
            None => Ok(0),
        }
    }

    /// Put the console back the way `snapshot` found it and release it
    ///
    /// Both the keyboard mode and the terminal attributes are always
    /// attempted. An attribute failure is only logged; a keyboard mode
    /// failure is returned as [`SessionError::ModeRestore`]. Calls after the
    /// first do nothing and return `Ok`.
    pub fn restore(&mut self) -> Result<(), SessionError> {
        let Some(console) = self.console.take() else {
            return Ok(());
        };

        let mode_result = console.set_keyboard_mode(self.original.mode);
        if let Err(e) = console.set_terminal_attrs(&self.original.attrs, SetArg::TCSANOW) {
            warn!("tcsetattr failed while restoring terminal: {}", e);
        }
        drop(console);
        if let Some(active) = self.active_mode.take() {
            debug!("Left keyboard mode {}", active);
        }

        match mode_result {
            Ok(()) => {
                info!("Keyboard mode restored to {}", self.original.mode);
                Ok(())
            }
            Err(source) => Err(SessionError::ModeRestore {
                mode: self.original.mode.name(),
                source,
            }),
        }
    }
}

impl<C: Console> Drop for Session<C> {
    fn drop(&mut self) {
        if self.console.is_some() {
            if let Err(e) = self.restore() {
                error!("{}", e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory console for exercising the session without a VT

    use super::*;
    use nix::errno::Errno;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct FakeAttrs {
        pub canonical: bool,
        pub echo: bool,
        pub signals: bool,
        pub min_read: u8,
        pub inter_byte_ds: u8,
    }

    impl FakeAttrs {
        pub fn interactive() -> Self {
            Self {
                canonical: true,
                echo: true,
                signals: true,
                min_read: 1,
                inter_byte_ds: 0,
            }
        }
    }

    impl TerminalAttrs for FakeAttrs {
        fn diagnostic(&self, min_read: u8, inter_byte_ds: u8) -> Self {
            Self {
                canonical: false,
                echo: false,
                signals: false,
                min_read,
                inter_byte_ds,
            }
        }
    }

    /// Scripted outcome of one `read` call
    #[derive(Debug, Clone)]
    pub enum ReadStep {
        Data(Vec<u8>),
        Interrupted,
        Eof,
        Fail(Errno),
    }

    /// Console state shared between the fake and the test
    #[derive(Debug)]
    pub struct FakeState {
        pub mode: KbMode,
        pub attrs: FakeAttrs,
        pub mode_sets: Vec<KbMode>,
        pub attr_sets: Vec<(FakeAttrs, SetArg)>,
        pub fail_mode_query: bool,
        pub fail_mode_set: bool,
        pub fail_mode_restore_to: Option<KbMode>,
        pub fail_attr_set: bool,
        pub reads: VecDeque<ReadStep>,
        pub closed: bool,
    }

    #[derive(Clone)]
    pub struct FakeConsole {
        pub state: Rc<RefCell<FakeState>>,
    }

    impl FakeConsole {
        pub fn new(mode: KbMode) -> Self {
            Self {
                state: Rc::new(RefCell::new(FakeState {
                    mode,
                    attrs: FakeAttrs::interactive(),
                    mode_sets: Vec::new(),
                    attr_sets: Vec::new(),
                    fail_mode_query: false,
                    fail_mode_set: false,
                    fail_mode_restore_to: None,
                    fail_attr_set: false,
                    reads: VecDeque::new(),
                    closed: false,
                })),
            }
        }

        pub fn with_reads(mode: KbMode, reads: Vec<ReadStep>) -> Self {
            let console = Self::new(mode);
            console.state.borrow_mut().reads = reads.into();
            console
        }
    }

    impl Drop for FakeConsole {
        fn drop(&mut self) {
            // Only the copy owned by the session counts as the device handle
            if Rc::strong_count(&self.state) == 2 {
                self.state.borrow_mut().closed = true;
            }
        }
    }

    impl Console for FakeConsole {
        type Attrs = FakeAttrs;

        fn keyboard_mode(&self) -> nix::Result<KbMode> {
            let state = self.state.borrow();
            if state.fail_mode_query {
                return Err(Errno::ENOTTY);
            }
            Ok(state.mode)
        }

        fn set_keyboard_mode(&self, mode: KbMode) -> nix::Result<()> {
            let mut state = self.state.borrow_mut();
            if state.fail_mode_set && mode != KbMode::Xlate {
                return Err(Errno::EPERM);
            }
            if state.fail_mode_restore_to == Some(mode) {
                return Err(Errno::EIO);
            }
            state.mode_sets.push(mode);
            state.mode = mode;
            Ok(())
        }

        fn terminal_attrs(&self) -> nix::Result<FakeAttrs> {
            Ok(self.state.borrow().attrs.clone())
        }

        fn set_terminal_attrs(&self, attrs: &FakeAttrs, when: SetArg) -> nix::Result<()> {
            let mut state = self.state.borrow_mut();
            if state.fail_attr_set {
                return Err(Errno::EIO);
            }
            state.attr_sets.push((attrs.clone(), when));
            state.attrs = attrs.clone();
            Ok(())
        }

        fn read(&self, buf: &mut [u8]) -> nix::Result<usize> {
            let step = self.state.borrow_mut().reads.pop_front();
            match step {
                Some(ReadStep::Data(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(ReadStep::Interrupted) => Err(Errno::EINTR),
                Some(ReadStep::Fail(errno)) => Err(errno),
                Some(ReadStep::Eof) | None => Ok(0),
            }
        }
    }
}
