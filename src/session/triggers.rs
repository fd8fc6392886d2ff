//! Termination triggers
//!
//! Signal handlers and the idle alarm only record what happened in an
//! atomic, and the read loop picks the trigger up and restores the console
//! on the main thread.
//!
//! Interrupt and user signals and SIGALRM stay blocked except while the
//! loop waits for input in `ppoll`, which unblocks them atomically. A signal
//! arriving between the pending check and the wait is therefore delivered
//! inside the wait and ends it with `EINTR`.
//!
//! Fault signals are never blocked. Their handler cannot wait for the loop:
//! a real fault re-executes the faulting instruction as soon as the handler
//! returns. So it writes the saved keyboard mode and termios straight back
//! with `ioctl` and `tcsetattr`, both async-signal-safe, and then lets the
//! default action run (`SA_RESETHAND`). It runs on the alternate signal
//! stack the Rust runtime sets up for the main thread (`SA_ONSTACK`), so a
//! stack overflow still reaches it.

use crate::console::device::KDSKBMODE;
use crate::console::KbMode;
use log::{debug, warn};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::termios::Termios;
use nix::unistd::alarm;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, Ordering};

/// First termination signal received (0 = none)
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Set by SIGALRM, cleared whenever the alarm is re-armed
static IDLE_EXPIRED: AtomicBool = AtomicBool::new(false);

/// Console state written back by the fault handler (null = nothing to do)
static FAULT_RECOVERY: AtomicPtr<FaultRecovery> = AtomicPtr::new(ptr::null_mut());

struct FaultRecovery {
    fd: RawFd,
    kb_mode: libc::c_int,
    termios: libc::termios,
}

/// Requests to stop: terminal hangup, interrupt keys, job control, broken
/// pipe, child/continue notifications
const INTERRUPT_SIGNALS: &[Signal] = &[
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGPIPE,
    Signal::SIGTERM,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Program faults (SIGIOT is SIGABRT on Linux)
const FAULT_SIGNALS: &[Signal] = &[
    Signal::SIGILL,
    Signal::SIGTRAP,
    Signal::SIGABRT,
    Signal::SIGFPE,
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGSTKFLT,
];

const USER_SIGNALS: &[Signal] = &[Signal::SIGUSR1, Signal::SIGUSR2];

/// Class of a terminating signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Fault,
    UserRequested,
}

impl SignalKind {
    /// Classify a signal, `None` for signals that do not end a session
    pub fn of(signal: Signal) -> Option<Self> {
        if INTERRUPT_SIGNALS.contains(&signal) {
            Some(SignalKind::Interrupt)
        } else if FAULT_SIGNALS.contains(&signal) {
            Some(SignalKind::Fault)
        } else if USER_SIGNALS.contains(&signal) {
            Some(SignalKind::UserRequested)
        } else {
            None
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationTrigger {
    /// A terminating signal arrived
    Signal { kind: SignalKind, signal: Signal },
    /// No input for the configured timeout
    Idle,
    /// The quit keycode was released
    QuitKey(u16),
    /// The console read returned no data
    EndOfInput,
}

impl TerminationTrigger {
    /// Process exit status for this trigger
    pub fn exit_code(&self) -> i32 {
        match self {
            TerminationTrigger::Signal { .. } => libc::EXIT_FAILURE,
            TerminationTrigger::Idle
            | TerminationTrigger::QuitKey(_)
            | TerminationTrigger::EndOfInput => libc::EXIT_SUCCESS,
        }
    }
}

/// Source of asynchronous termination triggers for the read loop
pub trait TriggerSource {
    /// Schedule the one-shot idle alarm, replacing any earlier one
    fn arm_idle(&mut self, secs: u32);

    /// Cancel the idle alarm
    fn disarm(&mut self);

    /// Trigger that has fired since the alarm was last armed, if any
    fn pending(&mut self) -> Option<TerminationTrigger>;

    /// Signal mask to install while waiting for input, if triggers are
    /// held back outside the wait
    fn wait_mask(&self) -> Option<SigSet> {
        None
    }
}

/// Process-wide signal handlers and SIGALRM idle timer
pub struct SignalTriggers {
    /// Thread mask from before `install`; in effect only during the wait
    wait_mask: Option<SigSet>,
}

impl SignalTriggers {
    /// Install handlers for every catchable terminating signal and SIGALRM,
    /// then block the asynchronous ones on the calling thread
    ///
    /// SIGKILL and SIGSTOP cannot be caught and are left alone.
    pub fn install() -> Self {
        PENDING_SIGNAL.store(0, Ordering::SeqCst);
        IDLE_EXPIRED.store(false, Ordering::SeqCst);

        let mut installed = 0;
        let groups: [(&[Signal], extern "C" fn(libc::c_int), SaFlags); 3] = [
            (INTERRUPT_SIGNALS, termination_signal_handler, SaFlags::empty()),
            (
                FAULT_SIGNALS,
                fault_signal_handler,
                SaFlags::SA_RESETHAND | SaFlags::SA_ONSTACK,
            ),
            (USER_SIGNALS, termination_signal_handler, SaFlags::empty()),
        ];
        for (signals, handler, flags) in groups {
            for &signal in signals {
                if install_handler(signal, handler, flags) {
                    installed += 1;
                }
            }
        }
        install_handler(Signal::SIGALRM, idle_alarm_handler, SaFlags::empty());
        debug!("Installed {} termination signal handlers", installed);

        let mut held = SigSet::empty();
        for &signal in INTERRUPT_SIGNALS.iter().chain(USER_SIGNALS) {
            held.add(signal);
        }
        held.add(Signal::SIGALRM);
        let wait_mask = match held.thread_swap_mask(SigmaskHow::SIG_BLOCK) {
            Ok(previous) => Some(previous),
            Err(e) => {
                warn!("Cannot block termination signals: {}", e);
                None
            }
        };

        Self { wait_mask }
    }

    /// Let the fault handler put `fd` back into `kb_mode` and `termios`
    pub fn protect_console(&mut self, fd: RawFd, kb_mode: KbMode, termios: &Termios) {
        let recovery = Box::new(FaultRecovery {
            fd,
            kb_mode: kb_mode.as_raw(),
            termios: libc::termios::from(termios.clone()),
        });
        replace_fault_recovery(Box::into_raw(recovery));
    }

    /// Forget the console registered with `protect_console`
    pub fn release_console(&mut self) {
        replace_fault_recovery(ptr::null_mut());
    }
}

impl Drop for SignalTriggers {
    fn drop(&mut self) {
        self.release_console();
        if let Some(mask) = &self.wait_mask {
            if let Err(e) = mask.thread_set_mask() {
                warn!("Cannot restore signal mask: {}", e);
            }
        }
    }
}

fn replace_fault_recovery(new: *mut FaultRecovery) {
    let old = FAULT_RECOVERY.swap(new, Ordering::SeqCst);
    if !old.is_null() {
        // The handler runs on this thread, so once the pointer is swapped
        // out nothing else can be reading it
        drop(unsafe { Box::from_raw(old) });
    }
}

fn install_handler(signal: Signal, handler: extern "C" fn(libc::c_int), flags: SaFlags) -> bool {
    let action = SigAction::new(SigHandler::Handler(handler), flags, SigSet::empty());
    match unsafe { sigaction(signal, &action) } {
        Ok(_) => true,
        Err(e) => {
            warn!("Cannot install handler for {}: {}", signal, e);
            false
        }
    }
}

extern "C" fn termination_signal_handler(signo: libc::c_int) {
    let _ = PENDING_SIGNAL.compare_exchange(0, signo, Ordering::SeqCst, Ordering::SeqCst);
}

extern "C" fn fault_signal_handler(signo: libc::c_int) {
    let recovery = FAULT_RECOVERY.load(Ordering::SeqCst);
    if !recovery.is_null() {
        let recovery = unsafe { &*recovery };
        unsafe {
            libc::ioctl(recovery.fd, KDSKBMODE as _, recovery.kb_mode as libc::c_ulong);
            libc::tcsetattr(recovery.fd, libc::TCSANOW, &recovery.termios);
        }
    }
    termination_signal_handler(signo);
}

extern "C" fn idle_alarm_handler(_signo: libc::c_int) {
    IDLE_EXPIRED.store(true, Ordering::SeqCst);
}

impl TriggerSource for SignalTriggers {
    fn arm_idle(&mut self, secs: u32) {
        alarm::set(secs);
        IDLE_EXPIRED.store(false, Ordering::SeqCst);
    }

    fn disarm(&mut self) {
        alarm::cancel();
        IDLE_EXPIRED.store(false, Ordering::SeqCst);
    }

    fn pending(&mut self) -> Option<TerminationTrigger> {
        let signo = PENDING_SIGNAL.load(Ordering::SeqCst);
        if signo != 0 {
            if let Ok(signal) = Signal::try_from(signo) {
                let kind = SignalKind::of(signal).unwrap_or(SignalKind::Interrupt);
                return Some(TerminationTrigger::Signal { kind, signal });
            }
        }
        if IDLE_EXPIRED.load(Ordering::SeqCst) {
            return Some(TerminationTrigger::Idle);
        }
        None
    }

    fn wait_mask(&self) -> Option<SigSet> {
        self.wait_mask
    }
}

/// Serializes tests that install real handlers or raise signals
#[cfg(test)]
pub(crate) static SIGNAL_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) mod scripted {
    //! Deterministic trigger source for read loop tests

    use super::*;

    pub struct ScriptedTriggers {
        /// Timeouts passed to each `arm_idle` call
        pub armed: Vec<u32>,
        pub disarmed: bool,
        /// Number of `pending` calls so far
        pub checks: usize,
        /// `pending` call (1-based) from which `trigger` is reported
        pub fire_at_check: usize,
        pub trigger: Option<TerminationTrigger>,
    }

    impl ScriptedTriggers {
        pub fn quiet() -> Self {
            Self {
                armed: Vec::new(),
                disarmed: false,
                checks: 0,
                fire_at_check: usize::MAX,
                trigger: None,
            }
        }

        pub fn firing(trigger: TerminationTrigger, at_check: usize) -> Self {
            Self {
                fire_at_check: at_check,
                trigger: Some(trigger),
                ..Self::quiet()
            }
        }
    }

    impl TriggerSource for ScriptedTriggers {
        fn arm_idle(&mut self, secs: u32) {
            self.armed.push(secs);
        }

        fn disarm(&mut self) {
            self.disarmed = true;
        }

        fn pending(&mut self) -> Option<TerminationTrigger> {
            self.checks += 1;
            if self.checks >= self.fire_at_check {
                self.trigger
            } else {
                None
            }
        }
    }
}
