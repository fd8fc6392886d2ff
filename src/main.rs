//! keyprobe - show what the Linux console keyboard sends
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   Session (snapshot → arm → restore)     │
//! ├──────────────────────────────────────────┤
//! │  Console read  →  Decoder  →  Reporter   │
//! │        ↑                                 │
//! │  Triggers (signals, idle alarm, quit key)│
//! └──────────────────────────────────────────┘
//! ```
//!
//! The console is switched to RAW or MEDIUMRAW keyboard mode for the run and
//! put back exactly as it was on every exit path.

mod config;
mod console;
mod constants;
mod error;
mod input;
mod report;
mod session;

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::config::{Command, Config};
use crate::console::{Console, KbMode};
use crate::constants::{EXIT_USAGE, READ_BUFFER_SIZE};
use crate::error::SessionError;
use crate::input::AsciiEcho;
use crate::report::Reporter;
use crate::session::{Session, SignalTriggers, TerminationTrigger, TriggerSource};

/// Print help message
fn print_help() {
    println!(
        r#"keyprobe {} - show keycodes and scancodes from the Linux console

USAGE:
    keyprobe [OPTIONS]

OPTIONS:
    -a, --ascii                 Display the decimal/octal/hex values of the keys
    -s, --scancodes             Display only the raw scan-codes
    -k, --keycodes              Display only the interpreted keycodes (default)
    -t, --timeout=SECONDS       Exit after this long without input (default 10)
    -q, --quit-keycode=KEYCODE  Exit when the key with this keycode is released
    -C, --console=DEVICE        Console device to use instead of probing
    -h, --help                  Print this help message
    -V, --version               Print version information

CONFIG FILE:
    ~/.config/keyprobe/config.toml
"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut config = Config::load();
    let command = match config.apply_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("keyprobe: {}", e);
            eprintln!("Try 'keyprobe --help' for more information.");
            std::process::exit(EXIT_USAGE);
        }
    };

    let code = match command {
        Command::Help => {
            print_help();
            libc::EXIT_SUCCESS
        }
        Command::Version => {
            println!("keyprobe {}", env!("CARGO_PKG_VERSION"));
            libc::EXIT_SUCCESS
        }
        Command::Run => match run(&config) {
            Ok(code) => code,
            Err(e) => {
                report_fatal(&e);
                libc::EXIT_FAILURE
            }
        },
    };

    std::process::exit(code);
}

fn report_fatal(e: &anyhow::Error) {
    error!("{:#}", e);
    eprintln!("keyprobe: {:#}", e);
    if e
        .downcast_ref::<SessionError>()
        .is_some_and(SessionError::leaves_console_unusable)
    {
        eprintln!(
            "keyprobe: FATAL: the console keyboard may be left unusable.\n\
             keyprobe: reset it by hand (e.g. `kbd_mode -a` from another login) or replug the keyboard."
        );
    }
}

/// Run the selected mode, returning the process exit status
fn run(config: &Config) -> Result<i32> {
    let mut reporter = Reporter::new(std::io::stdout(), config.session.mode.presentation());

    let Some(kb_mode) = config.session.mode.kb_mode() else {
        // ASCII mode: stdin only, settings restored when `echo` drops
        let echo = AsciiEcho::new();
        echo.run(&mut reporter).context("Cannot write output")?;
        return Ok(libc::EXIT_SUCCESS);
    };

    let settings = config.session.settings();
    let device = console::find_console(config.console.device.as_deref().map(Path::new))?;
    info!("Using console {}", device.path().display());
    let fd = device.as_raw_fd();

    // Installed before anything is changed so no signal can leave the
    // console in raw mode
    let mut triggers = SignalTriggers::install();

    let mut session = Session::snapshot(device, settings)?;
    triggers.protect_console(fd, session.original_mode(), session.original_attrs());

    let result = drive(&mut session, kb_mode, &mut triggers, &mut reporter);
    triggers.release_console();
    result
}

/// Arm a snapshotted session, run it and hand the console back
///
/// The console is restored on every path out of here, including the
/// failures to arm or to print the prompt.
fn drive<C, T, W>(
    session: &mut Session<C>,
    kb_mode: KbMode,
    triggers: &mut T,
    reporter: &mut Reporter<W>,
) -> Result<i32>
where
    C: Console,
    T: TriggerSource,
    W: Write,
{
    let settings = session.settings();

    let prepared = reporter
        .original_mode(session.original_mode())
        .context("Cannot write output")
        .and_then(|()| session.arm(kb_mode, READ_BUFFER_SIZE).map_err(anyhow::Error::from))
        .and_then(|()| {
            reporter
                .prompt(settings.timeout_secs, settings.quit_keycode)
                .context("Cannot write output")
        });
    if let Err(e) = prepared {
        // Terminal attributes may already be changed
        session.restore()?;
        return Err(e);
    }

    let outcome = session::run(session, triggers, reporter);
    triggers.disarm();

    let code = match &outcome {
        Ok(trigger) => {
            info!("Session ended: {:?}", trigger);
            if let TerminationTrigger::Signal { kind, signal } = trigger {
                warn!("Terminated by {} ({:?})", signal, kind);
            }
            if let Err(e) = reporter.termination(trigger, settings.timeout_secs) {
                warn!("Cannot write output: {}", e);
            }
            trigger.exit_code()
        }
        Err(_) => libc::EXIT_FAILURE,
    };

    session.restore()?;
    outcome?;
    Ok(code)
}
