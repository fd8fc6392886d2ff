//! Blocking read loop
//!
//! Re-arms the idle alarm, waits on the console with the trigger signals
//! unblocked, reads, reports what arrived and watches for the quit keycode,
//! until some trigger ends the session.

use super::{Session, TerminationTrigger, TriggerSource};
use crate::console::Console;
use crate::constants::READ_BUFFER_SIZE;
use crate::error::SessionError;
use crate::input::decode;
use crate::report::Reporter;
use log::{debug, trace, warn};
use nix::errno::Errno;
use std::io::Write;

/// Run an armed session until it should end
///
/// The console is not restored here; the caller does that once for
/// whatever trigger or error comes back.
pub fn run<C, T, W>(
    session: &Session<C>,
    triggers: &mut T,
    reporter: &mut Reporter<W>,
) -> Result<TerminationTrigger, SessionError>
where
    C: Console,
    T: TriggerSource,
    W: Write,
{
    let settings = session.settings();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        triggers.arm_idle(settings.timeout_secs);
        if let Some(trigger) = triggers.pending() {
            return Ok(trigger);
        }

        match session.wait_input(triggers.wait_mask()) {
            Ok(()) => {}
            Err(Errno::EINTR) => match triggers.pending() {
                Some(trigger) => return Ok(trigger),
                None => continue,
            },
            Err(e) => return Err(SessionError::Read(e)),
        }

        let n = match session.read(&mut buf) {
            Ok(0) => {
                debug!("Console read returned no data");
                return Ok(TerminationTrigger::EndOfInput);
            }
            Ok(n) => n,
            Err(Errno::EINTR) => match triggers.pending() {
                Some(trigger) => return Ok(trigger),
                None => continue,
            },
            Err(e) => return Err(SessionError::Read(e)),
        };

        let bytes = &buf[..n];
        trace!("Read {} bytes: {:02x?}", n, bytes);

        if let Err(e) = reporter.scancodes(bytes) {
            warn!("Cannot write output: {}", e);
        }
        for event in decode(bytes) {
            if let Err(e) = reporter.key_event(&event) {
                warn!("Cannot write output: {}", e);
            }
            if event.is_quit(settings.quit_keycode) {
                return Ok(TerminationTrigger::QuitKey(event.keycode));
            }
        }
    }
}
