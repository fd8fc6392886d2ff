//! Kernel keyboard modes (from linux/kd.h)

use std::fmt;

const K_RAW: libc::c_int = 0x00;
const K_XLATE: libc::c_int = 0x01;
const K_MEDIUMRAW: libc::c_int = 0x02;
const K_UNICODE: libc::c_int = 0x03;
const K_OFF: libc::c_int = 0x04;

/// Encoding the console keyboard driver delivers to readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbMode {
    /// Raw scancodes
    Raw,
    /// Translated characters (the normal interactive mode)
    Xlate,
    /// Keycodes, one or three bytes per event
    MediumRaw,
    /// UTF-8 characters
    Unicode,
    /// Keyboard ignored
    Off,
    /// A value this build does not know; kept verbatim so it can be written back
    Unknown(libc::c_int),
}

impl KbMode {
    pub fn from_raw(value: libc::c_int) -> Self {
        match value {
            K_RAW => KbMode::Raw,
            K_XLATE => KbMode::Xlate,
            K_MEDIUMRAW => KbMode::MediumRaw,
            K_UNICODE => KbMode::Unicode,
            K_OFF => KbMode::Off,
            other => KbMode::Unknown(other),
        }
    }

    pub fn as_raw(self) -> libc::c_int {
        match self {
            KbMode::Raw => K_RAW,
            KbMode::Xlate => K_XLATE,
            KbMode::MediumRaw => K_MEDIUMRAW,
            KbMode::Unicode => K_UNICODE,
            KbMode::Off => K_OFF,
            KbMode::Unknown(value) => value,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KbMode::Raw => "RAW",
            KbMode::Xlate => "XLATE",
            KbMode::MediumRaw => "MEDIUMRAW",
            KbMode::Unicode => "UNICODE",
            KbMode::Off => "OFF",
            KbMode::Unknown(_) => "?UNKNOWN?",
        }
    }
}

impl fmt::Display for KbMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_modes() {
        assert_eq!(KbMode::from_raw(0), KbMode::Raw);
        assert_eq!(KbMode::from_raw(1), KbMode::Xlate);
        assert_eq!(KbMode::from_raw(2), KbMode::MediumRaw);
        assert_eq!(KbMode::from_raw(3), KbMode::Unicode);
        assert_eq!(KbMode::MediumRaw.as_raw(), 2);
        assert_eq!(KbMode::Unicode.name(), "UNICODE");
    }

    #[test]
    fn test_unknown_mode_is_preserved() {
        let mode = KbMode::from_raw(42);
        assert_eq!(mode, KbMode::Unknown(42));
        assert_eq!(mode.as_raw(), 42);
        assert_eq!(mode.to_string(), "?UNKNOWN?");
    }
}
