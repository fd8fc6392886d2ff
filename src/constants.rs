//! Global constants for keyprobe
//!
//! Timing, buffer sizes and option limits shared between modules.

// ============================================================================
// Console Reads
// ============================================================================

/// Bytes per console read; divisible by 3 so extended keycodes fit whole
pub const READ_BUFFER_SIZE: usize = 18;

/// Inter-byte read timeout in deciseconds (termios VTIME)
pub const INTER_BYTE_TIMEOUT_DS: u8 = 1;

// ============================================================================
// Session Defaults
// ============================================================================

/// Seconds without input before the session ends
pub const DEFAULT_TIMEOUT_SECS: u32 = 10;

/// Highest keycode accepted as quit keycode
pub const MAX_QUIT_KEYCODE: u16 = 255;

/// Highest quit keycode that still makes sense as a raw scancode
pub const MAX_SCANCODE_QUIT_KEYCODE: u16 = 83;

// ============================================================================
// ASCII Mode
// ============================================================================

/// Ctrl-D ends ASCII mode
pub const ASCII_EOT: u8 = 0x04;

// ============================================================================
// Exit Statuses
// ============================================================================

/// Command line usage error (sysexits.h EX_USAGE)
pub const EXIT_USAGE: i32 = 64;
