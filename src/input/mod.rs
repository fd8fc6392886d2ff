//! Keyboard input
//!
//! - Scancode/keycode decoding of the console byte stream
//! - ASCII echo mode on stdin

pub mod ascii;
pub mod scancode;

pub use ascii::AsciiEcho;
pub use scancode::{decode, KeyEvent};
