//! Keyboard byte stream decoder
//!
//! In MEDIUMRAW mode the kernel sends one byte per key event: the low seven
//! bits are the keycode and the high bit is set on release. Keycodes that do
//! not fit in seven bits are sent as three bytes: a sentinel whose low seven
//! bits are zero (high bit = release), then the keycode split into two
//! seven-bit halves, each with the high bit set.
//!
//! The decoder works on one read buffer at a time. A sentinel too close to
//! the end of the buffer to be followed by two payload bytes is decoded as a
//! plain one-byte keycode 0.

/// One decoded key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Keycode, up to 14 bits for the extended form
    pub keycode: u16,
    /// Key went up
    pub released: bool,
    /// Input bytes this event consumed (1 or 3)
    pub bytes_consumed: u8,
}

impl KeyEvent {
    /// Does this event end the session for `quit_keycode` (0 = disabled)?
    pub fn is_quit(&self, quit_keycode: u16) -> bool {
        quit_keycode != 0 && self.released && self.keycode == quit_keycode
    }
}

const RELEASE_BIT: u8 = 0x80;
const KEYCODE_MASK: u8 = 0x7f;

/// Iterator over the key events in a buffer
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

/// Decode `buf` left to right
pub fn decode(buf: &[u8]) -> Decoder<'_> {
    Decoder { buf, pos: 0 }
}

impl<'a> Iterator for Decoder<'a> {
    type Item = KeyEvent;

    fn next(&mut self) -> Option<KeyEvent> {
        let rest = self.buf.get(self.pos..)?;
        let (&first, tail) = rest.split_first()?;
        let released = first & RELEASE_BIT != 0;

        let event = match tail {
            [high, low, ..]
                if first & KEYCODE_MASK == 0
                    && high & RELEASE_BIT != 0
                    && low & RELEASE_BIT != 0 =>
            {
                KeyEvent {
                    keycode: (u16::from(high & KEYCODE_MASK) << 7) | u16::from(low & KEYCODE_MASK),
                    released,
                    bytes_consumed: 3,
                }
            }
            _ => KeyEvent {
                keycode: u16::from(first & KEYCODE_MASK),
                released,
                bytes_consumed: 1,
            },
        };

        self.pos += usize::from(event.bytes_consumed);
        Some(event)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.buf.len().saturating_sub(self.pos);
        ((left + 2) / 3, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(buf: &[u8]) -> Vec<KeyEvent> {
        decode(buf).collect()
    }

    fn legacy(keycode: u16, released: bool) -> KeyEvent {
        KeyEvent {
            keycode,
            released,
            bytes_consumed: 1,
        }
    }

    #[test]
    fn test_empty_buffer() {
        assert!(events(&[]).is_empty());
    }

    #[test]
    fn test_single_press_and_release() {
        assert_eq!(events(&[0x41]), vec![legacy(65, false)]);
        assert_eq!(events(&[0xC1]), vec![legacy(65, true)]);
    }

    #[test]
    fn test_legacy_bytes_are_one_event_each() {
        // 'a' press/release, Enter press/release, Esc press
        let buf = [0x1e, 0x9e, 0x1c, 0x9c, 0x01];
        let decoded = events(&buf);
        assert_eq!(decoded.len(), buf.len());
        assert!(decoded.iter().all(|e| e.bytes_consumed == 1));
        assert_eq!(decoded[1], legacy(30, true));
        assert_eq!(decoded[4], legacy(1, false));
    }

    #[test]
    fn test_extended_press() {
        // (5 << 7) | 1
        assert_eq!(
            events(&[0x00, 0x85, 0x81]),
            vec![KeyEvent {
                keycode: 641,
                released: false,
                bytes_consumed: 3,
            }]
        );
    }

    #[test]
    fn test_extended_release_uses_sentinel_bit() {
        let decoded = events(&[0x80, 0x81, 0xb8]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].keycode, 184);
        assert!(decoded[0].released);
    }

    #[test]
    fn test_truncated_sentinel_is_legacy() {
        assert_eq!(events(&[0x00, 0x01]), vec![legacy(0, false), legacy(1, false)]);
        assert_eq!(events(&[0x80, 0x85]), vec![legacy(0, true), legacy(5, true)]);
    }

    #[test]
    fn test_sentinel_without_high_bits_is_legacy() {
        // Payload bytes must both carry the high bit
        assert_eq!(
            events(&[0x00, 0x05, 0x81]),
            vec![legacy(0, false), legacy(5, false), legacy(1, true)]
        );
    }

    #[test]
    fn test_mixed_stream_keeps_order() {
        let buf = [0x1d, 0x00, 0x81, 0xb8, 0x9d, 0x80, 0x81, 0xb8];
        let decoded: Vec<(u16, bool)> = decode(&buf).map(|e| (e.keycode, e.released)).collect();
        assert_eq!(decoded, vec![(29, false), (184, false), (29, true), (184, true)]);
        let consumed: usize = decode(&buf).map(|e| usize::from(e.bytes_consumed)).sum();
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_quit_matches_release_only() {
        let press = legacy(16, false);
        let release = legacy(16, true);
        assert!(!press.is_quit(16));
        assert!(release.is_quit(16));
        assert!(!release.is_quit(17));
        // 0 disables quitting, even for keycode 0
        assert!(!legacy(0, true).is_quit(0));
    }
}
