/// Turns raw string bytes found in an image into text.
///
/// The decoders never interpret string contents themselves; everything that ends up in a
/// [`String`] passes through an implementation of this trait.
pub trait TextDecoder {
    /// Decodes little-endian UTF-16 code units. A trailing odd byte is ignored.
    fn utf16_to_text(&self, bytes: &[u8]) -> String;

    /// Decodes a single-byte ASCII string.
    fn ascii_to_text(&self, bytes: &[u8]) -> String;
}


/// Decodes strings without failing, replacing anything undecodable with U+FFFD.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LossyDecoder;
impl TextDecoder for LossyDecoder {
    fn utf16_to_text(&self, bytes: &[u8]) -> String {
        let units: Vec<u16> = bytes.chunks_exact(2)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    }

    fn ascii_to_text(&self, bytes: &[u8]) -> String {
        bytes.iter()
            .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::{LossyDecoder, TextDecoder};

    #[test]
    fn test_utf16() {
        let decoder = LossyDecoder;
        assert_eq!(decoder.utf16_to_text(b"T\0e\0s\0t\0"), "Test");
        assert_eq!(decoder.utf16_to_text(&[0xE4, 0x00, 0x20, 0x00, 0xAC, 0x20]), "\u{E4} \u{20AC}");
        // lone surrogate
        assert_eq!(decoder.utf16_to_text(&[0x00, 0xD8, b'x', 0x00]), "\u{FFFD}x");
        // trailing odd byte
        assert_eq!(decoder.utf16_to_text(&[b'a', 0x00, b'b']), "a");
    }

    #[test]
    fn test_ascii() {
        let decoder = LossyDecoder;
        assert_eq!(decoder.ascii_to_text(b"COREDLL.dll"), "COREDLL.dll");
        assert_eq!(decoder.ascii_to_text(&[b'A', 0xC4, b'B']), "A\u{FFFD}B");
    }
}
