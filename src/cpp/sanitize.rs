#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turns uploaded bytes of unknown encoding into source text the compiler
//! will accept.

use crate::error::GradingError;

/// Byte-order mark as a char.
const BOM: char = '\u{feff}';

/// Encodings attempted, in order, before the lossy fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    /// UTF-8, with or without a BOM.
    Utf8,
    /// UTF-16 announced by a BOM (either byte order).
    Utf16,
    /// ISO-8859-1; maps every byte to a char, so it only fails on blank input.
    Latin1,
}

impl SourceEncoding {
    /// Order in which decoding is attempted.
    pub const ORDER: [SourceEncoding; 3] = [Self::Utf8, Self::Utf16, Self::Latin1];

    /// Attempts to decode `bytes`, returning `None` when the bytes are not
    /// valid in this encoding.
    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Self::Utf16 => decode_utf16_with_bom(bytes),
            Self::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// Decodes UTF-16 when the input starts with a BOM.
fn decode_utf16_with_bom(bytes: &[u8]) -> Option<String> {
    let (body, little_endian) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, true),
        [0xFE, 0xFF, rest @ ..] => (rest, false),
        _ => return None,
    };
    if body.len() % 2 != 0 {
        return None;
    }

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).ok()
}

/// Decodes raw file content, trying each of [`SourceEncoding::ORDER`] and then
/// a lossy pass that turns undecodable and non-printable bytes into spaces.
///
/// * `what`: name of the file for error messages, eg. `"submission"`.
pub fn decode(bytes: &[u8], what: &str) -> Result<String, GradingError> {
    for encoding in SourceEncoding::ORDER {
        match encoding.decode(bytes) {
            Some(text) if !text.trim_matches(|c: char| c.is_whitespace() || c == BOM).is_empty() => {
                tracing::debug!(?encoding, file = what, "decoded source");
                return Ok(text);
            }
            Some(_) => {
                tracing::debug!(?encoding, file = what, "decoded source is blank");
            }
            None => {
                tracing::debug!(?encoding, file = what, "decoding failed, trying next");
            }
        }
    }

    let lossy: String = String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| {
            if c == '\n' || c == '\t' || (' '..='~').contains(&c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    if lossy.trim().is_empty() {
        return Err(GradingError::unreadable(
            what,
            "file is empty or contains no readable text",
        ));
    }

    tracing::warn!(file = what, "source read as binary and cleaned");
    Ok(lossy)
}

/// Normalizes decoded text into compiler-safe source.
///
/// Strips a leading BOM, converts CRLF/CR to LF, replaces control characters
/// other than newline and tab with spaces, replaces characters outside the
/// Latin-1 range with spaces, and guarantees a trailing newline.
pub fn sanitize(text: &str) -> String {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut cleaned: String = text
        .chars()
        .map(|c| match c {
            '\n' | '\t' => c,
            c if (c as u32) < 0x20 || c as u32 == 0x7F => ' ',
            c if (c as u32) > 0xFF => ' ',
            c => c,
        })
        .collect();

    if !cleaned.ends_with('\n') {
        cleaned.push('\n');
    }
    cleaned
}

/// Decodes and sanitizes in one step.
pub fn read_source(bytes: &[u8], what: &str) -> Result<String, GradingError> {
    decode(bytes, what).map(|text| sanitize(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_is_idempotent_for_printable_ascii() {
        let samples = [
            "",
            "int main() { return 0; }",
            "#include <iostream>\nint main() {\n\treturn 0;\n}\n",
            "  trailing spaces   ",
            "~!@#$%^&*()_+{}|:\"<>?",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn sanitize_normalizes_line_endings_and_controls() {
        let out = sanitize("\u{feff}a\r\nb\rc\u{0007}d\u{2603}");
        assert_eq!(out, "a\nb\nc d \n");
    }

    #[test]
    fn sanitize_keeps_latin1_extended_characters() {
        assert_eq!(sanitize("caf\u{e9}"), "caf\u{e9}\n");
    }

    #[test]
    fn decode_prefers_utf8() {
        let text = decode("int x; // naïve".as_bytes(), "submission").expect("decode");
        assert_eq!(text, "int x; // naïve");
    }

    #[test]
    fn decode_handles_utf16_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "int main(){}".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode(&bytes, "submission").expect("decode"), "int main(){}");
    }

    #[test]
    fn decode_falls_back_to_latin1() {
        let bytes = b"int x; // caf\xe9";
        assert_eq!(decode(bytes, "submission").expect("decode"), "int x; // caf\u{e9}");
    }

    #[test]
    fn decode_rejects_blank_files() {
        let err = decode(b"  \n\t ", "submission").unwrap_err();
        assert!(matches!(err, GradingError::UnreadableFile { .. }));
        assert!(decode(b"", "reference solution").is_err());
    }
}
