#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{ffi::OsString, path::PathBuf};

use anyhow::{Context, Result};
use which::which;

/// Finds and returns the path to the configured C++ compiler driver.
pub fn cxx_path(compiler: &str) -> Result<OsString> {
    which(compiler)
        .map(PathBuf::into_os_string)
        .with_context(|| format!("Cannot find a C++ compiler on path ({compiler})"))
}

/// Truncates `text` to at most `limit` characters, never splitting a char.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Rounds half away from zero for non-negative values (`2.5 -> 3`).
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.49), 2);
        assert_eq!(round_half_up(0.0), 0);
    }
}
