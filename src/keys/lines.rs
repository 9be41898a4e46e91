use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::ui::prelude::*;

/// Read a key file into its lines.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let contents =
        fs::read(path).with_context(|| format!("reading key list from {}", path.display()))?;
    Ok(decode_lines(&contents, path))
}

/// Split raw file contents into lines the way `str::lines` does.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD and the line is kept,
/// so one bad line never costs the rest of the file.
pub fn decode_lines(contents: &[u8], source: &Path) -> Vec<String> {
    if contents.is_empty() {
        return Vec::new();
    }
    let contents = contents.strip_suffix(b"\n").unwrap_or(contents);

    contents
        .split(|byte| *byte == b'\n')
        .enumerate()
        .map(|(index, raw)| {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            match String::from_utf8_lossy(raw) {
                Cow::Borrowed(line) => line.to_string(),
                Cow::Owned(line) => {
                    emit(
                        Level::Warn,
                        "keys.read.invalid_utf8",
                        &format!(
                            "{}:{}: line is not valid UTF-8, undecodable bytes replaced",
                            source.display(),
                            index + 1
                        ),
                        None,
                    );
                    line
                }
            }
        })
        .collect()
}

/// Drop repeated lines. The result is a set: callers must not rely on its order.
pub fn dedup_unordered(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect()
}
