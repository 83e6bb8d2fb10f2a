// SPDX-License-Identifier: Apache-2.0

//! Cursor-based incremental reading of append-only files.
//!
//! `read_new_lines` is stateless: the caller owns the cursor and persists the
//! one returned here once everything read has been committed.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Default cap on the number of bytes read in one call (10 MiB)
pub const DEFAULT_MAX_READ_BYTES: u64 = 10 * 1024 * 1024;

/// Result of a single tail read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailRead {
    /// Complete, non-empty lines appended since the cursor
    pub lines: Vec<String>,
    /// Position just past the last complete line; the next read starts here
    pub cursor: u64,
    /// File size observed at read time
    pub file_size: u64,
    /// Leading bytes were skipped because the unread span exceeded the cap
    pub truncated: bool,
    /// The read did not continue from the supplied cursor (rotation or cap)
    pub reset: bool,
    /// False when the file was missing at read time
    pub exists: bool,
}

impl TailRead {
    /// Result for a file that does not exist
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Read newly appended complete lines from `path`, starting at `cursor`.
///
/// A missing file is not an error: the result is empty with cursor and size 0.
/// Without a cursor, reading begins at `max(0, size - max_bytes)`. A cursor
/// past the end of the file is treated as a rotation and reading restarts at 0.
pub fn read_new_lines(path: &Path, cursor: Option<u64>, max_bytes: u64) -> io::Result<TailRead> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TailRead::empty()),
        Err(e) => return Err(e),
    };

    let file_size = file.metadata()?.len();
    let mut truncated = false;
    let mut reset = false;

    let mut start = match cursor {
        Some(c) if c > file_size => {
            reset = true;
            0
        }
        Some(c) => c,
        None => 0,
    };

    if file_size - start > max_bytes {
        start = file_size - max_bytes;
        truncated = true;
        reset = true;
    }

    if start == file_size {
        return Ok(TailRead {
            lines: Vec::new(),
            cursor: file_size,
            file_size,
            truncated,
            reset,
            exists: true,
        });
    }

    // Starting inside a line means its head was consumed earlier or skipped
    let starts_mid_line = if start > 0 {
        file.seek(SeekFrom::Start(start - 1))?;
        let mut prev = [0u8; 1];
        file.read_exact(&mut prev)?;
        prev[0] != b'\n'
    } else {
        file.seek(SeekFrom::Start(0))?;
        false
    };

    let mut buf = Vec::with_capacity((file_size - start) as usize);
    file.take(file_size - start).read_to_end(&mut buf)?;

    let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
        // Only a line in progress; leave the cursor in front of it
        return Ok(TailRead {
            lines: Vec::new(),
            cursor: start,
            file_size,
            truncated,
            reset,
            exists: true,
        });
    };

    let mut complete = &buf[..=last_newline];
    if starts_mid_line {
        match complete.iter().position(|b| *b == b'\n') {
            Some(pos) => complete = &complete[pos + 1..],
            None => complete = &[],
        }
    }

    let lines = complete
        .split(|b| *b == b'\n')
        .filter_map(|raw| {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                return None;
            }
            Some(String::from_utf8_lossy(raw).into_owned())
        })
        .collect();

    Ok(TailRead {
        lines,
        cursor: start + last_newline as u64 + 1,
        file_size,
        truncated,
        reset,
        exists: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn append(path: &Path, content: &str) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let result = read_new_lines(&dir.path().join("nope.log"), Some(42), 1024).unwrap();
        assert_eq!(result, TailRead::empty());
        assert!(!result.exists);

        fs::write(dir.path().join("empty.log"), "").unwrap();
        let result = read_new_lines(&dir.path().join("empty.log"), None, 1024).unwrap();
        assert!(result.exists);
        assert!(result.lines.is_empty());
    }

    #[test]
    fn test_reads_complete_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "line 1").unwrap();
        writeln!(file, "line 2").unwrap();
        writeln!(file, "line 3").unwrap();
        file.flush().unwrap();

        let result = read_new_lines(file.path(), Some(0), 1024).unwrap();
        assert_eq!(result.lines, vec!["line 1", "line 2", "line 3"]);
        assert_eq!(result.cursor, 21);
        assert_eq!(result.file_size, 21);
        assert!(!result.truncated);
        assert!(!result.reset);
    }

    #[test]
    fn test_incremental_read() {
        let file = NamedTempFile::new().unwrap();
        append(file.path(), "line 1\n");

        let first = read_new_lines(file.path(), None, 1024).unwrap();
        assert_eq!(first.lines, vec!["line 1"]);

        append(file.path(), "line 2\n");

        let second = read_new_lines(file.path(), Some(first.cursor), 1024).unwrap();
        assert_eq!(second.lines, vec!["line 2"]);
        assert_eq!(second.cursor, 14);

        // Nothing new: same cursor, no lines
        let third = read_new_lines(file.path(), Some(second.cursor), 1024).unwrap();
        assert!(third.lines.is_empty());
        assert_eq!(third.cursor, second.cursor);
        assert!(!third.reset);
    }

    #[test]
    fn test_partial_line_is_held_back_until_complete() {
        let file = NamedTempFile::new().unwrap();
        append(file.path(), "{\"a\":1}\n{\"b\":");

        let first = read_new_lines(file.path(), Some(0), 1024).unwrap();
        assert_eq!(first.lines, vec!["{\"a\":1}"]);
        assert_eq!(first.cursor, 8);
        assert_eq!(first.file_size, 13);

        append(file.path(), "2}\n");

        let second = read_new_lines(file.path(), Some(first.cursor), 1024).unwrap();
        assert_eq!(second.lines, vec!["{\"b\":2}"]);
        assert_eq!(second.cursor, second.file_size);

        let third = read_new_lines(file.path(), Some(second.cursor), 1024).unwrap();
        assert!(third.lines.is_empty());
    }

    #[test]
    fn test_only_partial_line_keeps_cursor() {
        let file = NamedTempFile::new().unwrap();
        append(file.path(), "no newline yet");

        let result = read_new_lines(file.path(), Some(0), 1024).unwrap();
        assert!(result.lines.is_empty());
        assert_eq!(result.cursor, 0);
        assert_eq!(result.file_size, 14);
    }

    #[test]
    fn test_cursor_past_end_is_rotation() {
        let file = NamedTempFile::new().unwrap();
        append(file.path(), "fresh\n");

        let result = read_new_lines(file.path(), Some(10_000), 1024).unwrap();
        assert!(result.reset);
        assert!(!result.truncated);
        assert_eq!(result.lines, vec!["fresh"]);
        assert_eq!(result.cursor, 6);
    }

    #[test]
    fn test_cap_skips_forward_and_drops_fragment() {
        let file = NamedTempFile::new().unwrap();
        append(file.path(), "aaaaaaaaaa\nbbbbbbbbbb\ncccccccccc\n");

        // 33 bytes total; cap of 15 starts at byte 18, inside the "b" line
        let result = read_new_lines(file.path(), Some(0), 15).unwrap();
        assert!(result.truncated);
        assert!(result.reset);
        assert_eq!(result.lines, vec!["cccccccccc"]);
        assert_eq!(result.cursor, 33);
    }

    #[test]
    fn test_cap_on_line_boundary_keeps_first_line() {
        let file = NamedTempFile::new().unwrap();
        append(file.path(), "aaaaaaaaaa\nbbbbbbbbbb\n");

        // Start lands exactly after the first newline
        let result = read_new_lines(file.path(), None, 11).unwrap();
        assert!(result.truncated);
        assert_eq!(result.lines, vec!["bbbbbbbbbb"]);
    }

    #[test]
    fn test_bootstrap_cap_on_large_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.log");
        let line = format!("{}\n", "x".repeat(1023));
        fs::write(&path, line.repeat(10 * 1024)).unwrap();

        let size = fs::metadata(&path).unwrap().len();
        assert_eq!(size, 10 * 1024 * 1024);

        let cap = 1024 * 1024;
        let result = read_new_lines(&path, None, cap).unwrap();
        assert!(result.truncated);
        assert!(result.reset);
        assert_eq!(result.file_size, size);
        assert_eq!(result.cursor, size);
        // Start lands on a line boundary, so exactly cap / line length lines come back
        assert_eq!(result.lines.len(), 1024);
    }

    #[test]
    fn test_small_file_without_cursor_reads_everything() {
        let file = NamedTempFile::new().unwrap();
        append(file.path(), "one\ntwo\n");

        let result = read_new_lines(file.path(), None, 1024).unwrap();
        assert_eq!(result.lines, vec!["one", "two"]);
        assert!(!result.truncated);
        assert!(!result.reset);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let file = NamedTempFile::new().unwrap();
        append(file.path(), "one\r\n\r\n\ntwo\n");

        let result = read_new_lines(file.path(), Some(0), 1024).unwrap();
        assert_eq!(result.lines, vec!["one", "two"]);
    }

    #[test]
    fn test_cursor_inside_line_discards_fragment() {
        let file = NamedTempFile::new().unwrap();
        append(file.path(), "first line\nsecond\n");

        let result = read_new_lines(file.path(), Some(3), 1024).unwrap();
        assert_eq!(result.lines, vec!["second"]);
        assert!(!result.reset);
    }
}
