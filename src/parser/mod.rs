//! Readers for the fixed-format simulation output files.
//!
//! Both readers are lazy, single-pass iterators over `Result<Record>`. In
//! strict mode (the default) the first malformed line ends iteration with an
//! error naming the file and line. Lenient mode skips lines whose token count
//! does not match the layout and counts them instead.

pub mod indicator;
pub mod snapshot;

pub use indicator::IndicatorReader;
pub use snapshot::{SnapshotEncoding, SnapshotReader};

use crate::error::{CbmError, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Treatment of lines whose token count does not match the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParseMode {
    /// Fail the file load on the first malformed line
    #[default]
    Strict,
    /// Skip malformed lines with a warning
    Lenient,
}

/// Line iterator that tracks 1-based line numbers and skips blank and
/// comment lines. Lines must be valid UTF-8.
pub(crate) struct NumberedLines<R: BufRead> {
    reader: R,
    path: PathBuf,
    line_number: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> NumberedLines<R> {
    pub(crate) fn new(reader: R, path: &Path) -> Self {
        Self {
            reader,
            path: path.to_path_buf(),
            line_number: 0,
            buf: Vec::new(),
        }
    }

    /// Next non-blank line with its line number
    pub(crate) fn next_content(&mut self) -> Option<Result<(usize, String)>> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_number += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim_end_matches(['\n', '\r']),
                Err(e) => {
                    return Some(Err(CbmError::InvalidEncoding {
                        path: self.path.clone(),
                        line: self.line_number,
                        offset: e.valid_up_to(),
                    }));
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some(Ok((self.line_number, line.to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_numbered_lines_skip_blank_and_comments() {
        let text = "# header\n\n1 2 3\n   \n4 5 6\n";
        let mut lines = NumberedLines::new(Cursor::new(text), Path::new("poolind.out"));

        let (first_no, first) = lines.next_content().unwrap().unwrap();
        assert_eq!(first_no, 3);
        assert_eq!(first, "1 2 3");

        let (second_no, _) = lines.next_content().unwrap().unwrap();
        assert_eq!(second_no, 5);

        assert!(lines.next_content().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_located() {
        let bytes = b"1 2 3\r\n4 \xff 6\n7 8 9\n".to_vec();
        let mut lines = NumberedLines::new(Cursor::new(bytes), Path::new("distind.out"));

        let (_, first) = lines.next_content().unwrap().unwrap();
        assert_eq!(first, "1 2 3");
        match lines.next_content().unwrap() {
            Err(CbmError::InvalidEncoding { path, line, offset }) => {
                assert_eq!(path, PathBuf::from("distind.out"));
                assert_eq!(line, 2);
                assert_eq!(offset, 2);
            }
            other => panic!("Expected InvalidEncoding, got {other:?}"),
        }
    }
}
