//! Indicator file reader (age, pool, flux and disturbance-area files).

use super::{NumberedLines, ParseMode};
use crate::error::{CbmError, Result};
use crate::layout::RecordLayout;
use crate::models::{IndicatorKind, IndicatorRecord};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lazy reader yielding one typed record per indicator line
pub struct IndicatorReader<R: BufRead = BufReader<File>> {
    kind: IndicatorKind,
    layout: RecordLayout,
    path: PathBuf,
    lines: NumberedLines<R>,
    mode: ParseMode,
    skipped: usize,
    finished: bool,
}

impl IndicatorReader {
    /// Open an indicator file for reading
    pub fn open(path: &Path, kind: IndicatorKind, mode: ParseMode) -> Result<Self> {
        let file = File::open(path)?;
        debug!("Opened {} indicator file {}", kind, path.display());
        Ok(Self::from_reader(BufReader::new(file), path, kind, mode))
    }
}

impl<R: BufRead> IndicatorReader<R> {
    /// Read indicator lines from any buffered source; `path` is used only in
    /// error messages
    pub fn from_reader(reader: R, path: &Path, kind: IndicatorKind, mode: ParseMode) -> Self {
        Self {
            kind,
            layout: RecordLayout::indicator(kind),
            path: path.to_path_buf(),
            lines: NumberedLines::new(reader, path),
            mode,
            skipped: 0,
            finished: false,
        }
    }

    pub fn kind(&self) -> IndicatorKind {
        self.kind
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Lines dropped in lenient mode so far
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for IndicatorReader<R> {
    type Item = Result<IndicatorRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let (line_number, line) = match self.lines.next_content()? {
                Ok(entry) => entry,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            let tokens: Vec<&str> = line.split_whitespace().collect();
            match self.layout.parse_fields(&tokens, &self.path, line_number) {
                Ok(fields) => {
                    return Some(Ok(IndicatorRecord {
                        kind: self.kind,
                        fields,
                    }));
                }
                Err(CbmError::MalformedLine {
                    line,
                    expected,
                    found,
                    ..
                }) if self.mode == ParseMode::Lenient => {
                    warn!(
                        "Skipping malformed line {} in {}: expected {} tokens, found {}",
                        line,
                        self.path.display(),
                        expected,
                        found
                    );
                    self.skipped += 1;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
