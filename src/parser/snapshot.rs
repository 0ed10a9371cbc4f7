//! Snapshot file reader.
//!
//! Snapshot records come in two physical encodings that share one canonical
//! layout:
//!
//! ```text
//! single-line (svl*.dat)   one line of 66 tokens per record
//! grouped     (svl*.grp)   six lines per record:
//!   1: TimeStep RecordID SPUID Area LandClassID
//!   2: N c1 .. cN                      (0 <= N <= 10)
//!   3: kf2..kf6 Age AgeClassID LastDistTypeID TimeSinceLastDist TimeSinceLandClassChange
//!   4: growth curve and site fields (12)
//!   5: carbon pools (23)
//!   6: TotalBiomassC TotalDOMC TotalEcosystemC NPP NEP Rh
//! ```
//!
//! Grouped records declaring fewer than ten classifiers are right-padded with
//! `CLASSIFIER_PAD`.

use super::{NumberedLines, ParseMode};
use crate::config::SnapshotConfig;
use crate::constants::{CLASSIFIER_PAD, CLASSIFIER_SLOTS, GROUPED_SNAPSHOT_LINES};
use crate::error::{CbmError, Result};
use crate::layout::{POOL_COLUMNS, RecordLayout, SNAPSHOT_TOTAL_COLUMNS};
use crate::models::SnapshotRecord;
use glob::Pattern;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Token counts of grouped lines 1, 3, 4, 5 and 6
const GROUPED_FIXED_WIDTHS: [usize; 5] = [
    5,
    10,
    12,
    POOL_COLUMNS.len(),
    SNAPSHOT_TOTAL_COLUMNS.len(),
];

/// Physical encoding of a snapshot file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotEncoding {
    SingleLine,
    Grouped,
}

impl SnapshotEncoding {
    /// Detect the encoding from the file name convention
    pub fn detect(path: &Path, config: &SnapshotConfig) -> Result<Self> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if Pattern::new(&config.grouped_pattern.to_lowercase())?.matches(&name) {
            Ok(SnapshotEncoding::Grouped)
        } else if Pattern::new(&config.single_line_pattern.to_lowercase())?.matches(&name) {
            Ok(SnapshotEncoding::SingleLine)
        } else {
            Err(CbmError::UnknownSnapshotEncoding {
                path: path.to_path_buf(),
            })
        }
    }
}

/// Lazy reader yielding canonical snapshot records
pub struct SnapshotReader<R: BufRead = BufReader<File>> {
    encoding: SnapshotEncoding,
    layout: RecordLayout,
    path: PathBuf,
    lines: NumberedLines<R>,
    mode: ParseMode,
    skipped: usize,
    finished: bool,
}

impl SnapshotReader {
    /// Open a snapshot file, detecting its encoding from the file name
    pub fn open(path: &Path, config: &SnapshotConfig, mode: ParseMode) -> Result<Self> {
        let encoding = SnapshotEncoding::detect(path, config)?;
        let file = File::open(path)?;
        debug!("Opened {:?} snapshot file {}", encoding, path.display());
        Ok(Self::from_reader(BufReader::new(file), path, encoding, mode))
    }
}

impl<R: BufRead> SnapshotReader<R> {
    pub fn from_reader(
        reader: R,
        path: &Path,
        encoding: SnapshotEncoding,
        mode: ParseMode,
    ) -> Self {
        Self {
            encoding,
            layout: RecordLayout::snapshot(),
            path: path.to_path_buf(),
            lines: NumberedLines::new(reader, path),
            mode,
            skipped: 0,
            finished: false,
        }
    }

    pub fn encoding(&self) -> SnapshotEncoding {
        self.encoding
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Records dropped in lenient mode so far
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    fn read_single_line(&mut self) -> Option<Result<SnapshotRecord>> {
        let (line_number, line) = match self.lines.next_content()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e)),
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        Some(
            self.layout
                .parse_fields(&tokens, &self.path, line_number)
                .map(|fields| SnapshotRecord { fields }),
        )
    }

    fn read_grouped(&mut self) -> Option<Result<SnapshotRecord>> {
        let mut group: Vec<(usize, String)> = Vec::with_capacity(GROUPED_SNAPSHOT_LINES);
        while group.len() < GROUPED_SNAPSHOT_LINES {
            match self.lines.next_content() {
                Some(Ok(entry)) => group.push(entry),
                Some(Err(e)) => return Some(Err(e)),
                None if group.is_empty() => return None,
                None => {
                    let (start, _) = &group[0];
                    return Some(Err(CbmError::TruncatedRecord {
                        path: self.path.clone(),
                        line: *start,
                        reason: format!(
                            "end of file after {} of {} lines",
                            group.len(),
                            GROUPED_SNAPSHOT_LINES
                        ),
                    }));
                }
            }
        }
        Some(self.parse_group(&group))
    }

    fn parse_group(&self, group: &[(usize, String)]) -> Result<SnapshotRecord> {
        let split: Vec<Vec<&str>> = group
            .iter()
            .map(|(_, line)| line.split_whitespace().collect())
            .collect();

        let (classifier_line, classifier_tokens) = (group[1].0, &split[1]);
        let declared_token = classifier_tokens.first().copied().unwrap_or_default();
        let declared = declared_token
            .parse::<usize>()
            .ok()
            .filter(|count| *count <= CLASSIFIER_SLOTS)
            .ok_or_else(|| CbmError::InvalidValue {
                path: self.path.clone(),
                line: classifier_line,
                column: "ClassifierCount".to_string(),
                value: declared_token.to_string(),
            })?;

        let expected_widths = [
            GROUPED_FIXED_WIDTHS[0],
            declared + 1,
            GROUPED_FIXED_WIDTHS[1],
            GROUPED_FIXED_WIDTHS[2],
            GROUPED_FIXED_WIDTHS[3],
            GROUPED_FIXED_WIDTHS[4],
        ];
        for ((line_number, _), (tokens, expected)) in
            group.iter().zip(split.iter().zip(expected_widths))
        {
            if tokens.len() != expected {
                return Err(CbmError::MalformedLine {
                    path: self.path.clone(),
                    line: *line_number,
                    expected,
                    found: tokens.len(),
                });
            }
        }

        let pad = CLASSIFIER_PAD.to_string();
        let mut canonical: Vec<&str> = Vec::with_capacity(self.layout.width());
        canonical.extend_from_slice(&split[0][..4]);
        canonical.extend_from_slice(&classifier_tokens[1..]);
        canonical.extend(std::iter::repeat_n(pad.as_str(), CLASSIFIER_SLOTS - declared));
        canonical.push(split[0][4]);
        for tokens in &split[2..] {
            canonical.extend_from_slice(tokens);
        }

        let mut fields = self.layout.parse_fields(&canonical, &self.path, group[0].0)?;
        fields.classifiers.pad_from(declared);
        Ok(SnapshotRecord { fields })
    }
}

impl<R: BufRead> Iterator for SnapshotReader<R> {
    type Item = Result<SnapshotRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let result = match self.encoding {
                SnapshotEncoding::SingleLine => self.read_single_line()?,
                SnapshotEncoding::Grouped => self.read_grouped()?,
            };

            match result {
                Ok(record) => return Some(Ok(record)),
                Err(CbmError::MalformedLine {
                    line,
                    expected,
                    found,
                    ..
                }) if self.mode == ParseMode::Lenient => {
                    warn!(
                        "Skipping malformed snapshot record at line {} in {}: \
                         expected {} tokens, found {}",
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn grouped_record(classifiers: &[i32]) -> String {
        let classifier_line = std::iter::once(classifiers.len().to_string())
            .chain(classifiers.iter().map(|value| value.to_string()))
            .collect::<Vec<_>>()
            .join(" ");
        let pools = vec!["1.5"; POOL_COLUMNS.len()].join(" ");
        format!(
            "4 101 17 2.5 0\n{classifier_line}\n0 0 0 0 1 45 5 1 12 30\n\
             10 11 1.0 0 3 0 9 2 4.5 120.0 0.0 1.0\n{pools}\n50.0 80.0 130.0 4.2 1.1 3.1\n"
        )
    }

    fn single_line_record() -> String {
        let classifiers = "2 3 4 5 6 7 8 9 10 11";
        let pools = vec!["2.0"; POOL_COLUMNS.len()].join(" ");
        format!(
            "4 101 17 2.5 {classifiers} 0 0 0 0 0 1 45 5 1 12 30 \
             10 11 1.0 0 3 0 9 2 4.5 120.0 0.0 1.0 {pools} 50.0 80.0 130.0 4.2 1.1 3.1\n"
        )
    }

    fn reader(
        text: &str,
        encoding: SnapshotEncoding,
        mode: ParseMode,
    ) -> SnapshotReader<Cursor<String>> {
        SnapshotReader::from_reader(
            Cursor::new(text.to_string()),
            Path::new("svl001"),
            encoding,
            mode,
        )
    }

    #[test]
    fn test_grouped_record_pads_missing_classifiers() {
        let text = grouped_record(&[3, 4, 5, 6, 7, 8, 9]);
        let records: Vec<_> = reader(&text, SnapshotEncoding::Grouped, ParseMode::Strict)
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(records.len(), 1);
        let classifiers = records[0].fields.classifiers.0;
        assert_eq!(classifiers[..7], [3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(classifiers[7..], [CLASSIFIER_PAD; 3]);
    }

    #[test]
    fn test_grouped_and_single_line_share_layout() {
        let grouped = grouped_record(&[2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        let from_grouped = reader(&grouped, SnapshotEncoding::Grouped, ParseMode::Strict)
            .next()
            .unwrap()
            .unwrap();
        let single = single_line_record();
        let from_single = reader(&single, SnapshotEncoding::SingleLine, ParseMode::Strict)
            .next()
            .unwrap()
            .unwrap();

        assert_eq!(from_grouped.fields.classifiers, from_single.fields.classifiers);
        assert_eq!(from_grouped.fields.codes, from_single.fields.codes);
        assert_eq!(from_grouped.fields.timestep, 4);
        assert_eq!(from_grouped.fields.spatial_unit, 17);
        assert_eq!(
            from_grouped.fields.codes.len() + from_grouped.fields.measures.len(),
            from_single.fields.codes.len() + from_single.fields.measures.len()
        );
    }

    #[test]
    fn test_grouped_truncated_record_is_an_error() {
        let text = grouped_record(&[1, 2]);
        let truncated: String = text.lines().take(4).map(|line| format!("{line}\n")).collect();

        match reader(&truncated, SnapshotEncoding::Grouped, ParseMode::Lenient).next() {
            Some(Err(CbmError::TruncatedRecord { line, .. })) => assert_eq!(line, 1),
            other => panic!("Expected TruncatedRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_grouped_rejects_more_than_ten_classifiers() {
        let text = grouped_record(&[1; 11]);
        match reader(&text, SnapshotEncoding::Grouped, ParseMode::Strict).next() {
            Some(Err(CbmError::InvalidValue { column, line, .. })) => {
                assert_eq!(column, "ClassifierCount");
                assert_eq!(line, 2);
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_grouped_lenient_skips_bad_record() {
        let good = grouped_record(&[1, 2, 3]);
        let bad = good.replacen("0 0 0 0 1 45 5 1 12 30", "0 0 0 0 1 45", 1);
        let text = format!("{bad}{good}");

        let mut iter = reader(&text, SnapshotEncoding::Grouped, ParseMode::Lenient);
        let records: Vec<_> = iter.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(iter.skipped_lines(), 1);
    }

    #[test]
    fn test_encoding_detection() {
        let config = SnapshotConfig::default();
        assert_eq!(
            SnapshotEncoding::detect(Path::new("/run/svl003.dat"), &config).unwrap(),
            SnapshotEncoding::SingleLine
        );
        assert_eq!(
            SnapshotEncoding::detect(Path::new("/run/SVL003.grp"), &config).unwrap(),
            SnapshotEncoding::Grouped
        );
        assert!(matches!(
            SnapshotEncoding::detect(Path::new("/run/poolind.out"), &config),
            Err(CbmError::UnknownSnapshotEncoding { .. })
        ));
    }
}
