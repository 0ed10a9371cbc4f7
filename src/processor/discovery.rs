//! Run directory discovery
//!
//! Locates indicator files, snapshot files and the run log inside a
//! simulation run's output directory.

use crate::config::CbmConfig;
use crate::error::{CbmError, Result};
use crate::models::IndicatorKind;
use crate::parser::SnapshotEncoding;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Files making up one run's output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunFiles {
    /// Indicator files in `IndicatorKind::ALL` order
    pub indicators: Vec<(IndicatorKind, PathBuf)>,
    pub snapshots: Vec<(PathBuf, SnapshotEncoding)>,
    pub report_log: Option<PathBuf>,
}

impl RunFiles {
    pub fn file_count(&self) -> usize {
        self.indicators.len() + self.snapshots.len() + usize::from(self.report_log.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }
}

/// File discovery component for run output directories
#[derive(Debug)]
pub struct RunDiscovery {
    run_path: PathBuf,
    config: CbmConfig,
}

impl RunDiscovery {
    pub fn new(run_path: PathBuf, config: &CbmConfig) -> Self {
        Self {
            run_path,
            config: config.clone(),
        }
    }

    pub fn run_path(&self) -> &Path {
        &self.run_path
    }

    /// Walk the run directory. Files are visited in name order so repeated
    /// discovery of the same tree yields the same result.
    pub fn discover(&self) -> Result<RunFiles> {
        if !self.run_path.is_dir() {
            return Err(CbmError::RunNotFound {
                path: self.run_path.clone(),
            });
        }

        debug!("Searching for run output in: {}", self.run_path.display());

        let log_name = self.config.report_log.log_file_name.to_lowercase();
        let mut files = RunFiles::default();

        for entry in WalkDir::new(&self.run_path).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();

            if let Some(kind) = IndicatorKind::from_path(path) {
                if files.indicators.iter().any(|(k, _)| *k == kind) {
                    warn!(
                        "Ignoring duplicate {} indicator file {}",
                        kind,
                        path.display()
                    );
                } else {
                    files.indicators.push((kind, path.to_path_buf()));
                }
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name == log_name {
                match &files.report_log {
                    Some(existing) => warn!(
                        "Ignoring run log {}, already using {}",
                        path.display(),
                        existing.display()
                    ),
                    None => files.report_log = Some(path.to_path_buf()),
                }
                continue;
            }

            match SnapshotEncoding::detect(path, &self.config.snapshot) {
                Ok(encoding) => files.snapshots.push((path.to_path_buf(), encoding)),
                Err(CbmError::UnknownSnapshotEncoding { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        files.indicators.sort_by_key(|(kind, _)| *kind);
        debug!(
            "Found {} indicator files, {} snapshot files, run log: {}",
            files.indicators.len(),
            files.snapshots.len(),
            files.report_log.is_some()
        );
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discovers_run_files() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("output");
        fs::create_dir_all(&nested).unwrap();
        for name in ["fluxind.out", "AGEIND.OUT", "svl001.dat", "svl002.grp", "notes.txt"] {
            fs::write(nested.join(name), "").unwrap();
        }
        fs::write(dir.path().join("CBMRun.log"), "").unwrap();

        let files = RunDiscovery::new(dir.path().to_path_buf(), &CbmConfig::default())
            .discover()
            .unwrap();

        let kinds: Vec<IndicatorKind> = files.indicators.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![IndicatorKind::Age, IndicatorKind::Flux]);
        assert_eq!(files.snapshots.len(), 2);
        assert_eq!(files.snapshots[0].1, SnapshotEncoding::SingleLine);
        assert_eq!(files.snapshots[1].1, SnapshotEncoding::Grouped);
        assert!(files.report_log.is_some());
        assert_eq!(files.file_count(), 5);
    }

    #[test]
    fn test_missing_run_directory() {
        let result = RunDiscovery::new(PathBuf::from("/nonexistent/run"), &CbmConfig::default())
            .discover();
        assert!(matches!(result, Err(CbmError::RunNotFound { .. })));
    }

    #[test]
    fn test_custom_log_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("engine.log"), "").unwrap();
        fs::write(dir.path().join("CBMRun.log"), "").unwrap();

        let config = CbmConfig::default().with_log_file_name("engine.log");
        let files = RunDiscovery::new(dir.path().to_path_buf(), &config)
            .discover()
            .unwrap();
        assert_eq!(files.report_log, Some(dir.path().join("engine.log")));
    }
}
