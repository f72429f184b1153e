use super::WitnessRecord;
use crate::errors::WitnessError;
use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends witness records to the journey log, one JSON object per line.
///
/// With no path configured every append is a silent no-op.
#[derive(Debug, Clone, Default)]
pub struct WitnessLogger {
    log_path: Option<PathBuf>,
}

impl WitnessLogger {
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self { log_path }
    }

    /// A logger with no sink.
    pub fn disabled() -> Self {
        Self { log_path: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.log_path.is_some()
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Append one record.
    ///
    /// The line is written with a single `write_all` while holding an
    /// exclusive advisory lock, so records from other processes sharing the
    /// file never interleave. Callers in this crate report and discard the
    /// error; it is returned so tests can observe failures.
    pub fn append(&self, record: &WitnessRecord) -> Result<(), WitnessError> {
        let Some(path) = self.log_path.as_ref() else {
            return Ok(());
        };

        let mut line = serde_json::to_string(record).map_err(WitnessError::Serialize)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| WitnessError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        FileExt::lock_exclusive(&file).map_err(|source| WitnessError::LockFailed {
            path: path.clone(),
            source,
        })?;

        let written = file
            .write_all(line.as_bytes())
            .map_err(|source| WitnessError::WriteFailed {
                path: path.clone(),
                source,
            });

        // Dropping the handle releases the lock as well; unlock failures are not actionable.
        let _ = FileExt::unlock(&file);
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use crate::tracker::Transition;
    use crate::witness::WitnessEvent;
    use tempfile::TempDir;

    fn setup_logger() -> (WitnessLogger, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let logger = WitnessLogger::new(Some(dir.path().join("spiral_journey.jsonl")));
        (logger, dir)
    }

    #[test]
    fn test_disabled_logger_never_writes() {
        let dir = TempDir::new().unwrap();
        let logger = WitnessLogger::disabled();
        let record = WitnessRecord::from(Transition::new(
            Phase::Initialization,
            Phase::Execution,
            1,
        ));
        assert!(logger.append(&record).is_ok());
        assert!(!logger.is_enabled());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_append_writes_one_line_per_record() {
        let (logger, _dir) = setup_logger();
        logger
            .append(&Transition::new(Phase::Initialization, Phase::FirstOrderObservation, 1).into())
            .unwrap();
        logger
            .append(&WitnessEvent::new(Phase::Initialization, "btb_read_file", 1, 0).into())
            .unwrap();

        let content = std::fs::read_to_string(logger.log_path().unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            serde_json::from_str::<serde_json::Value>(line).expect("each line must be valid JSON");
        }
        assert!(lines[0].contains("\"to_phase\":\"First-Order Observation\""));
        assert!(lines[1].contains("\"tool\":\"btb_read_file\""));
    }

    #[test]
    fn test_append_preserves_existing_content() {
        let (logger, _dir) = setup_logger();
        let path = logger.log_path().unwrap().to_path_buf();
        std::fs::write(&path, "{\"earlier\":true}\n").unwrap();

        logger
            .append(&Transition::new(Phase::Execution, Phase::MetaReflection, 4).into())
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("{\"earlier\":true}\n"));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_append_to_missing_directory_returns_err() {
        let dir = TempDir::new().unwrap();
        let logger = WitnessLogger::new(Some(dir.path().join("missing/spiral.jsonl")));
        let result = logger.append(
            &Transition::new(Phase::Initialization, Phase::Execution, 1).into(),
        );
        assert!(
            matches!(result, Err(WitnessError::OpenFailed { .. })),
            "append into a missing directory must surface OpenFailed"
        );
    }
}
