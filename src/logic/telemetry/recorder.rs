//! CSV Measurement Recorder
//!
//! One file per series, header first, one flushed line per row.
//! File names carry the local wall-clock time the series started.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local};

use crate::logic::error::SamplerResult;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default measurements directory name
pub const MEASUREMENTS_DIR: &str = "measurements";

/// Measurement file extension
const CSV_EXT: &str = ".csv";

/// Series suffix, e.g. `Throughput_Measurements_14-03-59.csv`
const SERIES_FORMAT: &str = "%H-%M-%S";

/// Row timestamp, millisecond resolution
const ROW_TIME_FORMAT: &str = "%H:%M:%S:%3f";

pub fn series_file_name(prefix: &str, started: DateTime<Local>) -> String {
    format!("{}_{}{}", prefix, started.format(SERIES_FORMAT), CSV_EXT)
}

pub fn row_time(now: DateTime<Local>) -> String {
    now.format(ROW_TIME_FORMAT).to_string()
}

// ============================================================================
// RECORDER
// ============================================================================

pub struct CsvRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl CsvRecorder {
    /// Start a new series in `dir`, replacing any same-named file
    pub fn create(dir: &Path, prefix: &str, header: &[&str]) -> SamplerResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(series_file_name(prefix, Local::now()));

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(header.join(",").as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        log::info!("Creating {:?} done", path);
        Ok(Self { writer, path })
    }

    pub fn append(&mut self, fields: &[String]) -> SamplerResult<()> {
        self.writer.write_all(fields.join(",").as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_series_file_name() {
        let started = Local.with_ymd_and_hms(2024, 5, 1, 9, 7, 3).unwrap();
        assert_eq!(
            series_file_name("Throughput_Measurements", started),
            "Throughput_Measurements_09-07-03.csv"
        );
    }

    #[test]
    fn test_row_time_has_millis() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 13, 2, 45).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(row_time(now), "13:02:45:042");
    }

    #[test]
    fn test_header_then_rows() {
        let temp_dir = TempDir::new().unwrap();
        let mut recorder = CsvRecorder::create(temp_dir.path(), "Test", &["a", "b"]).unwrap();
        recorder.append(&["1".to_string(), "x".to_string()]).unwrap();
        recorder.append(&["2".to_string(), "y".to_string()]).unwrap();

        let content = std::fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["a,b", "1,x", "2,y"]);
    }

    #[test]
    fn test_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join(MEASUREMENTS_DIR);
        let recorder = CsvRecorder::create(&nested, "Test", &["h"]).unwrap();
        assert!(recorder.path().starts_with(&nested));
        assert!(recorder.path().exists());
    }
}
