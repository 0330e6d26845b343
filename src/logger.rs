//! `script(1)`/`scriptreplay(1)`-compatible session logging with date-based rotation.
//!
//! Two files per rotation: a typescript file (header + raw output bytes + footer) and a timing
//! file (`"<delay_seconds> <byte_count>\n"` per write), replayable with
//! `scriptreplay --timing=<file>.timing <file>`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::LoggerError;

const SUFFIX_LEN: usize = 6;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

struct OpenFiles {
    typescript: File,
    timing: File,
    date: chrono::NaiveDate,
    last_write: Instant,
}

/// Logs one session's PTY output to disk. Not `Send`-shared directly; owned exclusively by the
/// session actor that drives it, matching its single-writer discipline.
pub struct SessionLogger {
    base_dir: PathBuf,
    session_id: String,
    files: Option<OpenFiles>,
    closed: bool,
}

impl SessionLogger {
    pub fn new(base_dir: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            session_id: session_id.into(),
            files: None,
            closed: false,
        }
    }

    /// Open the initial files for today.
    pub fn start(&mut self) -> Result<(), LoggerError> {
        self.rotate_if_needed()?;
        info!(session_id = %self.session_id, "session logging started");
        Ok(())
    }

    fn rotate_if_needed(&mut self) -> Result<(), LoggerError> {
        let today = Local::now().date_naive();
        if let Some(files) = &self.files {
            if files.date == today {
                return Ok(());
            }
        }

        let suffix = random_suffix();
        let date_dir = self.base_dir.join(today.format("%Y/%m/%d").to_string());
        std::fs::create_dir_all(&date_dir).map_err(|source| LoggerError::CreateDir {
            path: date_dir.clone(),
            source,
        })?;

        let base_name = format!("typescript-{}-{}", self.session_id, suffix);
        let ts_path = date_dir.join(&base_name);
        let tm_path = date_dir.join(format!("{}.timing", base_name));

        let mut typescript = open_truncated(&ts_path)?;
        let timing = open_truncated(&tm_path)?;

        let header = format!("Script started on {}\n", today.format("%Y-%m-%d"));
        typescript
            .write_all(header.as_bytes())
            .map_err(|source| LoggerError::OpenFile {
                path: ts_path.clone(),
                source,
            })?;

        debug!(path = %ts_path.display(), "opened typescript file");

        self.files = Some(OpenFiles {
            typescript,
            timing,
            date: today,
            last_write: Instant::now(),
        });
        Ok(())
    }

    /// Append a data chunk and its timing record. Failures are logged at WARN and swallowed —
    /// logging must never propagate into the fan-out path.
    pub fn write(&mut self, data: &[u8]) {
        if self.closed {
            return;
        }
        if let Err(e) = self.rotate_if_needed() {
            warn!(session_id = %self.session_id, error = %e, "log rotation failed, dropping this write");
            return;
        }

        let files = self.files.as_mut().expect("just rotated");
        let delay = files.last_write.elapsed().as_secs_f64();
        files.last_write = Instant::now();

        if let Err(e) = files.typescript.write_all(data) {
            warn!(session_id = %self.session_id, error = %e, "typescript write failed");
        }
        let timing_line = format!("{:.6} {}\n", delay, data.len());
        if let Err(e) = files.timing.write_all(timing_line.as_bytes()) {
            warn!(session_id = %self.session_id, error = %e, "timing write failed");
        }
    }

    /// Write the footer and close. Idempotent.
    pub fn stop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(files) = &mut self.files {
            let footer = format!(
                "\nScript done on {}\n",
                Local::now().date_naive().format("%Y-%m-%d")
            );
            if let Err(e) = files.typescript.write_all(footer.as_bytes()) {
                warn!(session_id = %self.session_id, error = %e, "failed writing footer");
            }
        }
        self.files = None;
        info!(session_id = %self.session_id, "session logging stopped");
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_truncated(path: &Path) -> Result<File, LoggerError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|source| LoggerError::OpenFile {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_header_body_and_footer() {
        let dir = TempDir::new().unwrap();
        let mut logger = SessionLogger::new(dir.path(), "abc12345");
        logger.start().unwrap();
        logger.write(b"hello");
        logger.stop();

        let today = Local::now().date_naive();
        let date_dir = dir.path().join(today.format("%Y/%m/%d").to_string());
        let mut entries: Vec<_> = std::fs::read_dir(&date_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        let typescript_path = entries
            .iter()
            .find(|p| !p.to_string_lossy().ends_with(".timing"))
            .unwrap();

        let contents = std::fs::read_to_string(typescript_path).unwrap();
        assert!(contents.starts_with(&format!("Script started on {}\n", today.format("%Y-%m-%d"))));
        assert!(contents.contains("hello"));
        assert!(contents.trim_end().ends_with(&format!(
            "Script done on {}",
            today.format("%Y-%m-%d")
        )));
    }

    #[test]
    fn timing_file_records_delay_and_byte_count() {
        let dir = TempDir::new().unwrap();
        let mut logger = SessionLogger::new(dir.path(), "sess0001");
        logger.start().unwrap();
        logger.write(b"abc");
        logger.write(b"de");
        logger.stop();

        let today = Local::now().date_naive();
        let date_dir = dir.path().join(today.format("%Y/%m/%d").to_string());
        let timing_path = std::fs::read_dir(&date_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.to_string_lossy().ends_with(".timing"))
            .unwrap();

        let contents = std::fs::read_to_string(timing_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for (line, expected_len) in lines.iter().zip([3usize, 2]) {
            let mut parts = line.split_whitespace();
            let delay: f64 = parts.next().unwrap().parse().unwrap();
            let count: usize = parts.next().unwrap().parse().unwrap();
            assert!(delay >= 0.0);
            assert_eq!(count, expected_len);
        }
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut logger = SessionLogger::new(dir.path(), "idem0001");
        logger.start().unwrap();
        logger.write(b"x");
        logger.stop();
        logger.stop();
    }

    #[test]
    fn random_suffix_uses_expected_alphabet() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix
            .bytes()
            .all(|b| SUFFIX_ALPHABET.contains(&b)));
    }
}
