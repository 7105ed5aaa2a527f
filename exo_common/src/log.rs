//! Append-only sample logging.
//!
//! Distinct from diagnostic tracing: these are the measurement logs the
//! operator keeps. One text file per logged subject, one line per sample,
//! `time<tab>v0<tab>v1...`, fixed decimal precision. File names follow
//! `<user->-<subject>-<timestamp>.log` inside the environment log
//! directory, where `timestamp` is Unix seconds at creation.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::consts::DEFAULT_LOG_PRECISION;
use crate::env::Environment;

/// Buffered writer for one sample log file.
pub struct SampleLog {
    writer: BufWriter<File>,
    precision: usize,
    epoch: Instant,
    path: PathBuf,
}

impl SampleLog {
    /// Create a log file for `subject` under the environment log directory.
    ///
    /// The log directory is created if missing. Lines are stamped with the
    /// environment-relative execution time.
    pub fn create(
        env: &Environment,
        subject: &str,
        precision: Option<usize>,
    ) -> std::io::Result<Self> {
        fs::create_dir_all(env.log_dir())?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let file_name = match env.user() {
            Some(user) => format!("{user}-{subject}-{stamp}.log"),
            None => format!("{subject}-{stamp}.log"),
        };
        let path = env.log_dir().join(file_name);
        let file = File::create(&path)?;
        tracing::debug!(path = %path.display(), "sample log created");
        // Anchor the time base to the environment, not to file creation.
        let epoch = Instant::now()
            .checked_sub(std::time::Duration::from_secs_f64(env.elapsed_s()))
            .unwrap_or_else(Instant::now);
        Ok(Self {
            writer: BufWriter::new(file),
            precision: precision.unwrap_or(DEFAULT_LOG_PRECISION),
            epoch,
            path,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one sample line: execution time followed by `values`.
    ///
    /// Write errors are swallowed; a full disk must not take the control
    /// loop down with it.
    pub fn record(&mut self, values: &[f64]) {
        let time = self.epoch.elapsed().as_secs_f64();
        let p = self.precision;
        let _ = write!(self.writer, "{time:.p$}");
        for value in values {
            let _ = write!(self.writer, "\t{value:.p$}");
        }
        let _ = writeln!(self.writer);
    }

    /// Flush buffered lines to disk.
    pub fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for SampleLog {
    fn drop(&mut self) {
        self.flush();
    }
}
