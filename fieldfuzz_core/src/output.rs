//! Every job writes into its own directory below the output root:
//!
//! `<root>/<protocol>/<io interface>/<job id>/`
//! - `config.json`: the job configuration as it was when the job started
//! - `crashes.log`: append-only log of messages that got no reply
//!
//! Protocol and interface names are lower-cased and spaces are replaced by `_`.

use crate::config::JobConfig;
use crate::error::FuzzResult;
use crate::types::CrashRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Output directory of a single job
#[derive(Debug, Clone)]
pub struct Output {
    path: PathBuf,
}

fn path_component(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

impl Output {
    /// Output directory of job `id`. Nothing is created yet.
    #[must_use]
    pub fn for_job(root: &Path, protocol: &str, io_interface: &str, id: usize) -> Self {
        Self {
            path: root
                .join(path_component(protocol))
                .join(path_component(io_interface))
                .join(id.to_string()),
        }
    }

    /// Creates the directory
    /// # Errors
    pub fn init(&self) -> FuzzResult<()> {
        if !self.path.is_dir() {
            std::fs::create_dir_all(&self.path)?;
            tracing::info!("Created output directory: {}", self.path.display());
        }
        Ok(())
    }

    /// The job directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the crash log
    #[must_use]
    pub fn get_crash_file(&self) -> PathBuf {
        self.path.join("crashes.log")
    }

    /// Path of the saved job configuration
    #[must_use]
    pub fn get_config_file(&self) -> PathBuf {
        self.path.join("config.json")
    }

    /// Writes `config.json`
    /// # Errors
    pub fn save_config(&self, config: &JobConfig) -> FuzzResult<()> {
        config.save(&self.get_config_file())
    }
}

/// Append-only crash log of a job
#[derive(Debug)]
pub struct CrashLog {
    file: File,
    job_id: usize,
}

impl CrashLog {
    /// Opens (or creates) the crash log of `output` for appending
    /// # Errors
    pub fn create(output: &Output, job_id: usize) -> FuzzResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(output.get_crash_file())?;
        Ok(Self { file, job_id })
    }

    /// Id of the job this log belongs to
    #[must_use]
    pub fn job_id(&self) -> usize {
        self.job_id
    }

    /// Appends a crash
    /// # Errors
    pub fn record(&mut self, crash: &CrashRecord) -> FuzzResult<()> {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
        let mut entry = String::new();
        for line in [
            format!(
                "Job {}: Crash detected on interface {}",
                crash.job_id, crash.transport
            ),
            format!("\tMessage: {}", crash.message),
            format!("\tRaw message: {}", hex::encode(&crash.raw)),
        ] {
            entry.push_str(&format!("{now} - WARNING - {line}\n"));
        }
        self.file.write_all(entry.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}
