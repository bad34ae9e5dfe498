// src/utils/log.rs

use chrono::Local;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub enable_file_logging: bool,
    pub log_dir: PathBuf,
    pub log_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            enable_file_logging: false,
            log_dir: PathBuf::from("logs"),
            log_file: "intent_feedback.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> colored::ColoredString {
        match self {
            Level::Debug => "DEBUG".dimmed(),
            Level::Info => "INFO ".green(),
            Level::Warn => "WARN ".yellow(),
            Level::Error => "ERROR".red().bold(),
        }
    }

    fn plain(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Stage-tagged console logger with optional mirroring into `log_dir/log_file`.
///
/// Cheap to clone; every pipeline stage and worker thread holds its own copy.
#[derive(Debug, Clone)]
pub struct Logger {
    config: LoggingConfig,
}

impl Logger {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Logger that never writes to disk. Used by tests and throwaway tools.
    pub fn console_only() -> Self {
        Self::new(LoggingConfig::default())
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    pub fn debug(&self, stage: &str, message: &str) {
        if self.config.verbose {
            self.emit(Level::Debug, stage, message);
        }
    }

    pub fn info(&self, stage: &str, message: &str) {
        self.emit(Level::Info, stage, message);
    }

    pub fn warn(&self, stage: &str, message: &str) {
        self.emit(Level::Warn, stage, message);
    }

    pub fn error(&self, stage: &str, message: &str) {
        self.emit(Level::Error, stage, message);
    }

    fn emit(&self, level: Level, stage: &str, message: &str) {
        let timestamp = Local::now().format("%H:%M:%S%.3f");
        eprintln!(
            "{} {} {} {}",
            timestamp.to_string().dimmed(),
            level.tag(),
            format!("[{}]", stage).cyan(),
            message
        );

        if self.config.enable_file_logging {
            let line = format!("{} [{}] {}", level.plain(), stage, message);
            if let Err(e) = log_to_file(&self.config.log_dir, &self.config.log_file, &line) {
                eprintln!("{} failed to write log file: {}", "WARN ".yellow(), e);
            }
        }
    }
}

/// Appends a timestamped line to `log_dir/filename`, creating the directory if needed.
pub fn log_to_file(log_dir: &Path, filename: &str, message: &str) -> io::Result<()> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(filename))?;

    let timestamp = Local::now().to_rfc3339();
    writeln!(file, "{} {}", timestamp, message)?;
    file.flush()?;

    Ok(())
}

/// Logs a message with a formatted header block.
pub fn log_with_header(log_dir: &Path, filename: &str, header: &str, message: &str) -> io::Result<()> {
    let formatted_message = format!(
        "===== {} =====\n{}\n====================",
        header, message
    );
    log_to_file(log_dir, filename, &formatted_message)
}

/// Appends a row to a CSV file, writing `headers` first when the file is new.
pub fn log_csv(path: &Path, headers: &[&str], row: &[String]) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| crate::PipelineError::io(parent, e))?;
        }
    }
    let file_exists = path.exists();

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| crate::PipelineError::io(path, e))?;
    let mut writer = csv::Writer::from_writer(file);

    if !file_exists && !headers.is_empty() {
        writer.write_record(headers)?;
    }
    writer.write_record(row)?;
    writer.flush().map_err(|e| crate::PipelineError::io(path, e))?;

    Ok(())
}
