use chrono::Local;
use log::{LevelFilter, Metadata, Record};
use once_cell::sync::OnceCell;
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const LOG_FILE: &str = "log.txt";

#[derive(Debug)]
struct FileLogger {
    log_file: PathBuf,
    level: LevelFilter,
}

static LOGGER: OnceCell<FileLogger> = OnceCell::new();

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let log_entry = format!(
                "[{}] {} - {}\n",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            );

            if let Ok(mut file) = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_file)
            {
                let _ = file.write_all(log_entry.as_bytes());
            }
        }
    }

    fn flush(&self) {}
}

pub fn default_log_dir() -> Option<PathBuf> {
    dir::home_dir().map(|home| home.join("bet_generator").join("data"))
}

// Routes `log` records to `<log_dir>/log.txt`. Debug records are kept only in
// debug mode. A second call is a no-op.
pub fn init(log_dir: &Path, debug: bool) -> Result<(), AppError> {
    create_dir_all(log_dir)?;

    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let logger = FileLogger {
        log_file: log_dir.join(LOG_FILE),
        level,
    };
    if LOGGER.set(logger).is_err() {
        return Ok(());
    }

    if let Some(logger) = LOGGER.get() {
        log::set_logger(logger).map_err(|e| AppError::Logger(e.to_string()))?;
        log::set_max_level(level);
    }
    Ok(())
}
