use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::LogEntry;
use crate::session::Session;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} contains no log entries")]
    Empty(PathBuf),
}

pub fn session_file_name(started_at: NaiveDateTime) -> String {
    format!("session_advanced_{}.csv", started_at.format("%Y%m%d_%H%M%S"))
}

/// Writes entries with a header row in the fixed column order.
pub fn write_log<W: Write>(entries: &[LogEntry], writer: W) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(writer);
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the session log into `dir` and returns the file path.
pub fn write_session(session: &Session, dir: &Path) -> Result<PathBuf, ExportError> {
    let path = dir.join(session_file_name(session.started_at()));
    let file = File::create(&path).map_err(|source| ExportError::Open {
        path: path.clone(),
        source,
    })?;
    write_log(session.entries(), file)?;
    Ok(path)
}

pub fn read_log_from<R: Read>(reader: R) -> Result<Vec<LogEntry>, ExportError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut entries = Vec::new();
    for result in reader.deserialize::<LogEntry>() {
        entries.push(result?);
    }
    Ok(entries)
}

/// Reads a session log back; a log without rows is rejected.
pub fn read_log(path: &Path) -> Result<Vec<LogEntry>, ExportError> {
    let file = File::open(path).map_err(|source| ExportError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let entries = read_log_from(file)?;
    if entries.is_empty() {
        return Err(ExportError::Empty(path.to_path_buf()));
    }
    Ok(entries)
}
