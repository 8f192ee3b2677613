use crate::errors::PersistError;
use crate::types::Sample;
use chrono::{DateTime, Local, Utc};
use csv::{Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const HEADER: [&str; 6] = ["ts", "hostname", "ip", "port", "rtt_ms", "loss"];

/// `{hostname}_tcp_ping_{YYYYMMDDHH}.csv`, hour taken in local time.
pub fn log_file_name(hostname: &str, ts: DateTime<Utc>) -> String {
    format!("{}_tcp_ping_{}.csv", hostname, hour_key(ts))
}

fn hour_key(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y%m%d%H").to_string()
}

struct OpenLog {
    hour: String,
    path: PathBuf,
    writer: Writer<BufWriter<File>>,
}

/// Append-only CSV log of every sample, one file per hour.
///
/// Owned by the single consumer; nothing here is shared.
pub struct Persister {
    dir: PathBuf,
    hostname: String,
    current: Option<OpenLog>,
    files: Vec<PathBuf>,
    rows_written: u64,
}

impl Persister {
    pub fn new(dir: impl Into<PathBuf>, hostname: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            hostname: hostname.into(),
            current: None,
            files: Vec::new(),
            rows_written: 0,
        }
    }

    /// Write one row, rotating to the sample's hour file first if needed.
    ///
    /// When rotating, the previous hour's file is flushed and synced before its
    /// handle is dropped. If that fails the row is still written to the new
    /// file, and the close error is returned.
    pub fn append(&mut self, sample: &Sample) -> Result<(), PersistError> {
        let hour = hour_key(sample.ts);
        let mut closed = Ok(());
        let mut log = match self.current.take() {
            Some(log) if log.hour == hour => log,
            previous => {
                if let Some(old) = previous {
                    closed = close_log(old);
                }
                let path = self.dir.join(log_file_name(&self.hostname, sample.ts));
                let writer = open_log(&path)?;
                info!(path = %path.display(), "writing samples");
                if !self.files.contains(&path) {
                    self.files.push(path.clone());
                }
                OpenLog { hour, path, writer }
            }
        };

        let record = [
            sample.ts.timestamp_millis().to_string(),
            sample.hostname.clone(),
            sample.target.host.clone(),
            sample.target.port.to_string(),
            format!("{:.4}", sample.rtt_ms()),
            sample.is_loss().to_string(),
        ];
        match log.writer.write_record(&record) {
            Ok(()) => {
                self.current = Some(log);
                self.rows_written += 1;
                closed
            }
            // drop the handle so the next append reopens the file
            Err(e) => Err(e.into()),
        }
    }

    /// Push buffered rows to the OS.
    pub fn flush(&mut self) -> Result<(), PersistError> {
        if let Some(log) = self.current.as_mut() {
            log.writer.flush()?;
        }
        Ok(())
    }

    /// Flush and fsync the current file.
    pub fn sync(&mut self) -> Result<(), PersistError> {
        if let Some(log) = self.current.as_mut() {
            log.writer.flush()?;
            log.writer.get_ref().get_ref().sync_data()?;
        }
        Ok(())
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|l| l.path.as_path())
    }

    /// Every file written to during this run, in open order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

/// Flush and fsync a log that is about to be dropped.
fn close_log(mut log: OpenLog) -> Result<(), PersistError> {
    log.writer.flush()?;
    log.writer.get_ref().get_ref().sync_data()?;
    debug!(path = %log.path.display(), "closed sample log");
    Ok(())
}

/// Open `path` for appending; a new or empty file gets the header first.
fn open_log(path: &Path) -> Result<Writer<BufWriter<File>>, PersistError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let fresh = file.metadata()?.len() == 0;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(BufWriter::new(file));
    if fresh {
        writer.write_record(HEADER)?;
        writer.flush()?;
    }
    Ok(writer)
}
