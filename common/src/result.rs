use core::fmt;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Multiplier turning declared workload units into KiB
pub const UNIT_SCALE: f64 = 1024.0;

pub const TRAILING_COLUMNS: [&str; 5] = [
    "ThreadCount",
    "WorkerGroupCount",
    "ElapsedSeconds",
    "TotalWorkload",
    "Bandwidth",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResultError {
    #[error("Row has {got} axis columns, table expects {expected}")]
    ColumnMismatch { expected: usize, got: usize },
}

pub fn bandwidth(total_workload: u64, elapsed_secs: f64) -> f64 {
    total_workload as f64 * UNIT_SCALE / elapsed_secs
}

/// Storage medium tag derived from a mount description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Medium {
    Tmpfs,
    Nvme,
    Pmem,
}

impl Medium {
    pub fn from_mounts(description: &str) -> Self {
        if description.contains("tmpfs") {
            Medium::Tmpfs
        } else if description.contains("nvme") {
            Medium::Nvme
        } else {
            Medium::Pmem
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Medium::Tmpfs => write!(f, "tmpfs"),
            Medium::Nvme => write!(f, "nvme"),
            Medium::Pmem => write!(f, "pmem"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    /// One label per axis, in axis order
    pub labels: Vec<String>,
    pub thread_count: usize,
    pub worker_groups: usize,
    pub elapsed: f64,
    pub total_workload: u64,
    pub bandwidth: f64,
}

impl ResultRow {
    pub fn record(&self) -> Vec<String> {
        let mut record = self.labels.clone();
        record.extend([
            self.thread_count.to_string(),
            self.worker_groups.to_string(),
            self.elapsed.to_string(),
            self.total_workload.to_string(),
            self.bandwidth.to_string(),
        ]);
        record
    }
}

/// Accumulates the rows of one bench and rewrites its CSV file on every flush.
#[derive(Debug)]
pub struct ResultTable {
    path: PathBuf,
    headers: Vec<String>,
    axis_count: usize,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new<'a>(path: impl Into<PathBuf>, axis_headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut headers = axis_headers
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        let axis_count = headers.len();
        headers.extend(TRAILING_COLUMNS.iter().map(|c| (*c).to_owned()));
        Self {
            path: path.into(),
            headers,
            axis_count,
            rows: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn push(&mut self, row: ResultRow) -> Result<(), ResultError> {
        if row.labels.len() != self.axis_count {
            return Err(ResultError::ColumnMismatch {
                expected: self.axis_count,
                got: row.labels.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.record())?;
        }
        let data = writer
            .into_inner()
            .map_err(|err| eyre!("Serialize results: {}", err.error()))?;
        tokio::fs::write(&self.path, data)
            .await
            .context(format!("Write results to {}", self.path.display()))?;
        debug!("Flushed {} rows to {}", self.rows.len(), self.path.display());
        Ok(())
    }
}
