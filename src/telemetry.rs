//! Append-only per-frame telemetry.
//!
//! One [`FrameRecord`] per processed frame. Sinks only ever append; nothing
//! here rewrites or deletes earlier rows.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::sensor::SensorReading;

pub const CSV_HEADER: &str = "timestamp,temperature,humidity,bee_count,mite_count";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const UNAVAILABLE: &str = "unavailable";

#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    pub timestamp: DateTime<Local>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub bee_count: usize,
    pub mite_count: usize,
}

impl FrameRecord {
    pub fn new(
        timestamp: DateTime<Local>,
        reading: SensorReading,
        bee_count: usize,
        mite_count: usize,
    ) -> Self {
        Self {
            timestamp,
            temperature: reading.temperature,
            humidity: reading.humidity,
            bee_count,
            mite_count,
        }
    }

    /// Stamped with the current local time.
    pub fn now(reading: SensorReading, bee_count: usize, mite_count: usize) -> Self {
        Self::new(Local::now(), reading, bee_count, mite_count)
    }

    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// CSV row without the trailing newline.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp_text(),
            reading_text(self.temperature),
            reading_text(self.humidity),
            self.bee_count,
            self.mite_count
        )
    }
}

fn reading_text(value: Option<f32>) -> String {
    match value {
        Some(value) => format!("{:.1}", value),
        None => UNAVAILABLE.to_string(),
    }
}

pub trait TelemetrySink {
    fn append(&mut self, record: &FrameRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryFormat {
    Csv,
    Sqlite,
}

pub fn open_sink(format: TelemetryFormat, path: &Path) -> Result<Box<dyn TelemetrySink>> {
    let sink: Box<dyn TelemetrySink> = match format {
        TelemetryFormat::Csv => Box::new(CsvTelemetrySink::open(path)?),
        TelemetryFormat::Sqlite => Box::new(SqliteTelemetrySink::open(path)?),
    };
    log::info!("Telemetry: {}", sink.describe());
    Ok(sink)
}

/// CSV file sink. The header is written only when the file starts empty.
pub struct CsvTelemetrySink {
    file: File,
    path: String,
}

impl CsvTelemetrySink {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open telemetry log {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("stat telemetry log {}", path.display()))?
            .len();
        if len == 0 {
            writeln!(file, "{}", CSV_HEADER)
                .with_context(|| format!("write header to {}", path.display()))?;
        }
        Ok(Self {
            file,
            path: path.display().to_string(),
        })
    }
}

impl TelemetrySink for CsvTelemetrySink {
    fn append(&mut self, record: &FrameRecord) -> Result<()> {
        // single write per row
        let line = format!("{}\n", record.csv_row());
        self.file
            .write_all(line.as_bytes())
            .with_context(|| format!("append to {}", self.path))
    }

    fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .with_context(|| format!("flush {}", self.path))
    }

    fn describe(&self) -> String {
        format!("csv {}", self.path)
    }
}

/// SQLite sink. Unavailable readings are stored as NULL.
pub struct SqliteTelemetrySink {
    conn: Connection,
    name: String,
}

impl SqliteTelemetrySink {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open telemetry db {}", path.display()))?;
        Self::with_connection(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn with_connection(conn: Connection, name: String) -> Result<Self> {
        let sink = Self { conn, name };
        sink.ensure_schema()?;
        Ok(sink)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS frame_records (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              recorded_at TEXT NOT NULL,
              temperature REAL,
              humidity REAL,
              bee_count INTEGER NOT NULL,
              mite_count INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn record_count(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM frame_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl TelemetrySink for SqliteTelemetrySink {
    fn append(&mut self, record: &FrameRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO frame_records (recorded_at, temperature, humidity, bee_count, mite_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.timestamp_text(),
                record.temperature.map(f64::from),
                record.humidity.map(f64::from),
                record.bee_count as i64,
                record.mite_count as i64,
            ],
        )?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite {}", self.name)
    }
}

/// Collects records in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTelemetrySink {
    records: Arc<Mutex<Vec<FrameRecord>>>,
}

impl InMemoryTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FrameRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TelemetrySink for InMemoryTelemetrySink {
    fn append(&mut self, record: &FrameRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
