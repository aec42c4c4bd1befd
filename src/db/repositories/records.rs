use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, error, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    helpers::{format_epoch_seconds, to_u32, to_u64, value_to_text},
    models::PersistedRecord,
    TimeSeriesStore,
};

/// Rows between two progress notifications while dumping.
pub const PROGRESS_EVERY_ROWS: u64 = 100;

const FIELD_DELIMITER: &str = ";";
const DUMP_COLUMN_WIDTH: usize = 16;

/// Result of a full-table dump. An incomplete dump leaves the partial file in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpOutcome {
    pub rows_written: u64,
    pub complete: bool,
}

impl TimeSeriesStore {
    /// Inserts the record, replacing any row with the same `time_seconds`.
    pub async fn upsert(&self, record: &PersistedRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let result = write_record(conn, &record);
            if let Err(err) = conn.execute_batch("PRAGMA shrink_memory") {
                debug!("failed to release SQLite cache memory: {err}");
            }
            result
        })
        .await
    }

    /// Best-effort [`upsert`](Self::upsert): failures are logged and reported
    /// as `false` so the sampling loop carries on.
    pub async fn save(&self, record: &PersistedRecord) -> bool {
        match self.upsert(record).await {
            Ok(()) => {
                info!("Saved sample (location+signal) at time {}", record.time_seconds);
                true
            }
            Err(err) => {
                error!("failed to save sample at time {}: {err:?}", record.time_seconds);
                false
            }
        }
    }

    pub async fn row_count(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM Base", [], |row| row.get(0))
                .context("failed to count rows")?;
            to_u64(count, "row count")
        })
        .await
    }

    /// Newest key formatted for display, or an empty string for an empty store.
    pub async fn last_entry_timestamp(&self) -> Result<String> {
        self.execute(|conn| {
            let newest: Option<i64> = conn
                .query_row(
                    "SELECT time FROM Base ORDER BY time DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to query last entry")?;

            match newest {
                Some(seconds) => format_epoch_seconds(seconds),
                None => Ok(String::new()),
            }
        })
        .await
    }

    /// Every column of the newest row as `name:` (padded) followed by the value,
    /// one column per line.
    pub async fn last_row_dump(&self) -> Result<String> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM Base ORDER BY time DESC LIMIT 1")?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let mut dump = String::with_capacity(64);
            let mut rows = stmt.query([])?;
            if let Some(row) = rows.next()? {
                for (idx, name) in columns.iter().enumerate() {
                    let label = format!("{name}:");
                    let value = value_to_text(row.get_ref(idx)?);
                    dump.push_str(&format!("{label:<DUMP_COLUMN_WIDTH$}{value}\n"));
                }
            }

            Ok(dump)
        })
        .await
    }

    pub async fn get_record(&self, time_seconds: i64) -> Result<Option<PersistedRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT time, accuracy, altitude, satellites, latitude, longitude, speed,
                        cdmaDbm, evdoDbm, evdoSnr, signalStrength, carrier
                 FROM Base
                 WHERE time = ?1",
            )?;

            let mut rows = stmt.query(params![time_seconds])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };

            Ok(Some(PersistedRecord {
                time_seconds: row.get(0)?,
                accuracy: row.get(1)?,
                altitude: row.get(2)?,
                satellites: to_u32(row.get::<_, i64>(3)?, "satellites")?,
                latitude: row.get(4)?,
                longitude: row.get(5)?,
                speed: row.get(6)?,
                cdma_dbm: row.get(7)?,
                evdo_dbm: row.get(8)?,
                evdo_snr: row.get(9)?,
                signal_strength: row.get(10)?,
                carrier: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
            }))
        })
        .await
    }

    /// Streams the whole table to `destination` as `;`-terminated fields with a
    /// header line. `progress` receives the running row count every
    /// [`PROGRESS_EVERY_ROWS`] rows and the final count once the dump finishes.
    pub async fn dump_all<P>(&self, destination: impl Into<PathBuf>, progress: P) -> DumpOutcome
    where
        P: FnMut(u64) + Send + 'static,
    {
        let destination = destination.into();
        let result = self
            .execute(move |conn| Ok(write_dump(conn, &destination, progress)))
            .await;

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("dump aborted before writing: {err:?}");
                DumpOutcome {
                    rows_written: 0,
                    complete: false,
                }
            }
        }
    }

    /// Multi-line summary: newest entry, row count and the newest row.
    pub async fn status_report(&self) -> Result<String> {
        let last_entry = self.last_entry_timestamp().await?;
        let rows = self.row_count().await?;
        let last_row = self.last_row_dump().await?;

        Ok(format!(
            "Last entry: {last_entry}\nData rows: {rows}\n------\n{last_row}"
        ))
    }
}

fn write_record(conn: &mut Connection, record: &PersistedRecord) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to begin save transaction")?;

    tx.execute(
        "INSERT OR REPLACE INTO Base (
            time,
            accuracy,
            altitude,
            satellites,
            latitude,
            longitude,
            speed,
            cdmaDbm,
            evdoDbm,
            evdoSnr,
            signalStrength,
            carrier
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.time_seconds,
            record.accuracy,
            record.altitude,
            i64::from(record.satellites),
            record.latitude,
            record.longitude,
            record.speed,
            record.cdma_dbm,
            record.evdo_dbm,
            record.evdo_snr,
            record.signal_strength,
            record.carrier,
        ],
    )
    .context("failed to upsert sample")?;

    tx.commit().context("failed to commit sample")?;
    Ok(())
}

fn write_dump<P: FnMut(u64)>(conn: &Connection, destination: &Path, mut progress: P) -> DumpOutcome {
    let mut rows_written = 0;
    match stream_rows(conn, destination, &mut progress, &mut rows_written) {
        Ok(()) => {
            info!("wrote {rows_written} lines to {}", destination.display());
            progress(rows_written);
            DumpOutcome {
                rows_written,
                complete: true,
            }
        }
        Err(err) => {
            error!(
                "dump to {} failed after {rows_written} lines: {err:?}",
                destination.display()
            );
            DumpOutcome {
                rows_written,
                complete: false,
            }
        }
    }
}

fn stream_rows<P: FnMut(u64)>(
    conn: &Connection,
    destination: &Path,
    progress: &mut P,
    rows_written: &mut u64,
) -> Result<()> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dump directory {}", parent.display()))?;
    }

    let file = File::create(destination)
        .with_context(|| format!("failed to create dump file {}", destination.display()))?;
    let mut out = BufWriter::new(file);

    let mut stmt = conn.prepare("SELECT * FROM Base ORDER BY time ASC")?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    for name in &columns {
        write!(out, "{name}{FIELD_DELIMITER}")?;
    }
    writeln!(out)?;

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        for idx in 0..columns.len() {
            write!(out, "{}{FIELD_DELIMITER}", value_to_text(row.get_ref(idx)?))?;
        }
        writeln!(out)?;

        *rows_written += 1;
        if *rows_written % PROGRESS_EVERY_ROWS == 0 {
            debug!("wrote {rows_written} lines");
            progress(*rows_written);
        }
    }

    out.flush().context("failed to flush dump file")?;
    Ok(())
}
