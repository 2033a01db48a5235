use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

use crate::analytics::parse_entry_date;
use crate::cleaner::{self, CleanReport};
use crate::clock::Clock;
use crate::record::AttendanceRecord;

/// One imported source file, keyed by the hash of its raw bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEntry {
    pub source_hash: String,
    pub source_name: String,
    pub run_id: String,
    pub record_count: i64,
    pub ingested_at: DateTime<Utc>,
}

impl IngestEntry {
    pub fn new(source_hash: &str, source_name: &str, record_count: i64) -> Self {
        Self {
            source_hash: source_hash.to_string(),
            source_name: source_name.to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            record_count,
            ingested_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub enum ImportOutcome {
    /// Same bytes were imported before; nothing was cleaned or inserted
    AlreadyIngested { source_hash: String },
    Imported {
        run_id: String,
        report: CleanReport,
        inserted: usize,
    },
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS input_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            building TEXT NOT NULL,
            room_num TEXT NOT NULL,
            times_accessed INTEGER NOT NULL,
            access_succeed INTEGER NOT NULL,
            access_fail INTEGER NOT NULL,
            date_entered TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ingest_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_hash TEXT UNIQUE NOT NULL,
            source_name TEXT NOT NULL,
            run_id TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            ingested_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_input_location ON input_data(building, room_num)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS club_data (
            club_name TEXT PRIMARY KEY,
            club_president TEXT NOT NULL,
            email TEXT NOT NULL,
            club_size INTEGER NOT NULL,
            club_advisor TEXT NOT NULL,
            club_advisor_email TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS room_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            building TEXT NOT NULL,
            room_num TEXT NOT NULL,
            assigned_club TEXT NOT NULL,
            UNIQUE(building, room_num)
        )",
        [],
    )?;

    Ok(())
}

/// Insert records in one transaction. Returns the number of rows written.
pub fn insert_records(conn: &mut Connection, records: &[AttendanceRecord]) -> Result<usize> {
    let tx = conn.transaction()?;
    let inserted = insert_in(&tx, records)?;
    tx.commit()?;

    Ok(inserted)
}

/// Insert records on an open transaction; the caller commits.
fn insert_in(tx: &Transaction<'_>, records: &[AttendanceRecord]) -> Result<usize> {
    let mut stmt = tx.prepare(
        "INSERT INTO input_data (
            building, room_num, times_accessed, access_succeed, access_fail, date_entered
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    for record in records {
        stmt.execute(params![
            record.building,
            record.room_num,
            record.times_accessed,
            record.access_succeed,
            record.access_fail,
            record.date_entered,
        ])
        .with_context(|| format!("Failed to insert record for {}", record.location()))?;
    }

    debug!(inserted = records.len(), "inserted records");
    Ok(records.len())
}

pub fn count_records(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM input_data", [], |row| row.get(0))?;

    Ok(count)
}

/// Hex SHA-256 of a source file's raw bytes
pub fn source_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn is_ingested(conn: &Connection, hash: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM ingest_log WHERE source_hash = ?1",
            [hash],
            |row| row.get(0),
        )
        .optional()?;

    Ok(found.is_some())
}

pub fn log_ingest(conn: &Connection, entry: &IngestEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO ingest_log (
            source_hash, source_name, run_id, record_count, ingested_at
        ) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.source_hash,
            entry.source_name,
            entry.run_id,
            entry.record_count,
            entry.ingested_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

pub fn get_ingest_log(conn: &Connection) -> Result<Vec<IngestEntry>> {
    let mut stmt = conn.prepare(
        "SELECT source_hash, source_name, run_id, record_count, ingested_at
         FROM ingest_log
         ORDER BY id",
    )?;

    let entries = stmt
        .query_map([], |row| {
            let ingested_at: String = row.get(4)?;
            Ok(IngestEntry {
                source_hash: row.get(0)?,
                source_name: row.get(1)?,
                run_id: row.get(2)?,
                record_count: row.get(3)?,
                ingested_at: DateTime::parse_from_rfc3339(&ingested_at)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            4,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?
                    .with_timezone(&Utc),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// Clean a report and load it, once per distinct source file.
///
/// The cleaned file is re-read before insertion so the database holds
/// exactly what was written to disk.
pub fn import_report(
    conn: &mut Connection,
    input: &Path,
    output: Option<&Path>,
    clock: &dyn Clock,
) -> Result<ImportOutcome> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read report: {}", input.display()))?;
    let hash = source_hash(&bytes);

    if is_ingested(conn, &hash)? {
        info!(source = %input.display(), "report already ingested, skipping");
        return Ok(ImportOutcome::AlreadyIngested { source_hash: hash });
    }

    let report = cleaner::clean_csv(input, output, clock)
        .with_context(|| format!("Failed to clean report: {}", input.display()))?;
    let records = cleaner::read_records(&report.output_path)
        .with_context(|| format!("Failed to reload {}", report.output_path.display()))?;

    let source_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv");

    // Rows and the ingest entry land together or not at all
    let tx = conn.transaction()?;
    let inserted = insert_in(&tx, &records)?;
    let entry = IngestEntry::new(&hash, source_name, inserted as i64);
    log_ingest(&tx, &entry)?;
    tx.commit()?;

    info!(run_id = %entry.run_id, inserted, "imported report");

    Ok(ImportOutcome::Imported {
        run_id: entry.run_id,
        report,
        inserted,
    })
}

// ============================================================================
// EXPORT / RELOAD
// ============================================================================

/// Write every stored record to a cleaned-format file, oldest entry date first.
///
/// Rows whose date does not parse go last, in insertion order.
pub fn export_records(conn: &Connection, path: &Path) -> Result<usize> {
    let mut records = get_all_records(conn)?;
    records.sort_by_key(|record| match parse_entry_date(&record.date_entered) {
        Some(date) => (false, Some(date)),
        None => (true, None),
    });

    cleaner::write_records(path, &records)
        .with_context(|| format!("Failed to export to {}", path.display()))?;

    info!(exported = records.len(), path = %path.display(), "exported records");
    Ok(records.len())
}

/// Delete every attendance row. The ingest log is kept, so reports that were
/// already loaded are still skipped on the next import.
pub fn reset_input_data(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM input_data", [])?;

    info!(deleted, "reset input_data");
    Ok(deleted)
}

/// Load a file that is already in cleaned format, without re-cleaning it.
///
/// The whole file is validated before anything is inserted, so a bad row
/// leaves the database unchanged.
pub fn load_cleaned(conn: &mut Connection, path: &Path) -> Result<usize> {
    let records = cleaner::read_records(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    insert_records(conn, &records)
}

pub fn get_all_records(conn: &Connection) -> Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT building, room_num, times_accessed, access_succeed, access_fail, date_entered
         FROM input_data
         ORDER BY id",
    )?;

    let records = stmt
        .query_map([], row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn get_records_for_location(
    conn: &Connection,
    building: &str,
    room_num: &str,
) -> Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT building, room_num, times_accessed, access_succeed, access_fail, date_entered
         FROM input_data
         WHERE building = ?1 AND room_num = ?2
         ORDER BY id",
    )?;

    let records = stmt
        .query_map(params![building, room_num], row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Distinct `(building, room)` pairs, ordered by room
pub fn get_locations(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT building, room_num
         FROM input_data
         ORDER BY room_num, building",
    )?;

    let locations = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(locations)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        building: row.get(0)?,
        room_num: row.get(1)?,
        times_accessed: row.get(2)?,
        access_succeed: row.get(3)?,
        access_fail: row.get(4)?,
        date_entered: row.get(5)?,
    })
}

/// Open (or create) the database file and make sure the schema exists.
pub fn open(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    setup_database(&conn)?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn create_test_record(building: &str, room: &str, passed: u64, failed: u64, date: &str) -> AttendanceRecord {
        AttendanceRecord {
            building: building.to_string(),
            room_num: room.to_string(),
            times_accessed: passed + failed,
            access_succeed: passed,
            access_fail: failed,
            date_entered: date.to_string(),
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_read_back() {
        let mut conn = test_conn();
        let records = vec![
            create_test_record("Dana", "215", 7, 3, "04/15/2024"),
            create_test_record("EEME", "102", 4, 0, "04/16/2024"),
        ];

        let inserted = insert_records(&mut conn, &records).unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(count_records(&conn).unwrap(), 2);
        assert_eq!(get_all_records(&conn).unwrap(), records);
    }

    #[test]
    fn test_locations_distinct_and_ordered_by_room() {
        let mut conn = test_conn();
        insert_records(
            &mut conn,
            &[
                create_test_record("Sloan", "300", 1, 0, "01/01/2024"),
                create_test_record("Dana", "215", 1, 0, "01/01/2024"),
                create_test_record("Dana", "215", 2, 0, "01/02/2024"),
            ],
        )
        .unwrap();

        let locations = get_locations(&conn).unwrap();
        assert_eq!(
            locations,
            vec![
                ("Dana".to_string(), "215".to_string()),
                ("Sloan".to_string(), "300".to_string()),
            ]
        );

        let dana = get_records_for_location(&conn, "Dana", "215").unwrap();
        assert_eq!(dana.len(), 2);
    }

    #[test]
    fn test_source_hash_stable() {
        let hash1 = source_hash(b"Dana Room 215,Number of Patron");
        let hash2 = source_hash(b"Dana Room 215,Number of Patron");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
        assert_ne!(hash1, source_hash(b"Dana Room 216,Number of Patron"));
    }

    #[test]
    fn test_ingest_log_round_trip() {
        let conn = test_conn();
        let entry = IngestEntry::new("abc123", "report.csv", 4);

        assert!(!is_ingested(&conn, "abc123").unwrap());
        log_ingest(&conn, &entry).unwrap();
        assert!(is_ingested(&conn, "abc123").unwrap());

        let log = get_ingest_log(&conn).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].run_id, entry.run_id);
        assert_eq!(log[0].record_count, 4);
    }

    #[test]
    fn test_duplicate_ingest_rejected_by_schema() {
        let conn = test_conn();
        log_ingest(&conn, &IngestEntry::new("same", "a.csv", 1)).unwrap();
        assert!(log_ingest(&conn, &IngestEntry::new("same", "b.csv", 1)).is_err());
    }

    fn write_summary(dir: &Path) -> std::path::PathBuf {
        let input = dir.join("summary.csv");
        std::fs::write(
            &input,
            "Dana Room 215,Number of Patron,Total Number Passed 7,Total Number Failed 3,04/15/2024\n\
             Sloan 120,Number of Patron,Total Number of Transaction 9,04/15/2024\n",
        )
        .unwrap();
        input
    }

    #[test]
    fn test_failed_ingest_log_rolls_back_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_summary(dir.path());
        let mut conn = test_conn();
        let clock = FixedClock::ymd(2024, 4, 20).unwrap();

        conn.execute_batch(
            "CREATE TRIGGER fail_ingest BEFORE INSERT ON ingest_log
             BEGIN SELECT RAISE(ABORT, 'ingest log unavailable'); END;",
        )
        .unwrap();

        assert!(import_report(&mut conn, &input, None, &clock).is_err());
        assert_eq!(count_records(&conn).unwrap(), 0);
        assert!(get_ingest_log(&conn).unwrap().is_empty());

        conn.execute_batch("DROP TRIGGER fail_ingest;").unwrap();

        let retry = import_report(&mut conn, &input, None, &clock).unwrap();
        assert!(matches!(retry, ImportOutcome::Imported { inserted: 2, .. }));
        assert_eq!(count_records(&conn).unwrap(), 2);
    }

    #[test]
    fn test_export_orders_by_date_then_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        let mut conn = test_conn();
        insert_records(
            &mut conn,
            &[
                create_test_record("Dana", "215", 1, 0, "12/01/2023"),
                create_test_record("Sloan", "120", 2, 0, "13/45/2024"),
                create_test_record("EEME", "102", 3, 0, "02/01/2023"),
                create_test_record("Dana", "215", 4, 0, "01/15/2024"),
            ],
        )
        .unwrap();
        log_ingest(&conn, &IngestEntry::new("kept", "a.csv", 4)).unwrap();

        assert_eq!(export_records(&conn, &path).unwrap(), 4);

        let exported = cleaner::read_records(&path).unwrap();
        let dates: Vec<&str> = exported.iter().map(|r| r.date_entered.as_str()).collect();
        assert_eq!(dates, vec!["02/01/2023", "12/01/2023", "01/15/2024", "13/45/2024"]);

        assert_eq!(reset_input_data(&conn).unwrap(), 4);
        assert_eq!(count_records(&conn).unwrap(), 0);
        assert!(is_ingested(&conn, "kept").unwrap());
    }

    #[test]
    fn test_load_cleaned_restores_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        let mut conn = test_conn();
        let records = vec![
            create_test_record("Dana", "215", 7, 3, "04/15/2024"),
            create_test_record("EEME", "102", 4, 0, "04/16/2024"),
        ];
        insert_records(&mut conn, &records).unwrap();
        export_records(&conn, &path).unwrap();
        reset_input_data(&conn).unwrap();

        assert_eq!(load_cleaned(&mut conn, &path).unwrap(), 2);
        assert_eq!(get_all_records(&conn).unwrap(), records);
    }

    #[test]
    fn test_load_cleaned_bad_row_inserts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        std::fs::write(
            &path,
            "Building,Room Number,TimesAccessed,AccessSucceed,AccessFail,DateEntered\n\
             Dana,215,10,7,3,04/15/2024\n\
             Dana,215,ten,7,3,04/16/2024\n",
        )
        .unwrap();

        let mut conn = test_conn();
        assert!(load_cleaned(&mut conn, &path).is_err());
        assert_eq!(count_records(&conn).unwrap(), 0);
    }

    #[test]
    fn test_import_report_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("summary.csv");
        std::fs::write(
            &input,
            "Dana Room 215,Number of Patron,Total Number Passed 7,Total Number Failed 3,04/15/2024\n\
             Sloan 120,Number of Patron,Total Number of Transaction 9,04/15/2024\n",
        )
        .unwrap();

        let mut conn = test_conn();
        let clock = FixedClock::ymd(2024, 4, 20).unwrap();

        let first = import_report(&mut conn, &input, None, &clock).unwrap();
        match first {
            ImportOutcome::Imported { inserted, report, .. } => {
                assert_eq!(inserted, 2);
                assert_eq!(report.accepted(), 2);
                assert!(report.output_path.exists());
            }
            other => panic!("expected import, got {:?}", other),
        }

        let second = import_report(&mut conn, &input, None, &clock).unwrap();
        assert!(matches!(second, ImportOutcome::AlreadyIngested { .. }));
        assert_eq!(count_records(&conn).unwrap(), 2);
        assert_eq!(get_ingest_log(&conn).unwrap().len(), 1);
    }
}
