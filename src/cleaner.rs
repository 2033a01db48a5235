// 🧹 Report Cleaner - access-summary CSV → attendance records
//
// The upstream access report is semi-structured: every cell of a row is free
// text, and the fields we need (building, room, counters, date) are found by
// substring search and regex over the joined row. Rows that don't resolve are
// dropped, never reported as errors.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{PipelineError, RecordError, Result};
use crate::record::{AttendanceRecord, HEADER};

/// Phrase that marks a row as an attendance row
pub const PATRON_MARKER: &str = "Number of Patron";

pub const PASSED_LABEL: &str = "Total Number Passed";
pub const FAILED_LABEL: &str = "Total Number Failed";
pub const TRANSACTION_LABEL: &str = "Total Number of Transaction";

/// File name prefix for cleaned output written next to the input
pub const DEFAULT_OUTPUT_PREFIX: &str = "cleaned_";

static ROOM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bRoom\s+([0-9]{1,4}[A-Za-z]?)\b").expect("static regex must compile")
});
static BARE_ROOM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([0-9]{2,4}[A-Za-z]?)\b").expect("static regex must compile")
});
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("static regex must compile"));
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]{1,2}/[0-9]{1,2}/[0-9]{4}").expect("static regex must compile")
});

// ============================================================================
// ALIAS TABLE
// ============================================================================

/// A canonical building and the text patterns that identify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingAlias {
    pub building: &'static str,
    pub patterns: &'static [&'static str],
}

/// Buildings in match order. First pattern found anywhere in the text wins;
/// "Dana Hall" is listed before "Dana" so the room search starts after the
/// longer form when it is present.
pub const DEFAULT_ALIASES: &[BuildingAlias] = &[
    BuildingAlias {
        building: "Dana",
        patterns: &["Dana Hall", "Dana"],
    },
    BuildingAlias {
        building: "EEME",
        patterns: &["EEME"],
    },
    BuildingAlias {
        building: "Sloan",
        patterns: &["Sloan Hall", "Sloan"],
    },
];

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// Why a row produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Marker phrase absent
    NotAttendanceRow,
    /// Marker present but no alias matched
    UnknownBuilding,
    /// Building matched, no room number after it
    MissingRoom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRow {
    /// 1-based line in the input file
    pub line_number: u64,
    pub reason: DropReason,
}

/// Outcome of one cleaning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanReport {
    pub records: Vec<AttendanceRecord>,
    pub dropped: Vec<DroppedRow>,
    pub output_path: PathBuf,
}

impl CleanReport {
    pub fn accepted(&self) -> usize {
        self.records.len()
    }

    pub fn dropped_for(&self, reason: DropReason) -> usize {
        self.dropped.iter().filter(|d| d.reason == reason).count()
    }
}

// ============================================================================
// ROW-LEVEL EXTRACTION
// ============================================================================

/// Join the cells of a row with single spaces.
pub fn join_cells<S: AsRef<str>>(cells: &[S]) -> String {
    cells
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// True iff the joined row mentions the patron marker.
///
/// A plain substring check: any row that mentions the phrase is accepted,
/// whatever else it says.
pub fn is_attendance_row<S: AsRef<str>>(cells: &[S]) -> bool {
    join_cells(cells).contains(PATRON_MARKER)
}

/// Resolve `(building, room)` using the default alias table.
pub fn resolve_location(text: &str) -> (Option<String>, Option<String>) {
    resolve_location_with(DEFAULT_ALIASES, text)
}

/// Resolve `(building, room)` against an explicit alias table.
///
/// Returns `(None, None)` when no alias occurs in `text`, and
/// `(Some(building), None)` when a building matched but no room followed it.
pub fn resolve_location_with(
    aliases: &[BuildingAlias],
    text: &str,
) -> (Option<String>, Option<String>) {
    let Some((building, start)) = find_building(aliases, text) else {
        return (None, None);
    };

    let after_building = text[start..].trim();
    let room = ROOM_RE
        .captures(after_building)
        .or_else(|| BARE_ROOM_RE.captures(after_building))
        .map(|caps| caps[1].to_string());

    (Some(building.to_string()), room)
}

/// First alias hit in table order; returns the building and the byte offset
/// just past the matched pattern.
fn find_building(aliases: &[BuildingAlias], text: &str) -> Option<(&'static str, usize)> {
    aliases.iter().find_map(|alias| {
        alias
            .patterns
            .iter()
            .find_map(|pattern| text.find(pattern).map(|idx| (alias.building, idx + pattern.len())))
    })
}

/// First integer after the first occurrence of `keyword`, or 0.
///
/// A missing keyword, a keyword with no digits after it, and a digit run too
/// large for a counter all count as zero.
pub fn extract_number(text: &str, keyword: &str) -> u64 {
    let Some(idx) = text.find(keyword) else {
        return 0;
    };

    NUMBER_RE
        .find(&text[idx + keyword.len()..])
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// First `M/D/YYYY`-shaped token, verbatim, or today from `clock`.
///
/// No calendar validation: "13/45/2099" is returned as-is.
pub fn extract_date(text: &str, clock: &dyn Clock) -> String {
    match DATE_RE.find(text) {
        Some(m) => m.as_str().to_string(),
        None => clock.today_string(),
    }
}

/// Explicit transaction total wins; otherwise passed + failed.
pub fn reconcile_total(passed: u64, failed: u64, total: u64) -> u64 {
    if total != 0 {
        total
    } else {
        passed.saturating_add(failed)
    }
}

// ============================================================================
// REPORT CLEANER
// ============================================================================

/// Row parser bound to an alias table and a date source.
pub struct ReportCleaner<'a> {
    aliases: &'a [BuildingAlias],
    clock: &'a dyn Clock,
}

impl<'a> ReportCleaner<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        ReportCleaner {
            aliases: DEFAULT_ALIASES,
            clock,
        }
    }

    pub fn with_aliases(mut self, aliases: &'a [BuildingAlias]) -> Self {
        self.aliases = aliases;
        self
    }

    /// Turn one raw row into a record, or say why it was dropped.
    pub fn parse_row<S: AsRef<str>>(
        &self,
        cells: &[S],
    ) -> std::result::Result<AttendanceRecord, DropReason> {
        let row_text = join_cells(cells);
        let Some(marker) = row_text.find(PATRON_MARKER) else {
            return Err(DropReason::NotAttendanceRow);
        };

        // location text precedes the marker
        let location = row_text[..marker].trim();
        let (building, room_num) = match resolve_location_with(self.aliases, location) {
            (None, _) => return Err(DropReason::UnknownBuilding),
            (Some(_), None) => return Err(DropReason::MissingRoom),
            (Some(building), Some(room)) => (building, room),
        };

        let passed = extract_number(&row_text, PASSED_LABEL);
        let failed = extract_number(&row_text, FAILED_LABEL);
        let total = extract_number(&row_text, TRANSACTION_LABEL);

        Ok(AttendanceRecord {
            building,
            room_num,
            times_accessed: reconcile_total(passed, failed, total),
            access_succeed: passed,
            access_fail: failed,
            date_entered: extract_date(&row_text, self.clock),
        })
    }

    /// Clean `input` and write the records to `output`, or to the default
    /// `cleaned_<name>` sibling when no output is given.
    pub fn clean(&self, input: &Path, output: Option<&Path>) -> Result<CleanReport> {
        let output_path = match output {
            Some(path) => path.to_path_buf(),
            None => default_output_path(input),
        };

        let file = File::open(input).map_err(|source| PipelineError::Io {
            path: input.display().to_string(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut records = Vec::new();
        let mut dropped = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            let row = result.map_err(|source| PipelineError::Csv {
                path: input.display().to_string(),
                source,
            })?;
            if row.is_empty() {
                continue;
            }

            let line_number = row
                .position()
                .map(|pos| pos.line())
                .unwrap_or(idx as u64 + 1);
            let cells: Vec<&str> = row.iter().collect();

            match self.parse_row(&cells) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    debug!(line = line_number, ?reason, "dropped row");
                    dropped.push(DroppedRow {
                        line_number,
                        reason,
                    });
                }
            }
        }

        write_records(&output_path, &records)?;

        info!(
            accepted = records.len(),
            dropped = dropped.len(),
            output = %output_path.display(),
            "cleaned report"
        );

        Ok(CleanReport {
            records,
            dropped,
            output_path,
        })
    }
}

/// Clean with the default alias table.
pub fn clean_csv(input: &Path, output: Option<&Path>, clock: &dyn Clock) -> Result<CleanReport> {
    ReportCleaner::new(clock).clean(input, output)
}

// ============================================================================
// CLEANED FILE I/O
// ============================================================================

/// `<dir>/cleaned_<file name>`
pub fn default_output_path(input: &Path) -> PathBuf {
    output_path_with_prefix(input, DEFAULT_OUTPUT_PREFIX)
}

pub fn output_path_with_prefix(input: &Path, prefix: &str) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}", prefix, file_name))
}

/// Raw reports in `dir`: `.csv` files (any case) not already carrying the
/// cleaned-output prefix, sorted by name.
pub fn find_reports(dir: &Path, output_prefix: &str) -> Result<Vec<PathBuf>> {
    let io_err = |source| PipelineError::Io {
        path: dir.display().to_string(),
        source,
    };

    let mut reports = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

        if path.is_file() && is_csv && !name.starts_with(output_prefix) {
            reports.push(path);
        }
    }
    reports.sort();

    Ok(reports)
}

/// Write the fixed header followed by one row per record.
///
/// Cells are quoted only when they contain the delimiter, a quote, or a
/// line break.
pub fn write_records(path: &Path, records: &[AttendanceRecord]) -> Result<()> {
    let csv_err = |source| PipelineError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(HEADER).map_err(csv_err)?;
    for record in records {
        writer.write_record(record.to_list()).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;

    Ok(())
}

/// Read a cleaned file back.
///
/// The header must be exactly `HEADER`, in order; a file with renamed or
/// reordered columns is rejected before any row is read.
pub fn read_records(path: &Path) -> Result<Vec<AttendanceRecord>> {
    let csv_err = |source| PipelineError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let header = reader.headers().map_err(csv_err)?;
    if !header.is_empty() && !header.iter().eq(HEADER) {
        return Err(PipelineError::Record {
            path: path.display().to_string(),
            line: 1,
            source: RecordError::HeaderMismatch {
                expected: HEADER.join(","),
                found: header.iter().collect::<Vec<_>>().join(","),
            },
        });
    }

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = result.map_err(csv_err)?;
        let cells: Vec<&str> = row.iter().collect();
        let record = AttendanceRecord::from_list(&cells).map_err(|source| PipelineError::Record {
            path: path.display().to_string(),
            line: idx + 2,
            source,
        })?;
        records.push(record);
    }

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================
