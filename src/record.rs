// Attendance record - the normalized output unit of the cleaner
//
// One record per accepted report row. Records are never mutated after the
// cleaner builds them; the loader and analytics only read them.

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Column names of the cleaned file, in order.
pub const HEADER: [&str; 6] = [
    "Building",
    "Room Number",
    "TimesAccessed",
    "AccessSucceed",
    "AccessFail",
    "DateEntered",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "Building")]
    pub building: String,

    #[serde(rename = "Room Number")]
    pub room_num: String,

    #[serde(rename = "TimesAccessed")]
    pub times_accessed: u64,

    #[serde(rename = "AccessSucceed")]
    pub access_succeed: u64,

    #[serde(rename = "AccessFail")]
    pub access_fail: u64,

    /// `MM/DD/YYYY`, taken verbatim from the report
    #[serde(rename = "DateEntered")]
    pub date_entered: String,
}

impl AttendanceRecord {
    /// Build a record from six serialized cells.
    ///
    /// Mirrors the loader contract: exactly six columns, the three counters
    /// must parse as non-negative integers. Text columns are taken as-is.
    pub fn from_list<S: AsRef<str>>(cells: &[S]) -> Result<Self, RecordError> {
        match cells {
            [building, room, total, passed, failed, date] => Ok(AttendanceRecord {
                building: building.as_ref().to_string(),
                room_num: room.as_ref().to_string(),
                times_accessed: parse_count(HEADER[2], total.as_ref())?,
                access_succeed: parse_count(HEADER[3], passed.as_ref())?,
                access_fail: parse_count(HEADER[4], failed.as_ref())?,
                date_entered: date.as_ref().to_string(),
            }),
            _ => Err(RecordError::WrongColumnCount {
                expected: HEADER.len(),
                found: cells.len(),
            }),
        }
    }

    /// Cells in header order, as written to the cleaned file
    pub fn to_list(&self) -> [String; 6] {
        [
            self.building.clone(),
            self.room_num.clone(),
            self.times_accessed.to_string(),
            self.access_succeed.to_string(),
            self.access_fail.to_string(),
            self.date_entered.clone(),
        ]
    }

    /// `"<building> <room>"`, the label analytics groups by
    pub fn location(&self) -> String {
        format!("{} {}", self.building, self.room_num)
    }
}

fn parse_count(column: &'static str, value: &str) -> Result<u64, RecordError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| RecordError::InvalidInteger {
            column,
            value: value.to_string(),
        })
}
