// 📈 Room analytics - activity over time and usage per location
//
// Stored dates are MM/DD/YYYY text, which does not sort chronologically,
// so range filtering happens here after parsing each date with chrono.
// Rows whose date is not a real calendar date are skipped by range queries.

use anyhow::{anyhow, bail, Result};
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::clock::DATE_FORMAT;
use crate::db;
use crate::record::AttendanceRecord;

// ============================================================================
// QUERY WINDOW
// ============================================================================

/// Date range for a query: relative to today, or explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    Weeks(u32),
    Custom { start: NaiveDate, end: NaiveDate },
}

impl Window {
    /// Parse `"<n> weeks"`, `"<n> month(s)"` or `"<n> year(s)"`.
    ///
    /// A month counts as 4 weeks and a year as 52.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        let [count, unit] = parts.as_slice() else {
            bail!("unexpected duration '{}'", text);
        };

        let n: u32 = count
            .parse()
            .map_err(|_| anyhow!("unexpected duration '{}'", text))?;
        let per_unit = match *unit {
            "week" | "weeks" => 1,
            "month" | "months" => 4,
            "year" | "years" => 52,
            _ => bail!("unexpected duration '{}'", text),
        };
        let Some(weeks) = n.checked_mul(per_unit) else {
            bail!("duration '{}' is too long", text);
        };

        Ok(Window::Weeks(weeks))
    }

    /// Inclusive `(start, end)` for a given today.
    ///
    /// Fails when the start would fall before the earliest representable date.
    pub fn resolve(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        match *self {
            Window::Weeks(weeks) => {
                let start = today
                    .checked_sub_signed(Duration::weeks(i64::from(weeks)))
                    .ok_or_else(|| anyhow!("{} weeks before {} is out of range", weeks, today))?;
                Ok((start, today))
            }
            Window::Custom { start, end } => Ok((start, end)),
        }
    }
}

/// Parse a stored `date_entered` value; `None` for non-calendar dates.
pub fn parse_entry_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

fn in_range(
    records: Vec<AttendanceRecord>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<(NaiveDate, AttendanceRecord)> {
    records
        .into_iter()
        .filter_map(|record| match parse_entry_date(&record.date_entered) {
            Some(date) => Some((date, record)),
            None => {
                debug!(date = %record.date_entered, location = %record.location(), "skipping undated row");
                None
            }
        })
        .filter(|(date, _)| *date >= start && *date <= end)
        .collect()
}

// ============================================================================
// ROOM ACTIVITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPoint {
    pub date: NaiveDate,
    pub times_accessed: u64,
}

/// Value plus the date it occurred
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extreme {
    pub value: u64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub min: Extreme,
    pub max: Extreme,
    pub average: f64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomActivity {
    pub building: String,
    pub room_num: String,
    pub points: Vec<ActivityPoint>,
    pub summary: Option<ActivitySummary>,
}

impl RoomActivity {
    pub fn label(&self) -> String {
        format!("{} {}", self.building, self.room_num)
    }
}

/// Accesses of one room per entry date, oldest first.
pub fn room_activity(
    conn: &Connection,
    building: &str,
    room_num: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RoomActivity> {
    let records = db::get_records_for_location(conn, building, room_num)?;

    let mut points: Vec<ActivityPoint> = in_range(records, start, end)
        .into_iter()
        .map(|(date, record)| ActivityPoint {
            date,
            times_accessed: record.times_accessed,
        })
        .collect();
    points.sort_by_key(|p| p.date);

    Ok(RoomActivity {
        building: building.to_string(),
        room_num: room_num.to_string(),
        summary: summarize(&points),
        points,
    })
}

/// Min and max keep the earliest date on ties.
fn summarize(points: &[ActivityPoint]) -> Option<ActivitySummary> {
    let first = points.first()?;
    let mut min = Extreme {
        value: first.times_accessed,
        date: first.date,
    };
    let mut max = min.clone();
    let mut total: u64 = 0;

    for point in points {
        if point.times_accessed < min.value {
            min = Extreme {
                value: point.times_accessed,
                date: point.date,
            };
        }
        if point.times_accessed > max.value {
            max = Extreme {
                value: point.times_accessed,
                date: point.date,
            };
        }
        total += point.times_accessed;
    }

    Some(ActivitySummary {
        min,
        max,
        average: total as f64 / points.len() as f64,
        total,
    })
}

// ============================================================================
// USAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationUsage {
    pub location: String,
    pub accesses: u64,
}

/// Total accesses per `"<building> <room>"` within the range.
pub fn usage(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
    descending: bool,
) -> Result<Vec<LocationUsage>> {
    let records = db::get_all_records(conn)?;

    let mut totals: BTreeMap<String, u64> = BTreeMap::new();
    for (_, record) in in_range(records, start, end) {
        *totals.entry(record.location()).or_default() += record.times_accessed;
    }

    let mut usage: Vec<LocationUsage> = totals
        .into_iter()
        .map(|(location, accesses)| LocationUsage { location, accesses })
        .collect();

    // BTreeMap order breaks ties by location; the sort is stable
    if descending {
        usage.sort_by(|a, b| b.accesses.cmp(&a.accesses));
    } else {
        usage.sort_by(|a, b| a.accesses.cmp(&b.accesses));
    }

    Ok(usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_records, setup_database};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(building: &str, room: &str, total: u64, date: &str) -> AttendanceRecord {
        AttendanceRecord {
            building: building.to_string(),
            room_num: room.to_string(),
            times_accessed: total,
            access_succeed: total,
            access_fail: 0,
            date_entered: date.to_string(),
        }
    }

    fn seeded_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_records(
            &mut conn,
            &[
                record("Dana", "215", 8, "04/10/2024"),
                record("Dana", "215", 3, "4/2/2024"),
                record("Dana", "215", 12, "04/20/2024"),
                record("Dana", "215", 99, "13/45/2024"),
                record("Sloan", "120", 5, "04/11/2024"),
                record("Sloan", "120", 6, "04/12/2024"),
                record("EEME", "102", 40, "01/05/2023"),
            ],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_window_parse_units() {
        assert_eq!(Window::parse("2 weeks").unwrap(), Window::Weeks(2));
        assert_eq!(Window::parse("1 month").unwrap(), Window::Weeks(4));
        assert_eq!(Window::parse("3 months").unwrap(), Window::Weeks(12));
        assert_eq!(Window::parse("1 year").unwrap(), Window::Weeks(52));
    }

    #[test]
    fn test_window_parse_rejects_unknown() {
        assert!(Window::parse("fortnight").is_err());
        assert!(Window::parse("two weeks").is_err());
        assert!(Window::parse("2 decades").is_err());
    }

    #[test]
    fn test_window_resolve() {
        let today = date(2024, 4, 29);
        assert_eq!(Window::Weeks(2).resolve(today).unwrap(), (date(2024, 4, 15), today));

        let custom = Window::Custom {
            start: date(2024, 1, 1),
            end: date(2024, 2, 1),
        };
        assert_eq!(
            custom.resolve(today).unwrap(),
            (date(2024, 1, 1), date(2024, 2, 1))
        );
    }

    #[test]
    fn test_window_parse_overflow_is_error() {
        let err = Window::parse("100000000 years").unwrap_err();
        assert!(err.to_string().contains("too long"));
        assert!(Window::parse("4294967295 months").is_err());
        assert_eq!(Window::parse("4294967295 weeks").unwrap(), Window::Weeks(u32::MAX));
    }

    #[test]
    fn test_window_resolve_out_of_range_is_error() {
        let today = date(2024, 1, 1);
        assert!(Window::Weeks(u32::MAX).resolve(today).is_err());
        assert!(Window::parse("1000000 years").unwrap().resolve(today).is_err());
    }

    #[test]
    fn test_parse_entry_date() {
        assert_eq!(parse_entry_date("04/15/2024"), Some(date(2024, 4, 15)));
        assert_eq!(parse_entry_date("4/2/2024"), Some(date(2024, 4, 2)));
        assert_eq!(parse_entry_date("13/45/2099"), None);
    }

    #[test]
    fn test_room_activity_sorted_with_summary() {
        let conn = seeded_conn();
        let activity =
            room_activity(&conn, "Dana", "215", date(2024, 4, 1), date(2024, 4, 30)).unwrap();

        let dates: Vec<NaiveDate> = activity.points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![date(2024, 4, 2), date(2024, 4, 10), date(2024, 4, 20)]);

        let summary = activity.summary.as_ref().unwrap();
        assert_eq!(summary.min, Extreme { value: 3, date: date(2024, 4, 2) });
        assert_eq!(summary.max, Extreme { value: 12, date: date(2024, 4, 20) });
        assert_eq!(summary.total, 23);
        assert!((summary.average - 23.0 / 3.0).abs() < 1e-9);
        assert_eq!(activity.label(), "Dana 215");
    }

    #[test]
    fn test_room_activity_empty_range() {
        let conn = seeded_conn();
        let activity =
            room_activity(&conn, "Dana", "215", date(2025, 1, 1), date(2025, 2, 1)).unwrap();
        assert!(activity.points.is_empty());
        assert!(activity.summary.is_none());
    }

    #[test]
    fn test_usage_sums_per_location() {
        let conn = seeded_conn();
        let asc = usage(&conn, date(2024, 4, 1), date(2024, 4, 30), false).unwrap();
        assert_eq!(
            asc,
            vec![
                LocationUsage { location: "Sloan 120".to_string(), accesses: 11 },
                LocationUsage { location: "Dana 215".to_string(), accesses: 23 },
            ]
        );

        let desc = usage(&conn, date(2024, 4, 1), date(2024, 4, 30), true).unwrap();
        assert_eq!(desc[0].location, "Dana 215");
    }

    #[test]
    fn test_usage_ties_ordered_by_location() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_records(
            &mut conn,
            &[
                record("Sloan", "120", 5, "04/11/2024"),
                record("Dana", "215", 5, "04/11/2024"),
            ],
        )
        .unwrap();

        let result = usage(&conn, date(2024, 4, 1), date(2024, 4, 30), true).unwrap();
        assert_eq!(result[0].location, "Dana 215");
        assert_eq!(result[1].location, "Sloan 120");
    }
}
