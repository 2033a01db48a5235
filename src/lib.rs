// Attendance Tracker - Core Library
// Report cleaning, loading and analytics for club room access logs

pub mod analytics;
pub mod cleaner;
pub mod clock;
pub mod clubs;
pub mod config;
pub mod db;
pub mod error;
pub mod record;

// Re-export commonly used types
pub use analytics::{
    room_activity, usage, ActivityPoint, ActivitySummary, Extreme, LocationUsage, RoomActivity,
    Window,
};
pub use cleaner::{
    clean_csv, default_output_path, extract_date, extract_number, find_reports, is_attendance_row,
    read_records, resolve_location, resolve_location_with, write_records, BuildingAlias,
    CleanReport, DropReason, DroppedRow, ReportCleaner, DEFAULT_ALIASES,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use clubs::{add_club, assign_club, get_clubs, get_room_assignments, Club, RoomAssignment};
pub use config::AppConfig;
pub use db::{
    count_records, export_records, get_all_records, get_locations, import_report, insert_records,
    load_cleaned, reset_input_data, setup_database, ImportOutcome, IngestEntry,
};
pub use error::{PipelineError, RecordError};
pub use record::{AttendanceRecord, HEADER};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
