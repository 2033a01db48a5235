use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use attendance_tracker::{
    analytics, clean_csv, clubs, db, find_reports, import_report, AppConfig, Clock, Club,
    DropReason, ImportOutcome, SystemClock, Window,
};

#[derive(Debug, Parser)]
#[command(name = "attendance-tracker")]
#[command(about = "Clean club room access reports and query attendance")]
struct Cli {
    /// Settings file (defaults to ./attendance.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Clean a raw access report into the six-column format.
    Clean(CleanArgs),
    /// Clean raw access reports and load them into the database.
    Import(ImportArgs),
    /// List every building/room pair in the database.
    Locations,
    /// Accesses of one room over time.
    Activity(ActivityArgs),
    /// Total accesses per room.
    Usage(UsageArgs),
    /// Write every stored record to a cleaned-format CSV, oldest first.
    Export(ExportArgs),
    /// Load an already-cleaned six-column CSV without re-cleaning it.
    Load(LoadArgs),
    /// Club registry and room assignments.
    #[command(subcommand)]
    Club(ClubCommand),
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Destination CSV
    output: PathBuf,
    /// Empty the attendance table after a successful export
    #[arg(long)]
    reset: bool,
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Cleaned CSV with the fixed header
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
enum ClubCommand {
    /// Register a club; an existing club of the same name is left unchanged.
    Add(ClubAddArgs),
    /// Assign a room to a club; a room that already has a club is left unchanged.
    Assign(ClubAssignArgs),
    /// List clubs and room assignments.
    List,
}

#[derive(Debug, Args)]
struct ClubAddArgs {
    name: String,
    #[arg(long)]
    president: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    size: u32,
    #[arg(long)]
    advisor: String,
    #[arg(long)]
    advisor_email: String,
}

#[derive(Debug, Args)]
struct ClubAssignArgs {
    building: String,
    room: String,
    club: String,
}

#[derive(Debug, Args)]
struct CleanArgs {
    /// Raw report CSV
    input: PathBuf,
    /// Where to write the cleaned CSV
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Raw report CSV; every report in the download directory when omitted
    input: Option<PathBuf>,
    /// Where to write the cleaned CSV (single input only)
    #[arg(long, requires = "input")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RangeArgs {
    /// Relative window, e.g. "2 weeks", "3 months", "1 year"
    #[arg(long, conflicts_with_all = ["start", "end"])]
    window: Option<String>,
    /// Start date (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,
    /// End date (YYYY-MM-DD)
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl RangeArgs {
    fn window(&self) -> Result<Window> {
        match (&self.window, self.start, self.end) {
            (Some(text), _, _) => Window::parse(text),
            (None, Some(start), Some(end)) => Ok(Window::Custom { start, end }),
            _ => bail!("give either --window or both --start and --end"),
        }
    }
}

#[derive(Debug, Args)]
struct ActivityArgs {
    building: String,
    room: String,
    #[command(flatten)]
    range: RangeArgs,
}

#[derive(Debug, Args)]
struct UsageArgs {
    #[command(flatten)]
    range: RangeArgs,
    /// Busiest rooms first
    #[arg(long)]
    descending: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Clean(args) => run_clean(&config, args),
        Command::Import(args) => run_import(&config, args),
        Command::Locations => run_locations(&config),
        Command::Activity(args) => run_activity(&config, args),
        Command::Usage(args) => run_usage(&config, args),
        Command::Export(args) => run_export(&config, args),
        Command::Load(args) => run_load(&config, args),
        Command::Club(command) => run_club(&config, command),
    }
}

fn run_clean(config: &AppConfig, args: CleanArgs) -> Result<()> {
    let output = args
        .output
        .unwrap_or_else(|| config.output_path_for(&args.input));

    println!("🧹 Cleaning {}", args.input.display());
    let report = clean_csv(&args.input, Some(output.as_path()), &SystemClock)?;

    println!("✓ Cleaned data saved to {}", report.output_path.display());
    println!("✓ Processed {} entries", report.accepted());
    print_drops(&report);

    Ok(())
}

fn run_import(config: &AppConfig, args: ImportArgs) -> Result<()> {
    let inputs = match &args.input {
        Some(input) => vec![input.clone()],
        None => find_reports(&config.download_dir, &config.output_prefix)?,
    };
    if inputs.is_empty() {
        println!("No reports found in {}", config.download_dir.display());
        return Ok(());
    }

    let mut conn = db::open(&config.db_path)?;
    println!("🗄️  Importing {} report(s) → {}", inputs.len(), config.db_path.display());

    for input in &inputs {
        let output = match &args.output {
            Some(path) => path.clone(),
            None => config.output_path_for(input),
        };

        println!("\n📂 {}", input.display());
        match import_report(&mut conn, input, Some(output.as_path()), &SystemClock)? {
            ImportOutcome::AlreadyIngested { source_hash } => {
                println!("✓ Already imported (sha256 {}), skipping", &source_hash[..12]);
            }
            ImportOutcome::Imported {
                run_id,
                report,
                inserted,
            } => {
                println!("✓ Cleaned data saved to {}", report.output_path.display());
                print_drops(&report);
                println!("✓ Inserted {} rows (run {})", inserted, run_id);
            }
        }
    }

    println!("\n✓ Database contains {} rows", db::count_records(&conn)?);

    Ok(())
}

fn run_locations(config: &AppConfig) -> Result<()> {
    let conn = db::open(&config.db_path)?;
    for (building, room) in db::get_locations(&conn)? {
        println!("{} {}", building, room);
    }
    Ok(())
}

fn run_activity(config: &AppConfig, args: ActivityArgs) -> Result<()> {
    let conn = db::open(&config.db_path)?;
    let (start, end) = args.range.window()?.resolve(SystemClock.today())?;

    let activity = analytics::room_activity(&conn, &args.building, &args.room, start, end)?;

    if args.range.json {
        println!("{}", serde_json::to_string_pretty(&activity)?);
        return Ok(());
    }

    println!("📊 {} ({} → {})", activity.label(), start, end);
    for point in &activity.points {
        println!("  {}  {:>6}", point.date, point.times_accessed);
    }
    match &activity.summary {
        Some(summary) => {
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            println!("  Min    {:>8}  {}", summary.min.value, summary.min.date);
            println!("  Avg    {:>8.1}  -", summary.average);
            println!("  Max    {:>8}  {}", summary.max.value, summary.max.date);
            println!("  Total  {:>8}  -", summary.total);
        }
        None => println!("  No entries in range"),
    }

    Ok(())
}

fn run_usage(config: &AppConfig, args: UsageArgs) -> Result<()> {
    let conn = db::open(&config.db_path)?;
    let (start, end) = args.range.window()?.resolve(SystemClock.today())?;

    let usage = analytics::usage(&conn, start, end, args.descending)?;

    if args.range.json {
        println!("{}", serde_json::to_string_pretty(&usage)?);
        return Ok(());
    }

    println!("📊 Room usage ({} → {})", start, end);
    for entry in &usage {
        println!("  {:<16} {:>8}", entry.location, entry.accesses);
    }
    if usage.is_empty() {
        println!("  No entries in range");
    }

    Ok(())
}

fn run_export(config: &AppConfig, args: ExportArgs) -> Result<()> {
    let conn = db::open(&config.db_path)?;

    let exported = db::export_records(&conn, &args.output)?;
    println!("✓ Exported {} rows to {}", exported, args.output.display());

    if args.reset {
        let deleted = db::reset_input_data(&conn)?;
        println!("✓ Cleared {} rows from the database", deleted);
    }

    Ok(())
}

fn run_load(config: &AppConfig, args: LoadArgs) -> Result<()> {
    let mut conn = db::open(&config.db_path)?;

    println!("📂 Loading {}", args.input.display());
    let inserted = db::load_cleaned(&mut conn, &args.input)?;
    println!("✓ Inserted {} rows", inserted);
    println!("✓ Database contains {} rows", db::count_records(&conn)?);

    Ok(())
}

fn run_club(config: &AppConfig, command: ClubCommand) -> Result<()> {
    let conn = db::open(&config.db_path)?;

    match command {
        ClubCommand::Add(args) => {
            let club = Club {
                club_name: args.name,
                club_president: args.president,
                email: args.email,
                club_size: args.size,
                club_advisor: args.advisor,
                club_advisor_email: args.advisor_email,
            };
            if clubs::add_club(&conn, &club)? {
                println!("✓ Added club {}", club.club_name);
            } else {
                println!("Club already exists: {}", club.club_name);
            }
        }
        ClubCommand::Assign(args) => {
            if clubs::assign_club(&conn, &args.building, &args.room, &args.club)? {
                println!("✓ Assigned {} {} to {}", args.building, args.room, args.club);
            } else {
                println!("{} {} already has a club, unchanged", args.building, args.room);
            }
        }
        ClubCommand::List => {
            for club in clubs::get_clubs(&conn)? {
                println!(
                    "{} ({} members) president {} <{}>, advisor {} <{}>",
                    club.club_name,
                    club.club_size,
                    club.club_president,
                    club.email,
                    club.club_advisor,
                    club.club_advisor_email
                );
            }
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            for assignment in clubs::get_room_assignments(&conn)? {
                println!(
                    "  {} {}  →  {}",
                    assignment.building, assignment.room_num, assignment.assigned_club
                );
            }
        }
    }

    Ok(())
}

fn print_drops(report: &attendance_tracker::CleanReport) {
    let unknown = report.dropped_for(DropReason::UnknownBuilding);
    let no_room = report.dropped_for(DropReason::MissingRoom);
    if unknown + no_room > 0 {
        println!(
            "  ({} patron rows skipped: {} unknown building, {} without room)",
            unknown + no_room,
            unknown,
            no_room
        );
    }
}
