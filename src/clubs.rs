// 🏷️ Club registry - which clubs exist and which room each one holds
//
// A club is registered once by name; a room is assigned once. Both inserts
// are insert-if-absent, so repeating a registration never overwrites it.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RecordError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub club_name: String,
    pub club_president: String,
    pub email: String,
    pub club_size: u32,
    pub club_advisor: String,
    pub club_advisor_email: String,
}

impl Club {
    /// Build a club from six cells: name, president, email, size, advisor,
    /// advisor email. Size must be a non-negative integer.
    pub fn from_list<S: AsRef<str>>(cells: &[S]) -> Result<Self, RecordError> {
        match cells {
            [name, president, email, size, advisor, advisor_email] => Ok(Club {
                club_name: name.as_ref().to_string(),
                club_president: president.as_ref().to_string(),
                email: email.as_ref().to_string(),
                club_size: size.as_ref().trim().parse().map_err(|_| {
                    RecordError::InvalidInteger {
                        column: "club_size",
                        value: size.as_ref().to_string(),
                    }
                })?,
                club_advisor: advisor.as_ref().to_string(),
                club_advisor_email: advisor_email.as_ref().to_string(),
            }),
            _ => Err(RecordError::WrongColumnCount {
                expected: 6,
                found: cells.len(),
            }),
        }
    }
}

/// One room-to-club assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAssignment {
    pub building: String,
    pub room_num: String,
    pub assigned_club: String,
}

/// Register a club. Returns `false` when a club with that name already exists.
pub fn add_club(conn: &Connection, club: &Club) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO club_data (
                club_name, club_president, email, club_size, club_advisor, club_advisor_email
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                club.club_name,
                club.club_president,
                club.email,
                club.club_size,
                club.club_advisor,
                club.club_advisor_email,
            ],
        )
        .with_context(|| format!("Failed to add club {}", club.club_name))?;

    if inserted > 0 {
        info!(club = %club.club_name, "registered club");
    }
    Ok(inserted > 0)
}

/// Assign a room to a club. Returns `false` when the room already has one;
/// the existing assignment is left as it is.
pub fn assign_club(
    conn: &Connection,
    building: &str,
    room_num: &str,
    club_name: &str,
) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO room_log (building, room_num, assigned_club)
             VALUES (?1, ?2, ?3)",
            params![building, room_num, club_name],
        )
        .with_context(|| format!("Failed to assign {} {} to {}", building, room_num, club_name))?;

    if inserted > 0 {
        info!(building, room_num, club = club_name, "assigned room");
    }
    Ok(inserted > 0)
}

pub fn get_club(conn: &Connection, club_name: &str) -> Result<Option<Club>> {
    let club = conn
        .query_row(
            "SELECT club_name, club_president, email, club_size, club_advisor, club_advisor_email
             FROM club_data
             WHERE club_name = ?1",
            [club_name],
            row_to_club,
        )
        .optional()?;

    Ok(club)
}

pub fn get_clubs(conn: &Connection) -> Result<Vec<Club>> {
    let mut stmt = conn.prepare(
        "SELECT club_name, club_president, email, club_size, club_advisor, club_advisor_email
         FROM club_data
         ORDER BY club_name",
    )?;

    let clubs = stmt
        .query_map([], row_to_club)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(clubs)
}

/// Every assignment, ordered by building then room
pub fn get_room_assignments(conn: &Connection) -> Result<Vec<RoomAssignment>> {
    let mut stmt = conn.prepare(
        "SELECT building, room_num, assigned_club
         FROM room_log
         ORDER BY building, room_num",
    )?;

    let assignments = stmt
        .query_map([], |row| {
            Ok(RoomAssignment {
                building: row.get(0)?,
                room_num: row.get(1)?,
                assigned_club: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(assignments)
}

fn row_to_club(row: &rusqlite::Row<'_>) -> rusqlite::Result<Club> {
    Ok(Club {
        club_name: row.get(0)?,
        club_president: row.get(1)?,
        email: row.get(2)?,
        club_size: row.get(3)?,
        club_advisor: row.get(4)?,
        club_advisor_email: row.get(5)?,
    })
}
