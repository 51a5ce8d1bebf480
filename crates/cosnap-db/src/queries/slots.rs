use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Row, params};

use cosnap_types::models::{SlotStatus, TimeSlot};

use super::{OptionalExt, parsed, timestamp, timestamp_opt, ts};

const COLUMNS: &str = "id, photographer_id, convention_id, date, start_time, end_time, status, price,
     location, description, booked_by, booked_by_name, booked_at, created_at";

/// Optional narrowing for slot listings. Date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotFilter {
    pub convention_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<SlotStatus>,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<TimeSlot> {
    Ok(TimeSlot {
        id: row.get(0)?,
        photographer_id: row.get(1)?,
        convention_id: row.get(2)?,
        date: parsed(row, 3)?,
        start_time: parsed(row, 4)?,
        end_time: parsed(row, 5)?,
        status: parsed(row, 6)?,
        price: row.get(7)?,
        location: row.get(8)?,
        description: row.get(9)?,
        booked_by: row.get(10)?,
        booked_by_name: row.get(11)?,
        booked_at: timestamp_opt(row, 12)?,
        created_at: timestamp(row, 13)?,
    })
}

pub fn insert(conn: &Connection, slot: &TimeSlot) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO time_slots ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"),
        params![
            slot.id,
            slot.photographer_id,
            slot.convention_id,
            slot.date.to_string(),
            slot.start_time.as_str(),
            slot.end_time.as_str(),
            slot.status.as_str(),
            slot.price,
            slot.location,
            slot.description,
            slot.booked_by,
            slot.booked_by_name,
            slot.booked_at.as_ref().map(ts),
            ts(&slot.created_at),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<TimeSlot>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM time_slots WHERE id = ?1"),
        [id],
        from_row,
    )
    .optional()
}

/// Slots of one photographer in storage order. Callers sort for display.
pub fn list_by_photographer(
    conn: &Connection,
    photographer_id: &str,
    filter: &SlotFilter,
) -> Result<Vec<TimeSlot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM time_slots
         WHERE photographer_id = ?1
           AND (?2 IS NULL OR convention_id = ?2)
           AND (?3 IS NULL OR date >= ?3)
           AND (?4 IS NULL OR date <= ?4)
           AND (?5 IS NULL OR status = ?5)"
    ))?;

    let rows = stmt
        .query_map(
            params![
                photographer_id,
                filter.convention_id,
                filter.from.map(|d| d.to_string()),
                filter.to.map(|d| d.to_string()),
                filter.status.map(|s| s.as_str()),
            ],
            from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Occupy a slot. Returns false when the row does not exist.
pub fn mark_booked(
    conn: &Connection,
    id: &str,
    user_id: &str,
    user_name: Option<&str>,
    at: &DateTime<Utc>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE time_slots
         SET status = 'booked', booked_by = ?2, booked_by_name = ?3, booked_at = ?4
         WHERE id = ?1",
        params![id, user_id, user_name, ts(at)],
    )?;
    Ok(changed > 0)
}

/// Return a slot to `available` and clear its occupant.
pub fn mark_available(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE time_slots
         SET status = 'available', booked_by = NULL, booked_by_name = NULL, booked_at = NULL
         WHERE id = ?1",
        [id],
    )?;
    Ok(changed > 0)
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM time_slots WHERE id = ?1", [id])?;
    Ok(changed > 0)
}
