use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use cosnap_types::models::{BookingRequest, BookingStatus};

use super::{OptionalExt, parsed, timestamp, timestamp_opt, ts};

const COLUMNS: &str = "id, time_slot_id, photographer_id, cosplayer_id, requested_at, status, message,
     cosplay_character, cosplay_reference, payment_status, responded_at";

/// Which side of a request a listing is keyed on.
#[derive(Debug, Clone, Copy)]
pub enum BookingKey<'a> {
    Photographer(&'a str),
    Cosplayer(&'a str),
    TimeSlot(&'a str),
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<BookingRequest> {
    Ok(BookingRequest {
        id: row.get(0)?,
        time_slot_id: row.get(1)?,
        photographer_id: row.get(2)?,
        cosplayer_id: row.get(3)?,
        requested_at: timestamp(row, 4)?,
        status: parsed(row, 5)?,
        message: row.get(6)?,
        cosplay_character: row.get(7)?,
        cosplay_reference: row.get(8)?,
        payment_status: parsed(row, 9)?,
        responded_at: timestamp_opt(row, 10)?,
    })
}

pub fn insert(conn: &Connection, request: &BookingRequest) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO booking_requests ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        params![
            request.id,
            request.time_slot_id,
            request.photographer_id,
            request.cosplayer_id,
            ts(&request.requested_at),
            request.status.as_str(),
            request.message,
            request.cosplay_character,
            request.cosplay_reference,
            request.payment_status.as_str(),
            request.responded_at.as_ref().map(ts),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<BookingRequest>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM booking_requests WHERE id = ?1"),
        [id],
        from_row,
    )
    .optional()
}

/// Newest first.
pub fn list(conn: &Connection, key: BookingKey<'_>) -> Result<Vec<BookingRequest>> {
    let (column, value) = match key {
        BookingKey::Photographer(id) => ("photographer_id", id),
        BookingKey::Cosplayer(id) => ("cosplayer_id", id),
        BookingKey::TimeSlot(id) => ("time_slot_id", id),
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM booking_requests
         WHERE {column} = ?1
         ORDER BY requested_at DESC, rowid DESC"
    ))?;

    let rows = stmt
        .query_map([value], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn set_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    responded_at: Option<&DateTime<Utc>>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE booking_requests SET status = ?2, responded_at = COALESCE(?3, responded_at) WHERE id = ?1",
        params![id, status.as_str(), responded_at.map(ts)],
    )?;
    Ok(changed > 0)
}

/// The accepted request occupying a slot, if any.
pub fn accepted_for_slot(conn: &Connection, time_slot_id: &str) -> Result<Option<BookingRequest>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM booking_requests
             WHERE time_slot_id = ?1 AND status = 'accepted'
             LIMIT 1"
        ),
        [time_slot_id],
        from_row,
    )
    .optional()
}

/// Cancel every pending request against a slot. Returns the affected ids.
pub fn cancel_pending_for_slot(
    conn: &Connection,
    time_slot_id: &str,
    at: &DateTime<Utc>,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "UPDATE booking_requests SET status = 'cancelled', responded_at = ?2
         WHERE time_slot_id = ?1 AND status = 'pending'
         RETURNING id",
    )?;

    let ids = stmt
        .query_map(params![time_slot_id, ts(at)], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::{new_id, now};
    use cosnap_types::models::PaymentStatus;

    fn request(slot: &str, cosplayer: &str) -> BookingRequest {
        BookingRequest {
            id: new_id(),
            time_slot_id: slot.to_string(),
            photographer_id: "p1".into(),
            cosplayer_id: cosplayer.to_string(),
            requested_at: now(),
            status: BookingStatus::Pending,
            message: Some("golden hour please".into()),
            cosplay_character: "Frieren".into(),
            cosplay_reference: None,
            payment_status: PaymentStatus::Unpaid,
            responded_at: None,
        }
    }

    #[test]
    fn listing_and_status_updates() {
        let db = Database::open_in_memory().unwrap();
        let first = request("s1", "c1");
        let second = request("s1", "c2");
        let other = request("s2", "c1");

        db.with_conn(|conn| {
            for r in [&first, &second, &other] {
                insert(conn, r)?;
            }
            Ok(())
        })
        .unwrap();

        let for_slot = db.with_conn(|conn| list(conn, BookingKey::TimeSlot("s1"))).unwrap();
        assert_eq!(for_slot.len(), 2);
        // newest first
        assert_eq!(for_slot[0].id, second.id);

        let for_c1 = db.with_conn(|conn| list(conn, BookingKey::Cosplayer("c1"))).unwrap();
        assert_eq!(for_c1.len(), 2);

        let at = now();
        db.with_conn(|conn| set_status(conn, &first.id, BookingStatus::Accepted, Some(&at)))
            .unwrap();
        let accepted = db.with_conn(|conn| accepted_for_slot(conn, "s1")).unwrap().unwrap();
        assert_eq!(accepted.id, first.id);
        assert_eq!(accepted.responded_at, Some(at));

        let cancelled = db.with_conn(|conn| cancel_pending_for_slot(conn, "s1", &at)).unwrap();
        assert_eq!(cancelled, vec![second.id.clone()]);
        let second_now = db.with_conn(|conn| get(conn, &second.id)).unwrap().unwrap();
        assert_eq!(second_now.status, BookingStatus::Cancelled);
    }
}
