use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::{Connection, Row, params};

use cosnap_types::models::{Conversation, LastMessage};

use super::{OptionalExt, timestamp, timestamp_opt, ts};

const COLUMNS: &str = "id, participant_a, participant_b, unread_a, unread_b, last_text, last_sender_id,
     last_sent_at, created_at, updated_at";

/// Order a participant pair the way the `conversations` table stores it.
pub fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let a: String = row.get(1)?;
    let b: String = row.get(2)?;
    let unread_a: u32 = row.get(3)?;
    let unread_b: u32 = row.get(4)?;

    let last_text: Option<String> = row.get(5)?;
    let last_sender: Option<String> = row.get(6)?;
    let last_sent_at = timestamp_opt(row, 7)?;
    let last_message = match (last_text, last_sender, last_sent_at) {
        (Some(text), Some(sender_id), Some(sent_at)) => Some(LastMessage {
            text,
            sender_id,
            sent_at,
        }),
        _ => None,
    };

    let unread_counts = BTreeMap::from([(a.clone(), unread_a), (b.clone(), unread_b)]);

    Ok(Conversation {
        id: row.get(0)?,
        participants: [a, b],
        last_message,
        unread_counts,
        created_at: timestamp(row, 8)?,
        updated_at: timestamp(row, 9)?,
    })
}

/// Insert a conversation. Participants are stored in sorted order; the
/// unread counters start from the values in `conversation.unread_counts`.
pub fn insert(conn: &Connection, conversation: &Conversation) -> Result<()> {
    let [p, q] = &conversation.participants;
    let (a, b) = ordered_pair(p, q);

    conn.execute(
        &format!("INSERT INTO conversations ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, NULL, ?6, ?7)"),
        params![
            conversation.id,
            a,
            b,
            conversation.unread_for(a),
            conversation.unread_for(b),
            ts(&conversation.created_at),
            ts(&conversation.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"),
        [id],
        from_row,
    )
    .optional()
}

/// The conversation between two users, in either argument order.
pub fn find_by_pair(conn: &Connection, user_a: &str, user_b: &str) -> Result<Option<Conversation>> {
    let (a, b) = ordered_pair(user_a, user_b);
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM conversations WHERE participant_a = ?1 AND participant_b = ?2"),
        [a, b],
        from_row,
    )
    .optional()
}

/// Most recently updated first.
pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Conversation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM conversations
         WHERE participant_a = ?1 OR participant_b = ?1
         ORDER BY updated_at DESC, rowid DESC"
    ))?;

    let rows = stmt
        .query_map([user_id], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Store the last-message preview and bump the unread counter of every
/// participant except the sender.
pub fn record_message(conn: &Connection, conversation_id: &str, last: &LastMessage) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE conversations
         SET last_text = ?2,
             last_sender_id = ?3,
             last_sent_at = ?4,
             updated_at = ?4,
             unread_a = unread_a + (CASE WHEN participant_a = ?3 THEN 0 ELSE 1 END),
             unread_b = unread_b + (CASE WHEN participant_b = ?3 THEN 0 ELSE 1 END)
         WHERE id = ?1",
        params![conversation_id, last.text, last.sender_id, ts(&last.sent_at)],
    )?;
    Ok(changed > 0)
}

/// Zero one participant's unread counter. Returns whether it was non-zero.
pub fn reset_unread(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE conversations
         SET unread_a = CASE WHEN participant_a = ?2 THEN 0 ELSE unread_a END,
             unread_b = CASE WHEN participant_b = ?2 THEN 0 ELSE unread_b END
         WHERE id = ?1
           AND ((participant_a = ?2 AND unread_a > 0) OR (participant_b = ?2 AND unread_b > 0))",
        params![conversation_id, user_id],
    )?;
    Ok(changed > 0)
}

/// Sum of a user's unread counters across all their conversations.
pub fn total_unread(conn: &Connection, user_id: &str) -> Result<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN participant_a = ?1 THEN unread_a ELSE unread_b END), 0)
         FROM conversations
         WHERE participant_a = ?1 OR participant_b = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(u64::try_from(total)?)
}
