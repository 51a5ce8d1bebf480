use anyhow::Result;
use rusqlite::{Connection, Row, params};

use cosnap_types::models::Message;

use super::{timestamp, ts};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        text: row.get(3)?,
        image_url: row.get(4)?,
        created_at: timestamp(row, 5)?,
        read: row.get(6)?,
    })
}

pub fn insert(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, text, image_url, created_at, read)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            message.id,
            message.conversation_id,
            message.sender_id,
            message.text,
            message.image_url,
            ts(&message.created_at),
            message.read,
        ],
    )?;
    Ok(())
}

/// Oldest first; insertion order breaks timestamp ties.
pub fn list(conn: &Connection, conversation_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, text, image_url, created_at, read
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt
        .query_map([conversation_id], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Mark every unread message not sent by `reader` as read. Returns how many changed.
pub fn mark_read_for(conn: &Connection, conversation_id: &str, reader: &str) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE messages SET read = 1
         WHERE conversation_id = ?1 AND sender_id != ?2 AND read = 0",
        params![conversation_id, reader],
    )?;
    Ok(changed)
}
