use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE time_slots (
                id              TEXT PRIMARY KEY,
                photographer_id TEXT NOT NULL,
                convention_id   TEXT,
                date            TEXT NOT NULL,
                start_time      TEXT NOT NULL,
                end_time        TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'available',
                price           REAL NOT NULL,
                location        TEXT NOT NULL,
                description     TEXT,
                booked_by       TEXT,
                booked_by_name  TEXT,
                booked_at       TEXT,
                created_at      TEXT NOT NULL,
                CHECK (start_time < end_time),
                CHECK (price >= 0)
            );

            CREATE INDEX idx_time_slots_photographer
                ON time_slots(photographer_id, date, start_time);

            -- No foreign key to time_slots: requests outlive a deleted slot
            -- as cancelled history.
            CREATE TABLE booking_requests (
                id                TEXT PRIMARY KEY,
                time_slot_id      TEXT NOT NULL,
                photographer_id   TEXT NOT NULL,
                cosplayer_id      TEXT NOT NULL,
                requested_at      TEXT NOT NULL,
                status            TEXT NOT NULL DEFAULT 'pending',
                message           TEXT,
                cosplay_character TEXT NOT NULL,
                cosplay_reference TEXT,
                payment_status    TEXT NOT NULL DEFAULT 'unpaid',
                responded_at      TEXT
            );

            CREATE INDEX idx_booking_requests_slot
                ON booking_requests(time_slot_id, status);
            CREATE INDEX idx_booking_requests_photographer
                ON booking_requests(photographer_id, requested_at);
            CREATE INDEX idx_booking_requests_cosplayer
                ON booking_requests(cosplayer_id, requested_at);

            -- participant_a < participant_b, so each pair maps to one row
            CREATE TABLE conversations (
                id              TEXT PRIMARY KEY,
                participant_a   TEXT NOT NULL,
                participant_b   TEXT NOT NULL,
                unread_a        INTEGER NOT NULL DEFAULT 0,
                unread_b        INTEGER NOT NULL DEFAULT 0,
                last_text       TEXT,
                last_sender_id  TEXT,
                last_sent_at    TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                UNIQUE(participant_a, participant_b),
                CHECK (participant_a < participant_b),
                CHECK (unread_a >= 0 AND unread_b >= 0)
            );

            CREATE INDEX idx_conversations_b ON conversations(participant_b);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id       TEXT NOT NULL,
                text            TEXT NOT NULL,
                image_url       TEXT,
                created_at      TEXT NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            CREATE TABLE reviews (
                id               TEXT PRIMARY KEY,
                author_id        TEXT NOT NULL,
                author_name      TEXT NOT NULL,
                author_photo_url TEXT,
                author_role      TEXT NOT NULL,
                target_id        TEXT NOT NULL,
                target_type      TEXT NOT NULL,
                rating           INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                title            TEXT NOT NULL,
                comment          TEXT NOT NULL,
                experience_date  TEXT,
                created_at       TEXT NOT NULL,
                likes            INTEGER NOT NULL DEFAULT 0,
                dislikes         INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_reviews_target
                ON reviews(target_id, target_type, created_at);

            CREATE TABLE rating_summaries (
                target_id      TEXT NOT NULL,
                target_type    TEXT NOT NULL,
                average_rating REAL NOT NULL,
                total_reviews  INTEGER NOT NULL,
                stars_1        INTEGER NOT NULL,
                stars_2        INTEGER NOT NULL,
                stars_3        INTEGER NOT NULL,
                stars_4        INTEGER NOT NULL,
                stars_5        INTEGER NOT NULL,
                updated_at     TEXT NOT NULL,
                PRIMARY KEY (target_id, target_type)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_rerunnable() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
