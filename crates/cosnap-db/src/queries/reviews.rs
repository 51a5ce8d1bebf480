use anyhow::Result;
use rusqlite::{Connection, Row, params};

use cosnap_types::models::{ReactionKind, RatingSummary, Review, ReviewAuthor, TargetType};

use super::{OptionalExt, now, parsed, timestamp, ts};

const COLUMNS: &str = "id, author_id, author_name, author_photo_url, author_role, target_id, target_type,
     rating, title, comment, experience_date, created_at, likes, dislikes";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        author: ReviewAuthor {
            id: row.get(1)?,
            name: row.get(2)?,
            photo_url: row.get(3)?,
            role: parsed(row, 4)?,
        },
        target_id: row.get(5)?,
        target_type: parsed(row, 6)?,
        rating: row.get(7)?,
        title: row.get(8)?,
        comment: row.get(9)?,
        experience_date: row.get(10)?,
        created_at: timestamp(row, 11)?,
        likes: row.get(12)?,
        dislikes: row.get(13)?,
    })
}

pub fn insert(conn: &Connection, review: &Review) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO reviews ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            review.id,
            review.author.id,
            review.author.name,
            review.author.photo_url,
            review.author.role.as_str(),
            review.target_id,
            review.target_type.as_str(),
            review.rating,
            review.title,
            review.comment,
            review.experience_date,
            ts(&review.created_at),
            review.likes,
            review.dislikes,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Review>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM reviews WHERE id = ?1"),
        [id],
        from_row,
    )
    .optional()
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM reviews WHERE id = ?1", [id])?;
    Ok(changed > 0)
}

/// Newest first.
pub fn list_for_target(conn: &Connection, target_id: &str, target_type: TargetType) -> Result<Vec<Review>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM reviews
         WHERE target_id = ?1 AND target_type = ?2
         ORDER BY created_at DESC, rowid DESC"
    ))?;

    let rows = stmt
        .query_map(params![target_id, target_type.as_str()], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Per-star review counts for one target, from a full scan of its reviews.
pub fn rating_distribution(conn: &Connection, target_id: &str, target_type: TargetType) -> Result<[u32; 5]> {
    let mut stmt = conn.prepare(
        "SELECT rating, COUNT(*) FROM reviews
         WHERE target_id = ?1 AND target_type = ?2
         GROUP BY rating",
    )?;

    let mut distribution = [0u32; 5];
    let rows = stmt.query_map(params![target_id, target_type.as_str()], |row| {
        Ok((row.get::<_, u8>(0)?, row.get::<_, u32>(1)?))
    })?;
    for row in rows {
        let (rating, count) = row?;
        if (1..=5).contains(&rating) {
            distribution[usize::from(rating - 1)] = count;
        }
    }

    Ok(distribution)
}

pub fn upsert_summary(conn: &Connection, summary: &RatingSummary) -> Result<()> {
    let [s1, s2, s3, s4, s5] = summary.rating_distribution;
    conn.execute(
        "INSERT INTO rating_summaries
             (target_id, target_type, average_rating, total_reviews,
              stars_1, stars_2, stars_3, stars_4, stars_5, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT (target_id, target_type) DO UPDATE SET
             average_rating = excluded.average_rating,
             total_reviews = excluded.total_reviews,
             stars_1 = excluded.stars_1,
             stars_2 = excluded.stars_2,
             stars_3 = excluded.stars_3,
             stars_4 = excluded.stars_4,
             stars_5 = excluded.stars_5,
             updated_at = excluded.updated_at",
        params![
            summary.target_id,
            summary.target_type.as_str(),
            summary.average_rating,
            summary.total_reviews,
            s1,
            s2,
            s3,
            s4,
            s5,
            ts(&now()),
        ],
    )?;
    Ok(())
}

pub fn get_summary(conn: &Connection, target_id: &str, target_type: TargetType) -> Result<Option<RatingSummary>> {
    conn.query_row(
        "SELECT target_id, target_type, average_rating, total_reviews,
                stars_1, stars_2, stars_3, stars_4, stars_5
         FROM rating_summaries
         WHERE target_id = ?1 AND target_type = ?2",
        params![target_id, target_type.as_str()],
        |row| {
            Ok(RatingSummary {
                target_id: row.get(0)?,
                target_type: parsed(row, 1)?,
                average_rating: row.get(2)?,
                total_reviews: row.get(3)?,
                rating_distribution: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
            })
        },
    )
    .optional()
}

/// Add `delta` to a review's like or dislike counter, clamped at zero.
/// Returns false when the review does not exist.
pub fn adjust_reaction(conn: &Connection, id: &str, kind: ReactionKind, delta: i64) -> Result<bool> {
    let column = match kind {
        ReactionKind::Like => "likes",
        ReactionKind::Dislike => "dislikes",
    };
    let changed = conn.execute(
        &format!("UPDATE reviews SET {column} = MAX({column} + ?2, 0) WHERE id = ?1"),
        params![id, delta],
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::new_id;
    use cosnap_types::models::UserRole;

    fn review(target: &str, rating: u8) -> Review {
        Review {
            id: new_id(),
            author: ReviewAuthor {
                id: "c1".into(),
                name: "Rin".into(),
                photo_url: None,
                role: UserRole::Cosplayer,
            },
            target_id: target.to_string(),
            target_type: TargetType::Photographer,
            rating,
            title: "Great shoot".into(),
            comment: "Knew the venue well".into(),
            experience_date: Some("2026-03".into()),
            created_at: now(),
            likes: 0,
            dislikes: 0,
        }
    }

    #[test]
    fn distribution_counts_each_star() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert(conn, &review("p1", 5))?;
            insert(conn, &review("p1", 5))?;
            insert(conn, &review("p1", 2))?;
            insert(conn, &review("p2", 1))?;
            Ok(())
        })
        .unwrap();

        let dist = db
            .with_conn(|conn| rating_distribution(conn, "p1", TargetType::Photographer))
            .unwrap();
        assert_eq!(dist, [0, 1, 0, 0, 2]);

        let none = db
            .with_conn(|conn| rating_distribution(conn, "p1", TargetType::Cosplayer))
            .unwrap();
        assert_eq!(none, [0; 5]);
    }

    #[test]
    fn rating_outside_range_is_refused_by_schema() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.with_conn(|conn| insert(conn, &review("p1", 6))).is_err());
    }

    #[test]
    fn summary_upsert_and_reactions() {
        let db = Database::open_in_memory().unwrap();
        let summary = RatingSummary::from_distribution("p1", TargetType::Photographer, [1, 0, 0, 0, 1]);
        db.with_conn(|conn| upsert_summary(conn, &summary)).unwrap();
        let again = RatingSummary::from_distribution("p1", TargetType::Photographer, [0, 0, 0, 0, 1]);
        db.with_conn(|conn| upsert_summary(conn, &again)).unwrap();

        let stored = db
            .with_conn(|conn| get_summary(conn, "p1", TargetType::Photographer))
            .unwrap()
            .unwrap();
        assert_eq!(stored, again);

        let r = review("p1", 4);
        db.with_conn(|conn| insert(conn, &r)).unwrap();
        db.with_conn(|conn| adjust_reaction(conn, &r.id, ReactionKind::Like, 1)).unwrap();
        db.with_conn(|conn| adjust_reaction(conn, &r.id, ReactionKind::Dislike, -1)).unwrap();
        let stored = db.with_conn(|conn| get(conn, &r.id)).unwrap().unwrap();
        assert_eq!((stored.likes, stored.dislikes), (1, 0));
        assert!(!db.with_conn(|conn| adjust_reaction(conn, "missing", ReactionKind::Like, 1)).unwrap());
    }
}
