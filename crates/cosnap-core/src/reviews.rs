use std::sync::Arc;

use tracing::{debug, info};

use cosnap_db::queries::{new_id, now, reviews};
use cosnap_db::{Change, Connection, Database};
use cosnap_types::models::{RatingSummary, ReactionKind, Review, ReviewAuthor, TargetType};

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct NewReview {
    pub author: ReviewAuthor,
    pub target_id: String,
    pub target_type: TargetType,
    pub rating: u8,
    pub title: String,
    pub comment: String,
    pub experience_date: Option<String>,
}

impl NewReview {
    fn validate(&self) -> ServiceResult<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(ServiceError::validation("rating must be between 1 and 5"));
        }
        if self.title.trim().is_empty() {
            return Err(ServiceError::validation("title is required"));
        }
        if self.comment.trim().is_empty() {
            return Err(ServiceError::validation("comment is required"));
        }
        if self.target_id.trim().is_empty() {
            return Err(ServiceError::validation("review target is required"));
        }
        if self.author.id == self.target_id {
            return Err(ServiceError::validation("cannot review yourself"));
        }
        if let Some(date) = &self.experience_date {
            if !is_year_month(date) {
                return Err(ServiceError::validation(format!(
                    "experience date must be YYYY-MM, got {date:?}"
                )));
            }
        }
        Ok(())
    }
}

fn is_year_month(s: &str) -> bool {
    let Some((year, month)) = s.split_once('-') else {
        return false;
    };
    year.len() == 4
        && month.len() == 2
        && year.bytes().all(|b| b.is_ascii_digit())
        && matches!(month.parse::<u8>(), Ok(1..=12))
}

/// Rebuild the cached summary from every stored review of the target.
fn recompute_in(conn: &Connection, target_id: &str, target_type: TargetType) -> anyhow::Result<RatingSummary> {
    let distribution = reviews::rating_distribution(conn, target_id, target_type)?;
    let summary = RatingSummary::from_distribution(target_id, target_type, distribution);
    reviews::upsert_summary(conn, &summary)?;
    Ok(summary)
}

/// Reviews of photographer and cosplayer profiles plus their rating summaries.
#[derive(Clone)]
pub struct ReviewAggregator {
    db: Arc<Database>,
}

impl ReviewAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn add_review(&self, new: NewReview) -> ServiceResult<Review> {
        new.validate()?;

        let review = Review {
            id: new_id(),
            author: new.author,
            target_id: new.target_id,
            target_type: new.target_type,
            rating: new.rating,
            title: new.title.trim().to_string(),
            comment: new.comment.trim().to_string(),
            experience_date: new.experience_date,
            created_at: now(),
            likes: 0,
            dislikes: 0,
        };

        let summary = self.db.with_tx(|tx| {
            reviews::insert(tx, &review)?;
            recompute_in(tx, &review.target_id, review.target_type)
        })?;

        self.db.publish(Change::Review {
            target_id: review.target_id.clone(),
        });
        info!(
            "Review {} by {} on {} {} ({} stars, average now {:.2})",
            review.id,
            review.author.id,
            review.target_type,
            review.target_id,
            review.rating,
            summary.average_rating
        );
        Ok(review)
    }

    pub fn delete_review(&self, id: &str, caller_id: &str) -> ServiceResult<()> {
        let review = self.db.with_tx(|tx| {
            let review = reviews::get(tx, id)?.ok_or_else(|| ServiceError::not_found(format!("review {id}")))?;
            if review.author.id != caller_id {
                return Err(ServiceError::permission("only the author can delete a review").into());
            }
            reviews::delete(tx, id)?;
            recompute_in(tx, &review.target_id, review.target_type)?;
            Ok(review)
        })?;

        self.db.publish(Change::Review {
            target_id: review.target_id.clone(),
        });
        info!("Review {} deleted by {}", id, caller_id);
        Ok(())
    }

    /// Add or remove one like/dislike. Counters never drop below zero.
    pub fn update_review_reaction(&self, id: &str, kind: ReactionKind, add: bool) -> ServiceResult<Review> {
        let delta = if add { 1 } else { -1 };
        let review = self.db.with_tx(|tx| {
            if !reviews::adjust_reaction(tx, id, kind, delta)? {
                return Err(ServiceError::not_found(format!("review {id}")).into());
            }
            reviews::get(tx, id)?.ok_or_else(|| ServiceError::not_found(format!("review {id}")).into())
        })?;

        self.db.publish(Change::Review {
            target_id: review.target_id.clone(),
        });
        debug!("Review {} {} {}", id, if add { "+" } else { "-" }, kind);
        Ok(review)
    }

    /// Newest first.
    pub fn get_reviews(&self, target_id: &str, target_type: TargetType) -> ServiceResult<Vec<Review>> {
        Ok(self
            .db
            .with_conn(|conn| reviews::list_for_target(conn, target_id, target_type))?)
    }

    pub fn get_rating_summary(&self, target_id: &str, target_type: TargetType) -> ServiceResult<RatingSummary> {
        let stored = self
            .db
            .with_conn(|conn| reviews::get_summary(conn, target_id, target_type))?;
        Ok(stored.unwrap_or_else(|| RatingSummary::empty(target_id, target_type)))
    }

    /// Repair entry point: rebuild the cached summary from the stored reviews.
    pub fn recompute(&self, target_id: &str, target_type: TargetType) -> ServiceResult<RatingSummary> {
        let summary = self.db.with_tx(|tx| recompute_in(tx, target_id, target_type))?;
        info!("Recomputed rating of {} {}", target_type, target_id);
        Ok(summary)
    }
}
