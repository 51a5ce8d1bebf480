use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{ReactionKind, SlotStatus, SlotTime, TargetType, UserRole};

// -- JWT Claims --

/// Claims carried by tokens from the identity provider. Shared by the REST
/// middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub picture: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Time slots --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSlotRequest {
    #[serde(default)]
    pub convention_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub price: f64,
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSlotsRequest {
    pub slots: Vec<CreateSlotRequest>,
}

/// `POST /slots` accepts one slot or a `{"slots": [...]}` batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SlotSubmission {
    Batch(CreateSlotsRequest),
    Single(CreateSlotRequest),
}

#[derive(Debug, Default, Deserialize)]
pub struct SlotQuery {
    pub convention_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<SlotStatus>,
}

// -- Booking requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBookingRequestBody {
    pub time_slot_id: String,
    pub photographer_id: String,
    #[serde(default)]
    pub message: Option<String>,
    pub cosplay_character: String,
    #[serde(default)]
    pub cosplay_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    #[serde(rename = "as")]
    pub role: UserRole,
}

// -- Messaging --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub other_user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub total: u64,
}

// -- Reviews --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReviewRequest {
    pub target_id: String,
    pub target_type: TargetType,
    pub rating: u8,
    pub title: String,
    pub comment: String,
    #[serde(default)]
    pub experience_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionRequest {
    pub kind: ReactionKind,
    pub add: bool,
}

// -- Uploads --

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_submission_accepts_single_or_batch() {
        let single: SlotSubmission = serde_json::from_str(
            r#"{"date":"2026-11-02","start_time":"10:00","end_time":"10:30","price":40,"location":"Hall B"}"#,
        )
        .unwrap();
        assert!(matches!(single, SlotSubmission::Single(ref s) if s.start_time.as_str() == "10:00"));

        let batch: SlotSubmission = serde_json::from_str(
            r#"{"slots":[
                {"date":"2026-11-02","start_time":"10:00","end_time":"10:30","price":40,"location":"Hall B"},
                {"date":"2026-11-02","start_time":"11:00","end_time":"11:30","price":40,"location":"Hall B"}
            ]}"#,
        )
        .unwrap();
        assert!(matches!(batch, SlotSubmission::Batch(ref b) if b.slots.len() == 2));
    }

    #[test]
    fn malformed_slot_time_is_rejected() {
        let bad = serde_json::from_str::<CreateSlotRequest>(
            r#"{"date":"2026-11-02","start_time":"9:00","end_time":"10:30","price":40,"location":"Hall B"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn booking_list_query_uses_as() {
        let q: BookingListQuery = serde_json::from_str(r#"{"as":"photographer"}"#).unwrap();
        assert_eq!(q.role, UserRole::Photographer);
    }
}
