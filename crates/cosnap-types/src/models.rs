use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Returned when a stored or submitted value does not parse into its domain type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Lowercase string enums as they appear both in JSON and in SQLite columns.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseError::new($kind, other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// The two marketplace roles.
    UserRole, "user role" {
        Photographer => "photographer",
        Cosplayer => "cosplayer",
    }
);

string_enum!(
    SlotStatus, "slot status" {
        Available => "available",
        Pending => "pending",
        Booked => "booked",
        Cancelled => "cancelled",
    }
);

string_enum!(
    BookingStatus, "booking status" {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
);

string_enum!(
    PaymentStatus, "payment status" {
        Unpaid => "unpaid",
        Paid => "paid",
        Refunded => "refunded",
    }
);

string_enum!(
    /// Which kind of profile a review is attached to.
    TargetType, "target type" {
        Photographer => "photographer",
        Cosplayer => "cosplayer",
    }
);

string_enum!(
    ReactionKind, "reaction kind" {
        Like => "like",
        Dislike => "dislike",
    }
);

impl BookingStatus {
    /// Accepted, rejected and cancelled requests never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Local wall-clock time of a slot boundary, always zero-padded `HH:MM`.
///
/// Zero padding makes the derived string ordering agree with chronological
/// ordering, so slot ranges compare without parsing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotTime(String);

impl SlotTime {
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let b = s.as_bytes();
        let shaped = b.len() == 5
            && b[2] == b':'
            && [b[0], b[1], b[3], b[4]].iter().all(u8::is_ascii_digit);
        if !shaped || NaiveTime::parse_from_str(s, "%H:%M").is_err() {
            return Err(ParseError::new("slot time", s));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SlotTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SlotTime {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SlotTime> for String {
    fn from(value: SlotTime) -> Self {
        value.0
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: String,
    pub photographer_id: String,
    pub convention_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub status: SlotStatus,
    pub price: f64,
    pub location: String,
    pub description: Option<String>,
    pub booked_by: Option<String>,
    pub booked_by_name: Option<String>,
    pub booked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: String,
    pub time_slot_id: String,
    pub photographer_id: String,
    pub cosplayer_id: String,
    pub requested_at: DateTime<Utc>,
    pub status: BookingStatus,
    pub message: Option<String>,
    pub cosplay_character: String,
    pub cosplay_reference: Option<String>,
    pub payment_status: PaymentStatus,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Denormalized preview of the newest message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub text: String,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: [String; 2],
    pub last_message: Option<LastMessage>,
    pub unread_counts: BTreeMap<String, u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread_counts.get(user_id).copied().unwrap_or(0)
    }

    /// The participant that is not `user_id`.
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        if !self.has_participant(user_id) {
            return None;
        }
        self.participants
            .iter()
            .find(|p| *p != user_id)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewAuthor {
    pub id: String,
    pub name: String,
    pub photo_url: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub author: ReviewAuthor,
    pub target_id: String,
    pub target_type: TargetType,
    pub rating: u8,
    pub title: String,
    pub comment: String,
    /// Year and month of the shoot, `YYYY-MM`.
    pub experience_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub likes: u32,
    pub dislikes: u32,
}

/// Cached aggregate of every review attached to one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub target_id: String,
    pub target_type: TargetType,
    pub average_rating: f64,
    pub total_reviews: u32,
    /// Index 0 holds the 1-star count, index 4 the 5-star count.
    pub rating_distribution: [u32; 5],
}

impl RatingSummary {
    pub fn empty(target_id: &str, target_type: TargetType) -> Self {
        Self {
            target_id: target_id.to_string(),
            target_type,
            average_rating: 0.0,
            total_reviews: 0,
            rating_distribution: [0; 5],
        }
    }

    /// Builds a summary from per-star counts.
    pub fn from_distribution(target_id: &str, target_type: TargetType, distribution: [u32; 5]) -> Self {
        let total: u32 = distribution.iter().sum();
        let weighted: u64 = distribution
            .iter()
            .enumerate()
            .map(|(i, count)| (i as u64 + 1) * u64::from(*count))
            .sum();
        let average_rating = if total == 0 {
            0.0
        } else {
            weighted as f64 / f64::from(total)
        };

        Self {
            target_id: target_id.to_string(),
            target_type,
            average_rating,
            total_reviews: total,
            rating_distribution: distribution,
        }
    }

    /// Number of reviews with exactly `stars` stars (1..=5).
    pub fn count(&self, stars: u8) -> u32 {
        match stars {
            1..=5 => self.rating_distribution[usize::from(stars - 1)],
            _ => 0,
        }
    }
}
