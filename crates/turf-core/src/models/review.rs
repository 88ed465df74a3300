//! Review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Lowest accepted rating
pub const MIN_RATING: i32 = 1;

/// Highest accepted rating
pub const MAX_RATING: i32 = 5;

/// Review submission
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReviewRequest {
    pub requester_id: i64,
    pub resource_id: i64,
    /// Completed reservation the review refers to
    pub reservation_id: Option<Uuid>,
    pub rating: i32,
    #[validate(length(max = 1000, message = "Review text must be at most 1000 characters"))]
    pub text: Option<String>,
}

/// Review entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub requester_id: i64,
    pub resource_id: i64,
    pub reservation_id: Option<Uuid>,
    pub rating: i32,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(request: &ReviewRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requester_id: request.requester_id,
            resource_id: request.resource_id,
            reservation_id: request.reservation_id,
            rating: request.rating,
            text: request.text.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_valid_rating(rating: i32) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&rating)
    }
}
