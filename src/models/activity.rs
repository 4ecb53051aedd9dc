use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ItemId, UserId};
use crate::error::{AppError, AppResult};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// A user's star rating of an item. One per (user, item).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rating submission; replaces any prior rating for the same pair
#[derive(Debug, Clone, PartialEq)]
pub struct NewRating {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub rating: i32,
    pub comment: String,
}

impl NewRating {
    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(AppError::InvalidInput(format!(
                "Rating must be between {} and {}, got {}",
                MIN_RATING, MAX_RATING, self.rating
            )));
        }
        Ok(())
    }
}

/// Outcome of a rating write, committed together with its aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingReceipt {
    pub rating: Rating,
    /// Item aggregate after recomputation
    pub aggregate_rating: f64,
    /// False when a previous rating by the same user was replaced
    pub created: bool,
}

/// First time a user watched an item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchEvent {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub watched_at: DateTime<Utc>,
}

/// Membership of an item in a user's watchlist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListEntry {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub added_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(value: i32) -> NewRating {
        NewRating {
            user_id: UserId(1),
            item_id: ItemId(1),
            rating: value,
            comment: String::new(),
        }
    }

    #[test]
    fn test_rating_bounds() {
        assert!(rating(1).validate().is_ok());
        assert!(rating(5).validate().is_ok());
        assert!(matches!(
            rating(0).validate(),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            rating(6).validate(),
            Err(AppError::InvalidInput(_))
        ));
    }
}
