use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use super::{ItemId, UserId};
use crate::error::AppError;

/// Weight recorded for a watch
pub const WATCHED_WEIGHT: f64 = 2.0;

/// Weight recorded for a list addition
pub const LISTED_WEIGHT: f64 = 1.0;

/// What the user did with an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Watched,
    Rated,
    Listed,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 3] = [
        InteractionKind::Watched,
        InteractionKind::Rated,
        InteractionKind::Listed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Watched => "watched",
            InteractionKind::Rated => "rated",
            InteractionKind::Listed => "listed",
        }
    }

    /// Fixed weight for kinds that have one; rated interactions carry the rating value
    pub fn fixed_weight(&self) -> Option<f64> {
        match self {
            InteractionKind::Watched => Some(WATCHED_WEIGHT),
            InteractionKind::Listed => Some(LISTED_WEIGHT),
            InteractionKind::Rated => None,
        }
    }
}

impl Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watched" => Ok(InteractionKind::Watched),
            "rated" => Ok(InteractionKind::Rated),
            "listed" => Ok(InteractionKind::Listed),
            other => Err(AppError::InvalidInput(format!(
                "Unknown interaction kind '{}'",
                other
            ))),
        }
    }
}

/// A recorded (user, item, kind) fact. At most one exists per triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub kind: InteractionKind,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

/// Interaction to insert if its (user, item, kind) key is absent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewInteraction {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub kind: InteractionKind,
    pub weight: f64,
}

impl NewInteraction {
    pub fn watched(user_id: UserId, item_id: ItemId) -> Self {
        Self {
            user_id,
            item_id,
            kind: InteractionKind::Watched,
            weight: WATCHED_WEIGHT,
        }
    }

    pub fn listed(user_id: UserId, item_id: ItemId) -> Self {
        Self {
            user_id,
            item_id,
            kind: InteractionKind::Listed,
            weight: LISTED_WEIGHT,
        }
    }

    pub fn rated(user_id: UserId, item_id: ItemId, rating: i32) -> Self {
        Self {
            user_id,
            item_id,
            kind: InteractionKind::Rated,
            weight: f64::from(rating),
        }
    }
}
