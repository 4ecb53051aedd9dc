pub mod activity;
pub mod interaction;
pub mod item;
pub mod ranking;

pub use activity::{
    ListEntry, NewRating, Rating, RatingReceipt, WatchEvent, MAX_RATING, MIN_RATING,
};
pub use interaction::{Interaction, InteractionKind, NewInteraction, LISTED_WEIGHT, WATCHED_WEIGHT};
pub use item::{Item, ItemId, ItemSummary, NewItem, UserId};
pub use ranking::{BackfillReport, Recommendation, Ranking, RankingStrategy};
