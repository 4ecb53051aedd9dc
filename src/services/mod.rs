pub mod activity;
pub mod aggregator;
pub mod backfill;
pub mod catalog;
pub mod recommendations;
pub mod similarity;

pub use activity::{
    add_to_list, delete_rating, get_rating, increment_views, mark_watched, rate_item,
    record_interaction, remove_from_list, watch_history, watchlist,
};
pub use backfill::backfill_interactions;
pub use catalog::popular_items;
pub use recommendations::recommend_for_user;
pub use similarity::similar_items;
