use std::collections::{BTreeSet, HashMap};

use crate::models::{Interaction, ItemId, UserId};

/// Bipartite view of an interaction slice
///
/// Built fresh for every query; nothing is cached or invalidated. Interaction
/// kind does not matter for membership, and a user who touched an item several
/// ways is counted once for that item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionGraph {
    item_users: HashMap<ItemId, BTreeSet<UserId>>,
    user_items: HashMap<UserId, BTreeSet<ItemId>>,
}

impl InteractionGraph {
    pub fn from_interactions<'a>(interactions: impl IntoIterator<Item = &'a Interaction>) -> Self {
        let mut graph = Self::default();
        for interaction in interactions {
            graph
                .item_users
                .entry(interaction.item_id)
                .or_default()
                .insert(interaction.user_id);
            graph
                .user_items
                .entry(interaction.user_id)
                .or_default()
                .insert(interaction.item_id);
        }
        graph
    }

    /// Distinct users who touched `item`
    pub fn users_of(&self, item: ItemId) -> BTreeSet<UserId> {
        self.item_users.get(&item).cloned().unwrap_or_default()
    }

    /// Distinct items `user` touched
    pub fn items_of(&self, user: UserId) -> BTreeSet<ItemId> {
        self.user_items.get(&user).cloned().unwrap_or_default()
    }

    /// Distinct user count per item
    pub fn user_counts(&self) -> HashMap<ItemId, usize> {
        self.item_users
            .iter()
            .map(|(item, users)| (*item, users.len()))
            .collect()
    }

    /// Distinct item count per user
    pub fn item_counts(&self) -> HashMap<UserId, usize> {
        self.user_items
            .iter()
            .map(|(user, items)| (*user, items.len()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.item_users.is_empty()
    }
}

/// Mean of explicit ratings; 0.0 when there are none
pub fn mean_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    sum as f64 / ratings.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InteractionKind;
    use chrono::Utc;

    fn interaction(user: i64, item: i64, kind: InteractionKind) -> Interaction {
        Interaction {
            user_id: UserId(user),
            item_id: ItemId(item),
            kind,
            weight: 1.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_repeat_kinds_count_user_once() {
        let rows = vec![
            interaction(1, 10, InteractionKind::Watched),
            interaction(1, 10, InteractionKind::Rated),
            interaction(1, 10, InteractionKind::Listed),
            interaction(2, 10, InteractionKind::Watched),
        ];
        let graph = InteractionGraph::from_interactions(&rows);

        assert_eq!(graph.user_counts()[&ItemId(10)], 2);
        assert_eq!(graph.items_of(UserId(1)), BTreeSet::from([ItemId(10)]));
    }

    #[test]
    fn test_both_directions() {
        let rows = vec![
            interaction(1, 10, InteractionKind::Watched),
            interaction(1, 11, InteractionKind::Listed),
            interaction(2, 11, InteractionKind::Rated),
        ];
        let graph = InteractionGraph::from_interactions(&rows);

        assert_eq!(graph.users_of(ItemId(11)), BTreeSet::from([UserId(1), UserId(2)]));
        assert_eq!(graph.item_counts()[&UserId(1)], 2);
        assert!(graph.users_of(ItemId(99)).is_empty());
        assert!(graph.items_of(UserId(99)).is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = InteractionGraph::from_interactions(std::iter::empty());
        assert!(graph.is_empty());
        assert!(graph.user_counts().is_empty());
    }

    #[test]
    fn test_mean_rating() {
        assert_eq!(mean_rating(&[]), 0.0);
        assert_eq!(mean_rating(&[3, 5]), 4.0);
        assert_eq!(mean_rating(&[3, 5, 4]), 4.0);
        assert_eq!(mean_rating(&[1, 2]), 1.5);
    }
}
