use serde::Serialize;

use super::ItemSummary;

/// Which branch of the ranking algorithm produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    /// Ranked from shared interaction history
    Collaborative,
    /// No usable interaction data; ranked from shared genres
    GenreFallback,
    /// Ranked by global aggregate rating and views
    Popularity,
}

/// Ordered items plus the strategy that ranked them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub strategy: RankingStrategy,
    pub items: Vec<ItemSummary>,
}

impl Ranking {
    pub fn new(strategy: RankingStrategy, items: Vec<ItemSummary>) -> Self {
        Self { strategy, items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Outcome of a personalized recommendation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recommendation {
    /// The user has too little history; callers should show onboarding
    InsufficientHistory,
    /// Ranked recommendations
    Ranked(Ranking),
    /// Warm user, but every strategy came back empty
    NoCandidates,
}

/// Rows created by one backfill run, per interaction kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub rated: usize,
    pub watched: usize,
    pub listed: usize,
}

impl BackfillReport {
    pub fn total(&self) -> usize {
        self.rated + self.watched + self.listed
    }
}
