use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt::Display};

/// Identifier of a catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

/// Identifier of a user, issued by the (external) account system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A movie in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub year: i32,
    pub genres: BTreeSet<String>,
    pub language: Option<String>,
    pub thumbnail_ref: Option<String>,
    /// Mean of all current ratings, 0.0 when unrated. Only ever written by recomputation.
    pub aggregate_rating: f64,
    /// Monotonic view counter
    pub views: i64,
    pub published: bool,
}

impl Item {
    /// Whether this item has at least one genre in common with `genres`
    pub fn shares_genre_with(&self, genres: &BTreeSet<String>) -> bool {
        !self.genres.is_disjoint(genres)
    }
}

/// Catalog entry to create
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub title: String,
    pub year: i32,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub thumbnail_ref: Option<String>,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

impl NewItem {
    /// Creates a published item with the given genres
    pub fn new(title: impl Into<String>, year: i32, genres: &[&str]) -> Self {
        Self {
            title: title.into(),
            year,
            genres: genres.iter().map(|g| g.to_string()).collect(),
            language: None,
            thumbnail_ref: None,
            published: true,
        }
    }

    pub fn unpublished(mut self) -> Self {
        self.published = false;
        self
    }
}

/// Item shape returned to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemSummary {
    pub id: ItemId,
    pub title: String,
    pub year: i32,
    pub genres: Vec<String>,
    pub language: Option<String>,
    pub rating: f64,
    pub thumbnail_ref: Option<String>,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            year: item.year,
            genres: item.genres.iter().cloned().collect(),
            language: item.language.clone(),
            rating: item.aggregate_rating,
            thumbnail_ref: item.thumbnail_ref.clone(),
        }
    }
}
