use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::store::{InteractionFilter, ItemFilter, Store};
use crate::{
    error::{AppError, AppResult},
    models::{
        Interaction, InteractionKind, Item, ItemId, ListEntry, NewInteraction, NewItem, NewRating,
        Rating, RatingReceipt, UserId, WatchEvent,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the bundled schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const ITEM_COLUMNS: &str =
    "i.id, i.title, i.year, i.language, i.thumbnail_ref, i.aggregate_rating, i.views, i.published";

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    title: String,
    year: i32,
    language: Option<String>,
    thumbnail_ref: Option<String>,
    aggregate_rating: f64,
    views: i64,
    published: bool,
}

impl ItemRow {
    fn into_item(self, genres: BTreeSet<String>) -> Item {
        Item {
            id: ItemId(self.id),
            title: self.title,
            year: self.year,
            genres,
            language: self.language,
            thumbnail_ref: self.thumbnail_ref,
            aggregate_rating: self.aggregate_rating,
            views: self.views,
            published: self.published,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InteractionRow {
    user_id: i64,
    item_id: i64,
    kind: String,
    weight: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<InteractionRow> for Interaction {
    type Error = AppError;

    fn try_from(row: InteractionRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse::<InteractionKind>()
            .map_err(|e| AppError::Internal(format!("Corrupt interaction row: {}", e)))?;
        Ok(Interaction {
            user_id: UserId(row.user_id),
            item_id: ItemId(row.item_id),
            kind,
            weight: row.weight,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    user_id: i64,
    item_id: i64,
    rating: i32,
    comment: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RatingRow> for Rating {
    fn from(row: RatingRow) -> Self {
        Rating {
            user_id: UserId(row.user_id),
            item_id: ItemId(row.item_id),
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UpsertedRatingRow {
    #[sqlx(flatten)]
    rating: RatingRow,
    inserted: bool,
}

fn raw_item_ids(ids: &[ItemId]) -> Vec<i64> {
    ids.iter().map(|id| id.0).collect()
}

fn raw_user_ids(ids: &[UserId]) -> Vec<i64> {
    ids.iter().map(|id| id.0).collect()
}

// Single statements shared by the standalone and transactional writes

async fn insert_interaction(
    conn: &mut PgConnection,
    interaction: &NewInteraction,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO interactions (user_id, item_id, kind, weight)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, item_id, kind) DO NOTHING
        "#,
    )
    .bind(interaction.user_id.0)
    .bind(interaction.item_id.0)
    .bind(interaction.kind.as_str())
    .bind(interaction.weight)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn delete_interaction(
    conn: &mut PgConnection,
    user_id: UserId,
    item_id: ItemId,
    kind: InteractionKind,
) -> AppResult<()> {
    sqlx::query("DELETE FROM interactions WHERE user_id = $1 AND item_id = $2 AND kind = $3")
        .bind(user_id.0)
        .bind(item_id.0)
        .bind(kind.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Takes the item's row lock so rating writes on one item apply one after another.
/// Returns false if the item does not exist.
async fn lock_item(conn: &mut PgConnection, item_id: ItemId) -> AppResult<bool> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM items WHERE id = $1 FOR UPDATE")
        .bind(item_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id.is_some())
}

async fn recompute_aggregate(conn: &mut PgConnection, item_id: ItemId) -> AppResult<f64> {
    // Full recomputation in one statement; never an incremental adjustment
    let rating: f64 = sqlx::query_scalar(
        r#"
        UPDATE items
        SET aggregate_rating = COALESCE(
            (SELECT AVG(rating)::DOUBLE PRECISION FROM ratings WHERE item_id = $1),
            0.0
        )
        WHERE id = $1
        RETURNING aggregate_rating
        "#,
    )
    .bind(item_id.0)
    .fetch_one(&mut *conn)
    .await?;
    Ok(rating)
}

/// PostgreSQL-backed store
///
/// Uniqueness is enforced by table constraints and inserts are conditional
/// (`ON CONFLICT`), so concurrent writers cannot create duplicate rows or lose
/// view-count increments. Writes touching several tables run in one transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads genre names for the given items
    async fn genres_for(&self, ids: &[i64]) -> AppResult<HashMap<i64, BTreeSet<String>>> {
        let mut genres: HashMap<i64, BTreeSet<String>> = HashMap::new();
        if ids.is_empty() {
            return Ok(genres);
        }

        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT ig.item_id, g.name
            FROM item_genres ig
            JOIN genres g ON g.id = ig.genre_id
            WHERE ig.item_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        for (item_id, name) in rows {
            genres.entry(item_id).or_default().insert(name);
        }
        Ok(genres)
    }

    async fn attach_genres(&self, rows: Vec<ItemRow>) -> AppResult<Vec<Item>> {
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut genres = self.genres_for(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let item_genres = genres.remove(&row.id).unwrap_or_default();
                row.into_item(item_genres)
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn get_item(&self, id: ItemId) -> AppResult<Option<Item>> {
        let row: Option<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM items i WHERE i.id = $1",
            ITEM_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.attach_genres(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list_items(&self, filter: &ItemFilter) -> AppResult<Vec<Item>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM items i WHERE TRUE", ITEM_COLUMNS));

        if let Some(ids) = &filter.ids {
            query
                .push(" AND i.id = ANY(")
                .push_bind(raw_item_ids(ids))
                .push(")");
        }
        if let Some(published) = filter.published {
            query.push(" AND i.published = ").push_bind(published);
        }
        if let Some(genres) = &filter.genres_any {
            query
                .push(
                    " AND EXISTS (SELECT 1 FROM item_genres ig JOIN genres g ON g.id = ig.genre_id \
                     WHERE ig.item_id = i.id AND g.name = ANY(",
                )
                .push_bind(genres.iter().cloned().collect::<Vec<String>>())
                .push("))");
        }
        if !filter.exclude.is_empty() {
            query
                .push(" AND NOT (i.id = ANY(")
                .push_bind(raw_item_ids(&filter.exclude))
                .push("))");
        }
        query.push(" ORDER BY i.id");

        let rows: Vec<ItemRow> = query.build_query_as().fetch_all(&self.pool).await?;
        self.attach_genres(rows).await
    }

    #[instrument(skip(self, item), fields(title = %item.title))]
    async fn create_item(&self, item: NewItem) -> AppResult<Item> {
        let mut tx = self.pool.begin().await?;

        let row: ItemRow = sqlx::query_as(
            r#"
            INSERT INTO items (title, year, language, thumbnail_ref, published)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, year, language, thumbnail_ref, aggregate_rating, views, published
            "#,
        )
        .bind(&item.title)
        .bind(item.year)
        .bind(&item.language)
        .bind(&item.thumbnail_ref)
        .bind(item.published)
        .fetch_one(&mut *tx)
        .await?;

        let genres: BTreeSet<String> = item.genres.into_iter().collect();
        for genre in &genres {
            let genre_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO genres (name) VALUES ($1)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(genre)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO item_genres (item_id, genre_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(row.id)
            .bind(genre_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row.into_item(genres))
    }

    #[instrument(skip(self))]
    async fn increment_views(&self, id: ItemId) -> AppResult<Option<i64>> {
        let views: Option<i64> =
            sqlx::query_scalar("UPDATE items SET views = views + 1 WHERE id = $1 RETURNING views")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(views)
    }

    #[instrument(skip(self))]
    async fn interactions(&self, filter: &InteractionFilter) -> AppResult<Vec<Interaction>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT user_id, item_id, kind, weight, created_at FROM interactions WHERE TRUE",
        );

        if let Some(user_ids) = &filter.user_ids {
            query
                .push(" AND user_id = ANY(")
                .push_bind(raw_user_ids(user_ids))
                .push(")");
        }
        if let Some(item_ids) = &filter.item_ids {
            query
                .push(" AND item_id = ANY(")
                .push_bind(raw_item_ids(item_ids))
                .push(")");
        }
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        query.push(" ORDER BY user_id, item_id, kind");

        let rows: Vec<InteractionRow> = query.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Interaction::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn insert_interaction_if_absent(&self, interaction: NewInteraction) -> AppResult<bool> {
        let mut conn = self.pool.acquire().await?;
        insert_interaction(&mut conn, &interaction).await
    }

    #[instrument(skip(self, rating), fields(user_id = %rating.user_id, item_id = %rating.item_id))]
    async fn save_rating(&self, rating: &NewRating) -> AppResult<Option<RatingReceipt>> {
        let mut tx = self.pool.begin().await?;
        if !lock_item(&mut tx, rating.item_id).await? {
            return Ok(None);
        }

        // xmax is zero only for a freshly inserted tuple
        let row: UpsertedRatingRow = sqlx::query_as(
            r#"
            INSERT INTO ratings (user_id, item_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, item_id) DO UPDATE
            SET rating = EXCLUDED.rating, comment = EXCLUDED.comment, updated_at = now()
            RETURNING user_id, item_id, rating, comment, created_at, updated_at,
                      (xmax = 0) AS inserted
            "#,
        )
        .bind(rating.user_id.0)
        .bind(rating.item_id.0)
        .bind(rating.rating)
        .bind(&rating.comment)
        .fetch_one(&mut *tx)
        .await?;

        insert_interaction(
            &mut tx,
            &NewInteraction::rated(rating.user_id, rating.item_id, rating.rating),
        )
        .await?;
        let aggregate_rating = recompute_aggregate(&mut tx, rating.item_id).await?;

        tx.commit().await?;
        Ok(Some(RatingReceipt {
            rating: row.rating.into(),
            aggregate_rating,
            created: row.inserted,
        }))
    }

    #[instrument(skip(self))]
    async fn get_rating(&self, user_id: UserId, item_id: ItemId) -> AppResult<Option<Rating>> {
        let row: Option<RatingRow> = sqlx::query_as(
            r#"
            SELECT user_id, item_id, rating, comment, created_at, updated_at
            FROM ratings WHERE user_id = $1 AND item_id = $2
            "#,
        )
        .bind(user_id.0)
        .bind(item_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Rating::from))
    }

    #[instrument(skip(self))]
    async fn remove_rating(&self, user_id: UserId, item_id: ItemId) -> AppResult<Option<f64>> {
        let mut tx = self.pool.begin().await?;
        if !lock_item(&mut tx, item_id).await? {
            return Ok(None);
        }

        let result = sqlx::query("DELETE FROM ratings WHERE user_id = $1 AND item_id = $2")
            .bind(user_id.0)
            .bind(item_id.0)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        delete_interaction(&mut tx, user_id, item_id, InteractionKind::Rated).await?;
        let aggregate_rating = recompute_aggregate(&mut tx, item_id).await?;

        tx.commit().await?;
        Ok(Some(aggregate_rating))
    }

    #[instrument(skip(self))]
    async fn ratings(&self, item_id: Option<ItemId>) -> AppResult<Vec<Rating>> {
        let rows: Vec<RatingRow> = sqlx::query_as(
            r#"
            SELECT user_id, item_id, rating, comment, created_at, updated_at
            FROM ratings
            WHERE $1::BIGINT IS NULL OR item_id = $1
            ORDER BY created_at DESC, user_id
            "#,
        )
        .bind(item_id.map(|id| id.0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Rating::from).collect())
    }

    #[instrument(skip(self))]
    async fn record_watch(&self, user_id: UserId, item_id: ItemId) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO watch_events (user_id, item_id) VALUES ($1, $2)
            ON CONFLICT (user_id, item_id) DO NOTHING
            "#,
        )
        .bind(user_id.0)
        .bind(item_id.0)
        .execute(&mut *tx)
        .await?;
        insert_interaction(&mut tx, &NewInteraction::watched(user_id, item_id)).await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn watches(&self, user_id: Option<UserId>) -> AppResult<Vec<WatchEvent>> {
        let rows: Vec<(i64, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT user_id, item_id, watched_at
            FROM watch_events
            WHERE $1::BIGINT IS NULL OR user_id = $1
            ORDER BY watched_at DESC, id DESC
            "#,
        )
        .bind(user_id.map(|id| id.0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, item_id, watched_at)| WatchEvent {
                user_id: UserId(user_id),
                item_id: ItemId(item_id),
                watched_at,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn add_list_entry(&self, user_id: UserId, item_id: ItemId) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO list_entries (user_id, item_id) VALUES ($1, $2)
            ON CONFLICT (user_id, item_id) DO NOTHING
            "#,
        )
        .bind(user_id.0)
        .bind(item_id.0)
        .execute(&mut *tx)
        .await?;
        insert_interaction(&mut tx, &NewInteraction::listed(user_id, item_id)).await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn remove_list_entry(&self, user_id: UserId, item_id: ItemId) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM list_entries WHERE user_id = $1 AND item_id = $2")
            .bind(user_id.0)
            .bind(item_id.0)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        delete_interaction(&mut tx, user_id, item_id, InteractionKind::Listed).await?;

        tx.commit().await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn list_entries(&self, user_id: Option<UserId>) -> AppResult<Vec<ListEntry>> {
        let rows: Vec<(i64, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT user_id, item_id, added_at
            FROM list_entries
            WHERE $1::BIGINT IS NULL OR user_id = $1
            ORDER BY added_at DESC, id DESC
            "#,
        )
        .bind(user_id.map(|id| id.0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, item_id, added_at)| ListEntry {
                user_id: UserId(user_id),
                item_id: ItemId(item_id),
                added_at,
            })
            .collect())
    }
}
