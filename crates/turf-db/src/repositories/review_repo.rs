//! Review repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use turf_core::{
    models::Review,
    traits::{Repository, ReviewRepository},
    AppError, AppResult,
};
use uuid::Uuid;

/// PostgreSQL implementation of ReviewRepository
#[derive(Clone)]
pub struct PgReviewRepository {
    pool: PgPool,
}

impl PgReviewRepository {
    /// Create a new review repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Review, Uuid> for PgReviewRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Review>> {
        debug!("Finding review by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, ReviewRow>(
            r#"
            SELECT
                id, user_id, turf_id, booking_id, rating, review_text,
                created_at, updated_at
            FROM reviews
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding review {}: {}", id, e);
            AppError::Database(format!("Failed to find review: {}", e))
        })?;

        Ok(result.map(|row| row.into()))
    }

    #[instrument(skip(self, entity), fields(turf_id = entity.resource_id, user_id = entity.requester_id))]
    async fn create(&self, entity: &Review) -> AppResult<Review> {
        debug!("Creating review {}", entity.id);

        // Start transaction
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock turf row so the duplicate check and insert are not interleaved
        let locked: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM turfs
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(entity.resource_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to lock turf: {}", e);
            AppError::Database(format!("Failed to lock turf: {}", e))
        })?;

        if locked.is_none() {
            return Err(AppError::ResourceUnavailable(entity.resource_id));
        }

        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reviews WHERE user_id = $1 AND turf_id = $2
            )
            "#,
        )
        .bind(entity.requester_id)
        .bind(entity.resource_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to check existing review: {}", e);
            AppError::Database(format!("Failed to check existing review: {}", e))
        })?;

        if exists {
            warn!(
                "User {} already reviewed turf {}",
                entity.requester_id, entity.resource_id
            );
            return Err(AppError::DuplicateReview {
                requester_id: entity.requester_id,
                resource_id: entity.resource_id,
            });
        }

        let row = sqlx::query_as::<sqlx::Postgres, ReviewRow>(
            r#"
            INSERT INTO reviews (
                id, user_id, turf_id, booking_id, rating, review_text,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING
                id, user_id, turf_id, booking_id, rating, review_text,
                created_at, updated_at
            "#,
        )
        .bind(entity.id)
        .bind(entity.requester_id)
        .bind(entity.resource_id)
        .bind(entity.reservation_id)
        .bind(entity.rating)
        .bind(&entity.text)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to create review: {}", e);
            AppError::Database(format!("Failed to create review: {}", e))
        })?;

        // Commit transaction
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &Review) -> AppResult<Review> {
        debug!("Updating review {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, ReviewRow>(
            r#"
            UPDATE reviews
            SET rating = $2,
                review_text = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id, user_id, turf_id, booking_id, rating, review_text,
                created_at, updated_at
            "#,
        )
        .bind(entity.id)
        .bind(entity.rating)
        .bind(&entity.text)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating review: {}", e);
            AppError::Database(format!("Failed to update review: {}", e))
        })?
        .ok_or(AppError::ReviewNotFound(entity.id))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        debug!("Deleting review {}", id);

        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting review: {}", e);
                AppError::Database(format!("Failed to delete review: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ReviewRepository for PgReviewRepository {
    #[instrument(skip(self))]
    async fn find_by_resource(&self, resource_id: i64) -> AppResult<Vec<Review>> {
        debug!("Finding reviews for turf: {}", resource_id);

        let rows = sqlx::query_as::<sqlx::Postgres, ReviewRow>(
            r#"
            SELECT
                id, user_id, turf_id, booking_id, rating, review_text,
                created_at, updated_at
            FROM reviews
            WHERE turf_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding turf reviews: {}", e);
            AppError::Database(format!("Failed to find turf reviews: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn exists_for(&self, requester_id: i64, resource_id: i64) -> AppResult<bool> {
        let result: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE user_id = $1 AND turf_id = $2)",
        )
        .bind(requester_id)
        .bind(resource_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error checking review existence: {}", e);
            AppError::Database(format!("Failed to check review existence: {}", e))
        })?;

        Ok(result.0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    user_id: i64,
    turf_id: i64,
    booking_id: Option<Uuid>,
    rating: i32,
    review_text: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            requester_id: row.user_id,
            resource_id: row.turf_id,
            reservation_id: row.booking_id,
            rating: row.rating,
            text: row.review_text,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
