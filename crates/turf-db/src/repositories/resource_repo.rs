//! Resource catalog implementation
//!
//! Read access to turfs plus the single write the engine owns: the
//! aggregate rating columns.

use async_trait::async_trait;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use turf_core::{
    models::{RatingSummary, Resource},
    traits::ResourceCatalog,
    AppError, AppResult,
};

/// PostgreSQL implementation of ResourceCatalog
#[derive(Clone)]
pub struct PgResourceCatalog {
    pool: PgPool,
}

impl PgResourceCatalog {
    /// Create a new resource catalog
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceCatalog for PgResourceCatalog {
    #[instrument(skip(self))]
    async fn get_resource(&self, id: i64) -> AppResult<Option<Resource>> {
        debug!("Finding turf by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, ResourceRow>(
            r#"
            SELECT
                id, name, is_active, price_per_hour,
                opening_time, closing_time, rating, total_reviews
            FROM turfs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding turf {}: {}", id, e);
            AppError::Database(format!("Failed to find turf: {}", e))
        })?;

        Ok(result.map(|row| row.into()))
    }

    #[instrument(skip(self))]
    async fn recompute_rating(&self, id: i64) -> AppResult<RatingSummary> {
        debug!("Recomputing rating for turf {}", id);

        // Start transaction
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock turf row; the aggregate below reads reviews committed before it
        let locked: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM turfs
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to lock turf: {}", e);
            AppError::Database(format!("Failed to lock turf: {}", e))
        })?;

        if locked.is_none() {
            warn!("Rating recompute for unknown turf: {}", id);
            return Err(AppError::ResourceUnavailable(id));
        }

        let (average, count): (Decimal, i64) = sqlx::query_as(
            r#"
            UPDATE turfs
            SET rating = agg.average,
                total_reviews = agg.total
            FROM (
                SELECT
                    COALESCE(ROUND(AVG(rating)::numeric, 2), 0) AS average,
                    COUNT(*) AS total
                FROM reviews
                WHERE turf_id = $1
            ) AS agg
            WHERE turfs.id = $1
            RETURNING turfs.rating, turfs.total_reviews
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error updating turf rating: {}", e);
            AppError::Database(format!("Failed to update turf rating: {}", e))
        })?;

        // Commit transaction
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(RatingSummary { average, count })
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ResourceRow {
    id: i64,
    name: String,
    is_active: bool,
    price_per_hour: Decimal,
    opening_time: NaiveTime,
    closing_time: NaiveTime,
    rating: Decimal,
    total_reviews: i64,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            is_active: row.is_active,
            price_per_hour: row.price_per_hour,
            opening_time: row.opening_time,
            closing_time: row.closing_time,
            rating: row.rating,
            total_reviews: row.total_reviews,
        }
    }
}
