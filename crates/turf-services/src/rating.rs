//! Rating aggregator
//!
//! Admits, edits and removes reviews and keeps each resource's aggregate
//! rating in step. Every review write is followed by a catalog recompute,
//! which reads the full review set and writes the aggregate as one atomic
//! step per resource, so the last recompute always sees every review.

use std::sync::Arc;
use tracing::{debug, info, instrument};
use turf_core::{
    models::{RatingSummary, ReservationStatus, Review, ReviewRequest},
    traits::{ReservationRepository, ResourceCatalog, ReviewRepository},
    AppError, AppResult,
};
use uuid::Uuid;
use validator::Validate;

/// Review admission and per-resource rating recomputation
pub struct RatingAggregator<C, V, R>
where
    C: ResourceCatalog,
    V: ReviewRepository,
    R: ReservationRepository,
{
    catalog: Arc<C>,
    reviews: Arc<V>,
    reservations: Arc<R>,
}

impl<C, V, R> RatingAggregator<C, V, R>
where
    C: ResourceCatalog,
    V: ReviewRepository,
    R: ReservationRepository,
{
    /// Create a new rating aggregator
    pub fn new(catalog: Arc<C>, reviews: Arc<V>, reservations: Arc<R>) -> Self {
        Self {
            catalog,
            reviews,
            reservations,
        }
    }

    /// Recompute and store the aggregate rating of a resource
    ///
    /// Mean of all ratings rounded half-up to 2 dp (0 with no reviews),
    /// plus the review count; both fields are written in one call.
    #[instrument(skip(self))]
    pub async fn recompute_rating(&self, resource_id: i64) -> AppResult<RatingSummary> {
        let summary = self.catalog.recompute_rating(resource_id).await?;

        debug!(
            "Turf {} rating {} from {} reviews",
            resource_id, summary.average, summary.count
        );
        Ok(summary)
    }

    /// Create a review and refresh the resource's rating
    ///
    /// # Errors
    ///
    /// - `InvalidRating` outside 1..=5
    /// - `ResourceUnavailable` if the resource does not exist
    /// - `DuplicateReview` if the requester already reviewed the resource
    /// - `ReservationNotFound` / `NotEligible` if a cited reservation is
    ///   missing, not the requester's, for another resource, or not COMPLETED
    #[instrument(skip(self, request), fields(
        requester_id = request.requester_id,
        resource_id = request.resource_id
    ))]
    pub async fn create_review(&self, request: ReviewRequest) -> AppResult<Review> {
        if !Review::is_valid_rating(request.rating) {
            return Err(AppError::InvalidRating(request.rating));
        }
        request.validate()?;

        if self.catalog.get_resource(request.resource_id).await?.is_none() {
            return Err(AppError::ResourceUnavailable(request.resource_id));
        }

        if self
            .reviews
            .exists_for(request.requester_id, request.resource_id)
            .await?
        {
            return Err(AppError::DuplicateReview {
                requester_id: request.requester_id,
                resource_id: request.resource_id,
            });
        }

        if let Some(reservation_id) = request.reservation_id {
            let reservation = self
                .reservations
                .find_by_id(reservation_id)
                .await?
                .ok_or(AppError::ReservationNotFound(reservation_id))?;

            if !reservation.is_owned_by(request.requester_id) {
                return Err(AppError::NotEligible(format!(
                    "reservation {} belongs to another user",
                    reservation_id
                )));
            }
            if reservation.resource_id != request.resource_id {
                return Err(AppError::NotEligible(format!(
                    "reservation {} is for turf {}",
                    reservation_id, reservation.resource_id
                )));
            }
            if reservation.status != ReservationStatus::Completed {
                return Err(AppError::NotEligible(format!(
                    "reservation {} is {}, not COMPLETED",
                    reservation_id, reservation.status
                )));
            }
        }

        let review = self.reviews.create(&Review::new(&request)).await?;
        info!(
            "Review {} ({} stars) added for turf {}",
            review.id, review.rating, review.resource_id
        );

        self.recompute_rating(review.resource_id).await?;
        Ok(review)
    }

    /// Change the rating and text of the requester's own review
    ///
    /// # Errors
    ///
    /// `ReviewNotFound`, `NotOwner`, `InvalidRating`, or `Validation` when
    /// the text is too long.
    #[instrument(skip(self, text))]
    pub async fn update_review(
        &self,
        review_id: Uuid,
        requester_id: i64,
        rating: i32,
        text: Option<String>,
    ) -> AppResult<Review> {
        let mut review = self.owned_review(review_id, requester_id).await?;

        if !Review::is_valid_rating(rating) {
            return Err(AppError::InvalidRating(rating));
        }
        let edit = ReviewRequest {
            requester_id,
            resource_id: review.resource_id,
            reservation_id: review.reservation_id,
            rating,
            text,
        };
        edit.validate()?;

        review.rating = edit.rating;
        review.text = edit.text;

        let updated = self.reviews.update(&review).await?;
        info!("Review {} updated to {} stars", review_id, rating);

        self.recompute_rating(updated.resource_id).await?;
        Ok(updated)
    }

    /// Delete the requester's own review
    #[instrument(skip(self))]
    pub async fn delete_review(&self, review_id: Uuid, requester_id: i64) -> AppResult<()> {
        let review = self.owned_review(review_id, requester_id).await?;

        if !self.reviews.delete(review_id).await? {
            return Err(AppError::ReviewNotFound(review_id));
        }
        info!("Review {} deleted", review_id);

        self.recompute_rating(review.resource_id).await?;
        Ok(())
    }

    /// All reviews of a resource
    pub async fn reviews_for(&self, resource_id: i64) -> AppResult<Vec<Review>> {
        self.reviews.find_by_resource(resource_id).await
    }

    async fn owned_review(&self, review_id: Uuid, requester_id: i64) -> AppResult<Review> {
        let review = self
            .reviews
            .find_by_id(review_id)
            .await?
            .ok_or(AppError::ReviewNotFound(review_id))?;

        if review.requester_id != requester_id {
            return Err(AppError::NotOwner {
                requester_id,
                entity: format!("review {}", review_id),
            });
        }
        Ok(review)
    }
}
