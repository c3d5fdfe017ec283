//! Product reviews and the rating summary derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ProductId, ReviewId, UserId};

/// Rating validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RatingError {
    /// Ratings are whole stars from 1 to 5.
    #[error("rating must be between 1 and 5, got {0}")]
    OutOfRange(i64),
}

/// A star rating from 1 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i16")]
pub struct Rating(u8);

impl Rating {
    /// Lowest rating.
    pub const MIN: u8 = 1;
    /// Highest rating.
    pub const MAX: u8 = 5;

    /// Validate a rating.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::OutOfRange`] outside `1..=5`.
    pub fn new(value: i64) -> Result<Self, RatingError> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or(RatingError::OutOfRange(value))
    }

    /// Number of stars.
    #[must_use]
    pub const fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i32> for Rating {
    type Error = RatingError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<Rating> for i16 {
    fn from(rating: Rating) -> Self {
        Self::from(rating.0)
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A shopper's review of a product. One per shopper per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Review id.
    pub id: ReviewId,
    /// Reviewed product.
    #[serde(rename = "product")]
    pub product_id: ProductId,
    /// Author.
    #[serde(rename = "user")]
    pub author_id: UserId,
    /// Author's display name when the review was written.
    pub name: String,
    /// Stars.
    pub rating: Rating,
    /// Free text.
    pub comment: String,
    /// When the review was written.
    pub created_at: DateTime<Utc>,
}

/// A review about to be added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    /// Product being reviewed.
    pub product_id: ProductId,
    /// Author.
    pub author_id: UserId,
    /// Author's display name.
    pub name: String,
    /// Stars.
    pub rating: Rating,
    /// Free text.
    pub comment: String,
}

impl NewReview {
    /// Materialize as a stored review.
    #[must_use]
    pub fn into_review(self, id: ReviewId, created_at: DateTime<Utc>) -> Review {
        Review {
            id,
            product_id: self.product_id,
            author_id: self.author_id,
            name: self.name,
            rating: self.rating,
            comment: self.comment,
            created_at,
        }
    }
}

/// `numReviews` and mean `rating` for a product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    /// Number of reviews.
    pub num_reviews: u32,
    /// Arithmetic mean of all ratings, `0.0` with no reviews.
    pub rating: f64,
}

impl RatingSummary {
    /// No reviews.
    pub const EMPTY: Self = Self {
        num_reviews: 0,
        rating: 0.0,
    };

    /// Summarize a product's ratings.
    #[must_use]
    pub fn from_ratings(ratings: impl IntoIterator<Item = Rating>) -> Self {
        let (count, sum) = ratings
            .into_iter()
            .fold((0_u32, 0_u32), |(count, sum), r| (count + 1, sum + u32::from(r.get())));
        if count == 0 {
            return Self::EMPTY;
        }
        Self {
            num_reviews: count,
            rating: f64::from(sum) / f64::from(count),
        }
    }
}
