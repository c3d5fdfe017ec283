//! Product reviews.

use thiserror::Error;

use marigold_core::{NewReview, ProductId, Rating, RatingError, RatingSummary, Review};

use crate::db::{CatalogStore, RepositoryError};
use crate::models::CurrentUser;

/// Errors from adding a review.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Rating outside 1 to 5.
    #[error(transparent)]
    InvalidRating(#[from] RatingError),

    /// Comment missing.
    #[error("Comment is required")]
    MissingComment,

    /// No such product.
    #[error("Product not found")]
    ProductNotFound,

    /// The caller already reviewed this product.
    #[error("Product already reviewed")]
    AlreadyReviewed,

    /// Storage failure.
    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ReviewError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::ProductNotFound,
            RepositoryError::Conflict(_) => Self::AlreadyReviewed,
            other => Self::Repository(other),
        }
    }
}

/// Review service.
pub struct ReviewService<'a> {
    catalog: &'a dyn CatalogStore,
}

impl<'a> ReviewService<'a> {
    /// Create a new review service.
    #[must_use]
    pub const fn new(catalog: &'a dyn CatalogStore) -> Self {
        Self { catalog }
    }

    /// Add the caller's review and return the product's new rating summary.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::AlreadyReviewed` on a second review by the same
    /// author, in which case the product is unchanged.
    #[tracing::instrument(skip(self, author, comment), fields(user_id = %author.id))]
    pub async fn add(
        &self,
        author: &CurrentUser,
        product_id: ProductId,
        rating: i64,
        comment: &str,
    ) -> Result<(Review, RatingSummary), ReviewError> {
        let rating = Rating::new(rating)?;
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(ReviewError::MissingComment);
        }

        let (review, summary) = self
            .catalog
            .add_review(NewReview {
                product_id,
                author_id: author.id,
                name: author.name.clone(),
                rating,
                comment: comment.to_owned(),
            })
            .await?;

        tracing::info!(
            product_id = %product_id,
            rating = rating.get(),
            num_reviews = summary.num_reviews,
            "Review added"
        );
        Ok((review, summary))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marigold_core::{Email, Money};

    use super::*;
    use crate::db::{MemoryStore, UserStore};
    use crate::models::{NewProduct, NewUser};

    async fn setup() -> (MemoryStore, CurrentUser, CurrentUser, ProductId) {
        let store = MemoryStore::new();
        let mut authors = Vec::new();
        for name in ["asha", "ravi"] {
            let user = store
                .create_user(NewUser {
                    name: name.to_owned(),
                    email: Email::parse(&format!("{name}@example.com")).unwrap(),
                    password_hash: "hash".to_owned(),
                    is_admin: false,
                })
                .await
                .unwrap();
            authors.push(CurrentUser::from(&user));
        }
        let product = store
            .create_product(NewProduct {
                price: Money::from_major(10),
                ..NewProduct::sample(authors[0].id)
            })
            .await
            .unwrap();
        let ravi = authors.pop().unwrap();
        let asha = authors.pop().unwrap();
        (store, asha, ravi, product.id)
    }

    #[tokio::test]
    async fn summary_tracks_every_review() {
        let (store, asha, ravi, product) = setup().await;
        let reviews = ReviewService::new(&store);

        reviews.add(&asha, product, 5, "Great").await.unwrap();
        let (review, summary) = reviews.add(&ravi, product, 4, " Fine ").await.unwrap();

        assert_eq!(review.name, "ravi");
        assert_eq!(review.comment, "Fine");
        assert_eq!(summary.num_reviews, 2);
        assert!((summary.rating - 4.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn second_review_is_rejected_without_changing_rating() {
        let (store, asha, _, product) = setup().await;
        let reviews = ReviewService::new(&store);
        reviews.add(&asha, product, 5, "Great").await.unwrap();

        let err = reviews.add(&asha, product, 1, "Changed my mind").await.unwrap_err();
        assert!(matches!(err, ReviewError::AlreadyReviewed));

        let stored = store.get_product(product).await.unwrap().unwrap();
        assert_eq!(stored.num_reviews, 1);
        assert!((stored.rating - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn bad_input_is_rejected() {
        let (store, asha, _, product) = setup().await;
        let reviews = ReviewService::new(&store);

        assert!(matches!(
            reviews.add(&asha, product, 6, "Too good").await,
            Err(ReviewError::InvalidRating(_))
        ));
        assert!(matches!(
            reviews.add(&asha, product, 3, "   ").await,
            Err(ReviewError::MissingComment)
        ));
        assert!(matches!(
            reviews.add(&asha, ProductId::new(999), 3, "Where").await,
            Err(ReviewError::ProductNotFound)
        ));
    }
}
