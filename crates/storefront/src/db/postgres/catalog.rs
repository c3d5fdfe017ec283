//! Product and review persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use marigold_core::{
    Money, NewReview, ProductId, Rating, RatingSummary, Review, ReviewId, UserId,
};

use super::{PgStore, to_u32};
use crate::db::{CatalogStore, RepositoryError, conflict_on_unique};
use crate::models::product::PAGE_SIZE;
use crate::models::{NewProduct, Product, ProductFilter, ProductPage, ProductUpdate};

const PRODUCT_COLUMNS: &str = "id, created_by, name, image, brand, category, description, \
     price, count_in_stock, ram, rating, num_reviews, created_at, updated_at";

// Every filter is optional; a NULL parameter disables its clause.
const PRODUCT_FILTER: &str = r"
    ($1::TEXT IS NULL
        OR strpos(lower(name), lower($1)) > 0
        OR strpos(lower(category), lower($1)) > 0
        OR strpos(lower(description), lower($1)) > 0)
    AND ($2::TEXT IS NULL OR brand = $2)
    AND ($3::INTEGER IS NULL OR ram = $3)
    AND ($4::NUMERIC IS NULL OR price >= $4)
    AND ($5::NUMERIC IS NULL OR price <= $5)
";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    created_by: i32,
    name: String,
    image: String,
    brand: String,
    category: String,
    description: String,
    price: Decimal,
    count_in_stock: i32,
    ram: Option<i32>,
    rating: f64,
    num_reviews: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.id),
            created_by: UserId::new(row.created_by),
            name: row.name,
            image: row.image,
            brand: row.brand,
            category: row.category,
            description: row.description,
            price: Money::new(row.price),
            count_in_stock: to_u32(row.count_in_stock, "count_in_stock")?,
            ram: row.ram,
            rating: row.rating,
            num_reviews: to_u32(row.num_reviews, "num_reviews")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    product_id: i32,
    user_id: i32,
    name: String,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = Rating::new(i64::from(row.rating)).map_err(|e| {
            RepositoryError::DataCorruption(format!("review {}: {e}", row.id))
        })?;

        Ok(Self {
            id: ReviewId::new(row.id),
            product_id: ProductId::new(row.product_id),
            author_id: UserId::new(row.user_id),
            name: row.name,
            rating,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

fn stock_to_i32(count: u32) -> Result<i32, RepositoryError> {
    i32::try_from(count)
        .map_err(|_| RepositoryError::InvalidState(format!("count in stock {count} is too large")))
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<ProductPage, RepositoryError> {
        let keyword = filter.keyword();
        let brand = filter.brand();

        let (total,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM storefront.product WHERE {PRODUCT_FILTER}"
        ))
        .bind(keyword)
        .bind(brand)
        .bind(filter.ram)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS} FROM storefront.product
            WHERE {PRODUCT_FILTER}
            ORDER BY id
            LIMIT $6 OFFSET $7
            "
        ))
        .bind(keyword)
        .bind(brand)
        .bind(filter.ram)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(i64::from(PAGE_SIZE))
        .bind(i64::from(filter.offset()))
        .fetch_all(&self.pool)
        .await?;

        let products = rows
            .into_iter()
            .map(Product::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProductPage {
            products,
            page: filter.page(),
            pages: ProductPage::page_count(u64::try_from(total).unwrap_or_default()),
        })
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(raw)
        .fetch_all(&self.pool)
        .await?;

        let mut products = rows
            .into_iter()
            .map(Product::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        // Keep the caller's order
        products.sort_by_key(|p| ids.iter().position(|id| *id == p.id));
        Ok(products)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO storefront.product
                (created_by, name, image, brand, category, description, price, count_in_stock, ram)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(product.created_by)
        .bind(&product.name)
        .bind(&product.image)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(&product.description)
        .bind(product.price)
        .bind(stock_to_i32(product.count_in_stock)?)
        .bind(product.ram)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let update = update.normalized();
        let count_in_stock = update.count_in_stock.map(stock_to_i32).transpose()?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE storefront.product
            SET name = COALESCE($2, name),
                price = COALESCE($3, price),
                description = COALESCE($4, description),
                image = COALESCE($5, image),
                brand = COALESCE($6, brand),
                category = COALESCE($7, category),
                count_in_stock = COALESCE($8, count_in_stock),
                ram = COALESCE($9, ram),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.price)
        .bind(update.description)
        .bind(update.image)
        .bind(update.brand)
        .bind(update.category)
        .bind(count_in_stock)
        .bind(update.ram)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.product WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn recommendations(
        &self,
        id: ProductId,
        limit: u32,
    ) -> Result<Vec<Product>, RepositoryError> {
        let source = self
            .get_product(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS} FROM storefront.product
            WHERE id <> $1 AND (category = $2 OR brand = $3)
            ORDER BY id
            LIMIT $4
            "
        ))
        .bind(source.id)
        .bind(&source.category)
        .bind(&source.brand)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    async fn reviews(&self, product: ProductId) -> Result<Vec<Review>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            r"
            SELECT id, product_id, user_id, name, rating, comment, created_at
            FROM storefront.review
            WHERE product_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(product)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Review::try_from).collect()
    }

    async fn add_review(
        &self,
        review: NewReview,
    ) -> Result<(Review, RatingSummary), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent reviews of one product so the recomputed
        // summary always covers every committed review.
        let locked: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM storefront.product WHERE id = $1 FOR UPDATE")
                .bind(review.product_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let row = sqlx::query_as::<_, ReviewRow>(
            r"
            INSERT INTO storefront.review (product_id, user_id, name, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, product_id, user_id, name, rating, comment, created_at
            ",
        )
        .bind(review.product_id)
        .bind(review.author_id)
        .bind(&review.name)
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Product already reviewed"))?;

        let (count, mean): (i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), AVG(rating)::DOUBLE PRECISION FROM storefront.review WHERE product_id = $1",
        )
        .bind(review.product_id)
        .fetch_one(&mut *tx)
        .await?;

        let summary = RatingSummary {
            num_reviews: u32::try_from(count)
                .map_err(|_| RepositoryError::DataCorruption(format!("review count {count}")))?,
            rating: mean.unwrap_or(0.0),
        };

        sqlx::query(
            r"
            UPDATE storefront.product
            SET rating = $2, num_reviews = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(review.product_id)
        .bind(summary.rating)
        .bind(i32::try_from(summary.num_reviews).unwrap_or(i32::MAX))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((row.try_into()?, summary))
    }
}
