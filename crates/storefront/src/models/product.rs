//! Catalog types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marigold_core::{Money, ProductId, RatingSummary, Review, UserId};

/// Products per catalog page.
pub const PAGE_SIZE: u32 = 24;

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Administrator who created the product.
    #[serde(rename = "user")]
    pub created_by: UserId,
    /// Display name.
    pub name: String,
    /// Image URL.
    pub image: String,
    /// Brand.
    pub brand: String,
    /// Category.
    pub category: String,
    /// Long description.
    pub description: String,
    /// Unit price.
    pub price: Money,
    /// Units available.
    pub count_in_stock: u32,
    /// RAM in GB, for devices that have it.
    pub ram: Option<i32>,
    /// Mean review rating.
    pub rating: f64,
    /// Number of reviews.
    pub num_reviews: u32,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Overwrite the derived rating fields.
    pub const fn set_rating(&mut self, summary: RatingSummary) {
        self.rating = summary.rating;
        self.num_reviews = summary.num_reviews;
    }
}

/// A product with its reviews, for the product page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetail {
    /// The product.
    #[serde(flatten)]
    pub product: Product,
    /// Reviews, oldest first.
    pub reviews: Vec<Review>,
}

/// Data for creating a product.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    /// Administrator creating the product.
    #[serde(skip, default = "placeholder_owner")]
    pub created_by: UserId,
    /// Display name.
    pub name: String,
    /// Image URL.
    pub image: String,
    /// Brand.
    pub brand: String,
    /// Category.
    pub category: String,
    /// Long description.
    pub description: String,
    /// Unit price.
    pub price: Money,
    /// Units available.
    #[serde(default)]
    pub count_in_stock: u32,
    /// RAM in GB.
    #[serde(default)]
    pub ram: Option<i32>,
}

const fn placeholder_owner() -> UserId {
    UserId::new(0)
}

impl NewProduct {
    /// The placeholder product an admin creates before filling in the edit form.
    #[must_use]
    pub fn sample(created_by: UserId) -> Self {
        Self {
            created_by,
            name: "Sample name".to_owned(),
            image: "/images/sample.jpg".to_owned(),
            brand: "Sample brand".to_owned(),
            category: "Sample category".to_owned(),
            description: "Sample description".to_owned(),
            price: Money::ZERO,
            count_in_stock: 0,
            ram: None,
        }
    }

    /// Materialize as a stored product.
    #[must_use]
    pub fn into_product(self, id: ProductId, now: DateTime<Utc>) -> Product {
        Product {
            id,
            created_by: self.created_by,
            name: self.name,
            image: self.image,
            brand: self.brand,
            category: self.category,
            description: self.description,
            price: self.price,
            count_in_stock: self.count_in_stock,
            ram: self.ram,
            rating: 0.0,
            num_reviews: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial product update from the admin edit form.
///
/// Absent or blank fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price: Option<Money>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub count_in_stock: Option<u32>,
    pub ram: Option<i32>,
}

impl ProductUpdate {
    /// Drop blank strings so they keep the stored value.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        }
        Self {
            name: keep(self.name),
            description: keep(self.description),
            image: keep(self.image),
            brand: keep(self.brand),
            category: keep(self.category),
            ..self
        }
    }

    /// Apply to a product in place.
    pub fn apply_to(&self, product: &mut Product, now: DateTime<Utc>) {
        let update = self.clone().normalized();
        if let Some(name) = update.name {
            product.name = name;
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        if let Some(description) = update.description {
            product.description = description;
        }
        if let Some(image) = update.image {
            product.image = image;
        }
        if let Some(brand) = update.brand {
            product.brand = brand;
        }
        if let Some(category) = update.category {
            product.category = category;
        }
        if let Some(count) = update.count_in_stock {
            product.count_in_stock = count;
        }
        if update.ram.is_some() {
            product.ram = update.ram;
        }
        product.updated_at = now;
    }
}

/// Catalog search and filter parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    /// Case-insensitive substring of name, category or description.
    pub keyword: Option<String>,
    /// Exact brand.
    pub brand: Option<String>,
    /// Exact RAM size.
    pub ram: Option<i32>,
    /// Lowest price, inclusive.
    pub min_price: Option<Money>,
    /// Highest price, inclusive.
    pub max_price: Option<Money>,
    /// 1-based page number.
    pub page_number: Option<u32>,
}

impl ProductFilter {
    /// Requested page, at least 1.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page_number.unwrap_or(1).max(1)
    }

    /// Rows to skip for the requested page.
    #[must_use]
    pub fn offset(&self) -> u32 {
        (self.page() - 1).saturating_mul(PAGE_SIZE)
    }

    /// Keyword with surrounding whitespace removed, if any is left.
    #[must_use]
    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Brand with surrounding whitespace removed, if any is left.
    #[must_use]
    pub fn brand(&self) -> Option<&str> {
        self.brand.as_deref().map(str::trim).filter(|b| !b.is_empty())
    }

    /// Whether a product passes every filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(keyword) = self.keyword() {
            let keyword = keyword.to_lowercase();
            let hit = [&product.name, &product.category, &product.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&keyword));
            if !hit {
                return false;
            }
        }
        if self.brand().is_some_and(|brand| brand != product.brand) {
            return false;
        }
        if self.ram.is_some() && self.ram != product.ram {
            return false;
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        true
    }
}

/// One page of catalog results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPage {
    /// Products on this page.
    pub products: Vec<Product>,
    /// This page number.
    pub page: u32,
    /// Total number of pages.
    pub pages: u32,
}

impl ProductPage {
    /// Number of pages needed for `total` matching products.
    #[must_use]
    pub fn page_count(total: u64) -> u32 {
        u32::try_from(total.div_ceil(u64::from(PAGE_SIZE))).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product() -> Product {
        NewProduct {
            created_by: UserId::new(1),
            name: "Pixel 9".to_owned(),
            image: "/images/pixel.jpg".to_owned(),
            brand: "Google".to_owned(),
            category: "Phones".to_owned(),
            description: "Android flagship".to_owned(),
            price: Money::from_major(799),
            count_in_stock: 5,
            ram: Some(12),
        }
        .into_product(ProductId::new(1), Utc::now())
    }

    #[test]
    fn keyword_matches_any_text_field_case_insensitively() {
        let p = product();
        for keyword in ["pixel", "PHONES", "android"] {
            let filter = ProductFilter {
                keyword: Some(keyword.to_owned()),
                ..Default::default()
            };
            assert!(filter.matches(&p), "{keyword}");
        }
        let miss = ProductFilter {
            keyword: Some("laptop".to_owned()),
            ..Default::default()
        };
        assert!(!miss.matches(&p));
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let p = product();
        let filter = ProductFilter {
            min_price: Some(Money::from_major(799)),
            max_price: Some(Money::from_major(799)),
            ..Default::default()
        };
        assert!(filter.matches(&p));

        let filter = ProductFilter {
            max_price: Some(Money::from_major(500)),
            ..Default::default()
        };
        assert!(!filter.matches(&p));
    }

    #[test]
    fn brand_and_ram_are_exact() {
        let p = product();
        let filter = ProductFilter {
            brand: Some("Google".to_owned()),
            ram: Some(12),
            ..Default::default()
        };
        assert!(filter.matches(&p));

        let filter = ProductFilter {
            ram: Some(8),
            ..Default::default()
        };
        assert!(!filter.matches(&p));
    }

    #[test]
    fn paging_math() {
        assert_eq!(ProductPage::page_count(0), 0);
        assert_eq!(ProductPage::page_count(24), 1);
        assert_eq!(ProductPage::page_count(25), 2);

        let filter = ProductFilter {
            page_number: Some(3),
            ..Default::default()
        };
        assert_eq!(filter.offset(), 48);
        assert_eq!(ProductFilter::default().page(), 1);
    }

    #[test]
    fn blank_update_fields_keep_stored_values() {
        let mut p = product();
        let update = ProductUpdate {
            name: Some("  ".to_owned()),
            price: Some(Money::from_major(699)),
            count_in_stock: Some(0),
            ..Default::default()
        };
        update.apply_to(&mut p, Utc::now());

        assert_eq!(p.name, "Pixel 9");
        assert_eq!(p.price, Money::from_major(699));
        assert_eq!(p.count_in_stock, 0);
    }
}
