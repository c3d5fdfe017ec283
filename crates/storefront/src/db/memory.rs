//! In-memory implementation of the store traits.
//!
//! Everything lives behind one `tokio::sync::RwLock`, so each trait call is
//! atomic with respect to every other call. That gives the same guarantees the
//! Postgres store gets from conditional updates and constraints. Data is lost
//! when the process exits.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use marigold_core::{
    Email, NewOrder, NewReview, Order, OrderId, PaymentReceipt, ProductId, RatingSummary, Review,
    ReviewId, Transition, UserId,
};

use super::{CatalogStore, OrderStore, RepositoryError, UserStore};
use crate::models::product::PAGE_SIZE;
use crate::models::{
    NewProduct, NewUser, Product, ProductFilter, ProductPage, ProductUpdate, User,
    UserCredentials, UserUpdate, WishlistToggle,
};

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, UserCredentials>,
    products: BTreeMap<ProductId, Product>,
    reviews: Vec<Review>,
    wishlists: HashMap<UserId, Vec<ProductId>>,
    orders: BTreeMap<OrderId, Order>,
    last_id: i32,
}

impl State {
    const fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn email_taken(&self, email: &Email, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|c| &c.user.email == email && Some(c.user.id) != except)
    }
}

/// Store that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;
        let id = OrderId::new(state.next_id());
        let order = order.into_order(id, Utc::now());
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        Ok(self.state.read().await.orders.values().rev().cloned().collect())
    }

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .rev()
            .filter(|o| o.owner == owner)
            .cloned()
            .collect())
    }

    async fn mark_paid(
        &self,
        id: OrderId,
        receipt: PaymentReceipt,
        at: DateTime<Utc>,
    ) -> Result<Transition<Order>, RepositoryError> {
        let mut state = self.state.write().await;
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if order.apply_payment(receipt, at) {
            Ok(Transition::Applied(order.clone()))
        } else {
            Ok(Transition::Unchanged(order.clone()))
        }
    }

    async fn mark_delivered(
        &self,
        id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<Transition<Order>, RepositoryError> {
        let mut state = self.state.write().await;
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        match order.apply_delivery(at) {
            Ok(true) => Ok(Transition::Applied(order.clone())),
            Ok(false) => Ok(Transition::Unchanged(order.clone())),
            Err(e) => Err(RepositoryError::InvalidState(e.to_string())),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<ProductPage, RepositoryError> {
        let state = self.state.read().await;
        let matching: Vec<&Product> = state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .collect();

        let products = matching
            .iter()
            .skip(filter.offset() as usize)
            .take(PAGE_SIZE as usize)
            .map(|p| (*p).clone())
            .collect();

        Ok(ProductPage {
            products,
            page: filter.page(),
            pages: ProductPage::page_count(matching.len() as u64),
        })
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let mut state = self.state.write().await;
        let id = ProductId::new(state.next_id());
        let product = product.into_product(id, Utc::now());
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let mut state = self.state.write().await;
        let product = state.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        update.apply_to(product, Utc::now());
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.products.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        state.reviews.retain(|r| r.product_id != id);
        for list in state.wishlists.values_mut() {
            list.retain(|p| *p != id);
        }
        Ok(())
    }

    async fn recommendations(
        &self,
        id: ProductId,
        limit: u32,
    ) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.read().await;
        let source = state.products.get(&id).ok_or(RepositoryError::NotFound)?;
        Ok(state
            .products
            .values()
            .filter(|p| p.id != id && (p.category == source.category || p.brand == source.brand))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn reviews(&self, product: ProductId) -> Result<Vec<Review>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .reviews
            .iter()
            .filter(|r| r.product_id == product)
            .cloned()
            .collect())
    }

    async fn add_review(
        &self,
        review: NewReview,
    ) -> Result<(Review, RatingSummary), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(&review.product_id) {
            return Err(RepositoryError::NotFound);
        }
        if state
            .reviews
            .iter()
            .any(|r| r.product_id == review.product_id && r.author_id == review.author_id)
        {
            return Err(RepositoryError::Conflict("Product already reviewed".to_owned()));
        }

        let id = ReviewId::new(state.next_id());
        let product_id = review.product_id;
        let review = review.into_review(id, Utc::now());
        state.reviews.push(review.clone());

        let summary = RatingSummary::from_ratings(
            state
                .reviews
                .iter()
                .filter(|r| r.product_id == product_id)
                .map(|r| r.rating),
        );
        if let Some(product) = state.products.get_mut(&product_id) {
            product.set_rating(summary);
            product.updated_at = Utc::now();
        }
        Ok((review, summary))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        if state.email_taken(&user.email, None) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let now = Utc::now();
        let created = User {
            id: UserId::new(state.next_id()),
            name: user.name,
            email: user.email,
            is_admin: user.is_admin,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(
            created.id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).map(|c| c.user.clone()))
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).map(|c| c.user.clone()))
            .collect())
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|c| &c.user.email == email)
            .cloned())
    }

    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(email) = &update.email
            && state.email_taken(email, Some(id))
        {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let creds = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(name) = update.name {
            creds.user.name = name;
        }
        if let Some(email) = update.email {
            creds.user.email = email;
        }
        if let Some(hash) = update.password_hash {
            creds.password_hash = hash;
        }
        creds.user.updated_at = Utc::now();
        Ok(creds.user.clone())
    }

    async fn set_admin(&self, email: &Email, is_admin: bool) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let creds = state
            .users
            .values_mut()
            .find(|c| &c.user.email == email)
            .ok_or(RepositoryError::NotFound)?;
        creds.user.is_admin = is_admin;
        creds.user.updated_at = Utc::now();
        Ok(creds.user.clone())
    }

    async fn wishlist(&self, user: UserId) -> Result<Vec<ProductId>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .wishlists
            .get(&user)
            .cloned()
            .unwrap_or_default())
    }

    async fn toggle_wishlist(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<WishlistToggle, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(&product) {
            return Err(RepositoryError::NotFound);
        }

        let list = state.wishlists.entry(user).or_default();
        let added = if let Some(pos) = list.iter().position(|p| *p == product) {
            list.remove(pos);
            false
        } else {
            list.push(product);
            true
        };
        Ok(WishlistToggle {
            added,
            wishlist: list.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use marigold_core::{
        Money, OrderLine, OrderRequest, OrderTotals, PaymentMethod, Rating, ShippingAddress,
    };

    use super::*;

    async fn seeded() -> (MemoryStore, User, Product) {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                name: "Asha".to_owned(),
                email: Email::parse("asha@example.com").unwrap(),
                password_hash: "hash".to_owned(),
                is_admin: false,
            })
            .await
            .unwrap();
        let product = store
            .create_product(NewProduct {
                name: "Headphones".to_owned(),
                price: Money::from_major(100),
                count_in_stock: 3,
                ..NewProduct::sample(user.id)
            })
            .await
            .unwrap();
        (store, user, product)
    }

    fn new_order(owner: UserId, product: &Product) -> NewOrder {
        OrderRequest {
            owner,
            lines: vec![OrderLine {
                product_id: product.id,
                name: product.name.clone(),
                image: product.image.clone(),
                unit_price: product.price,
                quantity: 2,
            }],
            shipping_address: Some(ShippingAddress {
                address: "1 Main St".to_owned(),
                city: "Pune".to_owned(),
                postal_code: "411001".to_owned(),
                country: "India".to_owned(),
            }),
            payment_method: Some(PaymentMethod::Stripe),
            totals: OrderTotals {
                items_price: Money::from_major(200),
                shipping_price: Money::ZERO,
                tax_price: Money::from_major(30),
                total_price: Money::from_major(230),
            },
        }
        .validate()
        .unwrap()
    }

    fn receipt(id: &str) -> PaymentReceipt {
        PaymentReceipt {
            external_id: id.to_owned(),
            status: "succeeded".to_owned(),
            completed_at: "1717000000".to_owned(),
            receipt_email: None,
        }
    }

    fn review(product: ProductId, author: UserId, stars: i64) -> NewReview {
        NewReview {
            product_id: product,
            author_id: author,
            name: "Asha".to_owned(),
            rating: Rating::new(stars).unwrap(),
            comment: "Good".to_owned(),
        }
    }

    #[tokio::test]
    async fn concurrent_payments_apply_once() {
        let (store, user, product) = seeded().await;
        let store = Arc::new(store);
        let order = store.create(new_order(user.id, &product)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .mark_paid(order.id, receipt(&format!("pi_{i}")), Utc::now())
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().was_applied() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);

        let stored = store.get(order.id).await.unwrap().unwrap();
        assert!(stored.is_paid);
        assert!(stored.is_consistent());
    }

    #[tokio::test]
    async fn delivery_before_payment_is_invalid_state() {
        let (store, user, product) = seeded().await;
        let order = store.create(new_order(user.id, &product)).await.unwrap();

        let err = store.mark_delivered(order.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidState(_)));
        assert!(!store.get(order.id).await.unwrap().unwrap().is_delivered);

        store.mark_paid(order.id, receipt("pi_1"), Utc::now()).await.unwrap();
        assert!(store.mark_delivered(order.id, Utc::now()).await.unwrap().was_applied());
        assert!(!store.mark_delivered(order.id, Utc::now()).await.unwrap().was_applied());
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .mark_paid(OrderId::new(404), receipt("pi_1"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn second_review_by_same_author_conflicts() {
        let (store, user, product) = seeded().await;

        let (_, summary) = store.add_review(review(product.id, user.id, 4)).await.unwrap();
        assert_eq!(summary.num_reviews, 1);

        let err = store.add_review(review(product.id, user.id, 1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.num_reviews, 1);
        assert!((stored.rating - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rating_is_mean_of_all_reviews() {
        let (store, _, product) = seeded().await;
        for (i, stars) in [5, 4, 3].into_iter().enumerate() {
            let author = store
                .create_user(NewUser {
                    name: format!("Shopper {i}"),
                    email: Email::parse(&format!("shopper{i}@example.com")).unwrap(),
                    password_hash: "hash".to_owned(),
                    is_admin: false,
                })
                .await
                .unwrap();
            store.add_review(review(product.id, author.id, stars)).await.unwrap();
        }

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.num_reviews, 3);
        assert!((stored.rating - 4.0).abs() < f64::EPSILON);
        assert_eq!(store.reviews(product.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn wishlist_toggles() {
        let (store, user, product) = seeded().await;

        let first = store.toggle_wishlist(user.id, product.id).await.unwrap();
        assert!(first.added);
        assert_eq!(first.wishlist, vec![product.id]);

        let second = store.toggle_wishlist(user.id, product.id).await.unwrap();
        assert!(!second.added);
        assert!(second.wishlist.is_empty());

        let err = store
            .toggle_wishlist(user.id, ProductId::new(999))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn deleting_a_product_keeps_order_snapshots() {
        let (store, user, product) = seeded().await;
        let order = store.create(new_order(user.id, &product)).await.unwrap();

        store.delete_product(product.id).await.unwrap();
        assert!(store.get_product(product.id).await.unwrap().is_none());

        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.lines[0].name, "Headphones");
    }

    #[tokio::test]
    async fn recommendations_share_category_or_brand() {
        let (store, user, product) = seeded().await;
        let same_brand = store
            .create_product(NewProduct {
                category: "Speakers".to_owned(),
                ..NewProduct::sample(user.id)
            })
            .await
            .unwrap();
        let unrelated = store
            .create_product(NewProduct {
                brand: "Other".to_owned(),
                category: "Other".to_owned(),
                ..NewProduct::sample(user.id)
            })
            .await
            .unwrap();

        let recs = store.recommendations(product.id, 4).await.unwrap();
        let ids: Vec<_> = recs.iter().map(|p| p.id).collect();
        assert!(ids.contains(&same_brand.id));
        assert!(!ids.contains(&unrelated.id));
        assert!(!ids.contains(&product.id));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (store, _, _) = seeded().await;
        let err = store
            .create_user(NewUser {
                name: "Other".to_owned(),
                email: Email::parse("ASHA@example.com").unwrap(),
                password_hash: "hash".to_owned(),
                is_admin: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }
}
