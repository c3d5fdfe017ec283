//! Seed the catalog from a YAML file.
//!
//! The file names one administrator, who owns the seeded products, and a list
//! of products:
//!
//! ```yaml
//! admin:
//!   name: Store Admin
//!   email: admin@example.com
//!   password: change-me-please
//! products:
//!   - name: Pixel 8
//!     image: /images/pixel8.jpg
//!     brand: Google
//!     category: Phones
//!     description: ...
//!     price: 59999
//!     countInStock: 12
//!     ram: 8
//! ```
//!
//! An existing account with the admin email is promoted instead of created.

use std::path::Path;

use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;

use marigold_core::{Email, UserId};
use marigold_storefront::db::{CatalogStore, PgStore, UserStore};
use marigold_storefront::models::NewProduct;
use marigold_storefront::services::auth::{AuthError, AuthService};

use super::connect;

/// Seed file contents.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    admin: SeedAdmin,
    #[serde(default)]
    products: Vec<NewProduct>,
}

#[derive(Debug, Deserialize)]
struct SeedAdmin {
    name: String,
    email: String,
    password: String,
}

/// Load the administrator and products from `file_path`.
///
/// # Arguments
///
/// * `file_path` - Path to the YAML catalog file
/// * `reset` - If true, delete orders, reviews, wishlists and products first
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or database
/// operations fail.
pub async fn catalog(file_path: &str, reset: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Parse before connecting so a bad file never touches the database
    let content = tokio::fs::read_to_string(path).await?;
    let file: CatalogFile = serde_yaml::from_str(&content)?;
    info!(products = file.products.len(), "Parsed catalog");

    let pool = connect().await?;
    if reset {
        clear_catalog(&pool).await?;
    }

    let store = PgStore::new(pool);
    let owner = ensure_admin(&store, &file.admin).await?;

    let mut created = 0_usize;
    for mut product in file.products {
        product.created_by = owner;
        let product = store.create_product(product).await?;
        info!(id = %product.id, name = %product.name, "Created product");
        created += 1;
    }

    info!(created, "Seeding complete");
    Ok(())
}

/// Create the administrator, or promote the existing account with that email.
async fn ensure_admin(
    store: &PgStore,
    admin: &SeedAdmin,
) -> Result<UserId, Box<dyn std::error::Error>> {
    match AuthService::new(store)
        .create_account(&admin.name, &admin.email, &admin.password, true)
        .await
    {
        Ok(user) => {
            info!(email = %user.email, "Created administrator");
            Ok(user.id)
        }
        Err(AuthError::UserAlreadyExists) => {
            let user = store.set_admin(&Email::parse(&admin.email)?, true).await?;
            info!(email = %user.email, "Administrator already exists");
            Ok(user.id)
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove orders, reviews, wishlists and products. Accounts are kept.
async fn clear_catalog(pool: &PgPool) -> Result<(), sqlx::Error> {
    info!("Clearing existing orders and catalog");
    sqlx::query(
        r"
        TRUNCATE storefront.customer_order, storefront.review,
                 storefront.wishlist_item, storefront.product
        RESTART IDENTITY
        ",
    )
    .execute(pool)
    .await?;
    Ok(())
}
