//! Integration test harness for the Marigold storefront.
//!
//! [`TestApp`] builds the real router over the in-memory store, an in-memory
//! session store and [`MockPaymentGateway`], and drives it with
//! `tower::ServiceExt::oneshot`. No network or database is involved.
//!
//! [`TestClient`] plays the part of one browser: it keeps the session cookie
//! between requests, so the cart and checkout progress carry over.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests
//! cargo test -p marigold-integration-tests
//!
//! # Against a running server
//! MARIGOLD_BASE_URL=http://localhost:5000 cargo test -p marigold-integration-tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::OnceCell;
use tower::ServiceExt;
use url::Url;

use marigold_core::{Money, PricingConfig, UserId};
use marigold_storefront::config::{StoreBackend, StorefrontConfig, StripeConfig};
use marigold_storefront::db::{MemoryStore, Stores};
use marigold_storefront::models::{NewProduct, Product, User};
use marigold_storefront::services::payments::MockPaymentGateway;
use marigold_storefront::state::AppState;

/// Password used for every account the harness creates.
pub const PASSWORD: &str = "correct-horse-42";

/// Configuration for in-process tests: memory store, no rate limiting.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        store: StoreBackend::Memory,
        database_url: None,
        host: IpAddr::from([127, 0, 0, 1]),
        port: 0,
        base_url: Url::parse("http://localhost:5000").unwrap(),
        static_dir: None,
        rate_limit: false,
        pricing: PricingConfig::default(),
        stripe: StripeConfig {
            secret_key: SecretString::from("sk_test_unused"),
            api_base: Url::parse("http://127.0.0.1:9").unwrap(),
            currency: "inr".to_owned(),
            timeout: Duration::from_secs(1),
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// The storefront wired for tests.
pub struct TestApp {
    /// Shared state, for seeding and inspecting stores directly.
    pub state: AppState,
    /// The card processor stand-in.
    pub payments: Arc<MockPaymentGateway>,
    router: Router,
    catalog_owner: OnceCell<UserId>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// Build the app with default pricing.
    #[must_use]
    pub fn new() -> Self {
        let payments = Arc::new(MockPaymentGateway::new());
        let state = AppState::new(
            test_config(),
            Stores::from_backend(MemoryStore::new()),
            payments.clone(),
        );
        let router = marigold_storefront::app(
            state.clone(),
            tower_sessions::MemoryStore::default(),
        );
        Self {
            state,
            payments,
            router,
            catalog_owner: OnceCell::new(),
        }
    }

    /// A browser with no cookies.
    #[must_use]
    pub fn client(&self) -> TestClient {
        TestClient {
            router: self.router.clone(),
            cookie: None,
        }
    }

    /// A browser signed in as a new shopper.
    pub async fn shopper(&self, name: &str, email: &str) -> TestClient {
        let mut client = self.client();
        let res = client
            .post(
                "/api/auth/register",
                serde_json::json!({ "name": name, "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register failed: {}", res.body);
        client
    }

    /// A browser signed in as a new administrator.
    pub async fn admin(&self, email: &str) -> TestClient {
        self.create_admin(email).await;
        let mut client = self.client();
        let res = client
            .post(
                "/api/auth/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.body);
        client
    }

    /// Create an administrator account directly in the store.
    pub async fn create_admin(&self, email: &str) -> User {
        self.state
            .auth_service()
            .create_account("Admin", email, PASSWORD, true)
            .await
            .unwrap()
    }

    /// Add a product to the catalog, owned by a fresh administrator.
    pub async fn create_product(&self, name: &str, price: i64, count_in_stock: u32) -> Product {
        let owner = self
            .catalog_owner
            .get_or_init(|| async { self.create_admin("catalog@marigold.test").await.id })
            .await;

        self.state
            .catalog()
            .create_product(NewProduct {
                created_by: *owner,
                name: name.to_owned(),
                image: format!("/images/{}.jpg", name.to_lowercase().replace(' ', "-")),
                brand: "Marigold".to_owned(),
                category: "Phones".to_owned(),
                description: format!("{name} for testing"),
                price: Money::from_major(price),
                count_in_stock,
                ram: Some(8),
            })
            .await
            .unwrap()
    }
}

/// One browser session against the in-process router.
#[derive(Clone)]
pub struct TestClient {
    router: Router,
    cookie: Option<String>,
}

/// A response with its body parsed as JSON.
#[derive(Debug)]
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// JSON body; `Null` when empty, a string when not JSON.
    pub body: Value,
}

impl TestResponse {
    /// The `message` field of an error body.
    #[must_use]
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }

    /// The `Location` header.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

impl TestClient {
    /// Send a request, keeping any session cookie the server sets.
    pub async fn request(&mut self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            && let Some(pair) = set_cookie.split(';').next()
        {
            self.cookie = Some(pair.to_owned());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// `GET`.
    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    /// `POST` with a JSON body.
    pub async fn post(&mut self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body)).await
    }

    /// `PUT` with a JSON body.
    pub async fn put(&mut self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(body)).await
    }

    /// `DELETE`.
    pub async fn delete(&mut self, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None).await
    }
}

/// A JSON number as `f64`, for comparing money amounts.
#[must_use]
pub fn amount(value: &Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}
