//! Stripe payment intents over the REST API.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;

use marigold_core::OrderId;

use super::{IntentRequest, PaymentError, PaymentGateway, PaymentIntent, validate_intent_id};
use crate::config::StripeConfig;

/// Metadata key holding the order id on every intent we create.
const ORDER_METADATA_KEY: &str = "order_id";

/// Stripe API client.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    intents_url: String,
    currency: String,
}

impl StripeGateway {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();

        let mut auth_value =
            HeaderValue::from_str(&format!("Bearer {}", config.secret_key.expose_secret()))
                .map_err(|e| PaymentError::Parse(format!("Invalid API key format: {e}")))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            intents_url: format!(
                "{}/v1/payment_intents",
                config.api_base.as_str().trim_end_matches('/')
            ),
            currency: config.currency.to_lowercase(),
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(skip(self), fields(order_id = %request.order_id))]
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, PaymentError> {
        let form = [
            ("amount", request.amount_minor.to_string()),
            ("currency", self.currency.clone()),
            ("payment_method_types[]", "card".to_owned()),
            (
                "metadata[order_id]",
                request.order_id.as_i32().to_string(),
            ),
        ];

        // Repeat requests for the same order return the same intent.
        let response = self
            .client
            .post(&self.intents_url)
            .header(
                "Idempotency-Key",
                format!("intent-order-{}-{}", request.order_id, request.amount_minor),
            )
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        read_intent(response).await
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        validate_intent_id(intent_id)?;

        let response = self
            .client
            .get(format!("{}/{intent_id}", self.intents_url))
            .send()
            .await
            .map_err(transport_error)?;

        read_intent(response).await
    }
}

fn transport_error(err: reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        PaymentError::Timeout
    } else {
        PaymentError::Http(err)
    }
}

async fn read_intent(response: reqwest::Response) -> Result<PaymentIntent, PaymentError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.error.message)
            .unwrap_or(body);
        return Err(PaymentError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let intent: ApiIntent = response.json().await.map_err(|e| {
        if e.is_timeout() {
            PaymentError::Timeout
        } else {
            PaymentError::Parse(e.to_string())
        }
    })?;

    intent.try_into()
}

// =============================================================================
// API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiIntent {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    client_secret: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl TryFrom<ApiIntent> for PaymentIntent {
    type Error = PaymentError;

    fn try_from(raw: ApiIntent) -> Result<Self, Self::Error> {
        let order_id = raw
            .metadata
            .get(ORDER_METADATA_KEY)
            .map(|value| {
                value.parse::<OrderId>().map_err(|_| {
                    PaymentError::Parse(format!("intent {} has order_id {value:?}", raw.id))
                })
            })
            .transpose()?;

        Ok(Self {
            id: raw.id,
            client_secret: raw.client_secret,
            amount_minor: raw.amount,
            currency: raw.currency,
            status: raw.status,
            order_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Form, Json, Router};
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use url::Url;

    use super::*;

    #[derive(Clone, Default)]
    struct Seen {
        requests: Arc<Mutex<Vec<(HeaderMap, HashMap<String, String>)>>>,
    }

    async fn create(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        let amount: i64 = form["amount"].parse().unwrap();
        let order_id = form["metadata[order_id]"].clone();
        seen.requests.lock().unwrap().push((headers, form));
        if amount > 10_000_000 {
            return (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({"error": {"message": "Amount too large", "type": "invalid_request_error"}})),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "id": "pi_test_1",
                "object": "payment_intent",
                "amount": amount,
                "currency": "inr",
                "status": "requires_payment_method",
                "client_secret": "pi_test_1_secret_abc",
                "metadata": {"order_id": order_id},
            })),
        )
    }

    async fn retrieve(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
        if id == "pi_slow" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if id == "pi_missing" {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"message": "No such payment_intent: 'pi_missing'"}})),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "id": id,
                "amount": 23000,
                "currency": "inr",
                "status": "succeeded",
                "client_secret": null,
                "metadata": {"order_id": "7"},
            })),
        )
    }

    async fn spawn_fake_processor() -> (StripeGateway, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route("/v1/payment_intents", post(create))
            .route("/v1/payment_intents/{id}", get(retrieve))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = StripeConfig {
            secret_key: SecretString::from("sk_test_4eC39HqLyjWDarjtT1zdp7dc"),
            api_base: Url::parse(&format!("http://{addr}")).unwrap(),
            currency: "INR".to_owned(),
            timeout: Duration::from_millis(300),
        };
        (StripeGateway::new(&config).unwrap(), seen)
    }

    #[tokio::test]
    async fn create_intent_posts_form_with_order_metadata() {
        let (gateway, seen) = spawn_fake_processor().await;

        let intent = gateway
            .create_intent(IntentRequest {
                order_id: OrderId::new(7),
                amount_minor: 23_000,
            })
            .await
            .unwrap();

        assert_eq!(intent.id, "pi_test_1");
        assert_eq!(intent.amount_minor, 23_000);
        assert_eq!(intent.order_id, Some(OrderId::new(7)));
        assert_eq!(intent.client_secret.as_deref(), Some("pi_test_1_secret_abc"));
        assert!(!intent.is_succeeded());

        let requests = seen.requests.lock().unwrap();
        let (headers, form) = &requests[0];
        assert_eq!(
            headers["authorization"],
            "Bearer sk_test_4eC39HqLyjWDarjtT1zdp7dc"
        );
        assert_eq!(headers["idempotency-key"], "intent-order-7-23000");
        assert_eq!(form["currency"], "inr");
        assert_eq!(form["payment_method_types[]"], "card");
    }

    #[tokio::test]
    async fn api_errors_carry_processor_message() {
        let (gateway, _) = spawn_fake_processor().await;

        let err = gateway
            .create_intent(IntentRequest {
                order_id: OrderId::new(1),
                amount_minor: 50_000_000,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Api { status: 402, ref message } if message == "Amount too large"
        ));

        let err = gateway.retrieve_intent("pi_missing").await.unwrap_err();
        assert!(matches!(err, PaymentError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn retrieve_reports_status_and_metadata() {
        let (gateway, _) = spawn_fake_processor().await;

        let intent = gateway.retrieve_intent("pi_done").await.unwrap();
        assert!(intent.is_succeeded());
        assert_eq!(intent.order_id, Some(OrderId::new(7)));
    }

    #[tokio::test]
    async fn slow_processor_times_out() {
        let (gateway, _) = spawn_fake_processor().await;

        let err = gateway.retrieve_intent("pi_slow").await.unwrap_err();
        assert!(matches!(err, PaymentError::Timeout), "{err:?}");
    }

    #[tokio::test]
    async fn malformed_ids_never_reach_the_network() {
        let (gateway, _) = spawn_fake_processor().await;

        let err = gateway.retrieve_intent("../charges").await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidIntentId(_)));
    }
}
