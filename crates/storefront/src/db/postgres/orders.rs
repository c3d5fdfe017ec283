//! Order persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;

use marigold_core::{
    Money, NewOrder, Order, OrderId, OrderLine, OrderTotals, PaymentMethod, PaymentReceipt,
    ShippingAddress, Transition, UserId,
};

use super::PgStore;
use crate::db::{OrderStore, RepositoryError};

const ORDER_COLUMNS: &str = "id, user_id, line_items, shipping_address, payment_method, \
     items_price, shipping_price, tax_price, total_price, \
     is_paid, paid_at, payment_result, is_delivered, delivered_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    line_items: Json<Vec<OrderLine>>,
    shipping_address: Json<ShippingAddress>,
    payment_method: String,
    items_price: Decimal,
    shipping_price: Decimal,
    tax_price: Decimal,
    total_price: Decimal,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    payment_result: Option<Json<PaymentReceipt>>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let payment_method: PaymentMethod = row.payment_method.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("order {}: {e}", row.id))
        })?;

        Ok(Self {
            id: OrderId::new(row.id),
            owner: UserId::new(row.user_id),
            lines: row.line_items.0,
            shipping_address: row.shipping_address.0,
            payment_method,
            totals: OrderTotals {
                items_price: Money::new(row.items_price),
                shipping_price: Money::new(row.shipping_price),
                tax_price: Money::new(row.tax_price),
                total_price: Money::new(row.total_price),
            },
            is_paid: row.is_paid,
            paid_at: row.paid_at,
            payment_result: row.payment_result.map(|json| json.0),
            is_delivered: row.is_delivered,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let totals = order.totals();
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO storefront.customer_order
                (user_id, line_items, shipping_address, payment_method,
                 items_price, shipping_price, tax_price, total_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.owner())
        .bind(Json(order.lines()))
        .bind(Json(order.shipping_address()))
        .bind(order.payment_method().as_str())
        .bind(totals.items_price)
        .bind(totals.shipping_price)
        .bind(totals.tax_price)
        .bind(totals.total_price)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM storefront.customer_order
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn mark_paid(
        &self,
        id: OrderId,
        receipt: PaymentReceipt,
        at: DateTime<Utc>,
    ) -> Result<Transition<Order>, RepositoryError> {
        // The WHERE clause makes the check and the write one statement
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE storefront.customer_order
            SET is_paid = TRUE, paid_at = $2, payment_result = $3
            WHERE id = $1 AND NOT is_paid
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(at)
        .bind(Json(&receipt))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(Transition::Applied(row.try_into()?));
        }
        match self.get(id).await? {
            Some(order) => Ok(Transition::Unchanged(order)),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn mark_delivered(
        &self,
        id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<Transition<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE storefront.customer_order
            SET is_delivered = TRUE, delivered_at = $2
            WHERE id = $1 AND is_paid AND NOT is_delivered
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(Transition::Applied(row.try_into()?));
        }
        match self.get(id).await? {
            None => Err(RepositoryError::NotFound),
            Some(order) if !order.is_paid => Err(RepositoryError::InvalidState(format!(
                "order {id} must be paid before it can be delivered"
            ))),
            Some(order) => Ok(Transition::Unchanged(order)),
        }
    }
}
