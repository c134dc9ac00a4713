//! PostgreSQL storage backend.
//!
//! Implements the repository traits on top of `sqlx`. The
//! `(user_id, idempotency_key)` pair is a real UNIQUE constraint here, so
//! duplicate-payment detection works across processes, not just within one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OrderId, OrderLineId, PaymentId, RefundId, UserId};
use domain::{
    InventoryRecord, Money, Order, OrderLine, OrderStatus, Payment, PaymentStatus, ProductId,
    Refund, RefundLine, RefundStatus,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::{InventoryStore, OrderStore, PaymentStore, RefundStore};

/// PostgreSQL backend implementing all four repository traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    async fn load_order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, product_name, unit_price_cents, quantity
            FROM order_lines WHERE order_id = $1 ORDER BY position
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_order_line).collect()
    }

    async fn load_refund_lines(&self, refund_id: RefundId) -> Result<Vec<RefundLine>> {
        let rows = sqlx::query(
            r#"
            SELECT order_line_id, product_id, product_name, unit_price_cents, quantity
            FROM refund_lines WHERE refund_id = $1 ORDER BY position
            "#,
        )
        .bind(refund_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_refund_line).collect()
    }

    async fn hydrate_order(&self, row: PgRow) -> Result<Order> {
        let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let lines = self.load_order_lines(id).await?;
        row_to_order(&row, lines)
    }

    async fn hydrate_refund(&self, row: PgRow) -> Result<Refund> {
        let id = RefundId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let lines = self.load_refund_lines(id).await?;
        row_to_refund(&row, lines)
    }
}

fn map_insert_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::DuplicateKey {
            constraint: db_err.constraint().unwrap_or("unknown").to_string(),
        };
    }
    StoreError::Database(e)
}

fn require_updated(rows_affected: u64, entity: &'static str, id: String) -> Result<()> {
    if rows_affected == 0 {
        return Err(StoreError::RowMissing { entity, id });
    }
    Ok(())
}

fn parse_status<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|e: String| StoreError::Database(sqlx::Error::Decode(e.into())))
}

fn row_to_inventory(row: &PgRow) -> Result<InventoryRecord> {
    Ok(InventoryRecord::from_parts(
        ProductId::new(row.try_get::<String, _>("product_id")?),
        row.try_get::<i64, _>("quantity_available")? as u32,
        row.try_get::<i64, _>("quantity_reserved")? as u32,
        row.try_get::<DateTime<Utc>, _>("created_at")?,
        row.try_get::<DateTime<Utc>, _>("updated_at")?,
    ))
}

fn row_to_order_line(row: PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        id: OrderLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        quantity: row.try_get::<i64, _>("quantity")? as u32,
    })
}

fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
    let status: OrderStatus = parse_status(row.try_get::<String, _>("status")?.as_str())?;
    Ok(Order::from_parts(
        OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        status,
        Money::from_cents(row.try_get("total_amount_cents")?),
        lines,
        row.try_get::<DateTime<Utc>, _>("created_at")?,
        row.try_get::<DateTime<Utc>, _>("updated_at")?,
    ))
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let status: PaymentStatus = parse_status(row.try_get::<String, _>("status")?.as_str())?;
    Ok(Payment::from_parts(
        PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
        status,
        Money::from_cents(row.try_get("amount_cents")?),
        row.try_get::<DateTime<Utc>, _>("created_at")?,
        row.try_get::<DateTime<Utc>, _>("updated_at")?,
    ))
}

fn row_to_refund_line(row: PgRow) -> Result<RefundLine> {
    Ok(RefundLine {
        order_line_id: OrderLineId::from_uuid(row.try_get::<Uuid, _>("order_line_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        quantity: row.try_get::<i64, _>("quantity")? as u32,
    })
}

fn row_to_refund(row: &PgRow, lines: Vec<RefundLine>) -> Result<Refund> {
    let status: RefundStatus = parse_status(row.try_get::<String, _>("status")?.as_str())?;
    Ok(Refund::from_parts(
        RefundId::from_uuid(row.try_get::<Uuid, _>("id")?),
        UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        PaymentId::from_uuid(row.try_get::<Uuid, _>("payment_id")?),
        OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        status,
        Money::from_cents(row.try_get("amount_cents")?),
        row.try_get("reason")?,
        row.try_get::<Option<String>, _>("admin_comment")?,
        lines,
        row.try_get::<DateTime<Utc>, _>("created_at")?,
        row.try_get::<DateTime<Utc>, _>("updated_at")?,
    ))
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn insert_inventory(&self, record: &InventoryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventories
                (product_id, quantity_available, quantity_reserved, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.product_id().as_str())
        .bind(i64::from(record.available()))
        .bind(i64::from(record.reserved()))
        .bind(record.created_at())
        .bind(record.updated_at())
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(())
    }

    async fn find_inventory(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query("SELECT * FROM inventories WHERE product_id = $1")
            .bind(product_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_inventory).transpose()
    }

    async fn save_inventory(&self, record: &InventoryRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventories
            SET quantity_available = $2, quantity_reserved = $3, updated_at = $4
            WHERE product_id = $1
            "#,
        )
        .bind(record.product_id().as_str())
        .bind(i64::from(record.available()))
        .bind(i64::from(record.reserved()))
        .bind(record.updated_at())
        .execute(&self.pool)
        .await?;

        require_updated(
            result.rows_affected(),
            "inventory",
            record.product_id().to_string(),
        )
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_amount_cents, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_amount().cents())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(map_insert_err)?;

        for (position, line) in order.lines().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines
                    (id, order_id, position, product_id, product_name, unit_price_cents, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(order.id().as_uuid())
            .bind(position as i64)
            .bind(line.product_id.as_str())
            .bind(&line.product_name)
            .bind(line.unit_price.cents())
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_order(row).await?)),
            None => Ok(None),
        }
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id().as_uuid())
            .bind(order.status().as_str())
            .bind(order.updated_at())
            .execute(&self.pool)
            .await?;

        require_updated(result.rows_affected(), "order", order.id().to_string())
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.hydrate_order(row).await?);
        }
        Ok(orders)
    }

    async fn list_orders_created_before(
        &self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrderId>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM orders
            WHERE status = $1 AND created_at < $2
            ORDER BY created_at
            "#,
        )
        .bind(status.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(OrderId::from_uuid(row.try_get::<Uuid, _>("id")?)))
            .collect()
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, user_id, order_id, idempotency_key, status, amount_cents,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.user_id().as_uuid())
        .bind(payment.order_id().as_uuid())
        .bind(payment.idempotency_key().as_str())
        .bind(payment.status().as_str())
        .bind(payment.amount().cents())
        .bind(payment.created_at())
        .bind(payment.updated_at())
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(())
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn find_payment_by_key(
        &self,
        user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE user_id = $1 AND idempotency_key = $2")
            .bind(user_id.as_uuid())
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn save_payment(&self, payment: &Payment) -> Result<()> {
        let result = sqlx::query("UPDATE payments SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(payment.id().as_uuid())
            .bind(payment.status().as_str())
            .bind(payment.updated_at())
            .execute(&self.pool)
            .await?;

        require_updated(result.rows_affected(), "payment", payment.id().to_string())
    }

    async fn list_payments_by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        let rows = sqlx::query("SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_payment).collect()
    }
}

#[async_trait]
impl RefundStore for PgStore {
    async fn insert_refund(&self, refund: &Refund) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO refunds
                (id, user_id, payment_id, order_id, status, amount_cents, reason,
                 admin_comment, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(refund.id().as_uuid())
        .bind(refund.user_id().as_uuid())
        .bind(refund.payment_id().as_uuid())
        .bind(refund.order_id().as_uuid())
        .bind(refund.status().as_str())
        .bind(refund.amount().cents())
        .bind(refund.reason())
        .bind(refund.admin_comment())
        .bind(refund.created_at())
        .bind(refund.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(map_insert_err)?;

        for (position, line) in refund.lines().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO refund_lines
                    (refund_id, position, order_line_id, product_id, product_name,
                     unit_price_cents, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(refund.id().as_uuid())
            .bind(position as i64)
            .bind(line.order_line_id.as_uuid())
            .bind(line.product_id.as_str())
            .bind(&line.product_name)
            .bind(line.unit_price.cents())
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_refund(&self, id: RefundId) -> Result<Option<Refund>> {
        let row = sqlx::query("SELECT * FROM refunds WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_refund(row).await?)),
            None => Ok(None),
        }
    }

    async fn save_refund(&self, refund: &Refund) -> Result<()> {
        let result = sqlx::query(
            "UPDATE refunds SET status = $2, admin_comment = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(refund.id().as_uuid())
        .bind(refund.status().as_str())
        .bind(refund.admin_comment())
        .bind(refund.updated_at())
        .execute(&self.pool)
        .await?;

        require_updated(result.rows_affected(), "refund", refund.id().to_string())
    }

    async fn list_refunds_by_user(&self, user_id: UserId) -> Result<Vec<Refund>> {
        let rows = sqlx::query("SELECT * FROM refunds WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        let mut refunds = Vec::with_capacity(rows.len());
        for row in rows {
            refunds.push(self.hydrate_refund(row).await?);
        }
        Ok(refunds)
    }

    async fn list_refunds_by_status(&self, status: RefundStatus) -> Result<Vec<Refund>> {
        let rows = sqlx::query("SELECT * FROM refunds WHERE status = $1 ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut refunds = Vec::with_capacity(rows.len());
        for row in rows {
            refunds.push(self.hydrate_refund(row).await?);
        }
        Ok(refunds)
    }

    async fn list_refunds_by_payment(&self, payment_id: PaymentId) -> Result<Vec<Refund>> {
        let rows = sqlx::query("SELECT * FROM refunds WHERE payment_id = $1 ORDER BY created_at")
            .bind(payment_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        let mut refunds = Vec::with_capacity(rows.len());
        for row in rows {
            refunds.push(self.hydrate_refund(row).await?);
        }
        Ok(refunds)
    }
}
