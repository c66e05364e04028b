//! Postgres-backed store.
//!
//! Every query carries `tenant_id` in its WHERE clause. Units of work are
//! plain sqlx transactions: rows are locked with `SELECT ... FOR UPDATE` in
//! ascending id order and lock waits are bounded with `SET LOCAL lock_timeout`.
//!
//! ## Error Mapping
//!
//! | SQLSTATE | Meaning | StoreError |
//! |----------|---------|------------|
//! | `40001` | serialization failure | `SerializationFailure` (transient) |
//! | `40P01` | deadlock detected | `Deadlock` (transient) |
//! | `55P03` | lock not available (lock_timeout) | `LockTimeout` (transient) |
//! | `23505` | unique violation | `DuplicateSku` / `DuplicateOrderNumber` by constraint, else `Conflict` |
//! | `23503` | foreign key violation | `Conflict` |
//! | `23514` | check violation | `Conflict` |
//! | pool timeout | | `PoolTimeout` (transient) |
//!
//! Money is stored as `BIGINT` minor units, quantities as `BIGINT` with
//! `CHECK (>= 0)`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use orderdesk_catalog::Product;
use orderdesk_core::{
    CustomerId, Money, OrderId, OrderLineId, ProductId, Tenant, TenantId, TenantOwned,
};
use orderdesk_parties::{ContactInfo, Customer};
use orderdesk_sales::{Order, OrderLine, OrderRecord, OrderStatus};

use super::{
    CatalogStore, CustomerFilter, CustomerStore, OrderFilter, OrderStore, ProductFilter,
    StoreError, StoreResult, TenantDirectory, TransactionalStore, UnitOfWork,
};

/// Idempotent DDL for every table the store uses.
pub const SCHEMA: &str = include_str!("../../migrations/0001_orderdesk.sql");

const PRODUCTS_SKU_CONSTRAINT: &str = "products_tenant_sku_key";
const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";

const PRODUCT_COLUMNS: &str = "id, tenant_id, name, sku, unit_price_cents, stock_quantity, \
     low_stock_threshold, version, created_at, updated_at";
const CUSTOMER_COLUMNS: &str = "id, tenant_id, name, email, phone, address, created_at, updated_at";
const ORDER_COLUMNS: &str =
    "id, tenant_id, customer_id, order_number, status, total_amount_cents, created_at, updated_at";

/// Postgres backend. Cheap to clone (the pool is reference counted).
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create all tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    async fn acquire(&self) -> StoreResult<sqlx::pool::PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }
}

#[async_trait]
impl TenantDirectory for PostgresStore {
    #[instrument(skip_all, fields(tenant_id = %tenant.id), err)]
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, slug, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant.id.as_uuid())
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.active)
        .bind(tenant.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_tenant", e))?;
        Ok(tenant)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn get_tenant(&self, tenant_id: TenantId) -> StoreResult<Option<Tenant>> {
        let row = sqlx::query(
            "SELECT id, name, slug, active, created_at FROM tenants WHERE id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_tenant", e))?;

        row.as_ref().map(tenant_from_row).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn set_tenant_active(&self, tenant_id: TenantId, active: bool) -> StoreResult<Tenant> {
        let row = sqlx::query(
            r#"
            UPDATE tenants SET active = $2
            WHERE id = $1
            RETURNING id, name, slug, active, created_at
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_tenant_active", e))?;

        match row {
            Some(row) => tenant_from_row(&row),
            None => Err(StoreError::not_found("tenant", tenant_id)),
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn delete_tenant(&self, tenant_id: TenantId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_tenant", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("tenant", tenant_id));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip_all, fields(tenant_id = %product.tenant_id, product_id = %product.id), err)]
    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, name, sku, unit_price_cents, stock_quantity,
                low_stock_threshold, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.tenant_id.as_uuid())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(money_to_db(product.unit_price)?)
        .bind(i64::from(product.stock_quantity))
        .bind(i64::from(product.low_stock_threshold))
        .bind(version_to_db(product.version)?)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, PRODUCTS_SKU_CONSTRAINT) {
                StoreError::DuplicateSku(product.sku.clone())
            } else {
                map_sqlx_error("insert_product", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    async fn get_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, rows = tracing::field::Empty), err)]
    async fn list_products(
        &self,
        tenant_id: TenantId,
        filter: &ProductFilter,
    ) -> StoreResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE tenant_id = $1 \
               AND ($2::text IS NULL OR name ILIKE $2 OR sku ILIKE $2) \
               AND (NOT $3::boolean OR stock_quantity <= low_stock_threshold) \
             ORDER BY name, id"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.search_term().map(like_pattern))
            .bind(filter.low_stock_only)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        Span::current().record("rows", rows.len());
        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip_all, fields(tenant_id = %product.tenant_id, product_id = %product.id), err)]
    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $3,
                sku = $4,
                unit_price_cents = $5,
                low_stock_threshold = $6,
                version = version + 1,
                updated_at = $7
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(product.tenant_id.as_uuid())
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(money_to_db(product.unit_price)?)
        .bind(i64::from(product.low_stock_threshold))
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, PRODUCTS_SKU_CONSTRAINT) {
                StoreError::DuplicateSku(product.sku.clone())
            } else {
                map_sqlx_error("update_product", e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", product.id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    async fn delete_product(&self, tenant_id: TenantId, product_id: ProductId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(product_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", product_id));
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for PostgresStore {
    #[instrument(skip_all, fields(tenant_id = %customer.tenant_id, customer_id = %customer.id), err)]
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, tenant_id, name, email, phone, address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(customer.tenant_id.as_uuid())
        .bind(&customer.name)
        .bind(customer.contact.email.as_deref())
        .bind(customer.contact.phone.as_deref())
        .bind(customer.contact.address.as_deref())
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_customer", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, customer_id = %customer_id), err)]
    async fn get_customer(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> StoreResult<Option<Customer>> {
        let sql =
            format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(customer_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;

        row.as_ref().map(customer_from_row).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_customers(
        &self,
        tenant_id: TenantId,
        filter: &CustomerFilter,
    ) -> StoreResult<Vec<Customer>> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers \
             WHERE tenant_id = $1 \
               AND ($2::text IS NULL OR name ILIKE $2 OR email ILIKE $2 OR phone ILIKE $2) \
             ORDER BY name, id"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.search_term().map(like_pattern))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_customers", e))?;

        rows.iter().map(customer_from_row).collect()
    }

    #[instrument(skip_all, fields(tenant_id = %customer.tenant_id, customer_id = %customer.id), err)]
    async fn update_customer(&self, customer: &Customer) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET name = $3, email = $4, phone = $5, address = $6, updated_at = $7
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(customer.tenant_id.as_uuid())
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(customer.contact.email.as_deref())
        .bind(customer.contact.phone.as_deref())
        .bind(customer.contact.address.as_deref())
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_customer", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("customer", customer.id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, customer_id = %customer_id), err)]
    async fn delete_customer(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM customers WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(customer_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_customer", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("customer", customer_id));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    async fn get_order(&self, tenant_id: TenantId, order_id: OrderId) -> StoreResult<Option<Order>> {
        let mut conn = self.acquire().await?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;

        match row {
            Some(row) => Ok(load_orders(&mut *conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, rows = tracing::field::Empty), err)]
    async fn list_orders(&self, tenant_id: TenantId, filter: OrderFilter) -> StoreResult<Vec<Order>> {
        let mut conn = self.acquire().await?;
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE tenant_id = $1
                AND ($2::text IS NULL OR status = $2)
                AND ($3::uuid IS NULL OR customer_id = $3)
                AND ($4::date IS NULL OR (created_at AT TIME ZONE 'UTC')::date >= $4)
                AND ($5::date IS NULL OR (created_at AT TIME ZONE 'UTC')::date <= $5)
            ORDER BY created_at DESC, id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.customer_id.map(|c| *c.as_uuid()))
            .bind(filter.created_from)
            .bind(filter.created_to)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        Span::current().record("rows", rows.len());
        load_orders(&mut *conn, rows).await
    }
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    type Tx = PostgresTx;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> StoreResult<PostgresTx> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // SET does not accept bind parameters; the value is an integer.
        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&stmt)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(PostgresTx { tx })
    }
}

/// Unit of work over a Postgres transaction. Dropping it rolls back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresTx {
    async fn find_customer(
        &mut self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> StoreResult<Option<Customer>> {
        let sql =
            format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(customer_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_customer", e))?;

        row.as_ref().map(customer_from_row).transpose()
    }

    async fn lock_products(
        &mut self,
        tenant_id: TenantId,
        product_ids: &[ProductId],
    ) -> StoreResult<Vec<Product>> {
        let ids: Vec<Uuid> = product_ids.iter().map(|id| *id.as_uuid()).collect();
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE tenant_id = $1 AND id = ANY($2) \
             ORDER BY id \
             FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn lock_order(
        &mut self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> StoreResult<Option<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?;

        match row {
            Some(row) => Ok(load_orders(&mut *self.tx, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn save_stock(&mut self, product: &Product) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = $3, version = $4, updated_at = $5
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(product.tenant_id.as_uuid())
        .bind(product.id.as_uuid())
        .bind(i64::from(product.stock_quantity))
        .bind(version_to_db(product.version)?)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_stock", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", product.id));
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, tenant_id, customer_id, order_number, status,
                total_amount_cents, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.tenant_id().as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.order_number())
        .bind(order.status().as_str())
        .bind(money_to_db(order.total_amount())?)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, ORDER_NUMBER_CONSTRAINT) {
                StoreError::DuplicateOrderNumber(order.order_number().to_string())
            } else {
                map_sqlx_error("insert_order", e)
            }
        })?;

        for (line_no, line) in order.lines().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    id, order_id, line_no, product_id, quantity,
                    unit_price_cents, line_total_cents
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(order.id_typed().as_uuid())
            .bind(line_no as i32)
            .bind(line.product_id.as_uuid())
            .bind(i64::from(line.quantity))
            .bind(money_to_db(line.unit_price)?)
            .bind(money_to_db(line.line_total)?)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_line", e))?;
        }
        Ok(())
    }

    async fn update_order_status(&mut self, order: &Order) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = $4 WHERE tenant_id = $1 AND id = $2",
        )
        .bind(order.tenant_id().as_uuid())
        .bind(order.id_typed().as_uuid())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order_status", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order.id_typed()));
        }
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Attach lines to order rows (one extra query for all of them).
async fn load_orders(conn: &mut PgConnection, rows: Vec<PgRow>) -> StoreResult<Vec<Order>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids = rows
        .iter()
        .map(|row| get::<Uuid>(row, "id"))
        .collect::<StoreResult<Vec<_>>>()?;

    let line_rows = sqlx::query(
        r#"
        SELECT id, order_id, product_id, quantity, unit_price_cents, line_total_cents
        FROM order_lines
        WHERE order_id = ANY($1)
        ORDER BY order_id, line_no
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_order_lines", e))?;

    let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    for row in &line_rows {
        let order_id: Uuid = get(row, "order_id")?;
        lines.entry(order_id).or_default().push(OrderLine {
            id: OrderLineId::from_uuid(get(row, "id")?),
            product_id: ProductId::from_uuid(get(row, "product_id")?),
            quantity: quantity_from_db(get(row, "quantity")?)?,
            unit_price: money_from_db(get(row, "unit_price_cents")?)?,
            line_total: money_from_db(get(row, "line_total_cents")?)?,
        });
    }

    rows.iter()
        .map(|row| {
            let id: Uuid = get(row, "id")?;
            let status: String = get(row, "status")?;
            let order = Order::restore(OrderRecord {
                id: OrderId::from_uuid(id),
                tenant_id: TenantId::from_uuid(get(row, "tenant_id")?),
                customer_id: CustomerId::from_uuid(get(row, "customer_id")?),
                order_number: get(row, "order_number")?,
                status: status
                    .parse::<OrderStatus>()
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                lines: lines.remove(&id).unwrap_or_default(),
                created_at: get(row, "created_at")?,
                updated_at: get(row, "updated_at")?,
            })
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

            let stored_total = money_from_db(get(row, "total_amount_cents")?)?;
            if stored_total != order.total_amount() {
                return Err(StoreError::Corrupt(format!(
                    "order {id} total {stored_total} does not match its lines ({})",
                    order.total_amount()
                )));
            }
            Ok(order)
        })
        .collect()
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("failed to read {column}: {e}")))
}

fn tenant_from_row(row: &PgRow) -> StoreResult<Tenant> {
    Ok(Tenant {
        id: TenantId::from_uuid(get(row, "id")?),
        name: get(row, "name")?,
        slug: get(row, "slug")?,
        active: get(row, "active")?,
        created_at: get(row, "created_at")?,
    })
}

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    let version: i64 = get(row, "version")?;
    Ok(Product {
        id: ProductId::from_uuid(get(row, "id")?),
        tenant_id: TenantId::from_uuid(get(row, "tenant_id")?),
        name: get(row, "name")?,
        sku: get(row, "sku")?,
        unit_price: money_from_db(get(row, "unit_price_cents")?)?,
        stock_quantity: quantity_from_db(get(row, "stock_quantity")?)?,
        low_stock_threshold: quantity_from_db(get(row, "low_stock_threshold")?)?,
        version: u64::try_from(version)
            .map_err(|_| StoreError::Corrupt(format!("negative product version {version}")))?,
        created_at: get::<DateTime<Utc>>(row, "created_at")?,
        updated_at: get::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn customer_from_row(row: &PgRow) -> StoreResult<Customer> {
    Ok(Customer {
        id: CustomerId::from_uuid(get(row, "id")?),
        tenant_id: TenantId::from_uuid(get(row, "tenant_id")?),
        name: get(row, "name")?,
        contact: ContactInfo {
            email: get(row, "email")?,
            phone: get(row, "phone")?,
            address: get(row, "address")?,
        },
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn money_to_db(amount: Money) -> StoreResult<i64> {
    i64::try_from(amount.cents())
        .map_err(|_| StoreError::Conflict(format!("amount {amount} exceeds the storable range")))
}

fn money_from_db(cents: i64) -> StoreResult<Money> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::Corrupt(format!("negative amount {cents}")))
}

fn quantity_from_db(value: i64) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("quantity {value} out of range")))
}

fn version_to_db(version: u64) -> StoreResult<i64> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version {version} out of range")))
}

/// `%term%` with LIKE wildcards in the term escaped.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Check whether an error is a unique violation of the named constraint.
fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint);
    }
    false
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("40001") => StoreError::SerializationFailure(msg),
                Some("40P01") => StoreError::Deadlock(msg),
                Some("55P03") => StoreError::LockTimeout(msg),
                Some("23505") | Some("23503") | Some("23514") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::PoolTimeout(format!("timed out acquiring a connection in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
