//! Order lifecycle engine.
//!
//! Drives an order from placement through payment or cancellation while
//! keeping product stock consistent with the orders that claim it.
//!
//! ## Unit of work
//!
//! Each mutating operation runs inside one [`UnitOfWork`]:
//!
//! ```text
//! validate input (no store access)
//!   ↓
//! begin unit
//!   ↓
//! lock rows (products always in ascending id order)
//!   ↓
//! check every precondition on local copies
//!   ↓
//! write stock + order
//!   ↓
//! commit  (any error before this point rolls the unit back)
//! ```
//!
//! Products are locked before stock is compared, so concurrent placements
//! against one product serialize: N requests for quantity Q against stock S
//! produce exactly `S / Q` orders.
//!
//! ## Retries
//!
//! Transient store failures (deadlock, serialization failure, lock or pool
//! timeout) and order-number collisions re-run the whole unit according to
//! the engine's [`RetryPolicy`]. Business failures are returned immediately.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use orderdesk_catalog::Product;
use orderdesk_core::{CustomerId, OrderId, ProductId, TenantContext, TenantId};
use orderdesk_sales::{
    aggregate_quantities, generate_order_number, validate_line_requests, LineRequest, Order,
    OrderLine, OrderStatus,
};

use crate::config::AppConfig;
use crate::error::LifecycleError;
use crate::retry::RetryPolicy;
use crate::store::{OrderFilter, OrderStore, TransactionalStore, UnitOfWork};

/// Produces a candidate order number for a placement timestamp.
pub type OrderNumberGenerator = Arc<dyn Fn(DateTime<Utc>) -> String + Send + Sync>;

/// Tenant-scoped order placement, status changes, and cancellation.
pub struct OrderLifecycleEngine<S> {
    store: S,
    retry: RetryPolicy,
    order_numbers: OrderNumberGenerator,
}

impl<S> OrderLifecycleEngine<S>
where
    S: TransactionalStore + OrderStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            order_numbers: Arc::new(generate_order_number),
        }
    }

    /// Engine using the retry policy loaded into `config`.
    pub fn from_config(store: S, config: &AppConfig) -> Self {
        Self::new(store).with_retry_policy(config.retry)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the order-number generator (tests use this to force collisions).
    pub fn with_order_number_generator(mut self, generator: OrderNumberGenerator) -> Self {
        self.order_numbers = generator;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Place a new pending order, reserving stock for every line.
    ///
    /// Lines for the same product are summed for the stock check but kept as
    /// separate order lines. Unit prices are snapshotted from the catalog.
    #[instrument(
        skip(self, ctx, lines),
        fields(tenant_id = %ctx.tenant_id(), customer_id = %customer_id, line_count = lines.len()),
        err
    )]
    pub async fn create_order(
        &self,
        ctx: &TenantContext,
        customer_id: CustomerId,
        lines: Vec<LineRequest>,
    ) -> Result<Order, LifecycleError> {
        validate_line_requests(&lines)?;
        let quantities = aggregate_quantities(&lines)?;

        let tenant_id = ctx.tenant_id();
        let lines = &lines;
        let quantities = &quantities;
        let order = self
            .with_retry("create_order", move || {
                self.try_create_order(tenant_id, customer_id, lines, quantities)
            })
            .await?;

        info!(
            order_id = %order.id_typed(),
            order_number = %order.order_number(),
            total = %order.total_amount(),
            "order placed"
        );
        Ok(order)
    }

    /// Change the status of an order.
    ///
    /// Cancelling goes through [`Self::cancel_order`] so stock is restored.
    /// Re-applying the current status is a no-op that returns the order.
    #[instrument(
        skip(self, ctx),
        fields(tenant_id = %ctx.tenant_id(), order_id = %order_id, to = %new_status),
        err
    )]
    pub async fn update_status(
        &self,
        ctx: &TenantContext,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<Order, LifecycleError> {
        if new_status == OrderStatus::Cancelled {
            return self.cancel_order(ctx, order_id).await;
        }

        let tenant_id = ctx.tenant_id();
        let (order, changed) = self
            .with_retry("update_status", move || {
                self.try_update_status(tenant_id, order_id, new_status)
            })
            .await?;

        if changed {
            info!(order_number = %order.order_number(), status = %order.status(), "order status updated");
        }
        Ok(order)
    }

    /// Cancel an order and return its quantities to stock.
    ///
    /// A cancelled order cannot be cancelled again, so stock is restored at
    /// most once.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), order_id = %order_id), err)]
    pub async fn cancel_order(
        &self,
        ctx: &TenantContext,
        order_id: OrderId,
    ) -> Result<Order, LifecycleError> {
        let tenant_id = ctx.tenant_id();
        let order = self
            .with_retry("cancel_order", move || self.try_cancel_order(tenant_id, order_id))
            .await?;

        info!(order_number = %order.order_number(), "order cancelled");
        Ok(order)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), order_id = %order_id), err)]
    pub async fn get_order(
        &self,
        ctx: &TenantContext,
        order_id: OrderId,
    ) -> Result<Order, LifecycleError> {
        self.store
            .get_order(ctx.tenant_id(), order_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("order", order_id))
    }

    /// Orders matching `filter`, newest first.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn list_orders(
        &self,
        ctx: &TenantContext,
        filter: OrderFilter,
    ) -> Result<Vec<Order>, LifecycleError> {
        Ok(self.store.list_orders(ctx.tenant_id(), filter).await?)
    }

    async fn try_create_order(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
        lines: &[LineRequest],
        quantities: &BTreeMap<ProductId, u32>,
    ) -> Result<Order, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let result = self
            .reserve_and_place(&mut tx, tenant_id, customer_id, lines, quantities)
            .await;
        finish(tx, result).await
    }

    async fn reserve_and_place(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        customer_id: CustomerId,
        lines: &[LineRequest],
        quantities: &BTreeMap<ProductId, u32>,
    ) -> Result<Order, LifecycleError> {
        if tx.find_customer(tenant_id, customer_id).await?.is_none() {
            return Err(LifecycleError::not_found("customer", customer_id));
        }

        let product_ids: Vec<ProductId> = quantities.keys().copied().collect();
        let mut products: HashMap<ProductId, Product> = tx
            .lock_products(tenant_id, &product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let now = Utc::now();
        for (product_id, quantity) in quantities {
            let product = products
                .get_mut(product_id)
                .ok_or_else(|| LifecycleError::not_found("product", product_id))?;
            product.reserve(*quantity, now)?;
        }

        for product_id in &product_ids {
            if let Some(product) = products.get(product_id) {
                tx.save_stock(product).await?;
                debug!(
                    product_id = %product.id,
                    sku = %product.sku,
                    stock = product.stock_quantity,
                    "stock reserved"
                );
            }
        }

        let mut order_lines = Vec::with_capacity(lines.len());
        for line in lines {
            let product = products
                .get(&line.product_id)
                .ok_or_else(|| LifecycleError::not_found("product", line.product_id))?;
            order_lines.push(OrderLine::new(line.product_id, line.quantity, product.unit_price)?);
        }

        let order_number = (self.order_numbers)(now);
        let order = Order::place(tenant_id, customer_id, order_number, order_lines, now)?;
        tx.insert_order(&order).await?;
        Ok(order)
    }

    async fn try_update_status(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<(Order, bool), LifecycleError> {
        let mut tx = self.store.begin().await?;
        let result = transition_status(&mut tx, tenant_id, order_id, new_status).await;
        finish(tx, result).await
    }

    async fn try_cancel_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Order, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let result = restore_and_cancel(&mut tx, tenant_id, order_id).await;
        finish(tx, result).await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt_fn: F,
    ) -> Result<T, LifecycleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LifecycleError>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_fn().await {
                Err(err) if err.is_retryable() => {
                    if !self.retry.should_retry(attempt) {
                        return Err(LifecycleError::Transient {
                            attempts: attempt,
                            reason: err.to_string(),
                        });
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying unit of work"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Returns the order and whether its status changed.
async fn transition_status<U: UnitOfWork>(
    tx: &mut U,
    tenant_id: TenantId,
    order_id: OrderId,
    new_status: OrderStatus,
) -> Result<(Order, bool), LifecycleError> {
    let mut order = tx
        .lock_order(tenant_id, order_id)
        .await?
        .ok_or_else(|| LifecycleError::not_found("order", order_id))?;
    let previous = order.status();
    order.transition_to(new_status, Utc::now())?;

    let changed = previous != new_status;
    if changed {
        tx.update_order_status(&order).await?;
    }
    Ok((order, changed))
}

async fn restore_and_cancel<U: UnitOfWork>(
    tx: &mut U,
    tenant_id: TenantId,
    order_id: OrderId,
) -> Result<Order, LifecycleError> {
    let mut order = tx
        .lock_order(tenant_id, order_id)
        .await?
        .ok_or_else(|| LifecycleError::not_found("order", order_id))?;
    let now = Utc::now();
    order.transition_to(OrderStatus::Cancelled, now)?;

    let quantities = order.quantities_by_product();
    let product_ids: Vec<ProductId> = quantities.keys().copied().collect();
    let mut products: HashMap<ProductId, Product> = tx
        .lock_products(tenant_id, &product_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    for (product_id, quantity) in &quantities {
        let Some(product) = products.get_mut(product_id) else {
            warn!(product_id = %product_id, "product of cancelled order no longer exists; stock not restored");
            continue;
        };
        product.restock(*quantity, now)?;
        tx.save_stock(product).await?;
        debug!(
            product_id = %product.id,
            sku = %product.sku,
            stock = product.stock_quantity,
            "stock restored"
        );
    }

    tx.update_order_status(&order).await?;
    Ok(order)
}

/// Commit on success, roll back on failure.
async fn finish<U: UnitOfWork, T>(
    tx: U,
    result: Result<T, LifecycleError>,
) -> Result<T, LifecycleError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
