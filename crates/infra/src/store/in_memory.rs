//! In-memory store for tests and local development.
//!
//! A single async mutex guards all state. A unit of work holds that mutex for
//! its whole lifetime, so units are fully serialized; writes are staged on the
//! unit and only applied to the shared state on commit.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use orderdesk_catalog::Product;
use orderdesk_core::{CustomerId, Entity, OrderId, ProductId, Tenant, TenantId, TenantOwned};
use orderdesk_parties::Customer;
use orderdesk_sales::Order;

use super::{
    CatalogStore, CustomerFilter, CustomerStore, OrderFilter, OrderStore, ProductFilter,
    StoreError, StoreResult, TenantDirectory, TransactionalStore, UnitOfWork,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct State {
    tenants: HashMap<TenantId, Tenant>,
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    orders: HashMap<OrderId, Order>,
    order_numbers: HashSet<String>,
}

impl State {
    fn ensure_tenant(&self, tenant_id: TenantId) -> StoreResult<()> {
        if self.tenants.contains_key(&tenant_id) {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!("unknown tenant {tenant_id}")))
        }
    }

    fn sku_taken(&self, product: &Product) -> bool {
        self.products.values().any(|p| {
            p.tenant_id == product.tenant_id && p.id != product.id && p.sku == product.sku
        })
    }

    fn product_referenced(&self, product_id: ProductId) -> bool {
        self.orders
            .values()
            .any(|o| o.lines().iter().any(|l| l.product_id == product_id))
    }
}

/// Record lookup that treats other tenants' records as absent.
fn scoped<'a, K, V>(map: &'a HashMap<K, V>, tenant_id: TenantId, id: &K) -> Option<&'a V>
where
    K: Eq + Hash,
    V: TenantOwned,
{
    map.get(id).filter(|record| record.is_owned_by(tenant_id))
}

fn scoped_list<V>(map: &HashMap<<V as Entity>::Id, V>, tenant_id: TenantId) -> Vec<V>
where
    V: Entity + TenantOwned + Clone,
{
    map.values()
        .filter(|record| record.is_owned_by(tenant_id))
        .cloned()
        .collect()
}

/// Insert a new record; an id that already exists under any tenant is refused.
fn insert_new<V>(
    map: &mut HashMap<<V as Entity>::Id, V>,
    entity: &'static str,
    record: V,
) -> StoreResult<()>
where
    V: Entity,
    V::Id: std::fmt::Display,
{
    let id = *record.id();
    if map.contains_key(&id) {
        return Err(StoreError::Conflict(format!("{entity} {id} already exists")));
    }
    map.insert(id, record);
    Ok(())
}

fn upsert<V>(map: &mut HashMap<<V as Entity>::Id, V>, record: V)
where
    V: Entity,
{
    map.insert(*record.id(), record);
}

/// Shared, cloneable in-memory backend.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    lock_timeout: Duration,
    injected_failures: Arc<AtomicU32>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            lock_timeout,
            injected_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Make the next `n` commits fail with a serialization failure.
    pub fn inject_transient_failures(&self, n: u32) {
        self.injected_failures.store(n, Ordering::SeqCst);
    }

    async fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        tokio::time::timeout(self.lock_timeout, self.state.lock())
            .await
            .map_err(|_| self.timeout_error())
    }

    fn timeout_error(&self) -> StoreError {
        StoreError::LockTimeout(format!(
            "could not acquire store lock within {}ms",
            self.lock_timeout.as_millis()
        ))
    }
}

#[async_trait]
impl TenantDirectory for InMemoryStore {
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant> {
        let mut state = self.lock().await?;
        if state.tenants.values().any(|t| t.slug == tenant.slug) {
            return Err(StoreError::Conflict(format!("duplicate tenant slug '{}'", tenant.slug)));
        }
        upsert(&mut state.tenants, tenant.clone());
        Ok(tenant)
    }

    async fn get_tenant(&self, tenant_id: TenantId) -> StoreResult<Option<Tenant>> {
        let state = self.lock().await?;
        Ok(state.tenants.get(&tenant_id).cloned())
    }

    async fn set_tenant_active(&self, tenant_id: TenantId, active: bool) -> StoreResult<Tenant> {
        let mut state = self.lock().await?;
        let tenant = state
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| StoreError::not_found("tenant", tenant_id))?;
        tenant.active = active;
        Ok(tenant.clone())
    }

    async fn delete_tenant(&self, tenant_id: TenantId) -> StoreResult<()> {
        let mut state = self.lock().await?;
        if state.tenants.remove(&tenant_id).is_none() {
            return Err(StoreError::not_found("tenant", tenant_id));
        }
        let removed: Vec<String> = state
            .orders
            .values()
            .filter(|o| o.is_owned_by(tenant_id))
            .map(|o| o.order_number().to_string())
            .collect();
        for number in removed {
            state.order_numbers.remove(&number);
        }
        state.orders.retain(|_, o| !o.is_owned_by(tenant_id));
        state.customers.retain(|_, c| !c.is_owned_by(tenant_id));
        state.products.retain(|_, p| !p.is_owned_by(tenant_id));
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut state = self.lock().await?;
        state.ensure_tenant(product.tenant_id)?;
        if state.sku_taken(product) {
            return Err(StoreError::DuplicateSku(product.sku.clone()));
        }
        insert_new(&mut state.products, "product", product.clone())
    }

    async fn get_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> StoreResult<Option<Product>> {
        let state = self.lock().await?;
        Ok(scoped(&state.products, tenant_id, &product_id).cloned())
    }

    async fn list_products(
        &self,
        tenant_id: TenantId,
        filter: &ProductFilter,
    ) -> StoreResult<Vec<Product>> {
        let state = self.lock().await?;
        let mut products = scoped_list(&state.products, tenant_id);
        products.retain(|p| filter.matches(p));
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let mut state = self.lock().await?;
        if scoped(&state.products, product.tenant_id, &product.id).is_none() {
            return Err(StoreError::not_found("product", product.id));
        }
        if state.sku_taken(product) {
            return Err(StoreError::DuplicateSku(product.sku.clone()));
        }
        if let Some(stored) = state.products.get_mut(&product.id) {
            stored.name = product.name.clone();
            stored.sku = product.sku.clone();
            stored.unit_price = product.unit_price;
            stored.low_stock_threshold = product.low_stock_threshold;
            stored.version += 1;
            stored.updated_at = product.updated_at;
        }
        Ok(())
    }

    async fn delete_product(&self, tenant_id: TenantId, product_id: ProductId) -> StoreResult<()> {
        let mut state = self.lock().await?;
        if scoped(&state.products, tenant_id, &product_id).is_none() {
            return Err(StoreError::not_found("product", product_id));
        }
        if state.product_referenced(product_id) {
            return Err(StoreError::Conflict(format!(
                "product {product_id} is referenced by existing orders"
            )));
        }
        state.products.remove(&product_id);
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
        let mut state = self.lock().await?;
        state.ensure_tenant(customer.tenant_id)?;
        insert_new(&mut state.customers, "customer", customer.clone())
    }

    async fn get_customer(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> StoreResult<Option<Customer>> {
        let state = self.lock().await?;
        Ok(scoped(&state.customers, tenant_id, &customer_id).cloned())
    }

    async fn list_customers(
        &self,
        tenant_id: TenantId,
        filter: &CustomerFilter,
    ) -> StoreResult<Vec<Customer>> {
        let state = self.lock().await?;
        let mut customers = scoped_list(&state.customers, tenant_id);
        customers.retain(|c| filter.matches(c));
        customers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(customers)
    }

    async fn update_customer(&self, customer: &Customer) -> StoreResult<()> {
        let mut state = self.lock().await?;
        if scoped(&state.customers, customer.tenant_id, &customer.id).is_none() {
            return Err(StoreError::not_found("customer", customer.id));
        }
        upsert(&mut state.customers, customer.clone());
        Ok(())
    }

    async fn delete_customer(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> StoreResult<()> {
        let mut state = self.lock().await?;
        if scoped(&state.customers, tenant_id, &customer_id).is_none() {
            return Err(StoreError::not_found("customer", customer_id));
        }
        if state.orders.values().any(|o| o.customer_id() == customer_id) {
            return Err(StoreError::Conflict(format!(
                "customer {customer_id} has existing orders"
            )));
        }
        state.customers.remove(&customer_id);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get_order(&self, tenant_id: TenantId, order_id: OrderId) -> StoreResult<Option<Order>> {
        let state = self.lock().await?;
        Ok(scoped(&state.orders, tenant_id, &order_id).cloned())
    }

    async fn list_orders(&self, tenant_id: TenantId, filter: OrderFilter) -> StoreResult<Vec<Order>> {
        let state = self.lock().await?;
        let mut orders: Vec<Order> = scoped_list(&state.orders, tenant_id)
            .into_iter()
            .filter(|o| filter.matches(o))
            .collect();
        orders.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then(b.id_typed().cmp(&a.id_typed()))
        });
        Ok(orders)
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<InMemoryTx> {
        let state = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| self.timeout_error())?;
        Ok(InMemoryTx {
            state,
            stock: HashMap::new(),
            new_orders: Vec::new(),
            status_updates: HashMap::new(),
            injected_failures: self.injected_failures.clone(),
        })
    }
}

/// Unit of work over [`InMemoryStore`]; holds the store mutex until dropped.
#[derive(Debug)]
pub struct InMemoryTx {
    state: OwnedMutexGuard<State>,
    stock: HashMap<ProductId, Product>,
    new_orders: Vec<Order>,
    status_updates: HashMap<OrderId, Order>,
    injected_failures: Arc<AtomicU32>,
}

impl InMemoryTx {
    fn staged_order(&self, order_id: OrderId) -> Option<&Order> {
        self.status_updates
            .get(&order_id)
            .or_else(|| self.new_orders.iter().find(|o| o.id_typed() == order_id))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryTx {
    async fn find_customer(
        &mut self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> StoreResult<Option<Customer>> {
        Ok(scoped(&self.state.customers, tenant_id, &customer_id).cloned())
    }

    async fn lock_products(
        &mut self,
        tenant_id: TenantId,
        product_ids: &[ProductId],
    ) -> StoreResult<Vec<Product>> {
        let mut ids = product_ids.to_vec();
        ids.sort();
        ids.dedup();

        let products = ids
            .iter()
            .filter_map(|id| {
                scoped(&self.stock, tenant_id, id)
                    .or_else(|| scoped(&self.state.products, tenant_id, id))
                    .cloned()
            })
            .collect();
        Ok(products)
    }

    async fn lock_order(
        &mut self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> StoreResult<Option<Order>> {
        let order = self
            .staged_order(order_id)
            .or_else(|| self.state.orders.get(&order_id))
            .filter(|o| o.is_owned_by(tenant_id))
            .cloned();
        Ok(order)
    }

    async fn save_stock(&mut self, product: &Product) -> StoreResult<()> {
        if scoped(&self.state.products, product.tenant_id, &product.id).is_none() {
            return Err(StoreError::not_found("product", product.id));
        }
        upsert(&mut self.stock, product.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        let number = order.order_number();
        if self.state.order_numbers.contains(number)
            || self.new_orders.iter().any(|o| o.order_number() == number)
        {
            return Err(StoreError::DuplicateOrderNumber(number.to_string()));
        }
        self.new_orders.push(order.clone());
        Ok(())
    }

    async fn update_order_status(&mut self, order: &Order) -> StoreResult<()> {
        let known = self.staged_order(order.id_typed()).is_some()
            || scoped(&self.state.orders, order.tenant_id(), &order.id_typed()).is_some();
        if !known {
            return Err(StoreError::not_found("order", order.id_typed()));
        }
        upsert(&mut self.status_updates, order.clone());
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        let mut this = self;
        let injected = this
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::SerializationFailure(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        let state = &mut *this.state;
        for (_, product) in this.stock.drain() {
            upsert(&mut state.products, product);
        }
        for order in this.new_orders.drain(..) {
            state.order_numbers.insert(order.order_number().to_string());
            upsert(&mut state.orders, order);
        }
        for (_, order) in this.status_updates.drain() {
            upsert(&mut state.orders, order);
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
