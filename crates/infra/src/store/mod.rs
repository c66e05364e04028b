//! Tenant-scoped persistence boundary.
//!
//! Every method takes an explicit [`TenantId`]; a record owned by another
//! tenant is indistinguishable from a missing one. Mutations that must be
//! atomic (order placement, cancellation) go through a [`UnitOfWork`] opened
//! with [`TransactionalStore::begin`].

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use orderdesk_catalog::Product;
use orderdesk_core::{
    CustomerId, DomainError, OrderId, ProductId, Tenant, TenantContext, TenantId,
};
use orderdesk_parties::Customer;
use orderdesk_sales::{Order, OrderStatus};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Backend failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Another product of the same tenant already uses this SKU.
    #[error("duplicate sku '{0}'")]
    DuplicateSku(String),

    #[error("duplicate order number '{0}'")]
    DuplicateOrderNumber(String),

    /// The write would break referential integrity (e.g. deleting a product
    /// that order lines still reference).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    #[error("deadlock detected: {0}")]
    Deadlock(String),

    #[error("lock timeout: {0}")]
    LockTimeout(String),

    #[error("connection pool timeout: {0}")]
    PoolTimeout(String),

    /// A persisted row could not be mapped back into the domain model.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Failures that may succeed when the whole unit of work is retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::SerializationFailure(_)
                | StoreError::Deadlock(_)
                | StoreError::LockTimeout(_)
                | StoreError::PoolTimeout(_)
        )
    }
}

/// Tenant resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
    /// Unknown or deactivated tenant. Both cases are reported identically.
    #[error("invalid or inactive tenant {0}")]
    InvalidOrInactive(TenantId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Filters for [`OrderStore::list_orders`]. Date bounds are inclusive and
/// compared against the UTC creation date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<CustomerId>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
}

impl OrderFilter {
    /// Orders created on `date` (UTC).
    pub fn on_date(date: NaiveDate) -> Self {
        Self::between(date, date)
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            created_from: Some(from),
            created_to: Some(to),
            ..Self::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        let created = order.created_at().date_naive();
        self.status.is_none_or(|s| order.status() == s)
            && self.customer_id.is_none_or(|c| order.customer_id() == c)
            && self.created_from.is_none_or(|from| created >= from)
            && self.created_to.is_none_or(|to| created <= to)
    }
}

/// Filters for [`CatalogStore::list_products`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// Case-insensitive substring of the name or SKU.
    pub search: Option<String>,
    /// Only products at or below their low-stock threshold.
    pub low_stock_only: bool,
}

impl ProductFilter {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn low_stock() -> Self {
        Self {
            low_stock_only: true,
            ..Self::default()
        }
    }

    /// The trimmed search term, or `None` when it is blank.
    pub fn search_term(&self) -> Option<&str> {
        search_term(self.search.as_deref())
    }

    pub fn matches(&self, product: &Product) -> bool {
        (!self.low_stock_only || product.is_low_stock())
            && self
                .search_term()
                .is_none_or(|term| contains_ignore_case(&[&product.name, &product.sku], term))
    }
}

/// Filters for [`CustomerStore::list_customers`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerFilter {
    /// Case-insensitive substring of the name, email or phone.
    pub search: Option<String>,
}

impl CustomerFilter {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
        }
    }

    pub fn search_term(&self) -> Option<&str> {
        search_term(self.search.as_deref())
    }

    pub fn matches(&self, customer: &Customer) -> bool {
        self.search_term().is_none_or(|term| {
            let mut fields = vec![customer.name.as_str()];
            fields.extend(customer.contact.email.as_deref());
            fields.extend(customer.contact.phone.as_deref());
            contains_ignore_case(&fields, term)
        })
    }
}

fn search_term(search: Option<&str>) -> Option<&str> {
    search.map(str::trim).filter(|term| !term.is_empty())
}

fn contains_ignore_case<S: AsRef<str>>(fields: &[S], term: &str) -> bool {
    let term = term.to_lowercase();
    fields
        .iter()
        .any(|field| field.as_ref().to_lowercase().contains(&term))
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn insert_tenant(&self, tenant: Tenant) -> StoreResult<Tenant>;

    async fn get_tenant(&self, tenant_id: TenantId) -> StoreResult<Option<Tenant>>;

    async fn set_tenant_active(&self, tenant_id: TenantId, active: bool) -> StoreResult<Tenant>;

    /// Delete a tenant together with every product, customer, and order it owns.
    async fn delete_tenant(&self, tenant_id: TenantId) -> StoreResult<()>;

    /// Register a new active tenant for a business name.
    async fn register_tenant(&self, name: &str) -> Result<Tenant, TenantError> {
        let tenant = Tenant::register(name, chrono::Utc::now())?;
        Ok(self.insert_tenant(tenant).await?)
    }

    /// Resolve the context for an active tenant.
    async fn resolve(&self, tenant_id: TenantId) -> Result<TenantContext, TenantError> {
        match self.get_tenant(tenant_id).await? {
            Some(tenant) if tenant.active => Ok(TenantContext::new(tenant.id)),
            _ => Err(TenantError::InvalidOrInactive(tenant_id)),
        }
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a new product. Fails with [`StoreError::DuplicateSku`] when the
    /// tenant already has a product with the same SKU, and with
    /// [`StoreError::Conflict`] when the id is already taken.
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;

    async fn get_product(&self, tenant_id: TenantId, product_id: ProductId)
    -> StoreResult<Option<Product>>;

    /// Products of a tenant matching `filter`, ordered by name.
    async fn list_products(
        &self,
        tenant_id: TenantId,
        filter: &ProductFilter,
    ) -> StoreResult<Vec<Product>>;

    /// Persist descriptive attributes (name, SKU, price, threshold). Stock is
    /// not written here.
    async fn update_product(&self, product: &Product) -> StoreResult<()>;

    /// Fails with [`StoreError::Conflict`] while order lines reference it.
    async fn delete_product(&self, tenant_id: TenantId, product_id: ProductId) -> StoreResult<()>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the id is already taken.
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()>;

    async fn get_customer(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> StoreResult<Option<Customer>>;

    /// Customers of a tenant matching `filter`, ordered by name.
    async fn list_customers(
        &self,
        tenant_id: TenantId,
        filter: &CustomerFilter,
    ) -> StoreResult<Vec<Customer>>;

    async fn update_customer(&self, customer: &Customer) -> StoreResult<()>;

    /// Fails with [`StoreError::Conflict`] while orders reference it.
    async fn delete_customer(&self, tenant_id: TenantId, customer_id: CustomerId)
    -> StoreResult<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, tenant_id: TenantId, order_id: OrderId) -> StoreResult<Option<Order>>;

    /// Orders matching `filter`, newest first.
    async fn list_orders(&self, tenant_id: TenantId, filter: OrderFilter) -> StoreResult<Vec<Order>>;
}

/// One store transaction.
///
/// Dropping a unit without calling [`UnitOfWork::commit`] discards every
/// write made through it.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_customer(
        &mut self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> StoreResult<Option<Customer>>;

    /// Lock the given products for the rest of the unit and return them in
    /// ascending id order. Ids that are missing or owned by another tenant are
    /// left out of the result.
    async fn lock_products(
        &mut self,
        tenant_id: TenantId,
        product_ids: &[ProductId],
    ) -> StoreResult<Vec<Product>>;

    /// Lock an order row for the rest of the unit.
    async fn lock_order(&mut self, tenant_id: TenantId, order_id: OrderId)
    -> StoreResult<Option<Order>>;

    /// Write the stock quantity (and version) of a locked product.
    async fn save_stock(&mut self, product: &Product) -> StoreResult<()>;

    /// Insert an order with its lines. Fails with
    /// [`StoreError::DuplicateOrderNumber`] on a number collision.
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn update_order_status(&mut self, order: &Order) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Tx: UnitOfWork;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Deadlock("x".into()).is_transient());
        assert!(StoreError::LockTimeout("x".into()).is_transient());
        assert!(StoreError::SerializationFailure("x".into()).is_transient());
        assert!(StoreError::PoolTimeout("x".into()).is_transient());
        assert!(!StoreError::DuplicateOrderNumber("ORD".into()).is_transient());
        assert!(!StoreError::Conflict("x".into()).is_transient());
        assert!(!StoreError::not_found("order", "1").is_transient());
    }

    #[test]
    fn default_filter_matches_everything() {
        assert_eq!(OrderFilter::default(), OrderFilter {
            status: None,
            customer_id: None,
            created_from: None,
            created_to: None,
        });
    }

    mod filters {
        use super::*;
        use chrono::Utc;
        use orderdesk_catalog::NewProduct;
        use orderdesk_core::Money;
        use orderdesk_parties::{ContactInfo, NewCustomer};

        fn product(name: &str, sku: &str, stock: u32, threshold: u32) -> Product {
            Product::create(
                TenantId::new(),
                NewProduct {
                    name: name.to_string(),
                    sku: sku.to_string(),
                    unit_price: Money::from_cents(100),
                    stock_quantity: stock,
                    low_stock_threshold: Some(threshold),
                },
                Utc::now(),
            )
            .unwrap()
        }

        fn customer(name: &str, email: Option<&str>, phone: Option<&str>) -> Customer {
            Customer::create(
                TenantId::new(),
                NewCustomer {
                    name: name.to_string(),
                    contact: ContactInfo {
                        email: email.map(str::to_string),
                        phone: phone.map(str::to_string),
                        address: Some("12 Harbour Road".to_string()),
                    },
                },
                Utc::now(),
            )
            .unwrap()
        }

        #[test]
        fn product_search_covers_name_and_sku_ignoring_case() {
            let bolt = product("Hex Bolt", "HW-100", 50, 5);

            assert!(ProductFilter::search("bolt").matches(&bolt));
            assert!(ProductFilter::search("hw-1").matches(&bolt));
            assert!(ProductFilter::search("  HEX ").matches(&bolt));
            assert!(!ProductFilter::search("washer").matches(&bolt));
            assert!(ProductFilter::search("   ").matches(&bolt));
            assert!(ProductFilter::default().matches(&bolt));
        }

        #[test]
        fn low_stock_only_includes_the_threshold_itself() {
            assert!(ProductFilter::low_stock().matches(&product("A", "A-1", 5, 5)));
            assert!(ProductFilter::low_stock().matches(&product("B", "B-1", 0, 5)));
            assert!(!ProductFilter::low_stock().matches(&product("C", "C-1", 6, 5)));

            let both = ProductFilter {
                search: Some("a-".to_string()),
                low_stock_only: true,
            };
            assert!(both.matches(&product("A", "A-1", 1, 5)));
            assert!(!both.matches(&product("B", "B-1", 1, 5)));
        }

        #[test]
        fn customer_search_covers_name_email_and_phone() {
            let jane = customer("Jane Doe", Some("jane@example.com"), Some("+1 555 0100"));

            assert!(CustomerFilter::search("JANE").matches(&jane));
            assert!(CustomerFilter::search("example.com").matches(&jane));
            assert!(CustomerFilter::search("555").matches(&jane));
            assert!(!CustomerFilter::search("harbour").matches(&jane));

            let bare = customer("Sam", None, None);
            assert!(!CustomerFilter::search("example").matches(&bare));
            assert!(CustomerFilter::default().matches(&bare));
        }
    }
}
