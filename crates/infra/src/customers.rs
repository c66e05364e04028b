//! Customer service.

use chrono::Utc;
use tracing::{info, instrument};

use orderdesk_core::{CustomerId, TenantContext};
use orderdesk_parties::{Customer, CustomerPatch, NewCustomer};

use crate::error::LifecycleError;
use crate::store::{CustomerFilter, CustomerStore};

pub struct CustomerService<S> {
    store: S,
}

impl<S: CustomerStore> CustomerService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn create_customer(
        &self,
        ctx: &TenantContext,
        input: NewCustomer,
    ) -> Result<Customer, LifecycleError> {
        let customer = Customer::create(ctx.tenant_id(), input, Utc::now())?;
        self.store.insert_customer(&customer).await?;
        info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    pub async fn get_customer(
        &self,
        ctx: &TenantContext,
        customer_id: CustomerId,
    ) -> Result<Customer, LifecycleError> {
        self.store
            .get_customer(ctx.tenant_id(), customer_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("customer", customer_id))
    }

    /// Customers whose name, email or phone contains the search term.
    pub async fn list_customers(
        &self,
        ctx: &TenantContext,
        filter: CustomerFilter,
    ) -> Result<Vec<Customer>, LifecycleError> {
        Ok(self.store.list_customers(ctx.tenant_id(), &filter).await?)
    }

    #[instrument(skip(self, ctx, patch), fields(tenant_id = %ctx.tenant_id(), customer_id = %customer_id), err)]
    pub async fn update_customer(
        &self,
        ctx: &TenantContext,
        customer_id: CustomerId,
        patch: CustomerPatch,
    ) -> Result<Customer, LifecycleError> {
        let mut customer = self.get_customer(ctx, customer_id).await?;
        customer.apply_patch(patch, Utc::now())?;
        self.store.update_customer(&customer).await?;
        Ok(customer)
    }

    /// Fails with a conflict while orders reference the customer.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), customer_id = %customer_id), err)]
    pub async fn delete_customer(
        &self,
        ctx: &TenantContext,
        customer_id: CustomerId,
    ) -> Result<(), LifecycleError> {
        self.store.delete_customer(ctx.tenant_id(), customer_id).await?;
        info!("customer deleted");
        Ok(())
    }
}
