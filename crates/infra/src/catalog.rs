//! Product catalog service.

use chrono::Utc;
use tracing::{info, instrument};

use orderdesk_catalog::{NewProduct, Product, ProductPatch};
use orderdesk_core::{ProductId, TenantContext};

use crate::error::LifecycleError;
use crate::store::{CatalogStore, ProductFilter};

/// Tenant-scoped product management on top of a [`CatalogStore`].
///
/// Stock quantities are set at creation and afterwards only move through the
/// order lifecycle engine.
pub struct CatalogService<S> {
    store: S,
}

impl<S: CatalogStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), sku = %input.sku), err)]
    pub async fn create_product(
        &self,
        ctx: &TenantContext,
        input: NewProduct,
    ) -> Result<Product, LifecycleError> {
        let product = Product::create(ctx.tenant_id(), input, Utc::now())?;
        self.store.insert_product(&product).await?;
        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    pub async fn get_product(
        &self,
        ctx: &TenantContext,
        product_id: ProductId,
    ) -> Result<Product, LifecycleError> {
        self.store
            .get_product(ctx.tenant_id(), product_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("product", product_id))
    }

    /// Products of the tenant matching `filter`, ordered by name.
    pub async fn list_products(
        &self,
        ctx: &TenantContext,
        filter: ProductFilter,
    ) -> Result<Vec<Product>, LifecycleError> {
        Ok(self.store.list_products(ctx.tenant_id(), &filter).await?)
    }

    #[instrument(skip(self, ctx, patch), fields(tenant_id = %ctx.tenant_id(), product_id = %product_id), err)]
    pub async fn update_product(
        &self,
        ctx: &TenantContext,
        product_id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, LifecycleError> {
        let mut product = self.get_product(ctx, product_id).await?;
        product.apply_patch(patch, Utc::now())?;
        self.store.update_product(&product).await?;
        // Stock may have moved since the first read.
        self.get_product(ctx, product_id).await
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), product_id = %product_id), err)]
    pub async fn delete_product(
        &self,
        ctx: &TenantContext,
        product_id: ProductId,
    ) -> Result<(), LifecycleError> {
        self.store.delete_product(ctx.tenant_id(), product_id).await?;
        info!("product deleted");
        Ok(())
    }
}
