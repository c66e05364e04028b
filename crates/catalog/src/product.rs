use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderdesk_core::{DomainError, DomainResult, Entity, Money, ProductId, TenantId, TenantOwned};

/// Low-stock threshold applied when a product is created without one.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

const MAX_NAME_LEN: usize = 255;
const MAX_SKU_LEN: usize = 100;

/// A sellable catalog item belonging to exactly one tenant.
///
/// `stock_quantity` is unsigned, so "never negative" is a type-level fact;
/// [`Product::reserve`] refuses to go below zero instead of saturating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub sku: String,
    pub unit_price: Money,
    pub stock_quantity: u32,
    pub low_stock_threshold: u32,
    /// Incremented on every mutation.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub unit_price: Money,
    pub stock_quantity: u32,
    /// Defaults to [`DEFAULT_LOW_STOCK_THRESHOLD`].
    pub low_stock_threshold: Option<u32>,
}

/// Partial update of the descriptive attributes of a product.
///
/// Stock is absent: it only moves through order placement and
/// cancellation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub unit_price: Option<Money>,
    pub low_stock_threshold: Option<u32>,
}

impl Product {
    pub fn create(tenant_id: TenantId, input: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = validate_name(&input.name)?;
        let sku = validate_sku(&input.sku)?;

        Ok(Self {
            id: ProductId::new(),
            tenant_id,
            name,
            sku,
            unit_price: input.unit_price,
            stock_quantity: input.stock_quantity,
            low_stock_threshold: input
                .low_stock_threshold
                .unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a patch. Nothing is changed if any field fails validation.
    pub fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let sku = patch.sku.as_deref().map(validate_sku).transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(sku) = sku {
            self.sku = sku;
        }
        if let Some(price) = patch.unit_price {
            self.unit_price = price;
        }
        if let Some(threshold) = patch.low_stock_threshold {
            self.low_stock_threshold = threshold;
        }
        self.touch(now);
        Ok(())
    }

    pub fn has_stock(&self, quantity: u32) -> bool {
        self.stock_quantity >= quantity
    }

    /// At or below the low-stock threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.low_stock_threshold
    }

    /// Units missing to get back to the threshold (0 when not low).
    pub fn stock_deficit(&self) -> u32 {
        self.low_stock_threshold.saturating_sub(self.stock_quantity)
    }

    /// Take `quantity` units out of stock.
    pub fn reserve(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.has_stock(quantity) {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available: self.stock_quantity,
            });
        }
        self.stock_quantity -= quantity;
        self.touch(now);
        Ok(())
    }

    /// Put `quantity` units back into stock.
    pub fn restock(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<()> {
        self.stock_quantity = self
            .stock_quantity
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?;
        self.touch(now);
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for Product {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("product name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "product name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_sku(sku: &str) -> DomainResult<String> {
    let sku = sku.trim();
    if sku.is_empty() {
        return Err(DomainError::validation("sku cannot be empty"));
    }
    if sku.chars().count() > MAX_SKU_LEN {
        return Err(DomainError::validation(format!(
            "sku exceeds {MAX_SKU_LEN} characters"
        )));
    }
    Ok(sku.to_string())
}
