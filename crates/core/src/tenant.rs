//! Tenants and the tenant context every scoped operation requires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::TenantId;

/// An isolated business account; the scoping root for all other records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub slug: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Register a new, active tenant for a business name.
    ///
    /// The slug is the hyphenated name plus a random 6-character suffix, so two
    /// businesses with the same name still get distinct slugs.
    pub fn register(name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("business name cannot be empty"));
        }
        if name.chars().count() > 255 {
            return Err(DomainError::validation("business name is too long"));
        }

        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
        let base = slugify(name);
        let slug = if base.is_empty() {
            suffix
        } else {
            format!("{base}-{suffix}")
        };

        Ok(Self {
            id: TenantId::new(),
            name: name.to_string(),
            slug,
            active: true,
            created_at: now,
        })
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Records that belong to exactly one tenant.
pub trait TenantOwned {
    fn tenant_id(&self) -> TenantId;

    fn is_owned_by(&self, tenant_id: TenantId) -> bool {
        self.tenant_id() == tenant_id
    }
}

/// Tenant context for an operation.
///
/// Obtained by resolving an active tenant; immutable for the lifetime of the
/// request. Passed explicitly, never stored globally.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
