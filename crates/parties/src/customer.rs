use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderdesk_core::{CustomerId, DomainError, DomainResult, Entity, TenantId, TenantOwned};

/// Contact information for a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A customer of one tenant. Orders reference it; order logic never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub tenant_id: TenantId,
    pub name: String,
    pub contact: ContactInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
}

/// Partial update; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl Customer {
    pub fn create(tenant_id: TenantId, input: NewCustomer, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = validate_name(&input.name)?;
        let contact = normalize_contact(input.contact)?;

        Ok(Self {
            id: CustomerId::new(),
            tenant_id,
            name,
            contact,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_patch(&mut self, patch: CustomerPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let contact = normalize_contact(ContactInfo {
            email: patch.email.or_else(|| self.contact.email.clone()),
            phone: patch.phone.or_else(|| self.contact.phone.clone()),
            address: patch.address.or_else(|| self.contact.address.clone()),
        })?;

        if let Some(name) = name {
            self.name = name;
        }
        self.contact = contact;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for Customer {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("customer name cannot be empty"));
    }
    Ok(name.to_string())
}

/// Trims every field, drops blanks, and checks the email shape.
fn normalize_contact(contact: ContactInfo) -> DomainResult<ContactInfo> {
    let clean = |v: Option<String>| {
        v.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let email = clean(contact.email);
    if let Some(email) = &email {
        if !email.contains('@') {
            return Err(DomainError::validation(format!("invalid email '{email}'")));
        }
    }
    Ok(ContactInfo {
        email,
        phone: clean(contact.phone),
        address: clean(contact.address),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn new_customer(email: Option<&str>) -> NewCustomer {
        NewCustomer {
            name: "Jane Buyer".to_string(),
            contact: ContactInfo {
                email: email.map(str::to_string),
                phone: Some(" 555-0100 ".to_string()),
                address: None,
            },
        }
    }

    #[test]
    fn create_trims_contact_fields() {
        let customer =
            Customer::create(TenantId::new(), new_customer(Some("jane@example.com")), test_time())
                .unwrap();
        assert_eq!(customer.name, "Jane Buyer");
        assert_eq!(customer.contact.phone.as_deref(), Some("555-0100"));
        assert_eq!(customer.contact.email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn create_rejects_empty_name() {
        let input = NewCustomer {
            name: " ".to_string(),
            contact: ContactInfo::default(),
        };
        let err = Customer::create(TenantId::new(), input, test_time()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_rejects_malformed_email() {
        let err =
            Customer::create(TenantId::new(), new_customer(Some("not-an-email")), test_time())
                .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn email_is_optional() {
        let customer = Customer::create(TenantId::new(), new_customer(None), test_time()).unwrap();
        assert!(customer.contact.email.is_none());
    }

    #[test]
    fn patch_keeps_unspecified_fields() {
        let mut customer =
            Customer::create(TenantId::new(), new_customer(Some("jane@example.com")), test_time())
                .unwrap();
        customer
            .apply_patch(
                CustomerPatch {
                    address: Some("1 Main St".to_string()),
                    ..CustomerPatch::default()
                },
                test_time(),
            )
            .unwrap();
        assert_eq!(customer.contact.email.as_deref(), Some("jane@example.com"));
        assert_eq!(customer.contact.address.as_deref(), Some("1 Main St"));
    }

    #[test]
    fn invalid_patch_leaves_customer_unchanged() {
        let mut customer =
            Customer::create(TenantId::new(), new_customer(None), test_time()).unwrap();
        let before = customer.clone();
        let err = customer
            .apply_patch(
                CustomerPatch {
                    name: Some("New Name".to_string()),
                    email: Some("broken".to_string()),
                    ..CustomerPatch::default()
                },
                test_time(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(customer, before);
    }
}
