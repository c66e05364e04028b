use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orderdesk_core::{
    CustomerId, DomainError, DomainResult, Entity, Money, OrderId, OrderLineId, ProductId,
    TenantId, TenantOwned,
};

use crate::status::{OrderStatus, StatusTransitionError, ensure_transition};

/// One requested product-quantity pairing in a create-order request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self { product_id, quantity }
    }
}

/// Order line with the unit price captured when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        Ok(Self {
            id: OrderLineId::new(),
            product_id,
            quantity,
            unit_price,
            line_total: unit_price.times(quantity)?,
        })
    }
}

/// A placed order.
///
/// `total_amount` is always the sum of the line totals; there is no setter.
/// Lines are fixed once the order exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    id: OrderId,
    tenant_id: TenantId,
    customer_id: CustomerId,
    order_number: String,
    status: OrderStatus,
    total_amount: Money,
    lines: Vec<OrderLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persisted shape of an order, used by stores to rebuild an [`Order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub order_number: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new pending order from already priced lines.
    pub fn place(
        tenant_id: TenantId,
        customer_id: CustomerId,
        order_number: String,
        lines: Vec<OrderLine>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one line"));
        }
        Self::restore(OrderRecord {
            id: OrderId::new(),
            tenant_id,
            customer_id,
            order_number,
            status: OrderStatus::Pending,
            lines,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild an order from storage; the total is recomputed from the lines.
    pub fn restore(record: OrderRecord) -> DomainResult<Self> {
        let total_amount = Money::sum(record.lines.iter().map(|l| l.line_total))?;
        Ok(Self {
            id: record.id,
            tenant_id: record.tenant_id,
            customer_id: record.customer_id,
            order_number: record.order_number,
            status: record.status,
            total_amount,
            lines: record.lines,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Move to `to` if the state machine allows it. Same-state is a no-op.
    pub fn transition_to(
        &mut self,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StatusTransitionError> {
        ensure_transition(self.status, to)?;
        if self.status != to {
            self.status = to;
            self.updated_at = now;
        }
        Ok(())
    }

    /// Quantity per product over all lines, sorted by product id.
    pub fn quantities_by_product(&self) -> BTreeMap<ProductId, u32> {
        let mut totals = BTreeMap::new();
        for line in &self.lines {
            let entry = totals.entry(line.product_id).or_insert(0u32);
            *entry = entry.saturating_add(line.quantity);
        }
        totals
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for Order {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Reject empty requests and zero quantities before any store work happens.
pub fn validate_line_requests(lines: &[LineRequest]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("an order needs at least one line"));
    }
    if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
        return Err(DomainError::validation(format!(
            "quantity for product {} must be at least 1",
            line.product_id
        )));
    }
    Ok(())
}

/// Total requested quantity per product, sorted by product id.
///
/// Repeated product ids are summed so availability is checked against the
/// whole request. The sorted key order is also the row-lock order.
pub fn aggregate_quantities(lines: &[LineRequest]) -> DomainResult<BTreeMap<ProductId, u32>> {
    let mut totals: BTreeMap<ProductId, u32> = BTreeMap::new();
    for line in lines {
        let entry = totals.entry(line.product_id).or_insert(0);
        *entry = entry.checked_add(line.quantity).ok_or_else(|| {
            DomainError::validation(format!("quantity overflow for product {}", line.product_id))
        })?;
    }
    Ok(totals)
}

/// `ORD-YYYYMMDD-XXXXXXXX`: UTC date plus 8 random uppercase hex characters.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix[..8].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn line(cents: u64, qty: u32) -> OrderLine {
        OrderLine::new(ProductId::new(), qty, Money::from_cents(cents)).unwrap()
    }

    fn pending_order(lines: Vec<OrderLine>) -> Order {
        Order::place(
            TenantId::new(),
            CustomerId::new(),
            generate_order_number(test_time()),
            lines,
            test_time(),
        )
        .unwrap()
    }

    #[test]
    fn place_computes_total_from_lines() {
        let order = pending_order(vec![line(5_000, 5), line(199, 3)]);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_amount(), Money::from_cents(25_000 + 597));
        assert_eq!(order.lines()[0].line_total, Money::from_cents(25_000));
    }

    #[test]
    fn place_rejects_empty_lines() {
        let err = Order::place(
            TenantId::new(),
            CustomerId::new(),
            "ORD-1".to_string(),
            vec![],
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let err = OrderLine::new(ProductId::new(), 0, Money::from_cents(100)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn transition_updates_status_and_timestamp() {
        let mut order = pending_order(vec![line(100, 1)]);
        let later = order.updated_at() + chrono::Duration::seconds(5);
        order.transition_to(OrderStatus::Paid, later).unwrap();
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.updated_at(), later);

        let err = order.transition_to(OrderStatus::Pending, later).unwrap_err();
        assert_eq!(err.from, OrderStatus::Paid);
        assert_eq!(order.status(), OrderStatus::Paid);
    }

    #[test]
    fn same_state_transition_is_a_no_op() {
        let mut order = pending_order(vec![line(100, 1)]);
        let before = order.clone();
        order
            .transition_to(OrderStatus::Pending, before.updated_at() + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(order, before);
    }

    #[test]
    fn cancelled_order_rejects_everything() {
        let mut order = pending_order(vec![line(100, 1)]);
        order.transition_to(OrderStatus::Cancelled, test_time()).unwrap();
        for to in OrderStatus::ALL {
            assert!(order.transition_to(to, test_time()).is_err());
        }
    }

    #[test]
    fn validate_line_requests_rules() {
        assert!(validate_line_requests(&[]).is_err());
        assert!(validate_line_requests(&[LineRequest::new(ProductId::new(), 0)]).is_err());
        assert!(validate_line_requests(&[LineRequest::new(ProductId::new(), 1)]).is_ok());
    }

    #[test]
    fn aggregate_sums_duplicate_products() {
        let a = ProductId::new();
        let b = ProductId::new();
        let totals = aggregate_quantities(&[
            LineRequest::new(a, 2),
            LineRequest::new(b, 1),
            LineRequest::new(a, 3),
        ])
        .unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&a], 5);
        assert_eq!(totals[&b], 1);
        let keys: Vec<_> = totals.keys().copied().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn order_number_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let number = generate_order_number(at);
        assert!(number.starts_with("ORD-20240309-"), "{number}");
        let suffix = &number["ORD-20240309-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn restore_recomputes_total() {
        let order = pending_order(vec![line(250, 4), line(1, 1)]);
        let restored = Order::restore(OrderRecord {
            id: order.id_typed(),
            tenant_id: order.tenant_id(),
            customer_id: order.customer_id(),
            order_number: order.order_number().to_string(),
            status: order.status(),
            lines: order.lines().to_vec(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        })
        .unwrap();
        assert_eq!(restored, order);
        assert_eq!(restored.total_amount(), Money::from_cents(1_001));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: total equals the sum of quantity x unit price over all lines.
            #[test]
            fn total_is_sum_of_line_totals(
                parts in proptest::collection::vec((0u64..1_000_000, 1u32..1_000), 1..20)
            ) {
                let lines: Vec<OrderLine> = parts
                    .iter()
                    .map(|(cents, qty)| line(*cents, *qty))
                    .collect();
                let expected: u64 = parts.iter().map(|(c, q)| c * u64::from(*q)).sum();
                let order = pending_order(lines);
                prop_assert_eq!(order.total_amount().cents(), expected);
            }

            /// Property: aggregated quantities preserve the overall requested amount.
            #[test]
            fn aggregation_preserves_total_quantity(
                picks in proptest::collection::vec((0usize..4, 1u32..100), 1..30)
            ) {
                let products: Vec<ProductId> = (0..4).map(|_| ProductId::new()).collect();
                let requests: Vec<LineRequest> = picks
                    .iter()
                    .map(|(i, q)| LineRequest::new(products[*i], *q))
                    .collect();
                let totals = aggregate_quantities(&requests).unwrap();
                let requested: u32 = picks.iter().map(|(_, q)| q).sum();
                prop_assert_eq!(totals.values().sum::<u32>(), requested);
                prop_assert!(totals.len() <= 4);
            }
        }
    }
}
