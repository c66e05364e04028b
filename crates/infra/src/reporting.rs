//! Read-only sales and inventory reports.
//!
//! Reports read committed state through the regular store traits and never
//! take unit-of-work locks. Cancelled orders are excluded from every sales
//! figure except the per-status breakdown.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::instrument;

use orderdesk_catalog::Product;
use orderdesk_core::{Money, OrderId, ProductId, TenantContext};
use orderdesk_sales::{Order, OrderStatus};

use crate::error::LifecycleError;
use crate::store::{CatalogStore, OrderFilter, OrderStore, ProductFilter};

/// Products listed in a daily summary.
pub const DAILY_TOP_PRODUCTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub status: OrderStatus,
    pub count: u64,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySalesSummary {
    pub date: NaiveDate,
    /// Non-cancelled orders created that day.
    pub total_orders: u64,
    pub total_sales: Money,
    /// Rounded half-up to the cent; zero without orders.
    pub average_order_value: Money,
    /// One entry per status, including cancelled.
    pub orders_by_status: Vec<StatusBreakdown>,
    pub top_products: Vec<ProductSales>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub current_price: Money,
    pub quantity_sold: u64,
    pub revenue: Money,
    /// Distinct orders containing the product.
    pub order_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockItem {
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub current_stock: u32,
    pub low_stock_threshold: u32,
    pub stock_deficit: u32,
}

pub struct ReportingEngine<S> {
    store: S,
}

impl<S> ReportingEngine<S>
where
    S: CatalogStore + OrderStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), date = %date), err)]
    pub async fn daily_sales_summary(
        &self,
        ctx: &TenantContext,
        date: NaiveDate,
    ) -> Result<DailySalesSummary, LifecycleError> {
        let orders = self
            .store
            .list_orders(ctx.tenant_id(), OrderFilter::on_date(date))
            .await?;

        let mut orders_by_status = Vec::with_capacity(OrderStatus::ALL.len());
        for status in OrderStatus::ALL {
            let matching: Vec<&Order> = orders.iter().filter(|o| o.status() == status).collect();
            orders_by_status.push(StatusBreakdown {
                status,
                count: matching.len() as u64,
                total: Money::sum(matching.iter().map(|o| o.total_amount()))?,
            });
        }

        let counted: Vec<&Order> = orders
            .iter()
            .filter(|o| o.status() != OrderStatus::Cancelled)
            .collect();
        let total_orders = counted.len() as u64;
        let total_sales = Money::sum(counted.iter().map(|o| o.total_amount()))?;

        let top_products = self
            .ranked_sales(ctx, &orders, DAILY_TOP_PRODUCTS)
            .await?;

        Ok(DailySalesSummary {
            date,
            total_orders,
            total_sales,
            average_order_value: total_sales.div_round(total_orders),
            orders_by_status,
            top_products,
        })
    }

    /// Best sellers by quantity over an inclusive date range.
    #[instrument(
        skip(self, ctx),
        fields(tenant_id = %ctx.tenant_id(), start = %start, end = %end),
        err
    )]
    pub async fn top_selling_products(
        &self,
        ctx: &TenantContext,
        start: NaiveDate,
        end: NaiveDate,
        limit: usize,
    ) -> Result<Vec<ProductSales>, LifecycleError> {
        if start > end {
            return Err(LifecycleError::Validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        let orders = self
            .store
            .list_orders(ctx.tenant_id(), OrderFilter::between(start, end))
            .await?;
        self.ranked_sales(ctx, &orders, limit).await
    }

    /// Products at or below their threshold, lowest stock first.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn low_stock_report(
        &self,
        ctx: &TenantContext,
    ) -> Result<Vec<LowStockItem>, LifecycleError> {
        let mut items: Vec<LowStockItem> = self
            .store
            .list_products(ctx.tenant_id(), &ProductFilter::low_stock())
            .await?
            .into_iter()
            .map(|p| LowStockItem {
                product_id: p.id,
                stock_deficit: p.stock_deficit(),
                current_stock: p.stock_quantity,
                low_stock_threshold: p.low_stock_threshold,
                name: p.name,
                sku: p.sku,
            })
            .collect();
        items.sort_by(|a, b| {
            a.current_stock
                .cmp(&b.current_stock)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(items)
    }

    async fn ranked_sales(
        &self,
        ctx: &TenantContext,
        orders: &[Order],
        limit: usize,
    ) -> Result<Vec<ProductSales>, LifecycleError> {
        let tallies = tally_sales(orders)?;
        if tallies.is_empty() {
            return Ok(Vec::new());
        }

        let catalog: HashMap<ProductId, Product> = self
            .store
            .list_products(ctx.tenant_id(), &ProductFilter::default())
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        // Products deleted since the sale have no current name or price.
        let mut ranked: Vec<ProductSales> = tallies
            .into_iter()
            .filter_map(|(product_id, tally)| {
                let product = catalog.get(&product_id)?;
                Some(ProductSales {
                    product_id,
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    current_price: product.unit_price,
                    quantity_sold: tally.quantity,
                    revenue: tally.revenue,
                    order_count: tally.orders.len() as u64,
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.quantity_sold
                .cmp(&a.quantity_sold)
                .then_with(|| b.revenue.cmp(&a.revenue))
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[derive(Debug, Default)]
struct SalesTally {
    quantity: u64,
    revenue: Money,
    orders: BTreeSet<OrderId>,
}

/// Per-product quantity, revenue and order set over non-cancelled orders.
fn tally_sales(orders: &[Order]) -> Result<BTreeMap<ProductId, SalesTally>, LifecycleError> {
    let mut tallies: BTreeMap<ProductId, SalesTally> = BTreeMap::new();
    for order in orders.iter().filter(|o| o.status() != OrderStatus::Cancelled) {
        for line in order.lines() {
            let tally = tallies.entry(line.product_id).or_default();
            tally.quantity += u64::from(line.quantity);
            tally.revenue = tally.revenue.checked_add(line.line_total)?;
            tally.orders.insert(order.id_typed());
        }
    }
    Ok(tallies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orderdesk_core::{CustomerId, TenantId};
    use orderdesk_sales::OrderLine;

    fn order(lines: &[(ProductId, u32, u64)]) -> Order {
        let lines = lines
            .iter()
            .map(|(p, q, cents)| OrderLine::new(*p, *q, Money::from_cents(*cents)).unwrap())
            .collect();
        Order::place(
            TenantId::new(),
            CustomerId::new(),
            "ORD-TEST".to_string(),
            lines,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn tally_counts_distinct_orders_and_skips_cancelled() {
        let widget = ProductId::new();
        let gadget = ProductId::new();

        let first = order(&[(widget, 2, 500), (widget, 1, 500)]);
        let second = order(&[(widget, 3, 500), (gadget, 1, 1_000)]);
        let mut cancelled = order(&[(gadget, 7, 1_000)]);
        cancelled
            .transition_to(OrderStatus::Cancelled, Utc::now())
            .unwrap();

        let tallies = tally_sales(&[first, second, cancelled]).unwrap();

        let w = &tallies[&widget];
        assert_eq!(w.quantity, 6);
        assert_eq!(w.revenue, Money::from_cents(3_000));
        assert_eq!(w.orders.len(), 2);

        let g = &tallies[&gadget];
        assert_eq!(g.quantity, 1);
        assert_eq!(g.revenue, Money::from_cents(1_000));
        assert_eq!(g.orders.len(), 1);
    }

    #[test]
    fn tally_of_no_orders_is_empty() {
        assert!(tally_sales(&[]).unwrap().is_empty());
    }

    #[test]
    fn summary_serializes_statuses_lowercase_and_money_as_cents() {
        let summary = DailySalesSummary {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            total_orders: 1,
            total_sales: Money::from_cents(1_250),
            average_order_value: Money::from_cents(1_250),
            orders_by_status: vec![StatusBreakdown {
                status: OrderStatus::Pending,
                count: 1,
                total: Money::from_cents(1_250),
            }],
            top_products: Vec::new(),
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["date"], "2024-03-01");
        assert_eq!(json["total_sales"], 1_250);
        assert_eq!(json["orders_by_status"][0]["status"], "pending");
    }
}
