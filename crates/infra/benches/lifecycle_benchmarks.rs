use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use orderdesk_catalog::NewProduct;
use orderdesk_core::{CustomerId, Money, ProductId, TenantContext};
use orderdesk_infra::catalog::CatalogService;
use orderdesk_infra::customers::CustomerService;
use orderdesk_infra::lifecycle::OrderLifecycleEngine;
use orderdesk_infra::reporting::ReportingEngine;
use orderdesk_infra::store::{InMemoryStore, TenantDirectory};
use orderdesk_parties::NewCustomer;
use orderdesk_sales::LineRequest;
use tokio::runtime::Runtime;

const PLENTY: u32 = 1_000_000_000;

struct Bench {
    store: InMemoryStore,
    engine: OrderLifecycleEngine<InMemoryStore>,
    ctx: TenantContext,
    customer_id: CustomerId,
    products: Vec<ProductId>,
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn setup(rt: &Runtime, product_count: usize) -> Bench {
    rt.block_on(async {
        let store = InMemoryStore::new();
        let tenant = store.register_tenant("Bench Co").await.unwrap();
        let ctx = store.resolve(tenant.id).await.unwrap();

        let customer = CustomerService::new(store.clone())
            .create_customer(
                &ctx,
                NewCustomer {
                    name: "Bench Customer".to_string(),
                    contact: Default::default(),
                },
            )
            .await
            .unwrap();

        let catalog = CatalogService::new(store.clone());
        let mut products = Vec::with_capacity(product_count);
        for i in 0..product_count {
            let product = catalog
                .create_product(
                    &ctx,
                    NewProduct {
                        name: format!("Item {i}"),
                        sku: format!("SKU-{i}"),
                        unit_price: Money::from_cents(1_999),
                        stock_quantity: PLENTY,
                        low_stock_threshold: None,
                    },
                )
                .await
                .unwrap();
            products.push(product.id);
        }

        Bench {
            engine: OrderLifecycleEngine::new(store.clone()),
            store,
            ctx,
            customer_id: customer.id,
            products,
        }
    })
}

fn bench_create_and_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_lifecycle");
    let rt = runtime();

    for line_count in [1usize, 5, 20] {
        group.throughput(Throughput::Elements(line_count as u64));
        group.bench_with_input(
            BenchmarkId::new("create_then_cancel", line_count),
            &line_count,
            |b, &lines| {
                let bench = setup(&rt, lines);
                let requests: Vec<LineRequest> = bench
                    .products
                    .iter()
                    .map(|id| LineRequest::new(*id, 1))
                    .collect();

                b.iter(|| {
                    rt.block_on(async {
                        let order = bench
                            .engine
                            .create_order(&bench.ctx, bench.customer_id, black_box(requests.clone()))
                            .await
                            .unwrap();
                        bench
                            .engine
                            .cancel_order(&bench.ctx, order.id_typed())
                            .await
                            .unwrap();
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_rejected_order(c: &mut Criterion) {
    let rt = runtime();
    let bench = setup(&rt, 1);
    let request = vec![LineRequest::new(bench.products[0], PLENTY + 1)];

    c.bench_function("insufficient_stock_rejection", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result = bench
                    .engine
                    .create_order(&bench.ctx, bench.customer_id, black_box(request.clone()))
                    .await;
                assert!(result.is_err());
            })
        });
    });
}

fn bench_daily_summary(c: &mut Criterion) {
    let mut group = c.benchmark_group("daily_sales_summary");
    let rt = runtime();

    for order_count in [10usize, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("orders", order_count),
            &order_count,
            |b, &orders| {
                let bench = setup(&rt, 5);
                rt.block_on(async {
                    for i in 0..orders {
                        let product_id = bench.products[i % bench.products.len()];
                        bench
                            .engine
                            .create_order(
                                &bench.ctx,
                                bench.customer_id,
                                vec![LineRequest::new(product_id, 2)],
                            )
                            .await
                            .unwrap();
                    }
                });
                let reports = ReportingEngine::new(bench.store.clone());
                let today = Utc::now().date_naive();

                b.iter(|| {
                    rt.block_on(reports.daily_sales_summary(&bench.ctx, black_box(today)))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_create_and_cancel,
    bench_rejected_order,
    bench_daily_summary
);
criterion_main!(benches);
