use common::{OrderId, ProductId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{MovementReference, Reservation, ReservationLine, StockKey};
use store::{InMemoryStore, ReservationStore, StockStore};

async fn seeded(quantity: u32) -> (InMemoryStore, StockKey) {
    let store = InMemoryStore::new();
    let key = StockKey::product(ProductId::new());
    store.put_stock(key, quantity).await.unwrap();
    (store, key)
}

fn bench_reserve_single(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/reserve_single", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (store, key) = seeded(10).await;
                store
                    .reserve_stock(key, 1, MovementReference::reason("bench"))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_concurrent_reservations(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/concurrent_reserve_100_over_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (store, key) = seeded(50).await;
                let attempts = (0..100).map(|_| {
                    let store = store.clone();
                    async move {
                        store
                            .reserve_stock(key, 1, MovementReference::reason("bench"))
                            .await
                    }
                });
                let results = futures_util::future::join_all(attempts).await;
                assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 50);
            });
        });
    });
}

fn bench_confirm_reservation_10_lines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/confirm_reservation_10_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                let order_id = OrderId::new();
                let mut lines = Vec::with_capacity(10);
                for _ in 0..10 {
                    let key = StockKey::product(ProductId::new());
                    store.put_stock(key, 5).await.unwrap();
                    store
                        .reserve_stock(key, 2, MovementReference::order(order_id))
                        .await
                        .unwrap();
                    lines.push(ReservationLine::new(key, 2));
                }
                let reservation = Reservation::new(order_id, lines).unwrap();
                store.insert_reservation(&reservation).await.unwrap();
                store
                    .confirm_reservation(reservation.id, chrono::Utc::now())
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_single,
    bench_concurrent_reservations,
    bench_confirm_reservation_10_lines,
);
criterion_main!(benches);
