//! Concurrency tests for the transfer coordinator.
//!
//! These tests verify that:
//! - Two debits racing for the same balance never both succeed
//! - Opposite-direction transfers between the same pair cannot deadlock
//! - Transfers on disjoint card pairs do not wait on each other
//! - Money is conserved under a storm of concurrent transfers

mod common;

use std::sync::Arc;
use std::time::Duration;

use cardledger_core::{CreateLimitInput, LedgerError, LedgerStore, PeriodType, UnitOfWork};
use chrono::Utc;
use common::Fixture;
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_cannot_double_spend() {
    for _ in 0..50 {
        let fx = Arc::new(Fixture::new());
        let a = fx.card(dec!(100)).await;
        let b = fx.card(dec!(0)).await;
        let c = fx.card(dec!(0)).await;

        let barrier = Arc::new(Barrier::new(2));
        let handles = [b.id, c.id].map(|to| {
            let fx = Arc::clone(&fx);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                fx.services
                    .transfers
                    .transfer(fx.transfer(a.id, to, dec!(60)))
                    .await
            })
        });

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1, "exactly one transfer must win: {results:?}");
        assert!(results.iter().any(|r| matches!(
            r,
            Err(LedgerError::InsufficientFunds { balance, .. }) if *balance == dec!(40)
        )));

        assert_eq!(fx.balance(a.id).await, dec!(40));
        assert_eq!(fx.balance(b.id).await + fx.balance(c.id).await, dec!(60));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_respect_limit() {
    let fx = Arc::new(Fixture::new());
    let a = fx.card(dec!(1000)).await;
    let b = fx.card(dec!(0)).await;
    fx.services
        .limits
        .create_limit(CreateLimitInput {
            card_id: a.id,
            period_type: PeriodType::Daily,
            limit_amount: dec!(50),
            period_start_date: Utc::now().date_naive(),
        })
        .await
        .unwrap();

    const TASKS: usize = 10;
    let barrier = Arc::new(Barrier::new(TASKS));
    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let fx = Arc::clone(&fx);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                fx.services
                    .transfers
                    .transfer(fx.transfer(a.id, b.id, dec!(20)))
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    // 20 + 20 = 40 < 50 but a third would reach 60.
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 2);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(LedgerError::LimitExceeded(_))))
    );
    assert_eq!(fx.balance(a.id).await, dec!(960));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_directions_do_not_deadlock() {
    let fx = Arc::new(Fixture::new());
    let a = fx.card(dec!(1000)).await;
    let b = fx.card(dec!(1000)).await;

    const ROUNDS: usize = 200;
    let barrier = Arc::new(Barrier::new(ROUNDS * 2));
    let mut handles = Vec::with_capacity(ROUNDS * 2);
    for i in 0..ROUNDS * 2 {
        let fx = Arc::clone(&fx);
        let barrier = Arc::clone(&barrier);
        let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            fx.services
                .transfers
                .transfer(fx.transfer(from, to, dec!(1.25)))
                .await
        }));
    }

    let results = tokio::time::timeout(Duration::from_secs(30), join_all(handles))
        .await
        .expect("transfers deadlocked");

    for result in results {
        result.expect("task panicked").expect("transfer failed");
    }
    assert_eq!(fx.balance(a.id).await, dec!(1000));
    assert_eq!(fx.balance(b.id).await, dec!(1000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_pairs_proceed_independently() {
    let fx = Arc::new(Fixture::new());
    let a = fx.card(dec!(100)).await;
    let b = fx.card(dec!(100)).await;
    let c = fx.card(dec!(100)).await;
    let d = fx.card(dec!(100)).await;

    // Hold A and B for the whole test.
    let mut holder = fx.store.begin().await.unwrap();
    holder.lock_card(a.id).await.unwrap();
    holder.lock_card(b.id).await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        fx.services.transfers.transfer(fx.transfer(c.id, d.id, dec!(10))),
    )
    .await
    .expect("disjoint transfer blocked")
    .unwrap();

    // A transfer touching A waits until the holder lets go.
    let blocked = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move {
            fx.services
                .transfers
                .transfer(fx.transfer(a.id, c.id, dec!(10)))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished());

    drop(holder);
    blocked.await.unwrap().unwrap();

    assert_eq!(fx.balance(a.id).await, dec!(90));
    assert_eq!(fx.balance(c.id).await, dec!(100));
    assert_eq!(fx.balance(d.id).await, dec!(110));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_transfer_storm_conserves_total() {
    let fx = Arc::new(Fixture::new());
    let mut cards = Vec::new();
    for _ in 0..6 {
        cards.push(fx.card(dec!(250)).await.id);
    }
    let cards = Arc::new(cards);

    const TRANSFERS: usize = 600;
    let barrier = Arc::new(Barrier::new(TRANSFERS));
    let handles: Vec<_> = (0..TRANSFERS)
        .map(|i| {
            let fx = Arc::clone(&fx);
            let cards = Arc::clone(&cards);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                let from = cards[i % cards.len()];
                let to = cards[(i * 7 + 1) % cards.len()];
                let cents = i64::try_from((i % 9) + 1).unwrap() * 1_000 + 37;
                let amount = Decimal::new(cents, 2);
                barrier.wait().await;
                fx.services
                    .transfers
                    .transfer(fx.transfer(from, to, amount))
                    .await
            })
        })
        .collect();

    let mut committed = 0usize;
    for joined in join_all(handles).await {
        match joined.expect("task panicked") {
            Ok(_) => committed += 1,
            Err(
                LedgerError::InsufficientFunds { .. } | LedgerError::InvalidArgument(_),
            ) => {}
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }
    assert!(committed > 0);

    let mut total = Decimal::ZERO;
    for card_id in cards.iter() {
        let balance = fx.balance(*card_id).await;
        assert!(balance >= Decimal::ZERO);
        total += balance;
    }
    assert_eq!(total, dec!(1500));
}
