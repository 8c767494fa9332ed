//! Transfer coordinator tests against the in-memory store.
//!
//! Verifies conservation, full rollback on every rejected step and the
//! order in which rejection reasons are reported.

mod common;

use cardledger_core::{
    CreateLimitInput, EntryFilter, EntryType, LedgerError, LedgerStore, PeriodType,
};
use cardledger_shared::types::{CardId, PageRequest, UserId};
use chrono::{TimeZone, Utc};
use common::Fixture;
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn entry_count(fx: &Fixture) -> u64 {
    fx.store
        .entries(&EntryFilter::default(), PageRequest::new(1, 100))
        .await
        .unwrap()
        .meta
        .total
}

#[tokio::test]
async fn test_transfer_conserves_money() {
    let fx = Fixture::new();
    let a = fx.card(dec!(100.00)).await;
    let b = fx.card(dec!(5.50)).await;

    let receipt = fx
        .services
        .transfers
        .transfer(fx.transfer(a.id, b.id, dec!(30.25)))
        .await
        .unwrap();

    assert_eq!(fx.balance(a.id).await, dec!(69.75));
    assert_eq!(fx.balance(b.id).await, dec!(35.75));
    assert_eq!(receipt.from_balance, dec!(69.75));
    assert_eq!(receipt.to_balance, dec!(35.75));

    let out = fx.services.transactions.find_entry(receipt.debit_entry_id).await.unwrap();
    let inc = fx.services.transactions.find_entry(receipt.credit_entry_id).await.unwrap();
    assert_eq!(out.entry_type, EntryType::TransferOut);
    assert_eq!(inc.entry_type, EntryType::TransferIn);
    assert_eq!(out.amount, dec!(30.25));
    assert_eq!(inc.amount, dec!(30.25));
    assert_eq!(out.card_id, a.id);
    assert_eq!(inc.card_id, b.id);
    assert_eq!(out.description, "between own cards");
    assert_eq!(inc.description, "between own cards");
    assert_eq!(out.occurred_at, inc.occurred_at);
    assert_eq!(entry_count(&fx).await, 2);
}

#[tokio::test]
async fn test_daily_limit_scenario() {
    let fx = Fixture::new();
    let a = fx.card(dec!(100.00)).await;
    let b = fx.card(dec!(0)).await;
    let limit = fx
        .services
        .limits
        .create_limit(CreateLimitInput {
            card_id: a.id,
            period_type: PeriodType::Daily,
            limit_amount: dec!(50.00),
            period_start_date: Utc::now().date_naive(),
        })
        .await
        .unwrap();

    let err = fx
        .services
        .transfers
        .transfer(fx.transfer(a.id, b.id, dec!(50.00)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::LimitExceeded(id) if id == limit.id));
    assert_eq!(fx.balance(a.id).await, dec!(100.00));
    assert_eq!(entry_count(&fx).await, 0);

    fx.services
        .transfers
        .transfer(fx.transfer(a.id, b.id, dec!(49.99)))
        .await
        .unwrap();
    assert_eq!(fx.balance(a.id).await, dec!(50.01));
    assert_eq!(fx.balance(b.id).await, dec!(49.99));
    assert_eq!(entry_count(&fx).await, 2);

    // The window now holds 49.99 of spend; even one cent reaches the cap.
    let err = fx
        .services
        .transfers
        .transfer(fx.transfer(a.id, b.id, dec!(0.01)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::LimitExceeded(_)));
}

#[tokio::test]
async fn test_limit_window_anchored_at_start_date() {
    let fx = Fixture::new();
    let a = fx.card(dec!(500)).await;
    let b = fx.card(dec!(0)).await;
    let start = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();

    fx.services
        .limits
        .create_limit_on(
            CreateLimitInput {
                card_id: a.id,
                period_type: PeriodType::Monthly,
                limit_amount: dec!(100),
                period_start_date: start.date_naive(),
            },
            start.date_naive(),
        )
        .await
        .unwrap();

    let day = |d: u32| Utc.with_ymd_and_hms(2026, 4, d, 9, 30, 0).unwrap();
    fx.services
        .transfers
        .transfer_at(fx.transfer(a.id, b.id, dec!(60)), day(1))
        .await
        .unwrap();

    // Day 30 is the last day of the window.
    let err = fx
        .services
        .transfers
        .transfer_at(fx.transfer(a.id, b.id, dec!(40)), day(30))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::LimitExceeded(_)));

    fx.services
        .transfers
        .transfer_at(fx.transfer(a.id, b.id, dec!(39.99)), day(30))
        .await
        .unwrap();
}

#[rstest]
#[case::zero(dec!(0))]
#[case::negative(dec!(-10))]
#[case::five_decimal_places(dec!(1.00005))]
#[case::rounds_to_zero_in_storage(dec!(0.00001))]
#[tokio::test]
async fn test_invalid_amount_rejected(#[case] amount: Decimal) {
    let fx = Fixture::new();
    let a = fx.card(dec!(100)).await;
    let b = fx.card(dec!(0)).await;

    let err = fx
        .services
        .transfers
        .transfer(fx.transfer(a.id, b.id, amount))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InvalidArgument(_)));
    assert_eq!(fx.balance(a.id).await, dec!(100));
    assert_eq!(fx.balance(b.id).await, dec!(0));
    assert_eq!(entry_count(&fx).await, 0);
}

#[rstest]
#[case::within_balance(dec!(10))]
#[case::beyond_balance(dec!(1000))]
#[case::negative(dec!(-1))]
#[tokio::test]
async fn test_same_card_always_invalid(#[case] amount: Decimal) {
    let fx = Fixture::new();
    let a = fx.card(dec!(100)).await;
    fx.services
        .limits
        .create_limit(CreateLimitInput {
            card_id: a.id,
            period_type: PeriodType::Daily,
            limit_amount: dec!(1),
            period_start_date: Utc::now().date_naive(),
        })
        .await
        .unwrap();

    let err = fx
        .services
        .transfers
        .transfer(fx.transfer(a.id, a.id, amount))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InvalidArgument(_)));
    assert_eq!(fx.balance(a.id).await, dec!(100));
}

#[tokio::test]
async fn test_insufficient_funds_rolls_back() {
    let fx = Fixture::new();
    let a = fx.card(dec!(20.00)).await;
    let b = fx.card(dec!(1.00)).await;

    let err = fx
        .services
        .transfers
        .transfer(fx.transfer(a.id, b.id, dec!(20.01)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::InsufficientFunds { card_id, balance, requested }
            if card_id == a.id && balance == dec!(20.00) && requested == dec!(20.01)
    ));
    assert_eq!(fx.balance(a.id).await, dec!(20.00));
    assert_eq!(fx.balance(b.id).await, dec!(1.00));
    assert_eq!(entry_count(&fx).await, 0);

    // Whole balance may move.
    fx.services
        .transfers
        .transfer(fx.transfer(a.id, b.id, dec!(20.00)))
        .await
        .unwrap();
    assert_eq!(fx.balance(a.id).await, dec!(0));
}

#[tokio::test]
async fn test_foreign_or_missing_cards_not_found() {
    let fx = Fixture::new();
    let a = fx.card(dec!(100)).await;
    let b = fx.card(dec!(0)).await;

    let mut request = fx.transfer(a.id, b.id, dec!(10));
    request.user_id = UserId::new();
    let err = fx.services.transfers.transfer(request).await.unwrap_err();
    assert!(matches!(err, LedgerError::CardNotFound(id) if id == a.id));

    let ghost = CardId::new();
    let err = fx
        .services
        .transfers
        .transfer(fx.transfer(a.id, ghost, dec!(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::CardNotFound(id) if id == ghost));

    // Missing source is reported before the same-card and amount checks.
    let err = fx
        .services
        .transfers
        .transfer(fx.transfer(ghost, ghost, dec!(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::CardNotFound(id) if id == ghost));

    assert_eq!(fx.balance(a.id).await, dec!(100));
    assert_eq!(entry_count(&fx).await, 0);
}

#[tokio::test]
async fn test_inactive_limit_does_not_block() {
    let fx = Fixture::new();
    let a = fx.card(dec!(100)).await;
    let b = fx.card(dec!(0)).await;
    let limit = fx
        .services
        .limits
        .create_limit(CreateLimitInput {
            card_id: a.id,
            period_type: PeriodType::Daily,
            limit_amount: dec!(10),
            period_start_date: Utc::now().date_naive(),
        })
        .await
        .unwrap();

    fx.services
        .limits
        .update_limit(
            limit.id,
            cardledger_core::UpdateLimitInput {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    fx.services
        .transfers
        .transfer(fx.transfer(a.id, b.id, dec!(50)))
        .await
        .unwrap();
    assert_eq!(fx.balance(b.id).await, dec!(50));
}
