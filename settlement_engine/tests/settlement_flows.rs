//! End-to-end engine tests: a mock commerce platform in front of a real (in-memory) sqlite ledger.
//!
//! The mock's call-count expectations are the assertions that matter here: a capture or cancel that happens twice
//! fails the test at the platform boundary, exactly where a double-settlement would hurt in production.

use std::{sync::Arc, time::Duration};

use mockall::{mock, Sequence};
use settlement_engine::{
    db_types::{order_tag, ExceptionStatus, Invoice, InvoiceStatus, LogLevel, NewInvoice},
    events::EventProducers,
    traits::{CommercePlatform, InvoiceLedger, Payouts, PlatformError},
    CheckoutOutcome,
    RefundError,
    RefundMode,
    SettlementApi,
    SettlementConfig,
    SqliteDatabase,
};
use shopify_tools::{
    CancelOrderRequest,
    MoneyBag,
    MoneySet,
    OrderMetafield,
    RefundNotification,
    ShopifyOrder,
    ShopifyTransaction,
    TransactionKind,
    TransactionStatus,
};
use ssg_common::Sats;
use tokio_util::sync::CancellationToken;

mock! {
    pub Platform {}
    impl CommercePlatform for Platform {
        async fn fetch_order(&self, order_id: i64) -> Result<Option<ShopifyOrder>, PlatformError>;
        async fn fetch_order_by_checkout_token(&self, token: &str) -> Result<Option<ShopifyOrder>, PlatformError>;
        async fn capture_transaction(
            &self,
            order_id: i64,
            parent_transaction_id: i64,
            amount_cents: i64,
            currency: &str,
        ) -> Result<ShopifyTransaction, PlatformError>;
        async fn cancel_order(&self, order_id: i64, request: CancelOrderRequest) -> Result<ShopifyOrder, PlatformError>;
        async fn set_order_metafields(&self, order_id: i64, fields: Vec<OrderMetafield>) -> Result<(), PlatformError>;
    }
}

const ORDER_ID: i64 = 7304009351501;

fn tx(id: i64, kind: TransactionKind, status: TransactionStatus, capturable: bool, currency: &str) -> ShopifyTransaction {
    ShopifyTransaction {
        id,
        order_id: ORDER_ID,
        kind,
        status,
        amount: "6.00".to_string(),
        currency: currency.to_string(),
        gateway: Some("settlement-gateway".to_string()),
        parent_id: None,
        manually_capturable: capturable,
        created_at: None,
        message: None,
        error_code: None,
    }
}

fn order(transactions: Vec<ShopifyTransaction>) -> ShopifyOrder {
    ShopifyOrder {
        id: ORDER_ID,
        name: "#1001".to_string(),
        currency: "USD".to_string(),
        presentment_currency: "USD".to_string(),
        payment_gateway_names: vec!["settlement-gateway".to_string()],
        total_price: "6.00".to_string(),
        total_outstanding_set: Some(MoneySet {
            presentment_money: MoneyBag { amount: "6.00".to_string(), currency: "USD".to_string() },
            shop_money: MoneyBag { amount: "6.00".to_string(), currency: "USD".to_string() },
        }),
        transactions,
        ..Default::default()
    }
}

async fn test_db() -> SqliteDatabase {
    SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("in-memory database")
}

fn api(db: SqliteDatabase, platform: MockPlatform, config: SettlementConfig) -> SettlementApi<SqliteDatabase, MockPlatform> {
    SettlementApi::new(db, platform, EventProducers::default(), config)
}

/// Create an invoice linked to [`ORDER_ID`] and drive it into the given state, the way the invoice-side host
/// would once a payment lands.
async fn linked_invoice(db: &SqliteDatabase, status: InvoiceStatus, exception: ExceptionStatus) -> Invoice {
    let invoice = db
        .create_invoice(NewInvoice {
            currency: "USD".to_string(),
            price_cents: 600,
            order_id: Some(ORDER_ID),
            order_name: Some("#1001".to_string()),
            gateway: Some("settlement-gateway".to_string()),
            tags: vec![order_tag(ORDER_ID), "#1001".to_string(), ORDER_ID.to_string()],
        })
        .await
        .expect("invoice created");
    // 1 cent => 1 sat keeps the payout arithmetic easy to follow
    db.update_invoice_state(&invoice.id, status, exception, 600, Sats::from(600), Sats::from(1))
        .await
        .expect("invoice state updated");
    db.fetch_invoice(&invoice.id).await.expect("fetch").expect("invoice exists")
}

//---------------------------------------  Checkout deduplication  -----------------------------------------------

#[tokio::test]
async fn concurrent_checkouts_create_exactly_one_invoice() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let fixture = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
    platform
        .expect_fetch_order_by_checkout_token()
        .returning(move |_| Ok(Some(fixture.clone())));
    // exactly one invoice means exactly one metafield write-back
    platform.expect_set_order_metafields().times(1).returning(|_, _| Ok(()));
    let api = Arc::new(api(db.clone(), platform, SettlementConfig::default()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let api = Arc::clone(&api);
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            api.checkout_invoice("tok-abc", &cancel).await.expect("checkout succeeds")
        }));
    }
    let mut created = 0;
    let mut existing = 0;
    for handle in handles {
        match handle.await.unwrap() {
            CheckoutOutcome::Created(_) => created += 1,
            CheckoutOutcome::Existing(_) => existing += 1,
        }
    }
    assert_eq!(created, 1);
    assert_eq!(existing, 7);
    let invoices = db.search_invoices_by_tag(&order_tag(ORDER_ID)).await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].order_id, Some(ORDER_ID));
    assert_eq!(invoices[0].price_cents, 600);
}

#[tokio::test]
async fn checkout_refuses_orders_from_other_gateways() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let mut fixture = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
    fixture.payment_gateway_names = vec!["shopify_payments".to_string()];
    platform.expect_fetch_order_by_checkout_token().returning(move |_| Ok(Some(fixture.clone())));
    let api = api(db.clone(), platform, SettlementConfig::default());
    let cancel = CancellationToken::new();
    let err = api.checkout_invoice("tok-abc", &cancel).await.unwrap_err();
    assert!(matches!(err, settlement_engine::CheckoutError::GatewayMismatch));
    assert!(db.search_invoices_by_tag(&order_tag(ORDER_ID)).await.unwrap().is_empty());
}

//---------------------------------------  Capture idempotency  --------------------------------------------------

#[tokio::test]
async fn replayed_settled_events_capture_at_most_once() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let mut seq = Sequence::new();
    let before = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
    let after = order(vec![
        tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD"),
        tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD"),
    ]);
    platform
        .expect_fetch_order()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_| Ok(Some(before.clone())));
    platform
        .expect_fetch_order()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_| Ok(Some(after.clone())));
    // the property under test: replaying the event must not capture twice
    platform
        .expect_capture_transaction()
        .times(1)
        .withf(|_, parent, amount, currency| *parent == 7 && *amount == 600 && currency == "USD")
        .returning(|order_id, parent, _, _| {
            let mut t = tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD");
            t.order_id = order_id;
            t.parent_id = Some(parent);
            Ok(t)
        });
    let api = api(db.clone(), platform, SettlementConfig::default());
    let invoice = linked_invoice(&db, InvoiceStatus::Settled, ExceptionStatus::None).await;

    let first = api.reconcile_order(&invoice).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].level, LogLevel::Info);

    let second = api.reconcile_order(&invoice).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].level, LogLevel::Warning);
    assert!(second[0].message.contains("Skipping"));

    let logs = db.fetch_invoice_logs(&invoice.id).await.unwrap();
    assert_eq!(logs.len(), 2);
}

#[tokio::test]
async fn expired_invoice_cancels_with_refund_exactly_once() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let mut seq = Sequence::new();
    let captured = order(vec![
        tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD"),
        tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD"),
    ]);
    let mut cancelled = captured.clone();
    cancelled.cancelled_at = Some("2024-05-14T10:11:12-04:00".parse().unwrap());
    let cancelled_response = cancelled.clone();
    platform
        .expect_fetch_order()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_| Ok(Some(captured.clone())));
    platform
        .expect_fetch_order()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_| Ok(Some(cancelled.clone())));
    // one successful capture and zero refunds => the cancel must carry refund=true
    platform
        .expect_cancel_order()
        .times(1)
        .withf(|_, request| request.refund && request.restock && !request.notify_customer)
        .returning(move |_, _| Ok(cancelled_response.clone()));
    let api = api(db.clone(), platform, SettlementConfig::default());
    let invoice = linked_invoice(&db, InvoiceStatus::Expired, ExceptionStatus::None).await;

    let first = api.reconcile_order(&invoice).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].level, LogLevel::Warning);

    // the replayed event sees a cancelled order and issues no further call
    let second = api.reconcile_order(&invoice).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn currency_mismatch_never_issues_a_platform_mutation() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let foreign = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "EUR")]);
    platform.expect_fetch_order().returning(move |_| Ok(Some(foreign.clone())));
    // no capture/cancel expectations: any mutation attempt panics the mock
    let api = api(db.clone(), platform, SettlementConfig::default());
    let invoice = linked_invoice(&db, InvoiceStatus::Settled, ExceptionStatus::None).await;

    let logs = api.reconcile_order(&invoice).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Error);
    assert!(logs[0].message.contains("Currency mismatch"));
    let stored = db.fetch_invoice_logs(&invoice.id).await.unwrap();
    assert_eq!(stored, logs);
}

#[tokio::test]
async fn missing_order_reconciles_to_nothing() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    platform.expect_fetch_order().returning(|_| Ok(None));
    let api = api(db.clone(), platform, SettlementConfig::default());
    let invoice = linked_invoice(&db, InvoiceStatus::Settled, ExceptionStatus::None).await;
    let logs = api.reconcile_order(&invoice).await.unwrap();
    assert!(logs.is_empty());
    assert!(db.fetch_invoice_logs(&invoice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn platform_failures_are_logged_not_propagated() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let fixture = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
    platform.expect_fetch_order().returning(move |_| Ok(Some(fixture.clone())));
    platform
        .expect_capture_transaction()
        .returning(|_, _, _, _| Err(PlatformError::CallFailed("502 Bad Gateway".to_string())));
    let api = api(db.clone(), platform, SettlementConfig::default());
    let invoice = linked_invoice(&db, InvoiceStatus::Settled, ExceptionStatus::None).await;
    let logs = api.reconcile_order(&invoice).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Error);
    assert!(logs[0].message.contains("502 Bad Gateway"));
}

//---------------------------------------  Refund settlement  ----------------------------------------------------

fn refund_notification(cents_as_price: &str) -> RefundNotification {
    serde_json::from_str(&format!(
        r#"{{ "order_id": {ORDER_ID}, "refund_line_items": [ {{ "subtotal": "{cents_as_price}" }} ] }}"#
    ))
    .unwrap()
}

#[tokio::test]
async fn zero_total_refund_is_rejected_without_side_effects() {
    let db = test_db().await;
    // no platform expectations: a zero-total refund must not even fetch the order
    let api = api(db.clone(), MockPlatform::new(), SettlementConfig::default());
    let invoice = linked_invoice(&db, InvoiceStatus::Settled, ExceptionStatus::None).await;
    let refund: RefundNotification = serde_json::from_str(&format!(r#"{{ "order_id": {ORDER_ID} }}"#)).unwrap();
    let err = api.settle_refund(&refund).await.unwrap_err();
    assert!(matches!(err, RefundError::NothingToRefund));
    assert!(db.fetch_refund_for_invoice(&invoice.id).await.unwrap().is_none());
}

#[tokio::test]
async fn refund_settles_into_a_payout_with_spread_applied() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let fixture = order(vec![
        tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD"),
        tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD"),
    ]);
    platform.expect_fetch_order().returning(move |_| Ok(Some(fixture.clone())));
    let config = SettlementConfig {
        refund_mode: RefundMode::RateAtPaymentTime,
        refund_spread_bps: 2_000,
        ..Default::default()
    };
    let api = api(db.clone(), platform, config);
    let invoice = linked_invoice(&db, InvoiceStatus::Settled, ExceptionStatus::None).await;

    // 1.00 USD at 1 sat/cent => 100 sats gross, minus 20% spread => 80
    let record = api.settle_refund(&refund_notification("1.00")).await.unwrap();
    assert_eq!(record.invoice_id, invoice.id);
    let payout = db.fetch_payout(&record.payout_id).await.unwrap().unwrap();
    assert_eq!(payout.amount, Sats::from(80));
    assert_eq!(payout.currency, "BTC");
    assert!(payout.auto_approve_claims);

    // a second delivery of the same notification fails closed
    let err = api.settle_refund(&refund_notification("1.00")).await.unwrap_err();
    assert!(matches!(err, RefundError::AlreadyRefunded(_)));
}

#[tokio::test]
async fn full_spread_rejects_the_refund() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let fixture = order(vec![
        tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD"),
        tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD"),
    ]);
    platform.expect_fetch_order().returning(move |_| Ok(Some(fixture.clone())));
    let config = SettlementConfig { refund_spread_bps: 10_000, ..Default::default() };
    let api = api(db.clone(), platform, config);
    let invoice = linked_invoice(&db, InvoiceStatus::Settled, ExceptionStatus::None).await;

    let err = api.settle_refund(&refund_notification("1.00")).await.unwrap_err();
    assert!(matches!(err, RefundError::SpreadExhausted { spread_bps: 10_000 }));
    // rejected refunds leave no payout behind, but do leave an error entry on the invoice
    assert!(db.fetch_refund_for_invoice(&invoice.id).await.unwrap().is_none());
    let logs = db.fetch_invoice_logs(&invoice.id).await.unwrap();
    assert!(logs.iter().any(|l| l.level == LogLevel::Error && l.message.contains("spread")));
}

#[tokio::test]
async fn refund_for_an_unlinked_order_fails_closed() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let fixture = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
    platform.expect_fetch_order().returning(move |_| Ok(Some(fixture.clone())));
    let api = api(db.clone(), platform, SettlementConfig::default());
    // no invoice was ever created for this order
    let err = api.settle_refund(&refund_notification("1.00")).await.unwrap_err();
    assert!(matches!(err, RefundError::OrderNotLinked(_)));
}

#[tokio::test]
async fn unpaid_invoice_cannot_be_refunded() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let fixture = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
    platform.expect_fetch_order().returning(move |_| Ok(Some(fixture.clone())));
    let api = api(db.clone(), platform, SettlementConfig::default());
    let invoice = linked_invoice(&db, InvoiceStatus::New, ExceptionStatus::None).await;
    let err = api.settle_refund(&refund_notification("1.00")).await.unwrap_err();
    assert!(matches!(err, RefundError::InvoiceStateForbidsRefund(_, _)));
    assert!(db.fetch_refund_for_invoice(&invoice.id).await.unwrap().is_none());
}

//---------------------------------------  Refunds under concurrency  --------------------------------------------

#[tokio::test]
async fn concurrent_refund_deliveries_yield_exactly_one_payout() {
    let db = test_db().await;
    let mut platform = MockPlatform::new();
    let fixture = order(vec![
        tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD"),
        tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD"),
    ]);
    platform.expect_fetch_order().returning(move |_| Ok(Some(fixture.clone())));
    let config = SettlementConfig { lock_timeout: Duration::from_secs(5), ..Default::default() };
    let api = Arc::new(api(db.clone(), platform, config));
    let invoice = linked_invoice(&db, InvoiceStatus::Settled, ExceptionStatus::None).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let api = Arc::clone(&api);
        handles.push(tokio::spawn(async move { api.settle_refund(&refund_notification("1.00")).await }));
    }
    let mut settled = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => settled += 1,
            Err(RefundError::AlreadyRefunded(_)) => duplicates += 1,
            Err(e) => panic!("unexpected refund error: {e}"),
        }
    }
    assert_eq!(settled, 1);
    assert_eq!(duplicates, 3);
    let record = db.fetch_refund_for_invoice(&invoice.id).await.unwrap().expect("one refund record");
    assert!(db.fetch_payout(&record.payout_id).await.unwrap().is_some());
}
