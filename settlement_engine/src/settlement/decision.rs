//! The reconciliation decision, as a pure function over the order's transaction history.
//!
//! State is always deduced from the storefront's append-only history, never from local storage, so the decision
//! can be exercised exhaustively against literal fixtures. I/O lives in [`super::api`].

use shopify_tools::ShopifyOrder;

use crate::db_types::Invoice;

/// The single side effect (at most) reconciliation may apply to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Capture the invoice's paid amount against the base sale transaction.
    Capture { parent_transaction_id: i64, amount_cents: i64, currency: String },
    /// Cancel the order; `refund` asks the platform to also refund a still-active capture.
    Cancel { refund: bool },
    /// The invoice was paid in a different currency than the order's base transaction. Never mutate; an invoice
    /// settled in a foreign currency must not mark this order as paid.
    RejectCurrencyMismatch { invoice_currency: String, order_currency: String },
    /// Nothing to do, with the reason why.
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No manually-capturable sale transaction exists; the order is not awaiting settlement.
    OrderNotAwaitingSettlement,
    /// A capture is already active for this order. The idempotency short-circuit for replayed events.
    AlreadyCaptured,
    /// A capture is active but the order was cancelled out from under it. Worth a warning, nothing to mutate.
    CapturedButCancelled,
    /// The order is already cancelled, so an annulment has nothing left to do.
    AlreadyCancelled,
    /// The invoice's lifecycle state calls for no order action.
    NoActionForStatus,
}

/// Decide what, if anything, to do to `order` given the current state of `invoice`.
///
/// The decision is idempotent by construction: it inspects the transaction-history aggregate (successful captures
/// vs successful refunds) rather than remembering what the engine did before, so replaying the same lifecycle
/// event against the same history always lands in a skip branch.
pub fn decide(invoice: &Invoice, order: &ShopifyOrder) -> ReconcileAction {
    let Some(base) = order.base_capturable_transaction() else {
        return ReconcileAction::Skip(SkipReason::OrderNotAwaitingSettlement);
    };
    if !invoice.currency.eq_ignore_ascii_case(&base.currency) {
        return ReconcileAction::RejectCurrencyMismatch {
            invoice_currency: invoice.currency.clone(),
            order_currency: base.currency.clone(),
        };
    }
    let can_refund = order.can_refund();
    match invoice.settlement_outcome() {
        Some(true) => {
            if can_refund {
                if order.is_cancelled() {
                    ReconcileAction::Skip(SkipReason::CapturedButCancelled)
                } else {
                    ReconcileAction::Skip(SkipReason::AlreadyCaptured)
                }
            } else {
                ReconcileAction::Capture {
                    parent_transaction_id: base.id,
                    amount_cents: invoice.paid_cents,
                    currency: invoice.currency.clone(),
                }
            }
        },
        Some(false) => {
            if order.is_cancelled() {
                ReconcileAction::Skip(SkipReason::AlreadyCancelled)
            } else {
                ReconcileAction::Cancel { refund: can_refund }
            }
        },
        None => ReconcileAction::Skip(SkipReason::NoActionForStatus),
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use shopify_tools::{ShopifyTransaction, TransactionKind, TransactionStatus};
    use ssg_common::Sats;

    use super::*;
    use crate::db_types::{ExceptionStatus, InvoiceStatus};

    fn invoice(status: InvoiceStatus) -> Invoice {
        Invoice {
            id: "inv-1".to_string(),
            currency: "USD".to_string(),
            price_cents: 600,
            paid_cents: 600,
            paid_sats: Sats::from(15_000),
            settlement_rate: Sats::from(25),
            status,
            exception: ExceptionStatus::None,
            order_id: Some(42),
            order_name: Some("#1001".to_string()),
            gateway: Some("settlement-gateway".to_string()),
            created_at: Utc::now(),
        }
    }

    fn tx(id: i64, kind: TransactionKind, status: TransactionStatus, capturable: bool, currency: &str) -> ShopifyTransaction {
        ShopifyTransaction {
            id,
            order_id: 42,
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
        ShopifyOrder { id: 42, currency: "USD".to_string(), transactions, ..Default::default() }
    }

    #[test]
    fn settled_invoice_captures_against_base_sale() {
        let order = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
        let action = decide(&invoice(InvoiceStatus::Settled), &order);
        assert_eq!(
            action,
            ReconcileAction::Capture { parent_transaction_id: 7, amount_cents: 600, currency: "USD".to_string() }
        );
    }

    #[test]
    fn replayed_settled_event_is_skipped_after_capture() {
        let order = order(vec![
            tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD"),
            tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD"),
        ]);
        let action = decide(&invoice(InvoiceStatus::Settled), &order);
        assert_eq!(action, ReconcileAction::Skip(SkipReason::AlreadyCaptured));
    }

    #[test]
    fn captured_but_cancelled_order_is_left_alone() {
        let mut order = order(vec![
            tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD"),
            tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD"),
        ]);
        order.cancelled_at = Some("2024-05-14T10:11:12-04:00".parse().unwrap());
        let action = decide(&invoice(InvoiceStatus::Settled), &order);
        assert_eq!(action, ReconcileAction::Skip(SkipReason::CapturedButCancelled));
    }

    #[test]
    fn refunded_capture_reopens_the_capture_path() {
        // a refund neutralises the earlier capture, so a (re-)settled invoice captures again
        let order = order(vec![
            tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD"),
            tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD"),
            tx(9, TransactionKind::Refund, TransactionStatus::Success, false, "USD"),
        ]);
        let action = decide(&invoice(InvoiceStatus::Settled), &order);
        assert!(matches!(action, ReconcileAction::Capture { parent_transaction_id: 7, .. }));
    }

    #[test]
    fn currency_mismatch_never_mutates() {
        let order = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "EUR")]);
        for status in [InvoiceStatus::Settled, InvoiceStatus::Expired, InvoiceStatus::Invalid] {
            let action = decide(&invoice(status), &order);
            assert_eq!(
                action,
                ReconcileAction::RejectCurrencyMismatch {
                    invoice_currency: "USD".to_string(),
                    order_currency: "EUR".to_string(),
                }
            );
        }
    }

    #[test]
    fn expired_invoice_cancels_with_refund_when_capture_is_active() {
        let order = order(vec![
            tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD"),
            tx(8, TransactionKind::Capture, TransactionStatus::Success, false, "USD"),
        ]);
        let action = decide(&invoice(InvoiceStatus::Expired), &order);
        assert_eq!(action, ReconcileAction::Cancel { refund: true });
    }

    #[test]
    fn invalid_invoice_cancels_without_refund_when_nothing_was_captured() {
        let order = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
        let action = decide(&invoice(InvoiceStatus::Invalid), &order);
        assert_eq!(action, ReconcileAction::Cancel { refund: false });
    }

    #[test]
    fn second_annulment_is_a_no_op() {
        let mut order = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
        order.cancelled_at = Some("2024-05-14T10:11:12-04:00".parse().unwrap());
        let action = decide(&invoice(InvoiceStatus::Expired), &order);
        assert_eq!(action, ReconcileAction::Skip(SkipReason::AlreadyCancelled));
    }

    #[test]
    fn order_without_base_transaction_is_not_awaiting_settlement() {
        let order = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, false, "USD")]);
        let action = decide(&invoice(InvoiceStatus::Settled), &order);
        assert_eq!(action, ReconcileAction::Skip(SkipReason::OrderNotAwaitingSettlement));
    }

    #[test]
    fn new_invoice_takes_no_action() {
        let order = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
        let action = decide(&invoice(InvoiceStatus::New), &order);
        assert_eq!(action, ReconcileAction::Skip(SkipReason::NoActionForStatus));
    }

    #[test]
    fn partially_paid_expired_invoice_captures_the_paid_portion() {
        let order = order(vec![tx(7, TransactionKind::Sale, TransactionStatus::Success, true, "USD")]);
        let mut inv = invoice(InvoiceStatus::Expired);
        inv.exception = ExceptionStatus::PaidPartial;
        inv.paid_cents = 250;
        let action = decide(&inv, &order);
        assert_eq!(
            action,
            ReconcileAction::Capture { parent_transaction_id: 7, amount_cents: 250, currency: "USD".to_string() }
        );
    }
}
