use std::{fmt::Debug, str::FromStr, time::Duration};

use log::*;
use shopify_tools::{CancelOrderRequest, CancelReason, OrderMetafield, RefundNotification, ShopifyOrder};
use ssg_common::BTC_CURRENCY_CODE;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    db_types::{order_tag, Invoice, InvoiceStatus, LogEntry, NewInvoice, NewPayout, RefundRecord},
    events::{EventProducers, RefundSettledEvent},
    keyed_lock::{LockError, OrderLocks},
    rates::apply_spread,
    settlement::decision::{decide, ReconcileAction, SkipReason},
    traits::{
        CommercePlatform,
        ExchangeRateError,
        ExchangeRates,
        InvoiceLedger,
        LedgerError,
        PayoutError,
        Payouts,
        PlatformError,
    },
};

/// How the payout amount for a refund is derived from the fiat refund total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundMode {
    /// Use the settlement rate recorded on the invoice when it was paid.
    RateAtPaymentTime,
    /// Fetch a fresh quote and use its bid.
    CurrentRate,
}

impl FromStr for RefundMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rate-then" | "rate_at_payment_time" => Ok(RefundMode::RateAtPaymentTime),
            "current-rate" | "current_rate" => Ok(RefundMode::CurrentRate),
            other => Err(format!("{other} is not a refund mode. Use 'rate-then' or 'current-rate'.")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Only orders that were (partially) paid through a gateway whose name contains this keyword are eligible for
    /// an invoice.
    pub gateway_keyword: String,
    pub refund_mode: RefundMode,
    /// Spread deducted from refund payouts, in basis points. Validated to `0..10_000` at configuration time; the
    /// refund path independently rejects any spread that consumes the whole payout.
    pub refund_spread_bps: i64,
    /// Upper bound on waiting for the per-order lock on request-driven paths.
    pub lock_timeout: Duration,
    /// Public base URL of this gateway, used for checkout and payout-claim links.
    pub public_base_url: String,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            gateway_keyword: "settlement-gateway".to_string(),
            refund_mode: RefundMode::RateAtPaymentTime,
            refund_spread_bps: 0,
            lock_timeout: Duration::from_secs(30),
            public_base_url: "http://localhost:8360".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Could not acquire the order lock. {0}")]
    Lock(#[from] LockError),
    #[error("Invoice ledger failure. {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("The checkout token does not resolve to an order")]
    InvalidCheckoutToken,
    #[error("The order was not paid through this gateway")]
    GatewayMismatch,
    #[error("The order has no capturable sale transaction")]
    OrderNotCapturable,
    #[error("The order carries an invalid amount: {0}")]
    InvalidOrderAmount(String),
    #[error("Could not acquire the order lock. {0}")]
    Lock(#[from] LockError),
    #[error("Invoice ledger failure. {0}")]
    Ledger(#[from] LedgerError),
    #[error("Platform call failed. {0}")]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Error)]
pub enum RefundError {
    #[error("The refund notification contains nothing to refund")]
    NothingToRefund,
    #[error("Order #{0} does not exist on the platform")]
    OrderNotFound(i64),
    #[error("Order #{0} is not linked to any invoice")]
    OrderNotLinked(i64),
    #[error("Invoice {0} has already been refunded")]
    AlreadyRefunded(String),
    #[error("Invoice {0} is {1} and cannot accept a refund")]
    InvoiceStateForbidsRefund(String, InvoiceStatus),
    #[error("The computed payout amount is not positive")]
    AmountNotPositive,
    #[error("The configured spread of {}% reduced the payout to nothing", .spread_bps / 100)]
    SpreadExhausted { spread_bps: i64 },
    #[error("Could not fetch an exchange rate. {0}")]
    RateUnavailable(#[from] ExchangeRateError),
    #[error("Could not acquire the order lock. {0}")]
    Lock(#[from] LockError),
    #[error("Invoice ledger failure. {0}")]
    Ledger(#[from] LedgerError),
    #[error("Platform call failed. {0}")]
    Platform(#[from] PlatformError),
    #[error("Payout creation failed. {0}")]
    Payout(#[from] PayoutError),
}

#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// An invoice already existed for the order; the caller should send the buyer to it.
    Existing(Invoice),
    Created(Invoice),
}

impl CheckoutOutcome {
    pub fn invoice(&self) -> &Invoice {
        match self {
            CheckoutOutcome::Existing(i) | CheckoutOutcome::Created(i) => i,
        }
    }
}

/// The engine's public API. `B` is the ledger-side backend, `S` the commerce platform. All order-mutating entry
/// points serialize on the per-order lock; the platform's order record is re-fetched inside every critical
/// section and never cached across them.
#[derive(Clone)]
pub struct SettlementApi<B, S> {
    db: B,
    platform: S,
    locks: OrderLocks,
    producers: EventProducers,
    config: SettlementConfig,
}

impl<B, S> Debug for SettlementApi<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B, S> SettlementApi<B, S> {
    pub fn new(db: B, platform: S, producers: EventProducers, config: SettlementConfig) -> Self {
        Self { db, platform, locks: OrderLocks::new(), producers, config }
    }

    /// Share a lock registry with another api instance. All instances that can touch the same orders MUST share
    /// one registry, or the per-order serialization guarantee falls apart.
    pub fn with_locks(mut self, locks: OrderLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    fn checkout_url(&self, checkout_token: &str) -> String {
        format!("{}/shopify/checkout?checkout_token={checkout_token}", self.config.public_base_url)
    }

    fn claim_url(&self, payout_id: &str) -> String {
        format!("{}/payouts/{payout_id}/claim", self.config.public_base_url)
    }
}

impl<B, S> SettlementApi<B, S>
where
    B: InvoiceLedger,
    S: CommercePlatform,
{
    /// Reconcile the platform order referenced by `invoice` with the invoice's current lifecycle state.
    ///
    /// At most one mutation (capture or cancel) is applied, decided by [`decide`] over a freshly fetched
    /// transaction history. Platform-call failures do not propagate: they are recorded as error entries on the
    /// invoice and reconciliation is retried on the next qualifying lifecycle event.
    pub async fn reconcile_order(&self, invoice: &Invoice) -> Result<Vec<LogEntry>, SettlementError> {
        let Some(order_id) = invoice.order_id else {
            debug!("🔄️ Invoice {} carries no order reference. Nothing to reconcile.", invoice.id);
            return Ok(Vec::new());
        };
        let key = order_id.to_string();
        let _guard = self.locks.lock_with_timeout(&key, self.config.lock_timeout).await?;
        let order = match self.platform.fetch_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                debug!("🔄️ Order #{order_id} does not exist on the platform. Nothing to reconcile.");
                return Ok(Vec::new());
            },
            Err(e) => {
                let entry = LogEntry::error(format!("Could not fetch order #{order_id} from the platform. {e}"));
                self.db.append_invoice_log(&invoice.id, entry.clone()).await?;
                return Ok(vec![entry]);
            },
        };
        let action = decide(invoice, &order);
        debug!("🔄️ Reconciling order #{order_id} against invoice {} ({}): {action:?}", invoice.id, invoice.status);
        let logs = self.execute(invoice, order_id, action).await;
        for entry in &logs {
            self.db.append_invoice_log(&invoice.id, entry.clone()).await?;
        }
        Ok(logs)
    }

    async fn execute(&self, invoice: &Invoice, order_id: i64, action: ReconcileAction) -> Vec<LogEntry> {
        match action {
            ReconcileAction::Capture { parent_transaction_id, amount_cents, currency } => {
                match self
                    .platform
                    .capture_transaction(order_id, parent_transaction_id, amount_cents, &currency)
                    .await
                {
                    Ok(tx) => {
                        info!("🔄️ Captured order #{order_id} for invoice {}. Transaction {}.", invoice.id, tx.id);
                        vec![LogEntry::info(format!(
                            "Successfully captured the order on the platform. Transaction {}.",
                            tx.id
                        ))]
                    },
                    Err(e) => {
                        error!("🔄️ Failed to capture order #{order_id}. {e}");
                        vec![LogEntry::error(format!("Failed to capture the order. {e}"))]
                    },
                }
            },
            ReconcileAction::Cancel { refund } => {
                let request = CancelOrderRequest {
                    notify_customer: false,
                    restock: true,
                    refund,
                    reason: CancelReason::Declined,
                    staff_note: Some(format!("Invoice {} expired or invalid", invoice.id)),
                };
                match self.platform.cancel_order(order_id, request).await {
                    Ok(_) => {
                        info!("🔄️ Cancelled order #{order_id} for invoice {} (refund: {refund}).", invoice.id);
                        vec![LogEntry::warning("Order cancelled on the platform.")]
                    },
                    Err(e) => {
                        error!("🔄️ Failed to cancel order #{order_id}. {e}");
                        vec![LogEntry::error(format!("Failed to cancel the order. {e}"))]
                    },
                }
            },
            ReconcileAction::RejectCurrencyMismatch { invoice_currency, order_currency } => {
                error!(
                    "🔄️ Currency mismatch on order #{order_id}: invoice {} is in {invoice_currency}, the order \
                     transaction is in {order_currency}. Not registering.",
                    invoice.id
                );
                vec![LogEntry::error(format!(
                    "Currency mismatch on the platform order: the invoice is in {invoice_currency} but the order \
                     transaction is in {order_currency}. Not registering the payment."
                ))]
            },
            ReconcileAction::Skip(SkipReason::AlreadyCaptured) => {
                vec![LogEntry::warning("A transaction was previously recorded against the order. Skipping.")]
            },
            ReconcileAction::Skip(SkipReason::CapturedButCancelled) => {
                vec![LogEntry::warning(
                    "The platform order has already been cancelled, but the invoice was successfully paid.",
                )]
            },
            ReconcileAction::Skip(
                SkipReason::OrderNotAwaitingSettlement | SkipReason::AlreadyCancelled | SkipReason::NoActionForStatus,
            ) => Vec::new(),
        }
    }

    /// Resolve a buyer's checkout token into exactly one invoice.
    ///
    /// The per-order lock spans the search-then-create sequence, so concurrent checkout hits for the same order
    /// yield one created invoice and N-1 references to it.
    pub async fn checkout_invoice(
        &self,
        checkout_token: &str,
        cancel: &CancellationToken,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let order = self
            .platform
            .fetch_order_by_checkout_token(checkout_token)
            .await?
            .ok_or(CheckoutError::InvalidCheckoutToken)?;
        if !order.paid_through_gateway(&self.config.gateway_keyword) {
            debug!("🛒️ Order #{} was not paid through this gateway. Refusing checkout.", order.id);
            return Err(CheckoutError::GatewayMismatch);
        }
        let key = order.id.to_string();
        let _guard = self.locks.lock_with_cancel(&key, cancel).await?;
        let tag = order_tag(order.id);
        let existing =
            self.db.search_invoices_by_tag(&tag).await?.into_iter().find(|i| i.order_id == Some(order.id));
        if let Some(invoice) = existing {
            debug!("🛒️ Order #{} already has invoice {}.", order.id, invoice.id);
            return Ok(CheckoutOutcome::Existing(invoice));
        }
        let base = order.base_capturable_transaction().ok_or(CheckoutError::OrderNotCapturable)?;
        let (price_cents, currency) = outstanding_amount(&order)?;
        let new_invoice = NewInvoice {
            currency,
            price_cents,
            order_id: Some(order.id),
            order_name: Some(order.name.clone()),
            gateway: base.gateway.clone(),
            tags: vec![tag, order.name.clone(), order.id.to_string()],
        };
        let invoice = self.db.create_invoice(new_invoice).await?;
        info!("🛒️ Created invoice {} for order #{}.", invoice.id, order.id);
        let fields = vec![
            OrderMetafield::new("ssg_checkout_url", self.checkout_url(checkout_token)),
            OrderMetafield::new("ssg_invoice_id", invoice.id.clone()),
        ];
        if let Err(e) = self.platform.set_order_metafields(order.id, fields).await {
            // the invoice exists and is discoverable by tag, so the stash is best-effort
            warn!("🛒️ Could not write gateway metafields to order #{}. {e}", order.id);
        }
        Ok(CheckoutOutcome::Created(invoice))
    }
}

impl<B, S> SettlementApi<B, S>
where
    B: InvoiceLedger + ExchangeRates + Payouts,
    S: CommercePlatform,
{
    /// Settle a verified refund notification into a claimable payout.
    ///
    /// Fails closed: any rejection after the invoice has been identified is also recorded on the invoice, and no
    /// partial refund state survives an abort; the payout and the refund record are written in one transaction.
    pub async fn settle_refund(&self, refund: &RefundNotification) -> Result<RefundRecord, RefundError> {
        let total_cents = refund.total_refund_cents();
        if total_cents <= 0 {
            debug!("💸️ Refund notification for order #{} totals zero. Rejecting.", refund.order_id);
            return Err(RefundError::NothingToRefund);
        }
        let order_id = refund.order_id;
        let key = order_id.to_string();
        let _guard = self.locks.lock_with_timeout(&key, self.config.lock_timeout).await?;
        let order = self.platform.fetch_order(order_id).await?.ok_or(RefundError::OrderNotFound(order_id))?;
        let tag = order_tag(order_id);
        let invoice = self
            .db
            .search_invoices_by_tag(&tag)
            .await?
            .into_iter()
            .find(|i| i.order_id == Some(order_id))
            .ok_or(RefundError::OrderNotLinked(order_id))?;
        if let Some(record) = self.db.fetch_refund_for_invoice(&invoice.id).await? {
            self.reject(
                &invoice.id,
                format!("A refund was requested, but the invoice is already linked to payout {}.", record.payout_id),
            )
            .await?;
            return Err(RefundError::AlreadyRefunded(invoice.id));
        }
        if !invoice.can_accept_refund() {
            self.reject(
                &invoice.id,
                format!("A refund was requested, but the invoice is {} and cannot accept one.", invoice.status),
            )
            .await?;
            return Err(RefundError::InvoiceStateForbidsRefund(invoice.id.clone(), invoice.status));
        }
        let rate = match self.config.refund_mode {
            RefundMode::RateAtPaymentTime => invoice.settlement_rate,
            RefundMode::CurrentRate => self.db.fetch_rate(&invoice.currency).await?.bid,
        };
        let gross = rate * total_cents;
        if !gross.is_positive() {
            self.reject(&invoice.id, "The refund converts to a non-positive payout amount.".to_string()).await?;
            return Err(RefundError::AmountNotPositive);
        }
        let spread_bps = self.config.refund_spread_bps;
        let net = if spread_bps > 0 { apply_spread(gross, spread_bps) } else { gross };
        if !net.is_positive() {
            self.reject(
                &invoice.id,
                format!("The configured spread of {}% consumed the entire payout.", spread_bps / 100),
            )
            .await?;
            return Err(RefundError::SpreadExhausted { spread_bps });
        }
        let payout = NewPayout {
            currency: BTC_CURRENCY_CODE.to_string(),
            amount: net,
            payout_methods: vec!["BTC-CHAIN".to_string()],
            auto_approve_claims: true,
            description: format!("Refund {}", invoice.id),
        };
        let record = match self.db.create_payout_with_refund(&invoice.id, payout).await {
            Ok(record) => record,
            Err(PayoutError::RefundAlreadyExists(_)) => return Err(RefundError::AlreadyRefunded(invoice.id)),
            Err(e) => return Err(e.into()),
        };
        self.db
            .append_invoice_log(
                &invoice.id,
                LogEntry::info(format!("Refund of {} queued as payout {}.", net, record.payout_id)),
            )
            .await?;
        info!("💸️ Refund for order #{order_id} settled: invoice {} => payout {}.", invoice.id, record.payout_id);
        let event = RefundSettledEvent {
            order_id,
            invoice_id: invoice.id.clone(),
            payout_id: record.payout_id.clone(),
            claim_url: self.claim_url(&record.payout_id),
            recipient: order.customer_email().map(str::to_string),
        };
        for producer in &self.producers.refund_settled_producer {
            producer.publish_event(event.clone()).await;
        }
        Ok(record)
    }

    async fn reject(&self, invoice_id: &str, message: String) -> Result<(), LedgerError> {
        warn!("💸️ {message}");
        self.db.append_invoice_log(invoice_id, LogEntry::error(message)).await
    }
}

fn outstanding_amount(order: &ShopifyOrder) -> Result<(i64, String), CheckoutError> {
    match &order.total_outstanding_set {
        Some(set) => {
            let cents = shopify_tools::helpers::parse_shopify_price(&set.presentment_money.amount)
                .map_err(|e| CheckoutError::InvalidOrderAmount(e.to_string()))?;
            Ok((cents, set.presentment_money.currency.clone()))
        },
        None => {
            let cents = shopify_tools::helpers::parse_shopify_price(&order.total_price)
                .map_err(|e| CheckoutError::InvalidOrderAmount(e.to_string()))?;
            Ok((cents, order.currency.clone()))
        },
    }
}
