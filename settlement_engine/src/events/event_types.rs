use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::Invoice;

/// A state transition reported by the invoice side of the gateway. The host delivers these into the engine through
/// an explicit channel; the engine holds no ambient subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleTransition {
    Confirmed,
    Settled,
    Invalid,
    Expired,
    FailedToConfirm,
}

impl Display for LifecycleTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleTransition::Confirmed => "confirmed",
            LifecycleTransition::Settled => "settled",
            LifecycleTransition::Invalid => "invalid",
            LifecycleTransition::Expired => "expired",
            LifecycleTransition::FailedToConfirm => "failed_to_confirm",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLifecycleEvent {
    pub invoice: Invoice,
    pub transition: LifecycleTransition,
}

impl InvoiceLifecycleEvent {
    pub fn new(invoice: Invoice, transition: LifecycleTransition) -> Self {
        Self { invoice, transition }
    }
}

/// Emitted after a refund has been settled into a payout. Carries everything the notification collaborator needs
/// to tell the buyer where to claim their funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundSettledEvent {
    pub order_id: i64,
    pub invoice_id: String,
    pub payout_id: String,
    pub claim_url: String,
    pub recipient: Option<String>,
}
