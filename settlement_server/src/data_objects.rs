use std::fmt::Display;

use serde::{Deserialize, Serialize};
use settlement_engine::events::LifecycleTransition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// A lifecycle notification from the invoice-side host. The invoice is re-read from the ledger, so the
/// notification only needs to say *which* invoice moved and *where* to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceEventNotification {
    pub invoice_id: String,
    pub transition: LifecycleTransition,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutParams {
    pub checkout_token: Option<String>,
    #[serde(default = "default_redirect")]
    pub redirect: bool,
}

fn default_redirect() -> bool {
    true
}
