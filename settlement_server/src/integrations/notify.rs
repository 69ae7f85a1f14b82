//! Delivery of refund claim links.
//!
//! Actually getting a message in front of the buyer (mail, SMS, storefront notification) is another system's job.
//! This hook hands the claim link to a configurable HTTP sink and otherwise just logs it, so a missing sink never
//! blocks settlement.

use std::{future::Future, pin::Pin};

use log::*;
use settlement_engine::events::RefundSettledEvent;

pub fn refund_settled_hook(
    notify_url: Option<String>,
) -> impl Fn(RefundSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
    let client = reqwest::Client::new();
    move |ev| {
        let client = client.clone();
        let notify_url = notify_url.clone();
        Box::pin(async move {
            let Some(url) = notify_url else {
                info!(
                    "💌️ Refund for order #{} settled as payout {}. Claim link: {} (no notification sink is \
                     configured)",
                    ev.order_id, ev.payout_id, ev.claim_url
                );
                return;
            };
            let body = serde_json::json!({
                "order_id": ev.order_id,
                "invoice_id": ev.invoice_id,
                "payout_id": ev.payout_id,
                "claim_url": ev.claim_url,
                "recipient": ev.recipient,
            });
            match client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    info!("💌️ Refund notification for order #{} delivered to the sink.", ev.order_id)
                },
                Ok(response) => warn!(
                    "💌️ Notification sink answered {} for order #{}. The claim link is still valid: {}",
                    response.status(),
                    ev.order_id,
                    ev.claim_url
                ),
                Err(e) => error!(
                    "💌️ Could not reach the notification sink for order #{}. {e}. The claim link is still valid: {}",
                    ev.order_id, ev.claim_url
                ),
            }
        })
    }
}
