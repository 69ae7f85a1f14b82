pub mod notify;

use futures::future::BoxFuture;
use log::*;
use settlement_engine::{
    events::{EventHandlers, EventHooks},
    SettlementApi,
    SqliteDatabase,
};
use shopify_tools::ShopifyApi;

pub const EVENT_BUFFER_SIZE: usize = 25;

/// Wire the engine's event hooks.
///
/// 1. `InvoiceLifecycleEvent`: delivered by the `/invoice/event` route, consumed here by running the
///    reconciliation flow for the affected order. Failures are logged and dropped; reconciliation is best-effort
///    and will run again on the next qualifying event.
/// 2. `RefundSettledEvent`: forwarded to the configured notification sink (or just logged) so the buyer gets
///    their claim link.
pub fn create_event_handlers(
    api: SettlementApi<SqliteDatabase, ShopifyApi>,
    notify_url: Option<String>,
) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_invoice_event(move |ev| {
        let api = api.clone();
        Box::pin(async move {
            let invoice_id = ev.invoice.id.clone();
            match api.reconcile_order(&ev.invoice).await {
                Ok(logs) if logs.is_empty() => {
                    debug!("🔄️ Invoice {invoice_id} ({}) required no order action.", ev.transition)
                },
                Ok(logs) => {
                    for entry in logs {
                        debug!("🔄️ Invoice {invoice_id}: {entry}");
                    }
                },
                Err(e) => error!("🔄️ Reconciliation for invoice {invoice_id} failed. {e}"),
            }
        }) as BoxFuture<'static, ()>
    });
    hooks.on_refund_settled(notify::refund_settled_hook(notify_url));
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}

/// Handlers with no hooks attached, for paths that only need producers (tests, tools).
pub fn no_op_handlers() -> EventHandlers {
    EventHandlers::new(EVENT_BUFFER_SIZE, EventHooks::default())
}
