//! Request handler definitions.
//!
//! Handlers are generic over the engine's backend traits so the endpoint tests can drive them with mocks; the
//! server module registers them with the concrete sqlite + Shopify types. Keep anything longer than a few lines
//! out of here; the engine owns the logic, the handlers own the status codes.

use actix_web::{get, http::header, web, HttpRequest, HttpResponse, Responder};
use log::*;
use settlement_engine::{
    events::{EventProducers, InvoiceLifecycleEvent},
    traits::{CommercePlatform, ExchangeRates, InvoiceLedger, Payouts},
    CheckoutOutcome,
    SettlementApi,
};
use shopify_tools::RefundNotification;

use crate::{
    data_objects::{CheckoutParams, InvoiceEventNotification, JsonResponse},
    errors::{checkout_error_status, refund_error_status},
};

/// The webhook topic this gateway subscribes to. Anything else on the refund endpoint is a routing mistake.
const REFUND_TOPIC: &str = "refunds/create";

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(JsonResponse::success("👍️"))
}

/// POST /shopify/webhook/refund
///
/// Runs behind [`crate::middleware::HmacMiddlewareFactory`], so the body's provenance is already established;
/// what remains is the topic check, payload parsing, and mapping the engine's verdict to a status code.
pub async fn shopify_refund_webhook<B, S>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<SettlementApi<B, S>>,
) -> HttpResponse
where
    B: InvoiceLedger + ExchangeRates + Payouts,
    S: CommercePlatform,
{
    let topic = req.headers().get("X-Shopify-Topic").and_then(|v| v.to_str().ok());
    if topic != Some(REFUND_TOPIC) {
        warn!("💸️ Webhook delivery with unexpected topic {topic:?} on the refund endpoint.");
        return HttpResponse::BadRequest().json(JsonResponse::failure("Unexpected webhook topic."));
    }
    let refund = match serde_json::from_slice::<RefundNotification>(&body) {
        Ok(refund) => refund,
        Err(e) => {
            warn!("💸️ Could not parse refund webhook payload. {e}");
            return HttpResponse::BadRequest().json(JsonResponse::failure("Malformed refund payload."));
        },
    };
    match api.settle_refund(&refund).await {
        Ok(record) => {
            info!("💸️ Refund for order #{} settled as payout {}.", refund.order_id, record.payout_id);
            HttpResponse::Ok().json(JsonResponse::success(format!("Refund settled as payout {}.", record.payout_id)))
        },
        Err(e) => {
            warn!("💸️ Refund for order #{} rejected. {e}", refund.order_id);
            HttpResponse::build(refund_error_status(&e)).json(JsonResponse::failure(e))
        },
    }
}

/// GET /shopify/checkout?checkout_token=..&redirect=true
///
/// Lands the buyer on exactly one invoice for their order, no matter how many tabs they opened.
pub async fn checkout<B, S>(
    params: web::Query<CheckoutParams>,
    api: web::Data<SettlementApi<B, S>>,
) -> HttpResponse
where
    B: InvoiceLedger,
    S: CommercePlatform,
{
    let Some(token) = params.checkout_token.as_deref().filter(|t| !t.is_empty()) else {
        return HttpResponse::BadRequest().json(JsonResponse::failure("Invalid checkout token."));
    };
    let cancel = tokio_util::sync::CancellationToken::new();
    match api.checkout_invoice(token, &cancel).await {
        Ok(outcome) => {
            let invoice = outcome.invoice();
            if let CheckoutOutcome::Created(_) = &outcome {
                debug!("🛒️ Checkout token resolved to freshly created invoice {}.", invoice.id);
            }
            if params.redirect {
                let location = format!("{}/invoice/{}", api.config().public_base_url, invoice.id);
                HttpResponse::SeeOther().insert_header((header::LOCATION, location)).finish()
            } else {
                HttpResponse::Ok().json(JsonResponse::success(format!("Invoice {} is ready.", invoice.id)))
            }
        },
        Err(e) => {
            info!("🛒️ Checkout rejected. {e}");
            HttpResponse::build(checkout_error_status(&e)).json(JsonResponse::failure(e))
        },
    }
}

/// POST /invoice/event
///
/// Entry point for invoice lifecycle notifications. The invoice is re-read from the ledger and the event is
/// published into the engine's channel; reconciliation itself happens in the subscribed handler, so this endpoint
/// answers as soon as the event is enqueued.
pub async fn invoice_event<B, S>(
    body: web::Json<InvoiceEventNotification>,
    api: web::Data<SettlementApi<B, S>>,
    producers: web::Data<EventProducers>,
) -> HttpResponse
where
    B: InvoiceLedger,
    S: CommercePlatform,
{
    let notification = body.into_inner();
    let invoice = match api.db().fetch_invoice(&notification.invoice_id).await {
        Ok(Some(invoice)) => invoice,
        Ok(None) => {
            warn!("🔄️ Lifecycle event for unknown invoice {}.", notification.invoice_id);
            return HttpResponse::NotFound().json(JsonResponse::failure("No such invoice."));
        },
        Err(e) => {
            error!("🔄️ Could not load invoice {} for lifecycle event. {e}", notification.invoice_id);
            return HttpResponse::InternalServerError().json(JsonResponse::failure("Could not load the invoice."));
        },
    };
    debug!("🔄️ Invoice {} transitioned to {}.", invoice.id, notification.transition);
    let event = InvoiceLifecycleEvent::new(invoice, notification.transition);
    for producer in &producers.invoice_event_producer {
        producer.publish_event(event.clone()).await;
    }
    HttpResponse::Ok().json(JsonResponse::success("Event accepted."))
}
