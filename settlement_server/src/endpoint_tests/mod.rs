mod mocks;

use actix_web::{
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test,
    web,
    App,
};
use mocks::MockPlatform;
use settlement_engine::{
    db_types::{order_tag, ExceptionStatus, InvoiceStatus, NewInvoice},
    events::EventProducers,
    traits::InvoiceLedger,
    SettlementApi,
    SettlementConfig,
    SqliteDatabase,
};
use shopify_tools::{MoneyBag, MoneySet, ShopifyOrder, ShopifyTransaction, TransactionKind, TransactionStatus};
use ssg_common::{Sats, Secret};

use crate::{helpers::calculate_hmac, middleware::HmacMiddlewareFactory, routes};

const SECRET: &str = "0123456789abcdef";
const ORDER_ID: i64 = 7304009351501;

fn order_fixture() -> ShopifyOrder {
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
        transactions: vec![
            ShopifyTransaction {
                id: 7,
                order_id: ORDER_ID,
                kind: TransactionKind::Sale,
                status: TransactionStatus::Success,
                amount: "6.00".to_string(),
                currency: "USD".to_string(),
                gateway: Some("settlement-gateway".to_string()),
                parent_id: None,
                manually_capturable: true,
                created_at: None,
                message: None,
                error_code: None,
            },
            ShopifyTransaction {
                id: 8,
                order_id: ORDER_ID,
                kind: TransactionKind::Capture,
                status: TransactionStatus::Success,
                amount: "6.00".to_string(),
                currency: "USD".to_string(),
                gateway: Some("settlement-gateway".to_string()),
                parent_id: Some(7),
                manually_capturable: false,
                created_at: None,
                message: None,
                error_code: None,
            },
        ],
        ..Default::default()
    }
}

async fn settled_invoice(db: &SqliteDatabase) -> String {
    let invoice = db
        .create_invoice(NewInvoice {
            currency: "USD".to_string(),
            price_cents: 600,
            order_id: Some(ORDER_ID),
            order_name: Some("#1001".to_string()),
            gateway: Some("settlement-gateway".to_string()),
            tags: vec![order_tag(ORDER_ID)],
        })
        .await
        .unwrap();
    db.update_invoice_state(&invoice.id, InvoiceStatus::Settled, ExceptionStatus::None, 600, Sats::from(600), Sats::from(1))
        .await
        .unwrap();
    invoice.id
}

macro_rules! webhook_app {
    ($platform:expr) => {{
        let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.unwrap();
        let api = SettlementApi::new(db.clone(), $platform, EventProducers::default(), SettlementConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(api))
                .app_data(web::Data::new(EventProducers::default()))
                .service(
                    web::scope("/shopify")
                        .service(
                            web::resource("/webhook/refund")
                                .wrap(HmacMiddlewareFactory::new(
                                    "X-Shopify-Hmac-SHA256",
                                    Secret::new(SECRET.to_string()),
                                    true,
                                ))
                                .route(web::post().to(routes::shopify_refund_webhook::<SqliteDatabase, MockPlatform>)),
                        )
                        .service(
                            web::resource("/checkout")
                                .route(web::get().to(routes::checkout::<SqliteDatabase, MockPlatform>)),
                        ),
                ),
        )
        .await;
        (db, app)
    }};
}

/// Resolve a request to a status, whether the HMAC middleware rejected it with an `Err` or a handler answered
/// with a response.
async fn status_of<S, B>(app: &S, req: actix_http::Request) -> StatusCode
where S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error> {
    match app.call(req).await {
        Ok(resp) => resp.status(),
        Err(e) => e.as_response_error().status_code(),
    }
}

fn refund_body() -> Vec<u8> {
    format!(r#"{{ "order_id": {ORDER_ID}, "refund_line_items": [ {{ "subtotal": "6.00" }} ] }}"#).into_bytes()
}

#[actix_web::test]
async fn webhook_without_signature_is_unauthorized() {
    let (_db, app) = webhook_app!(MockPlatform::new());
    let req = test::TestRequest::post()
        .uri("/shopify/webhook/refund")
        .insert_header(("X-Shopify-Topic", "refunds/create"))
        .set_payload(refund_body())
        .to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn webhook_with_bad_signature_is_unauthorized() {
    let (_db, app) = webhook_app!(MockPlatform::new());
    let req = test::TestRequest::post()
        .uri("/shopify/webhook/refund")
        .insert_header(("X-Shopify-Topic", "refunds/create"))
        .insert_header(("X-Shopify-Hmac-SHA256", calculate_hmac("wrong-secret", &refund_body())))
        .set_payload(refund_body())
        .to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn webhook_with_wrong_topic_is_bad_request() {
    let (_db, app) = webhook_app!(MockPlatform::new());
    let body = refund_body();
    let req = test::TestRequest::post()
        .uri("/shopify/webhook/refund")
        .insert_header(("X-Shopify-Topic", "orders/create"))
        .insert_header(("X-Shopify-Hmac-SHA256", calculate_hmac(SECRET, &body)))
        .set_payload(body)
        .to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn webhook_with_valid_signature_settles_the_refund() {
    let mut platform = MockPlatform::new();
    let fixture = order_fixture();
    platform.expect_fetch_order().returning(move |_| Ok(Some(fixture.clone())));
    let (db, app) = webhook_app!(platform);
    let invoice_id = settled_invoice(&db).await;

    let body = refund_body();
    let req = test::TestRequest::post()
        .uri("/shopify/webhook/refund")
        .insert_header(("X-Shopify-Topic", "refunds/create"))
        .insert_header(("X-Shopify-Hmac-SHA256", calculate_hmac(SECRET, &body)))
        .set_payload(body)
        .to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::OK);

    use settlement_engine::traits::Payouts;
    let record = db.fetch_refund_for_invoice(&invoice_id).await.unwrap().expect("refund record created");
    assert!(db.fetch_payout(&record.payout_id).await.unwrap().is_some());
}

#[actix_web::test]
async fn webhook_for_unlinked_order_is_bad_request() {
    let mut platform = MockPlatform::new();
    let fixture = order_fixture();
    platform.expect_fetch_order().returning(move |_| Ok(Some(fixture.clone())));
    let (_db, app) = webhook_app!(platform);
    // no invoice in the ledger for this order
    let body = refund_body();
    let req = test::TestRequest::post()
        .uri("/shopify/webhook/refund")
        .insert_header(("X-Shopify-Topic", "refunds/create"))
        .insert_header(("X-Shopify-Hmac-SHA256", calculate_hmac(SECRET, &body)))
        .set_payload(body)
        .to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn checkout_without_token_is_bad_request() {
    let (_db, app) = webhook_app!(MockPlatform::new());
    let req = test::TestRequest::get().uri("/shopify/checkout").to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn checkout_redirects_to_the_invoice() {
    let mut platform = MockPlatform::new();
    let fixture = order_fixture();
    platform.expect_fetch_order_by_checkout_token().returning(move |_| Ok(Some(fixture.clone())));
    platform.expect_set_order_metafields().returning(|_, _| Ok(()));
    let (db, app) = webhook_app!(platform);
    let req = test::TestRequest::get().uri("/shopify/checkout?checkout_token=tok-abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let location = resp.headers().get("location").unwrap().to_str().unwrap().to_string();
    let invoices = db.search_invoices_by_tag(&order_tag(ORDER_ID)).await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert!(location.ends_with(&format!("/invoice/{}", invoices[0].id)));
}
