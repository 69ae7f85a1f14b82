use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::info;
use settlement_engine::{events::EventProducers, OrderLocks, SettlementApi, SqliteDatabase};
use shopify_tools::ShopifyApi;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::create_event_handlers,
    middleware::HmacMiddlewareFactory,
    routes,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let shopify_api =
        ShopifyApi::new(config.shopify.api.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;

    // One lock registry serializes every path that can touch an order: the reconciliation hook, the checkout
    // route and the refund webhook all share it.
    let locks = OrderLocks::new();
    let settlement_config = config.settlement_config();
    let hook_api =
        SettlementApi::new(db.clone(), shopify_api.clone(), EventProducers::default(), settlement_config.clone())
            .with_locks(locks.clone());
    let handlers = create_event_handlers(hook_api, config.refund_notify_url.clone());
    let producers = handlers.producers();
    let api = SettlementApi::new(db, shopify_api, producers.clone(), settlement_config).with_locks(locks);
    handlers.start_handlers().await;
    info!("📬️ Event handlers are running");

    let srv = create_server_instance(config, api, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    api: SettlementApi<SqliteDatabase, ShopifyApi>,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let hmac_middleware = HmacMiddlewareFactory::new(
            "X-Shopify-Hmac-SHA256",
            config.shopify.webhook_secret.clone(),
            config.shopify.hmac_checks,
        );
        let shopify_scope = web::scope("/shopify")
            .service(
                web::resource("/webhook/refund")
                    .wrap(hmac_middleware)
                    .route(web::post().to(routes::shopify_refund_webhook::<SqliteDatabase, ShopifyApi>)),
            )
            .service(
                web::resource("/checkout").route(web::get().to(routes::checkout::<SqliteDatabase, ShopifyApi>)),
            );
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ssg::access_log"))
            .app_data(web::Data::new(api.clone()))
            .app_data(web::Data::new(producers.clone()))
            .service(routes::health)
            .service(shopify_scope)
            .service(
                web::resource("/invoice/event")
                    .route(web::post().to(routes::invoice_event::<SqliteDatabase, ShopifyApi>)),
            )
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
