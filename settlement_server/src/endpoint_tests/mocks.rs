use mockall::mock;
use settlement_engine::traits::{CommercePlatform, PlatformError};
use shopify_tools::{CancelOrderRequest, OrderMetafield, ShopifyOrder, ShopifyTransaction};

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
