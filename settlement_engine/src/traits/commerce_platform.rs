use shopify_tools::{CancelOrderRequest, OrderMetafield, ShopifyApi, ShopifyApiError, ShopifyOrder, ShopifyTransaction};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("Platform call failed: {0}")]
    CallFailed(String),
}

impl From<ShopifyApiError> for PlatformError {
    fn from(e: ShopifyApiError) -> Self {
        PlatformError::CallFailed(e.to_string())
    }
}

/// The storefront's order API, as the engine sees it. Implementations must return `Ok(None)` for orders the
/// platform does not know; an absent order is a legitimate state, not a failure.
#[allow(async_fn_in_trait)]
pub trait CommercePlatform {
    /// Fetch an order and its full transaction history.
    async fn fetch_order(&self, order_id: i64) -> Result<Option<ShopifyOrder>, PlatformError>;
    /// Resolve the order a buyer's checkout token refers to.
    async fn fetch_order_by_checkout_token(&self, token: &str) -> Result<Option<ShopifyOrder>, PlatformError>;
    /// Capture `amount_cents` of `currency` against a previously authorized sale transaction.
    async fn capture_transaction(
        &self,
        order_id: i64,
        parent_transaction_id: i64,
        amount_cents: i64,
        currency: &str,
    ) -> Result<ShopifyTransaction, PlatformError>;
    /// Cancel an order, optionally refunding a prior capture as part of the cancellation.
    async fn cancel_order(&self, order_id: i64, request: CancelOrderRequest) -> Result<ShopifyOrder, PlatformError>;
    /// Stash gateway cross-references on the order.
    async fn set_order_metafields(&self, order_id: i64, fields: Vec<OrderMetafield>) -> Result<(), PlatformError>;
}

impl CommercePlatform for ShopifyApi {
    async fn fetch_order(&self, order_id: i64) -> Result<Option<ShopifyOrder>, PlatformError> {
        Ok(self.get_order(order_id).await?)
    }

    async fn fetch_order_by_checkout_token(&self, token: &str) -> Result<Option<ShopifyOrder>, PlatformError> {
        Ok(self.get_order_by_checkout_token(token).await?)
    }

    async fn capture_transaction(
        &self,
        order_id: i64,
        parent_transaction_id: i64,
        amount_cents: i64,
        currency: &str,
    ) -> Result<ShopifyTransaction, PlatformError> {
        Ok(ShopifyApi::capture_transaction(self, order_id, parent_transaction_id, amount_cents, currency).await?)
    }

    async fn cancel_order(&self, order_id: i64, request: CancelOrderRequest) -> Result<ShopifyOrder, PlatformError> {
        Ok(ShopifyApi::cancel_order(self, order_id, &request).await?)
    }

    async fn set_order_metafields(&self, order_id: i64, fields: Vec<OrderMetafield>) -> Result<(), PlatformError> {
        Ok(self.update_order_metafields(order_id, &fields).await?)
    }
}
