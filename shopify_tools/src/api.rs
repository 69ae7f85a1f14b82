use std::sync::Arc;

use graphql_parser::parse_query;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::ShopifyConfig,
    helpers::price_string_from_cents,
    CancelOrderRequest,
    OrderMetafield,
    ShopifyApiError,
    ShopifyOrder,
    ShopifyTransaction,
};

#[derive(Clone)]
pub struct ShopifyApi {
    config: ShopifyConfig,
    client: Arc<Client>,
}

impl ShopifyApi {
    pub fn new(config: ShopifyConfig) -> Result<Self, ShopifyApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.admin_access_token.reveal().as_str())
            .map_err(|e| ShopifyApiError::Initialization(e.to_string()))?;
        headers.insert("X-Shopify-Access-Token", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ShopifyApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, ShopifyApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| ShopifyApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| ShopifyApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ShopifyApiError::RestResponseError(e.to_string()))?;
            Err(ShopifyApiError::QueryError { status, message })
        }
    }

    pub async fn graphql_query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<T, ShopifyApiError> {
        let query = parse_query::<String>(query).map_err(|e| ShopifyApiError::InvalidGraphQL(e.to_string()))?;
        let mut body = serde_json::json!({
            "query": query.to_string(),
        });
        if let Some(vars) = variables {
            body["variables"] = vars;
        }
        trace!("Sending GraphQL query: {body}");
        let result = self.rest_query::<Value, Value>(Method::POST, "/graphql.json", &[], Some(body)).await?;
        if let Some(errors) = result["errors"].as_array() {
            let e = errors.iter().map(|e| e.to_string()).collect::<Vec<String>>().join(", ");
            return Err(ShopifyApiError::GraphQLError(e));
        }
        let data = result["data"].clone();
        if data.is_null() {
            return Err(ShopifyApiError::EmptyResponse);
        }
        let result = serde_json::from_value(data).map_err(|e| ShopifyApiError::JsonError(e.to_string()))?;
        Ok(result)
    }

    pub fn url(&self, path: &str) -> String {
        format!("https://{}/admin/api/{}{path}", self.config.shop, self.config.api_version)
    }

    /// Fetch an order by id, with its transaction history attached. `Ok(None)` means the platform does not know
    /// the order (a legitimate state, not an error).
    pub async fn get_order(&self, order_id: i64) -> Result<Option<ShopifyOrder>, ShopifyApiError> {
        #[derive(Deserialize)]
        struct OrderResponse {
            order: ShopifyOrder,
        }
        let path = format!("/orders/{order_id}.json");
        debug!("Fetching order #{order_id}");
        let result = match self.rest_query::<OrderResponse, ()>(Method::GET, &path, &[], None).await {
            Ok(r) => r,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut order = result.order;
        order.transactions = self.get_transactions(order_id).await?;
        info!("Fetched order #{order_id} with {} transactions", order.transactions.len());
        Ok(Some(order))
    }

    /// Look an order up by the checkout token the storefront handed to the buyer.
    pub async fn get_order_by_checkout_token(&self, token: &str) -> Result<Option<ShopifyOrder>, ShopifyApiError> {
        #[derive(Deserialize)]
        struct OrdersResponse {
            orders: Vec<ShopifyOrder>,
        }
        debug!("Looking up order by checkout token");
        let result = self
            .rest_query::<OrdersResponse, ()>(
                Method::GET,
                "/orders.json",
                &[("checkout_token", token), ("status", "any")],
                None,
            )
            .await?;
        let Some(mut order) = result.orders.into_iter().next() else {
            return Ok(None);
        };
        order.transactions = self.get_transactions(order.id).await?;
        info!("Checkout token resolved to order #{}", order.id);
        Ok(Some(order))
    }

    pub async fn get_transactions(&self, order_id: i64) -> Result<Vec<ShopifyTransaction>, ShopifyApiError> {
        #[derive(Deserialize)]
        struct TransactionsResponse {
            transactions: Vec<ShopifyTransaction>,
        }
        let path = format!("/orders/{order_id}/transactions.json");
        let result = self.rest_query::<TransactionsResponse, ()>(Method::GET, &path, &[], None).await?;
        Ok(result.transactions)
    }

    /// Capture a previously authorized sale transaction. The amount is given in cents of `currency`.
    pub async fn capture_transaction(
        &self,
        order_id: i64,
        parent_transaction_id: i64,
        amount_cents: i64,
        currency: &str,
    ) -> Result<ShopifyTransaction, ShopifyApiError> {
        #[derive(Deserialize)]
        struct TransactionResponse {
            transaction: ShopifyTransaction,
        }
        let path = format!("/orders/{order_id}/transactions.json");
        let body = serde_json::json!({
            "transaction": {
                "parent_id": parent_transaction_id,
                "amount": price_string_from_cents(amount_cents),
                "kind": "capture",
                "currency": currency,
            },
        });
        debug!("Capturing {} {currency} against order #{order_id}", price_string_from_cents(amount_cents));
        let result = self.rest_query::<TransactionResponse, Value>(Method::POST, &path, &[], Some(body)).await?;
        info!("Captured order #{order_id}. New transaction: {}", result.transaction.id);
        Ok(result.transaction)
    }

    pub async fn cancel_order(
        &self,
        order_id: i64,
        request: &CancelOrderRequest,
    ) -> Result<ShopifyOrder, ShopifyApiError> {
        #[derive(Deserialize)]
        struct OrderResponse {
            order: ShopifyOrder,
        }
        let path = format!("/orders/{order_id}/cancel.json");
        debug!("Cancelling order #{order_id} (refund: {})", request.refund);
        let result =
            self.rest_query::<OrderResponse, &CancelOrderRequest>(Method::POST, &path, &[], Some(request)).await?;
        info!("Cancelled order #{order_id}");
        Ok(result.order)
    }

    /// Stash gateway cross-references (checkout URL, invoice id) on the order, under the `custom` namespace.
    pub async fn update_order_metafields(
        &self,
        order_id: i64,
        fields: &[OrderMetafield],
    ) -> Result<(), ShopifyApiError> {
        let mutation = r#"
        mutation SetOrderMetafields($metafields: [MetafieldsSetInput!]!) {
          metafieldsSet(metafields: $metafields) {
            metafields { id key }
            userErrors { field message code }
          }
        }"#;
        let owner_id = format!("gid://shopify/Order/{order_id}");
        let metafields = fields
            .iter()
            .map(|f| {
                serde_json::json!({
                    "ownerId": owner_id,
                    "namespace": "custom",
                    "key": f.key,
                    "type": "single_line_text_field",
                    "value": f.value,
                })
            })
            .collect::<Vec<Value>>();
        let variables = serde_json::json!({ "metafields": metafields });
        debug!("Updating metafields on order #{order_id}: {variables}");
        let response = self.graphql_query::<Value>(mutation, Some(variables)).await?;
        if let Some(errors) = response["metafieldsSet"]["userErrors"].as_array() {
            if !errors.is_empty() {
                let e = errors.iter().map(|e| e.to_string()).collect::<Vec<String>>().join(", ");
                return Err(ShopifyApiError::GraphQLError(e));
            }
        }
        info!("Updated {} metafields on order #{order_id}", fields.len());
        Ok(())
    }
}
