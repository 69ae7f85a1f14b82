use serde::{Deserialize, Serialize};

use crate::helpers::cents_from_price;

/// The body of a `refunds/create` webhook, reduced to the fields that size the refund. Everything else in the
/// payload (line item details, restock instructions) is merchandising data the gateway does not need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundNotification {
    pub order_id: i64,
    #[serde(default)]
    pub refund_line_items: Vec<RefundLineItem>,
    #[serde(default)]
    pub order_adjustments: Vec<OrderAdjustment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundLineItem {
    #[serde(deserialize_with = "cents_from_price")]
    pub subtotal: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAdjustment {
    pub refund_id: Option<i64>,
    #[serde(deserialize_with = "cents_from_price")]
    pub amount: i64,
}

impl RefundNotification {
    /// Total refunded amount in cents: line-item subtotals plus any order-level adjustments tied to a refund.
    /// The platform reports adjustments as negative amounts, so everything is summed in absolute value.
    pub fn total_refund_cents(&self) -> i64 {
        let line_items: i64 = self.refund_line_items.iter().map(|li| li.subtotal.abs()).sum();
        let adjustments: i64 =
            self.order_adjustments.iter().filter(|a| a.refund_id.is_some()).map(|a| a.amount.abs()).sum();
        line_items + adjustments
    }
}
