use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ShopifyTransaction, TransactionKind, TransactionStatus};

/// An order as the commerce platform reports it, together with its transaction history. The platform owns this
/// record; the gateway reads it fresh at the start of every critical section and never caches it across them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShopifyOrder {
    pub id: i64,
    pub name: String,
    pub checkout_token: Option<String>,
    pub currency: String,
    pub presentment_currency: String,
    pub created_at: String,
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_gateway_names: Vec<String>,
    pub total_price: String,
    pub total_outstanding_set: Option<MoneySet>,
    pub customer: Option<Customer>,
    pub status_page_url: Option<String>,
    #[serde(default)]
    pub transactions: Vec<ShopifyTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MoneySet {
    pub presentment_money: MoneyBag,
    pub shop_money: MoneyBag,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MoneyBag {
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Customer {
    pub id: i64,
    pub email: Option<String>,
}

/// A key/value pair written back onto the order under the `custom` namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderMetafield {
    pub key: String,
    pub value: String,
}

impl OrderMetafield {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

impl ShopifyOrder {
    /// The transaction a settlement would capture against: the most recent sale that is still awaiting manual
    /// capture. `None` means the order is not awaiting settlement.
    pub fn base_capturable_transaction(&self) -> Option<&ShopifyTransaction> {
        self.transactions.iter().rev().find(|t| t.kind == TransactionKind::Sale && t.manually_capturable)
    }

    pub fn successful_captures(&self) -> usize {
        self.transactions.iter().filter(|t| t.is_successful(TransactionKind::Capture)).count()
    }

    pub fn successful_refunds(&self) -> usize {
        self.transactions.iter().filter(|t| t.is_successful(TransactionKind::Refund)).count()
    }

    /// True while a prior capture is still "active", i.e. there is captured money a refund could return.
    pub fn can_refund(&self) -> bool {
        let captures = self.successful_captures();
        captures > 0 && captures > self.successful_refunds()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    /// Whether any of the gateways that touched this order match the given keyword.
    pub fn paid_through_gateway(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.payment_gateway_names.iter().any(|g| g.to_lowercase().contains(&keyword))
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer.as_ref().and_then(|c| c.email.as_deref())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tx(id: i64, kind: TransactionKind, status: TransactionStatus, capturable: bool) -> ShopifyTransaction {
        ShopifyTransaction {
            id,
            order_id: 1,
            kind,
            status,
            amount: "10.00".to_string(),
            currency: "USD".to_string(),
            gateway: Some("settlement-gateway".to_string()),
            parent_id: None,
            manually_capturable: capturable,
            created_at: None,
            message: None,
            error_code: None,
        }
    }

    #[test]
    fn base_transaction_is_most_recent_capturable_sale() {
        let order = ShopifyOrder {
            transactions: vec![
                tx(1, TransactionKind::Sale, TransactionStatus::Success, true),
                tx(2, TransactionKind::Capture, TransactionStatus::Success, false),
                tx(3, TransactionKind::Sale, TransactionStatus::Success, true),
            ],
            ..Default::default()
        };
        assert_eq!(order.base_capturable_transaction().unwrap().id, 3);
    }

    #[test]
    fn no_base_transaction_without_capturable_flag() {
        let order = ShopifyOrder {
            transactions: vec![tx(1, TransactionKind::Sale, TransactionStatus::Success, false)],
            ..Default::default()
        };
        assert!(order.base_capturable_transaction().is_none());
    }

    #[test]
    fn refund_aggregate() {
        let mut order = ShopifyOrder {
            transactions: vec![
                tx(1, TransactionKind::Sale, TransactionStatus::Success, true),
                tx(2, TransactionKind::Capture, TransactionStatus::Success, false),
            ],
            ..Default::default()
        };
        assert!(order.can_refund());
        order.transactions.push(tx(3, TransactionKind::Refund, TransactionStatus::Success, false));
        assert!(!order.can_refund());
        // failed refunds don't count
        order.transactions.pop();
        order.transactions.push(tx(4, TransactionKind::Refund, TransactionStatus::Failure, false));
        assert!(order.can_refund());
    }

    #[test]
    fn gateway_keyword() {
        let order = ShopifyOrder {
            payment_gateway_names: vec!["Settlement-Gateway (BTC)".to_string()],
            ..Default::default()
        };
        assert!(order.paid_through_gateway("settlement-gateway"));
        assert!(!order.paid_through_gateway("shopify_payments"));
    }
}
