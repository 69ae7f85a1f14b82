use serde::{Deserialize, Serialize};

/// One entry in an order's append-only transaction history. The gateway never edits these; it only appends new ones
/// indirectly through capture and cancel calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopifyTransaction {
    pub id: i64,
    pub order_id: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: String,
    pub currency: String,
    pub gateway: Option<String>,
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub manually_capturable: bool,
    pub created_at: Option<String>,
    pub message: Option<String>,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Authorization,
    Sale,
    Capture,
    Void,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failure,
    Error,
}

impl ShopifyTransaction {
    pub fn is_successful(&self, kind: TransactionKind) -> bool {
        self.kind == kind && self.status == TransactionStatus::Success
    }
}

/// Options for the order cancellation call. `refund` asks the platform to refund any prior successful capture as
/// part of the cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    pub notify_customer: bool,
    pub restock: bool,
    pub refund: bool,
    pub reason: CancelReason,
    pub staff_note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelReason {
    Customer,
    Declined,
    Fraud,
    Inventory,
    Other,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transaction_deserialization() {
        let json = r#"{
            "id": 6674280546516,
            "order_id": 7304009351501,
            "kind": "sale",
            "status": "success",
            "amount": "6.00",
            "currency": "USD",
            "gateway": "settlement-gateway",
            "parent_id": null,
            "manually_capturable": true,
            "created_at": "2024-05-14T10:11:12-04:00",
            "message": "Pending the payment gateway",
            "error_code": null
        }"#;
        let tx: ShopifyTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.id, 6674280546516);
        assert_eq!(tx.kind, TransactionKind::Sale);
        assert_eq!(tx.status, TransactionStatus::Success);
        assert!(tx.manually_capturable);
        assert!(tx.is_successful(TransactionKind::Sale));
        assert!(!tx.is_successful(TransactionKind::Capture));
    }

    #[test]
    fn cancel_request_wire_format() {
        let req = CancelOrderRequest {
            notify_customer: false,
            restock: true,
            refund: true,
            reason: CancelReason::Declined,
            staff_note: Some("Invoice inv-1 expired or invalid".to_string()),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["reason"], "declined");
        assert_eq!(v["restock"], true);
        assert_eq!(v["refund"], true);
    }
}
