use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use settlement_engine::{CheckoutError, LockError, RefundError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request timed out waiting for the order to become available.")]
    OrderBusy,
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::OrderBusy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// The HTTP status a refund rejection maps to. Domain preconditions are the caller's problem (400/404); lock
/// timeouts and platform failures are transient, so they get statuses the storefront's retry policy will redeliver
/// on.
pub fn refund_error_status(e: &RefundError) -> StatusCode {
    match e {
        RefundError::NothingToRefund => StatusCode::BAD_REQUEST,
        RefundError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        RefundError::OrderNotLinked(_) => StatusCode::BAD_REQUEST,
        RefundError::AlreadyRefunded(_) => StatusCode::BAD_REQUEST,
        RefundError::InvoiceStateForbidsRefund(_, _) => StatusCode::BAD_REQUEST,
        RefundError::AmountNotPositive => StatusCode::BAD_REQUEST,
        RefundError::SpreadExhausted { .. } => StatusCode::BAD_REQUEST,
        RefundError::RateUnavailable(_) => StatusCode::BAD_REQUEST,
        RefundError::Lock(LockError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
        RefundError::Lock(LockError::TimedOut(_)) => StatusCode::SERVICE_UNAVAILABLE,
        RefundError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RefundError::Platform(_) => StatusCode::BAD_GATEWAY,
        RefundError::Payout(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn checkout_error_status(e: &CheckoutError) -> StatusCode {
    match e {
        CheckoutError::InvalidCheckoutToken => StatusCode::BAD_REQUEST,
        CheckoutError::GatewayMismatch => StatusCode::NOT_FOUND,
        CheckoutError::OrderNotCapturable => StatusCode::BAD_REQUEST,
        CheckoutError::InvalidOrderAmount(_) => StatusCode::BAD_REQUEST,
        CheckoutError::Lock(_) => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CheckoutError::Platform(_) => StatusCode::BAD_GATEWAY,
    }
}
