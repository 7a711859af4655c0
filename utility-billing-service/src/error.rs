//! Domain error taxonomy for payment reconciliation and ticket workflow.

use axum::http::StatusCode;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::Retryable;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Ticket status cannot change from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Customer details do not match our records")]
    Verification,

    #[error("Bill {0} not found")]
    BillNotFound(i64),

    #[error("Payment {0} not found")]
    PaymentNotFound(i64),

    #[error("Ticket {0} not found")]
    TicketNotFound(String),

    #[error("Full payment amount {amount} must match the bill total {total}")]
    AmountMismatch { amount: Decimal, total: Decimal },

    #[error("Partial payment amount {amount} must be less than the bill total {total}")]
    AmountTooHigh { amount: Decimal, total: Decimal },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store call '{operation}' failed: {message}")]
    Gateway {
        operation: String,
        message: String,
        transient: bool,
    },
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// A store failure that will not go away on retry (4xx, malformed body).
    pub fn gateway(operation: &str, message: impl Into<String>) -> Self {
        Self::Gateway {
            operation: operation.to_string(),
            message: message.into(),
            transient: false,
        }
    }

    /// A store failure worth retrying for idempotent reads (timeouts, 5xx).
    pub fn gateway_transient(operation: &str, message: impl Into<String>) -> Self {
        Self::Gateway {
            operation: operation.to_string(),
            message: message.into(),
            transient: true,
        }
    }

    /// Stable taxonomy name used in logs, metrics and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidTransition { .. } => "ValidationError",
            Self::Verification => "VerificationError",
            Self::BillNotFound(_) | Self::PaymentNotFound(_) | Self::TicketNotFound(_) => {
                "NotFoundError"
            }
            Self::AmountMismatch { .. } => "AmountMismatchError",
            Self::AmountTooHigh { .. } => "AmountTooHighError",
            Self::Conflict(_) => "ConflictError",
            Self::Storage(_) => "StorageError",
            Self::Gateway { .. } => "GatewayError",
        }
    }
}

impl Retryable for BillingError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway { transient: true, .. })
    }
}

impl BillingError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidTransition { .. } | Self::Verification => {
                StatusCode::BAD_REQUEST
            }
            Self::BillNotFound(_) | Self::PaymentNotFound(_) | Self::TicketNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::AmountMismatch { .. } | Self::AmountTooHigh { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Gateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        AppError::Rejected {
            status: err.status(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
