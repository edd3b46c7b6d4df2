use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Illegal state: cannot {action} {entity} in state {from}")]
    IllegalState {
        entity: String,
        from: String,
        action: String,
    },

    #[error("Validation error on {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("Downtime period intersects with another period with ID: {}", .conflicting.join(", "))]
    DowntimeOverlap { conflicting: Vec<String> },

    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error("Invoice not found: {id}")]
    InvoiceNotFound { id: String },

    #[error("Line item not found: {id}")]
    LineItemNotFound { id: String },

    #[error("Resource not found: {reference}")]
    ResourceNotFound { reference: String },

    #[error("Invoice already exists for customer {customer} in period {period}")]
    DuplicateInvoice { customer: String, period: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BillingError {
    pub fn precondition(message: impl Into<String>) -> Self {
        BillingError::Precondition {
            message: message.into(),
        }
    }

    /// Errors the caller must not persist through: bounds, future dates, overlaps.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BillingError::ValidationError { .. } | BillingError::DowntimeOverlap { .. }
        )
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, BillingError::IllegalState { .. })
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, BillingError::Precondition { .. })
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
