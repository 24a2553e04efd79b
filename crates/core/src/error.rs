use crate::db::DbError;

pub type PayResult<T> = Result<T, PayError>;

/// Error taxonomy surfaced to callers of the billing layer.
///
/// Vendor SDK/API failures never cross this boundary directly: each adapter
/// wraps them into `Processor`, keeping the original message and chaining the
/// vendor error as the source.
#[derive(Debug, thiserror::Error)]
pub enum PayError {
    /// A failure originating from the payment processor's API.
    #[error("{message}")]
    Processor {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The payment intent needs a new payment method before it can proceed.
    #[error("this payment attempt requires a valid payment method")]
    InvalidPaymentMethod {
        payment_intent_id: String,
        client_secret: Option<String>,
    },

    /// The payment intent needs additional customer authentication
    /// (for example a 3-D Secure confirmation).
    #[error("this payment attempt requires additional customer action")]
    ActionRequired {
        payment_intent_id: String,
        client_secret: Option<String>,
    },

    /// The billable has no payment processor assigned yet.
    #[error("billable has no payment processor configured")]
    ProcessorNotConfigured,

    /// No local record exists for the given processor id. Webhook handlers
    /// swallow this case; synchronous callers see it.
    #[error("no local {entity} found for {processor} id {processor_id}")]
    NotFound {
        entity: &'static str,
        processor: &'static str,
        processor_id: String,
    },

    /// A webhook payload for a known event type failed to parse.
    #[error("malformed webhook payload: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl PayError {
    /// Wrap a vendor API error, preserving its message and cause.
    pub fn processor<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PayError::Processor {
            message: source.to_string(),
            source: Box::new(source),
        }
    }
}
