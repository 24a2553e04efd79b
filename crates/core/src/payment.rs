use crate::error::{PayError, PayResult};
use crate::processor::stripe::api::StripeApi;
use crate::processor::stripe::types::{PaymentIntentStatus, StripePaymentIntent};

/// Transient wrapper around a processor payment intent.
///
/// Exists only for the duration of a validation or confirmation call; the
/// status predicates reflect the value captured at construction.
#[derive(Debug, Clone)]
pub struct Payment {
    intent: StripePaymentIntent,
}

impl Payment {
    pub fn new(intent: StripePaymentIntent) -> Self {
        Payment { intent }
    }

    pub async fn from_id<A: StripeApi>(api: &A, id: &str) -> PayResult<Self> {
        let intent = api
            .retrieve_payment_intent(id)
            .await
            .map_err(PayError::processor)?;
        Ok(Payment::new(intent))
    }

    pub fn id(&self) -> &str {
        &self.intent.id
    }

    pub fn amount(&self) -> i64 {
        self.intent.amount
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.intent.client_secret.as_deref()
    }

    pub fn requires_payment_method(&self) -> bool {
        self.intent.status == PaymentIntentStatus::RequiresPaymentMethod
    }

    pub fn requires_action(&self) -> bool {
        self.intent.status == PaymentIntentStatus::RequiresAction
    }

    pub fn canceled(&self) -> bool {
        self.intent.status == PaymentIntentStatus::Canceled
    }

    pub fn succeeded(&self) -> bool {
        self.intent.status == PaymentIntentStatus::Succeeded
    }

    /// The single policy point turning a processor status into an error the
    /// application can branch on (re-collect a card, or drive a 3-D Secure
    /// confirmation).
    pub fn validate(&self) -> PayResult<()> {
        if self.requires_payment_method() {
            Err(PayError::InvalidPaymentMethod {
                payment_intent_id: self.intent.id.clone(),
                client_secret: self.intent.client_secret.clone(),
            })
        } else if self.requires_action() {
            Err(PayError::ActionRequired {
                payment_intent_id: self.intent.id.clone(),
                client_secret: self.intent.client_secret.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Ask the processor to confirm the intent, returning the updated state.
    pub async fn confirm<A: StripeApi>(&self, api: &A) -> PayResult<Payment> {
        let intent = api
            .confirm_payment_intent(&self.intent.id)
            .await
            .map_err(PayError::processor)?;
        Ok(Payment::new(intent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(status: PaymentIntentStatus) -> Payment {
        Payment::new(StripePaymentIntent {
            id: "pi_123".to_string(),
            amount: 2900,
            client_secret: Some("pi_123_secret".to_string()),
            status,
        })
    }

    #[test]
    fn validate_raises_invalid_payment_method() {
        let err = payment(PaymentIntentStatus::RequiresPaymentMethod)
            .validate()
            .unwrap_err();
        match err {
            PayError::InvalidPaymentMethod {
                payment_intent_id,
                client_secret,
            } => {
                assert_eq!(payment_intent_id, "pi_123");
                assert_eq!(client_secret.as_deref(), Some("pi_123_secret"));
            }
            other => panic!("expected InvalidPaymentMethod, got {other:?}"),
        }
    }

    #[test]
    fn validate_raises_action_required() {
        let err = payment(PaymentIntentStatus::RequiresAction)
            .validate()
            .unwrap_err();
        assert!(matches!(err, PayError::ActionRequired { .. }));
    }

    #[test]
    fn validate_passes_other_statuses() {
        for status in [
            PaymentIntentStatus::Succeeded,
            PaymentIntentStatus::Processing,
            PaymentIntentStatus::Canceled,
            PaymentIntentStatus::RequiresConfirmation,
        ] {
            assert!(payment(status).validate().is_ok());
        }
    }

    #[test]
    fn predicates_reflect_captured_status() {
        assert!(payment(PaymentIntentStatus::Succeeded).succeeded());
        assert!(payment(PaymentIntentStatus::Canceled).canceled());
        assert!(!payment(PaymentIntentStatus::Succeeded).requires_action());
    }

    #[tokio::test]
    async fn confirm_returns_the_updated_intent_state() {
        use crate::processor::stripe::testing::FakeStripe;

        let api = FakeStripe::default().with_intent_status(PaymentIntentStatus::RequiresConfirmation);
        let pending = Payment::from_id(&api, "pi_123").await.unwrap();
        assert!(!pending.succeeded());

        let confirmed = pending.confirm(&api).await.unwrap();
        assert_eq!(confirmed.id(), "pi_123");
        assert!(confirmed.succeeded());
        // The original wrapper still reflects the state it captured.
        assert!(!pending.succeeded());
    }
}
