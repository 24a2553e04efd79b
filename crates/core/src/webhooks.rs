use paykit_types::{PayConfig, Processor};
use serde::Deserialize;

use crate::db::DbManager;
use crate::error::PayResult;
use crate::mailer::UserMailer;
use crate::processor::braintree::webhooks as braintree_webhooks;
use crate::processor::braintree::webhooks::BraintreeWebhook;
use crate::processor::stripe::StripeAdapter;
use crate::processor::stripe::api::StripeApi;
use crate::processor::stripe::webhooks as stripe_webhooks;
use crate::processor::stripe::webhooks::StripeWebhook;

/// Generic webhook envelope: an event type plus the nested object.
///
/// Signature verification and event parsing happen upstream; this layer
/// consumes already-parsed envelopes.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// Dispatches parsed webhook events to their handlers.
///
/// Unknown event types are no-ops. Handlers resolve local entities by
/// `(processor, processor_id)` and silently skip events for entities not
/// tracked locally; webhooks are delivered at least once, so every mutation
/// behind this router is idempotent. Only the Stripe card re-sync handlers
/// call back out to the processor, so the router borrows just that seam.
pub struct WebhookRouter<'a, S: StripeApi> {
    db: &'a DbManager,
    config: &'a PayConfig,
    mailer: &'a UserMailer,
    stripe: &'a S,
}

impl<'a, S: StripeApi> WebhookRouter<'a, S> {
    pub fn new(
        db: &'a DbManager,
        config: &'a PayConfig,
        mailer: &'a UserMailer,
        stripe: &'a S,
    ) -> Self {
        WebhookRouter {
            db,
            config,
            mailer,
            stripe,
        }
    }

    pub async fn handle(&self, processor: Processor, event: &WebhookEvent) -> PayResult<()> {
        match processor {
            Processor::Stripe => self.handle_stripe(event).await,
            Processor::Braintree => self.handle_braintree(event),
            Processor::None => Ok(()),
        }
    }

    pub async fn handle_stripe(&self, event: &WebhookEvent) -> PayResult<()> {
        let parsed = StripeWebhook::from_event(event)?;
        let mut conn = self.db.conn()?;
        match parsed {
            StripeWebhook::ChargeSucceeded(charge) => {
                stripe_webhooks::ChargeSucceeded.handle(&mut conn, self.mailer, &charge)
            }
            StripeWebhook::ChargeRefunded(charge) => {
                stripe_webhooks::ChargeRefunded.handle(&mut conn, self.mailer, &charge)
            }
            StripeWebhook::SubscriptionRenewing(invoice) => {
                stripe_webhooks::SubscriptionRenewing.handle(&mut conn, self.mailer, &invoice)
            }
            StripeWebhook::PaymentActionRequired(invoice) => {
                stripe_webhooks::PaymentActionRequired.handle(&mut conn, self.mailer, &invoice)
            }
            StripeWebhook::SubscriptionUpdated(subscription) => {
                stripe_webhooks::SubscriptionUpdated.handle(&mut conn, &subscription)
            }
            StripeWebhook::SubscriptionDeleted(subscription) => {
                stripe_webhooks::SubscriptionDeleted.handle(&mut conn, &subscription)
            }
            StripeWebhook::CustomerUpdated(customer) => {
                let adapter = StripeAdapter::new(self.stripe, self.config);
                stripe_webhooks::CustomerUpdated
                    .handle(&mut conn, &adapter, &customer.id)
                    .await
            }
            StripeWebhook::SourceUpdated(source) => match source.customer {
                Some(customer_id) => {
                    let adapter = StripeAdapter::new(self.stripe, self.config);
                    stripe_webhooks::CustomerUpdated
                        .handle(&mut conn, &adapter, &customer_id)
                        .await
                }
                None => Ok(()),
            },
            StripeWebhook::Ignored => Ok(()),
        }
    }

    pub fn handle_braintree(&self, event: &WebhookEvent) -> PayResult<()> {
        let parsed = BraintreeWebhook::from_event(event)?;
        let mut conn = self.db.conn()?;
        match parsed {
            BraintreeWebhook::SubscriptionChargedSuccessfully(subscription) => {
                braintree_webhooks::SubscriptionChargedSuccessfully.handle(
                    &mut conn,
                    self.mailer,
                    &subscription,
                )
            }
            BraintreeWebhook::SubscriptionCanceled(subscription) => {
                braintree_webhooks::SubscriptionCanceled.handle(&mut conn, &subscription)
            }
            BraintreeWebhook::Ignored => Ok(()),
        }
    }
}
