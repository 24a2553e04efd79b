pub mod braintree;
pub mod stripe;

use paykit_types::{PayConfig, Processor};

use crate::billable::Billable;
use crate::db::DbManager;
use crate::db::models::{ChargeRow, SubscriptionRow};
use crate::error::{PayError, PayResult};
use crate::mailer::UserMailer;
use crate::webhooks::{WebhookEvent, WebhookRouter};

use self::braintree::BraintreeAdapter;
use self::braintree::api::BraintreeApi;
use self::stripe::api::StripeApi;
use self::stripe::{ChargeOptions, StripeAdapter, SubscribeOptions};

/// Entry point tying the pieces together: configuration, storage, the two
/// processor seams, and the mailer.
///
/// The uniform methods dispatch on each billable's own `processor` column,
/// so billables on different processors coexist in one deployment. Anything
/// processor-specific (setup intents, invoices) lives on the adapter
/// returned by [`Pay::stripe`] or [`Pay::braintree`].
pub struct Pay<S: StripeApi, B: BraintreeApi> {
    config: PayConfig,
    db: DbManager,
    stripe: S,
    braintree: B,
    mailer: UserMailer,
}

impl<S: StripeApi, B: BraintreeApi> Pay<S, B> {
    pub fn new(config: PayConfig, db: DbManager, stripe: S, braintree: B, mailer: UserMailer) -> Self {
        Pay {
            config,
            db,
            stripe,
            braintree,
            mailer,
        }
    }

    pub fn config(&self) -> &PayConfig {
        &self.config
    }

    pub fn db(&self) -> &DbManager {
        &self.db
    }

    pub fn mailer(&self) -> &UserMailer {
        &self.mailer
    }

    pub fn stripe(&self) -> StripeAdapter<'_, S> {
        StripeAdapter::new(&self.stripe, &self.config)
    }

    pub fn braintree(&self) -> BraintreeAdapter<'_, B> {
        BraintreeAdapter::new(&self.braintree)
    }

    /// Charge `amount` minor units against the billable's default payment
    /// method on its processor.
    pub async fn charge(&self, billable: &mut Billable, amount: i64) -> PayResult<ChargeRow> {
        let mut conn = self.db.conn()?;
        match billable.processor {
            Processor::Stripe => {
                self.stripe()
                    .charge(&mut conn, billable, amount, ChargeOptions::default())
                    .await
            }
            Processor::Braintree => self.braintree().charge(&mut conn, billable, amount).await,
            Processor::None => Err(PayError::ProcessorNotConfigured),
        }
    }

    /// Subscribe the billable to `plan` under the local subscription `name`.
    pub async fn subscribe(
        &self,
        billable: &mut Billable,
        name: &str,
        plan: &str,
    ) -> PayResult<SubscriptionRow> {
        let mut conn = self.db.conn()?;
        match billable.processor {
            Processor::Stripe => {
                self.stripe()
                    .subscribe(&mut conn, billable, name, plan, SubscribeOptions::default())
                    .await
            }
            Processor::Braintree => {
                self.braintree()
                    .subscribe(&mut conn, billable, name, plan)
                    .await
            }
            Processor::None => Err(PayError::ProcessorNotConfigured),
        }
    }

    /// Make `token` (a Stripe payment method id or a Braintree nonce) the
    /// billable's default card.
    pub async fn update_card(&self, billable: &mut Billable, token: &str) -> PayResult<()> {
        let mut conn = self.db.conn()?;
        match billable.processor {
            Processor::Stripe => self.stripe().update_card(&mut conn, billable, token).await,
            Processor::Braintree => {
                self.braintree()
                    .update_card(&mut conn, billable, token)
                    .await
            }
            Processor::None => Err(PayError::ProcessorNotConfigured),
        }
    }

    /// Push the billable's current email and display name to its processor.
    /// A no-op for billables without a processor yet.
    pub async fn update_email(&self, billable: &mut Billable) -> PayResult<()> {
        if billable.processor_id.is_none() {
            return Ok(());
        }
        let mut conn = self.db.conn()?;
        match billable.processor {
            Processor::Stripe => self.stripe().update_email(&mut conn, billable).await,
            Processor::Braintree => self.braintree().update_email(&mut conn, billable).await,
            Processor::None => Ok(()),
        }
    }

    /// Re-read the billable's default payment method from its processor and
    /// refresh the local card columns.
    pub async fn sync_card(&self, billable: &mut Billable) -> PayResult<()> {
        let mut conn = self.db.conn()?;
        match billable.processor {
            Processor::Stripe => {
                self.stripe()
                    .sync_card_from_processor(&mut conn, billable)
                    .await
            }
            Processor::Braintree => {
                self.braintree()
                    .sync_card_from_processor(&mut conn, billable)
                    .await
            }
            Processor::None => Ok(()),
        }
    }

    /// Route a parsed webhook envelope from `processor` to its handler.
    pub async fn handle_webhook(&self, processor: Processor, event: &WebhookEvent) -> PayResult<()> {
        WebhookRouter::new(&self.db, &self.config, &self.mailer, &self.stripe)
            .handle(processor, event)
            .await
    }
}
