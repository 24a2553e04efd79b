pub mod api;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod webhooks;

use paykit_types::{PayConfig, Processor, SubscriptionStatus};
use tracing::debug;

use crate::billable::{Billable, CardOnFile};
use crate::db::models::{BillableRow, ChargeRow, SubscriptionRow};
use crate::db::{DbError, PooledConnection};
use crate::error::{PayError, PayResult};
use crate::payment::Payment;

use self::api::{ChargeParams, CustomerUpdate, StripeApi, SubscriptionParams};
use self::types::{
    PaymentMethodCard, StripeCustomer, StripeInvoice, StripeSetupIntent, StripeSubscription,
};
use self::webhooks::ChargeSucceeded;

/// Caller-supplied overrides for a charge request.
#[derive(Debug, Clone, Default)]
pub struct ChargeOptions {
    pub currency: Option<String>,
    pub description: Option<String>,
    pub extra: Vec<(String, String)>,
}

/// Caller-supplied overrides for a subscription create request.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub off_session: bool,
    pub trial_from_plan: bool,
    pub extra: Vec<(String, String)>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions {
            off_session: true,
            trial_from_plan: true,
            extra: Vec::new(),
        }
    }
}

/// The single seam translating local billable state into Stripe API calls
/// and back. Every vendor error is wrapped into [`PayError::Processor`] at
/// the call site; callers never see Stripe-specific error types.
pub struct StripeAdapter<'a, A: StripeApi> {
    api: &'a A,
    config: &'a PayConfig,
}

impl<'a, A: StripeApi> StripeAdapter<'a, A> {
    pub fn new(api: &'a A, config: &'a PayConfig) -> Self {
        StripeAdapter { api, config }
    }

    /// The remote customer for this billable, created lazily on first use.
    ///
    /// Creation persists the new `(processor, processor_id)` pair and, when a
    /// pending card token exists, attaches it as the default payment method
    /// and mirrors the card on file.
    pub async fn customer(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
    ) -> PayResult<StripeCustomer> {
        if let Some(processor_id) = billable.processor_id.clone() {
            return self
                .api
                .retrieve_customer(&processor_id)
                .await
                .map_err(PayError::processor);
        }

        let customer = self
            .api
            .create_customer(&billable.email, billable.display_name())
            .await
            .map_err(PayError::processor)?;
        debug!("Created Stripe customer {} for billable {}", customer.id, billable.id);

        BillableRow::set_processor(conn, billable.id, Processor::Stripe.as_str(), &customer.id)
            .map_err(DbError::SaveBillableError)?;
        billable.processor = Processor::Stripe;
        billable.processor_id = Some(customer.id.clone());

        if let Some(card_token) = billable.card_token.clone() {
            let payment_method = self
                .api
                .attach_payment_method(&card_token, &customer.id)
                .await
                .map_err(PayError::processor)?;
            self.api
                .update_customer(
                    &customer.id,
                    CustomerUpdate {
                        default_payment_method: Some(card_token),
                        ..CustomerUpdate::default()
                    },
                )
                .await
                .map_err(PayError::processor)?;
            self.update_card_on_file(conn, billable, payment_method.card.as_ref())?;
        }

        Ok(customer)
    }

    /// Pass-through setup intent for client-side card collection.
    pub async fn create_setup_intent(&self) -> PayResult<StripeSetupIntent> {
        self.api
            .create_setup_intent()
            .await
            .map_err(PayError::processor)
    }

    /// Charge the billable, recording the resulting charge locally through
    /// the same normalization path the charge-succeeded webhook uses.
    pub async fn charge(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
        amount: i64,
        options: ChargeOptions,
    ) -> PayResult<ChargeRow> {
        let customer = self.customer(conn, billable).await?;

        let params = ChargeParams {
            amount,
            currency: options
                .currency
                .unwrap_or_else(|| self.config.default_currency.clone()),
            customer: customer.id,
            description: options
                .description
                .or_else(|| billable.display_name().map(str::to_string)),
            extra: options.extra,
        };
        let stripe_charge = self
            .api
            .create_charge(&params)
            .await
            .map_err(PayError::processor)?;

        let (charge, _created) = ChargeSucceeded::record(conn, billable.id, &stripe_charge)?;
        Ok(charge)
    }

    /// Create a remote subscription and mirror it locally.
    ///
    /// If the remote subscription comes back incomplete, the expanded payment
    /// intent is validated immediately so the caller learns synchronously
    /// whether customer action is required. This is the one place where the
    /// synchronous and webhook reconciliation paths must agree.
    pub async fn subscribe(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
        name: &str,
        plan: &str,
        options: SubscribeOptions,
    ) -> PayResult<SubscriptionRow> {
        let customer = self.customer(conn, billable).await?;

        let params = SubscriptionParams {
            customer: customer.id,
            plan: plan.to_string(),
            off_session: options.off_session,
            trial_from_plan: options.trial_from_plan,
            extra: options.extra,
        };
        let stripe_sub = self
            .api
            .create_subscription(&params)
            .await
            .map_err(PayError::processor)?;

        let subscription = self.record_subscription(conn, billable, name, plan, &stripe_sub)?;

        if subscription.is_incomplete() {
            if let Some(intent) = stripe_sub.latest_payment_intent() {
                Payment::new(intent.clone()).validate()?;
            }
        }
        Ok(subscription)
    }

    /// Make `payment_method_id` the customer's default card. A no-op success
    /// when it already is the default.
    pub async fn update_card(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
        payment_method_id: &str,
    ) -> PayResult<()> {
        let customer = self.customer(conn, billable).await?;

        if customer.default_payment_method() == Some(payment_method_id) {
            return Ok(());
        }

        let payment_method = self
            .api
            .attach_payment_method(payment_method_id, &customer.id)
            .await
            .map_err(PayError::processor)?;
        self.api
            .update_customer(
                &customer.id,
                CustomerUpdate {
                    default_payment_method: Some(payment_method_id.to_string()),
                    ..CustomerUpdate::default()
                },
            )
            .await
            .map_err(PayError::processor)?;

        self.update_card_on_file(conn, billable, payment_method.card.as_ref())?;
        Ok(())
    }

    /// Push local email and display name to the remote customer. Best effort:
    /// both fields share one update, there is no rollback on partial failure.
    pub async fn update_email(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
    ) -> PayResult<()> {
        let customer = self.customer(conn, billable).await?;
        self.api
            .update_customer(
                &customer.id,
                CustomerUpdate {
                    email: Some(billable.email.clone()),
                    description: billable.display_name().map(str::to_string),
                    ..CustomerUpdate::default()
                },
            )
            .await
            .map_err(PayError::processor)?;
        Ok(())
    }

    pub async fn retrieve_subscription(
        &self,
        subscription_id: &str,
        expand: &[&str],
    ) -> PayResult<StripeSubscription> {
        self.api
            .retrieve_subscription(subscription_id, expand)
            .await
            .map_err(PayError::processor)
    }

    /// The customer's upcoming invoice, or `None` before a remote customer
    /// exists.
    pub async fn upcoming_invoice(&self, billable: &Billable) -> PayResult<Option<StripeInvoice>> {
        let Some(processor_id) = billable.processor_id.as_deref() else {
            return Ok(None);
        };
        self.api
            .upcoming_invoice(processor_id)
            .await
            .map(Some)
            .map_err(PayError::processor)
    }

    /// Create an invoice for any pending items and pay it immediately.
    /// Fire-and-forget; a no-op before a remote customer exists.
    pub async fn create_and_pay_invoice(
        &self,
        billable: &Billable,
    ) -> PayResult<Option<StripeInvoice>> {
        let Some(processor_id) = billable.processor_id.as_deref() else {
            return Ok(None);
        };
        let invoice = self
            .api
            .create_invoice(processor_id)
            .await
            .map_err(PayError::processor)?;
        self.api
            .pay_invoice(&invoice.id)
            .await
            .map(Some)
            .map_err(PayError::processor)
    }

    /// Reconcile the local card cache with the remote default payment source,
    /// used after out-of-band changes observed through webhooks.
    pub async fn sync_card_from_processor(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
    ) -> PayResult<()> {
        let Some(processor_id) = billable.processor_id.clone() else {
            return Ok(());
        };
        let customer = self
            .api
            .retrieve_customer(&processor_id)
            .await
            .map_err(PayError::processor)?;

        let card = customer.default_source_object().map(|source| CardOnFile {
            brand: capitalize_brand(source.brand.as_deref().unwrap_or_default()),
            last4: source.last4.clone().unwrap_or_default(),
            exp_month: source.exp_month,
            exp_year: source.exp_year,
        });

        BillableRow::set_card(conn, billable.id, card.as_ref())
            .map_err(DbError::SaveBillableError)?;
        billable.set_card(card);
        Ok(())
    }

    fn record_subscription(
        &self,
        conn: &mut PooledConnection,
        billable: &Billable,
        name: &str,
        plan: &str,
        stripe_sub: &StripeSubscription,
    ) -> PayResult<SubscriptionRow> {
        // Unknown remote statuses are treated as incomplete so they cannot be
        // mistaken for a settled subscription.
        let status = stripe_sub
            .status
            .parse::<SubscriptionStatus>()
            .unwrap_or(SubscriptionStatus::Incomplete);
        let row = crate::db::models::NewSubscription::new(
            billable.id,
            name.to_string(),
            Processor::Stripe.as_str().to_string(),
            stripe_sub.id.clone(),
            plan.to_string(),
            status,
            stripe_sub.trial_end.map(|seconds| seconds * 1000),
        )
        .insert(conn)
        .map_err(DbError::SaveSubscriptionError)?;
        Ok(row)
    }

    fn update_card_on_file(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
        card: Option<&PaymentMethodCard>,
    ) -> PayResult<()> {
        let card = card.map(|card| CardOnFile {
            brand: capitalize_brand(&card.brand),
            last4: card.last4.clone(),
            exp_month: card.exp_month,
            exp_year: card.exp_year,
        });
        BillableRow::set_card(conn, billable.id, card.as_ref())
            .map_err(DbError::SaveBillableError)?;
        billable.set_card(card);
        Ok(())
    }
}

/// Stripe reports brands in lowercase ("visa"); the card-on-file cache keeps
/// the display form ("Visa").
pub(crate) fn capitalize_brand(brand: &str) -> String {
    let mut chars = brand.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
