pub mod api;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod webhooks;

use paykit_types::{Processor, SubscriptionStatus};
use tracing::debug;

use crate::billable::{Billable, CardOnFile};
use crate::db::models::{BillableRow, ChargeRow, SubscriptionRow};
use crate::db::{DbError, PooledConnection};
use crate::error::{PayError, PayResult};

use self::api::{BraintreeApi, BraintreeApiError, BraintreeSubscriptionParams, SaleParams};
use self::types::{BraintreeCard, BraintreeCustomer, to_decimal_amount};
use self::webhooks::SubscriptionChargedSuccessfully;

/// Braintree counterpart of the Stripe adapter: the same contract surface,
/// expressed in vault/transaction semantics. Amounts cross this seam as
/// integer minor units and are converted to Braintree's decimal strings at
/// the boundary.
pub struct BraintreeAdapter<'a, A: BraintreeApi> {
    api: &'a A,
}

impl<'a, A: BraintreeApi> BraintreeAdapter<'a, A> {
    pub fn new(api: &'a A) -> Self {
        BraintreeAdapter { api }
    }

    /// The remote customer, created lazily on first use. A pending
    /// `card_token` (a client-side payment method nonce) is vaulted as part
    /// of creation.
    pub async fn customer(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
    ) -> PayResult<BraintreeCustomer> {
        if let Some(processor_id) = billable.processor_id.clone() {
            return self
                .api
                .find_customer(&processor_id)
                .await
                .map_err(PayError::processor);
        }

        let nonce = billable.card_token.clone();
        let customer = self
            .api
            .create_customer(&billable.email, billable.display_name(), nonce.as_deref())
            .await
            .map_err(PayError::processor)?;
        debug!(
            "Created Braintree customer {} for billable {}",
            customer.id, billable.id
        );

        BillableRow::set_processor(
            conn,
            billable.id,
            Processor::Braintree.as_str(),
            &customer.id,
        )
        .map_err(DbError::SaveBillableError)?;
        billable.processor = Processor::Braintree;
        billable.processor_id = Some(customer.id.clone());

        let card = customer
            .default_payment_method()
            .and_then(|pm| pm.card.clone());
        self.update_card_on_file(conn, billable, card.as_ref())?;
        Ok(customer)
    }

    /// Charge the customer's default payment method, recording the resulting
    /// transaction through the webhook normalization path.
    pub async fn charge(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
        amount: i64,
    ) -> PayResult<ChargeRow> {
        let customer = self.customer(conn, billable).await?;

        let params = SaleParams {
            amount: to_decimal_amount(amount),
            customer_id: customer.id,
            payment_method_token: customer
                .payment_methods
                .iter()
                .find(|pm| pm.default)
                .map(|pm| pm.token.clone()),
            submit_for_settlement: true,
        };
        let transaction = self.api.sale(&params).await.map_err(PayError::processor)?;

        match SubscriptionChargedSuccessfully::record(conn, billable.id, &transaction)? {
            Some((charge, _created)) => Ok(charge),
            None => Err(PayError::processor(BraintreeApiError::transport(format!(
                "Braintree returned unparseable amount {:?}",
                transaction.amount
            )))),
        }
    }

    /// Create a remote subscription against the default payment method and
    /// mirror it locally. Braintree has no payment-intent flow, so there is
    /// no post-create validation step.
    pub async fn subscribe(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
        name: &str,
        plan: &str,
    ) -> PayResult<SubscriptionRow> {
        let customer = self.customer(conn, billable).await?;
        let token = customer
            .default_payment_method()
            .map(|pm| pm.token.clone())
            .ok_or_else(|| {
                PayError::processor(BraintreeApiError::transport(
                    "customer has no payment method on file",
                ))
            })?;

        let remote = self
            .api
            .create_subscription(&BraintreeSubscriptionParams {
                plan_id: plan.to_string(),
                payment_method_token: token,
                trial_from_plan: true,
            })
            .await
            .map_err(PayError::processor)?;

        let row = crate::db::models::NewSubscription::new(
            billable.id,
            name.to_string(),
            Processor::Braintree.as_str().to_string(),
            remote.id.clone(),
            plan.to_string(),
            normalize_status(&remote.status),
            None,
        )
        .insert(conn)
        .map_err(DbError::SaveSubscriptionError)?;
        Ok(row)
    }

    /// Vault a new payment method nonce as the default card.
    pub async fn update_card(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
        payment_method_nonce: &str,
    ) -> PayResult<()> {
        let customer = self.customer(conn, billable).await?;
        let payment_method = self
            .api
            .vault_payment_method(&customer.id, payment_method_nonce, true)
            .await
            .map_err(PayError::processor)?;
        self.update_card_on_file(conn, billable, payment_method.card.as_ref())?;
        Ok(())
    }

    /// Push local email and display name to the remote customer.
    pub async fn update_email(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
    ) -> PayResult<()> {
        let customer = self.customer(conn, billable).await?;
        self.api
            .update_customer(&customer.id, &billable.email, billable.display_name())
            .await
            .map_err(PayError::processor)?;
        Ok(())
    }

    /// Reconcile the local card cache with the remote default payment method.
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
            .find_customer(&processor_id)
            .await
            .map_err(PayError::processor)?;
        let card = customer
            .default_payment_method()
            .and_then(|pm| pm.card.clone());
        self.update_card_on_file(conn, billable, card.as_ref())
    }

    fn update_card_on_file(
        &self,
        conn: &mut PooledConnection,
        billable: &mut Billable,
        card: Option<&BraintreeCard>,
    ) -> PayResult<()> {
        let card = card.map(|card| CardOnFile {
            brand: card.card_type.clone(),
            last4: card.last4.clone(),
            exp_month: card.exp_month(),
            exp_year: card.exp_year(),
        });
        BillableRow::set_card(conn, billable.id, card.as_ref())
            .map_err(DbError::SaveBillableError)?;
        billable.set_card(card);
        Ok(())
    }
}

/// Braintree reports PascalCase statuses; fold them into the shared model.
pub(crate) fn normalize_status(status: &str) -> SubscriptionStatus {
    match status {
        "Active" => SubscriptionStatus::Active,
        "Pending" => SubscriptionStatus::Trialing,
        "Past Due" | "PastDue" | "PAST_DUE" => SubscriptionStatus::PastDue,
        "Canceled" | "CANCELED" => SubscriptionStatus::Canceled,
        "Expired" | "EXPIRED" => SubscriptionStatus::Canceled,
        "ACTIVE" => SubscriptionStatus::Active,
        "PENDING" => SubscriptionStatus::Trialing,
        other => {
            tracing::warn!("Unknown Braintree subscription status {:?}", other);
            SubscriptionStatus::Incomplete
        }
    }
}
