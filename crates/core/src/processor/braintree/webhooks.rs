use diesel::result::{DatabaseErrorKind, Error as DieselError};
use paykit_types::{Processor, SubscriptionStatus};
use tracing::{debug, warn};

use crate::billable::Billable;
use crate::db::models::{BillableRow, ChargeRow, NewCharge, SubscriptionRow};
use crate::db::{DbError, PooledConnection};
use crate::error::PayResult;
use crate::mailer::UserMailer;
use crate::webhooks::WebhookEvent;

use super::types::{BraintreeSubscription, BraintreeTransaction};

/// Braintree webhook notifications this layer reacts to. The ingestion
/// layer decodes Braintree's notification envelope into the shared
/// [`WebhookEvent`] shape before handing it over.
#[derive(Debug)]
pub enum BraintreeWebhook {
    SubscriptionChargedSuccessfully(BraintreeSubscription),
    SubscriptionCanceled(BraintreeSubscription),
    Ignored,
}

impl BraintreeWebhook {
    pub fn from_event(event: &WebhookEvent) -> Result<Self, serde_json::Error> {
        let object = event.data.object.clone();
        let parsed = match event.event_type.as_str() {
            "subscription_charged_successfully" => {
                BraintreeWebhook::SubscriptionChargedSuccessfully(serde_json::from_value(object)?)
            }
            "subscription_canceled" => {
                BraintreeWebhook::SubscriptionCanceled(serde_json::from_value(object)?)
            }
            other => {
                debug!("Ignoring Braintree notification kind {}", other);
                BraintreeWebhook::Ignored
            }
        };
        Ok(parsed)
    }
}

/// Records the renewal transaction as a local charge and sends a receipt.
pub struct SubscriptionChargedSuccessfully;

impl SubscriptionChargedSuccessfully {
    /// Insert-or-find on `(processor, processor_id)`; shared with the
    /// synchronous charge path. `None` means the transaction amount could
    /// not be parsed and nothing was recorded.
    ///
    /// A duplicate notification (redelivered or concurrently delivered)
    /// trips the unique index and recovers to the winner's row.
    pub(crate) fn record(
        conn: &mut PooledConnection,
        billable_id: i32,
        transaction: &BraintreeTransaction,
    ) -> Result<Option<(ChargeRow, bool)>, DbError> {
        let Some(amount) = transaction.amount_minor_units() else {
            warn!(
                "Unparseable Braintree amount {:?} on {}, not recording",
                transaction.amount, transaction.id
            );
            return Ok(None);
        };

        let card = transaction.card.as_ref();
        let insert = NewCharge::new(
            billable_id,
            Processor::Braintree.as_str().to_string(),
            transaction.id.clone(),
            amount,
            transaction.currency_iso_code.to_lowercase(),
            card.map(|c| c.card_type.clone()),
            card.map(|c| c.last4.clone()),
        )
        .insert(conn);
        match insert {
            Ok(row) => Ok(Some((row, true))),
            Err(e @ DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                match ChargeRow::find_by_processor_id(
                    conn,
                    Processor::Braintree.as_str(),
                    &transaction.id,
                )
                .map_err(DbError::FindChargeError)?
                {
                    Some(existing) => Ok(Some((existing, false))),
                    None => Err(DbError::InsertChargeError(e)),
                }
            }
            Err(e) => Err(DbError::InsertChargeError(e)),
        }
    }

    pub fn handle(
        &self,
        conn: &mut PooledConnection,
        mailer: &UserMailer,
        subscription: &BraintreeSubscription,
    ) -> PayResult<()> {
        let Some(local) = SubscriptionRow::find_by_processor_id(
            conn,
            Processor::Braintree.as_str(),
            &subscription.id,
        )
        .map_err(DbError::FindSubscriptionError)?
        else {
            debug!("No subscription for {}, skipping", subscription.id);
            return Ok(());
        };
        let Some(owner) =
            BillableRow::find(conn, local.billable_id).map_err(DbError::FindBillableError)?
        else {
            return Ok(());
        };
        let owner: Billable = owner.into();

        let Some(transaction) = subscription.transactions.first() else {
            return Ok(());
        };
        if let Some((charge, created)) = Self::record(conn, owner.id, transaction)? {
            if created {
                mailer.receipt(&owner, &charge, None);
            }
        }
        Ok(())
    }
}

/// Finalizes a cancellation reported by Braintree.
pub struct SubscriptionCanceled;

impl SubscriptionCanceled {
    pub fn handle(
        &self,
        conn: &mut PooledConnection,
        subscription: &BraintreeSubscription,
    ) -> PayResult<()> {
        let Some(local) = SubscriptionRow::find_by_processor_id(
            conn,
            Processor::Braintree.as_str(),
            &subscription.id,
        )
        .map_err(DbError::FindSubscriptionError)?
        else {
            return Ok(());
        };
        SubscriptionRow::sync_remote_state(
            conn,
            local.id,
            SubscriptionStatus::Canceled,
            Some(chrono::Utc::now().timestamp_millis()),
            local.trial_ends_at,
        )
        .map_err(DbError::SaveSubscriptionError)?;
        Ok(())
    }
}
