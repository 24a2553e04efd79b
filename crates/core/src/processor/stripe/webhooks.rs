use diesel::result::{DatabaseErrorKind, Error as DieselError};
use paykit_types::{Processor, SubscriptionStatus};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::billable::Billable;
use crate::db::models::{BillableRow, ChargeRow, NewCharge, SubscriptionRow};
use crate::db::{DbError, PooledConnection};
use crate::error::PayResult;
use crate::mailer::{MailAttachment, UserMailer};
use crate::webhooks::WebhookEvent;

use super::StripeAdapter;
use super::api::StripeApi;
use super::capitalize_brand;
use super::types::{StripeCharge, StripeCustomer, StripeInvoice, StripeSubscription};

/// Stripe webhook events this layer reacts to, parsed from the generic
/// envelope. Anything else maps to `Ignored`.
#[derive(Debug)]
pub enum StripeWebhook {
    ChargeSucceeded(StripeCharge),
    ChargeRefunded(StripeCharge),
    SubscriptionRenewing(StripeInvoice),
    PaymentActionRequired(StripeInvoice),
    SubscriptionUpdated(StripeSubscription),
    SubscriptionDeleted(StripeSubscription),
    CustomerUpdated(StripeCustomer),
    SourceUpdated(SourceObject),
    Ignored,
}

/// `customer.source.updated` delivers a source object; only its owner
/// matters here.
#[derive(Debug, Deserialize)]
pub struct SourceObject {
    #[serde(default)]
    pub customer: Option<String>,
}

impl StripeWebhook {
    pub fn from_event(event: &WebhookEvent) -> Result<Self, serde_json::Error> {
        let object = event.data.object.clone();
        let parsed = match event.event_type.as_str() {
            "charge.succeeded" => StripeWebhook::ChargeSucceeded(serde_json::from_value(object)?),
            "charge.refunded" => StripeWebhook::ChargeRefunded(serde_json::from_value(object)?),
            "invoice.upcoming" => {
                StripeWebhook::SubscriptionRenewing(serde_json::from_value(object)?)
            }
            "invoice.payment_action_required" => {
                StripeWebhook::PaymentActionRequired(serde_json::from_value(object)?)
            }
            "customer.subscription.updated" => {
                StripeWebhook::SubscriptionUpdated(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                StripeWebhook::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            "customer.updated" => StripeWebhook::CustomerUpdated(serde_json::from_value(object)?),
            "customer.source.updated" => {
                StripeWebhook::SourceUpdated(serde_json::from_value(object)?)
            }
            other => {
                debug!("Ignoring Stripe event type {}", other);
                StripeWebhook::Ignored
            }
        };
        Ok(parsed)
    }
}

fn find_billable(
    conn: &mut PooledConnection,
    customer_id: &str,
) -> Result<Option<Billable>, DbError> {
    let row = BillableRow::find_by_processor_id(conn, Processor::Stripe.as_str(), customer_id)
        .map_err(DbError::FindBillableError)?;
    Ok(row.map(Billable::from))
}

/// Records a remote charge locally and sends the receipt.
///
/// The recording step is also the normalization path for synchronous
/// charges, so webhook-sourced and adapter-sourced charges can never
/// diverge.
pub struct ChargeSucceeded;

impl ChargeSucceeded {
    /// Insert-or-find on `(processor, processor_id)`. Returns the row and
    /// whether it was newly created.
    ///
    /// At-least-once delivery means a duplicate event (sequential redelivery
    /// or a concurrent delivery that won the insert) trips the unique index;
    /// the winner's row is the record either way.
    pub(crate) fn record(
        conn: &mut PooledConnection,
        billable_id: i32,
        charge: &StripeCharge,
    ) -> Result<(ChargeRow, bool), DbError> {
        let card = charge.card();
        let insert = NewCharge::new(
            billable_id,
            Processor::Stripe.as_str().to_string(),
            charge.id.clone(),
            charge.amount,
            charge.currency.clone(),
            card.map(|c| capitalize_brand(&c.brand)),
            card.map(|c| c.last4.clone()),
        )
        .insert(conn);
        match insert {
            Ok(row) => Ok((row, true)),
            Err(e @ DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                match ChargeRow::find_by_processor_id(conn, Processor::Stripe.as_str(), &charge.id)
                    .map_err(DbError::FindChargeError)?
                {
                    Some(existing) => Ok((existing, false)),
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
        charge: &StripeCharge,
    ) -> PayResult<()> {
        let Some(customer_id) = charge.customer.as_deref() else {
            return Ok(());
        };
        let Some(billable) = find_billable(conn, customer_id)? else {
            debug!("No billable for Stripe customer {}, skipping", customer_id);
            return Ok(());
        };

        let (local, created) = Self::record(conn, billable.id, charge)?;
        // Redelivery must not re-send the receipt.
        if created {
            let receipt = charge.receipt_url.as_ref().map(|url| MailAttachment {
                filename: format!("receipt-{}.html", charge.id),
                url: url.clone(),
            });
            mailer.receipt(&billable, &local, receipt);
        }
        Ok(())
    }
}

/// Notifies the owner that a previously recorded charge was refunded.
pub struct ChargeRefunded;

impl ChargeRefunded {
    pub fn handle(
        &self,
        conn: &mut PooledConnection,
        mailer: &UserMailer,
        charge: &StripeCharge,
    ) -> PayResult<()> {
        let Some(customer_id) = charge.customer.as_deref() else {
            return Ok(());
        };
        let Some(billable) = find_billable(conn, customer_id)? else {
            return Ok(());
        };
        let Some(local) =
            ChargeRow::find_by_processor_id(conn, Processor::Stripe.as_str(), &charge.id)
                .map_err(DbError::FindChargeError)?
        else {
            debug!("No local charge for {}, skipping refund notice", charge.id);
            return Ok(());
        };
        mailer.refund(&billable, &local);
        Ok(())
    }
}

/// `invoice.upcoming`: the subscription is about to renew.
pub struct SubscriptionRenewing;

impl SubscriptionRenewing {
    pub fn handle(
        &self,
        conn: &mut PooledConnection,
        mailer: &UserMailer,
        invoice: &StripeInvoice,
    ) -> PayResult<()> {
        let Some(subscription_id) = invoice.subscription.as_deref() else {
            return Ok(());
        };
        let Some(subscription) = SubscriptionRow::find_by_processor_id(
            conn,
            Processor::Stripe.as_str(),
            subscription_id,
        )
        .map_err(DbError::FindSubscriptionError)?
        else {
            debug!("No subscription for {}, skipping", subscription_id);
            return Ok(());
        };
        let Some(owner) = BillableRow::find(conn, subscription.billable_id)
            .map_err(DbError::FindBillableError)?
        else {
            return Ok(());
        };
        mailer.subscription_renewing(&owner.into(), &subscription);
        Ok(())
    }
}

/// `invoice.payment_action_required`: the renewal payment needs additional
/// customer authentication.
pub struct PaymentActionRequired;

impl PaymentActionRequired {
    pub fn handle(
        &self,
        conn: &mut PooledConnection,
        mailer: &UserMailer,
        invoice: &StripeInvoice,
    ) -> PayResult<()> {
        let Some(subscription_id) = invoice.subscription.as_deref() else {
            return Ok(());
        };
        let Some(subscription) = SubscriptionRow::find_by_processor_id(
            conn,
            Processor::Stripe.as_str(),
            subscription_id,
        )
        .map_err(DbError::FindSubscriptionError)?
        else {
            return Ok(());
        };
        let Some(owner) = BillableRow::find(conn, subscription.billable_id)
            .map_err(DbError::FindBillableError)?
        else {
            return Ok(());
        };
        let Some(payment_intent_id) = invoice.payment_intent_id() else {
            return Ok(());
        };
        mailer.payment_action_required(&owner.into(), &subscription, payment_intent_id);
        Ok(())
    }
}

/// Mirrors remote subscription state changes onto the local row.
pub struct SubscriptionUpdated;

impl SubscriptionUpdated {
    pub fn handle(
        &self,
        conn: &mut PooledConnection,
        remote: &StripeSubscription,
    ) -> PayResult<()> {
        let Some(local) =
            SubscriptionRow::find_by_processor_id(conn, Processor::Stripe.as_str(), &remote.id)
                .map_err(DbError::FindSubscriptionError)?
        else {
            return Ok(());
        };
        let Ok(status) = remote.status.parse::<SubscriptionStatus>() else {
            warn!(
                "Unknown Stripe subscription status {:?} for {}, skipping",
                remote.status, remote.id
            );
            return Ok(());
        };

        // ends_at is only ever set once a cancellation is scheduled or done.
        let ends_at = remote
            .ended_at
            .or_else(|| {
                remote
                    .cancel_at_period_end
                    .then_some(remote.current_period_end)
                    .flatten()
            })
            .map(|seconds| seconds * 1000);

        SubscriptionRow::sync_remote_state(
            conn,
            local.id,
            status,
            ends_at,
            remote.trial_end.map(|seconds| seconds * 1000),
        )
        .map_err(DbError::SaveSubscriptionError)?;
        Ok(())
    }
}

/// Finalizes a cancellation reported by the processor.
pub struct SubscriptionDeleted;

impl SubscriptionDeleted {
    pub fn handle(
        &self,
        conn: &mut PooledConnection,
        remote: &StripeSubscription,
    ) -> PayResult<()> {
        let Some(local) =
            SubscriptionRow::find_by_processor_id(conn, Processor::Stripe.as_str(), &remote.id)
                .map_err(DbError::FindSubscriptionError)?
        else {
            return Ok(());
        };
        let ends_at = remote
            .ended_at
            .map(|seconds| seconds * 1000)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        SubscriptionRow::sync_remote_state(
            conn,
            local.id,
            SubscriptionStatus::Canceled,
            Some(ends_at),
            local.trial_ends_at,
        )
        .map_err(DbError::SaveSubscriptionError)?;
        Ok(())
    }
}

/// `customer.updated` / `customer.source.updated`: the default payment source
/// may have changed out of band, so re-sync the local card cache.
pub struct CustomerUpdated;

impl CustomerUpdated {
    pub async fn handle<A: StripeApi>(
        &self,
        conn: &mut PooledConnection,
        adapter: &StripeAdapter<'_, A>,
        customer_id: &str,
    ) -> PayResult<()> {
        let Some(mut billable) = find_billable(conn, customer_id)? else {
            return Ok(());
        };
        adapter.sync_card_from_processor(conn, &mut billable).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbManager;
    use crate::db::models::NewSubscription;
    use crate::processor::stripe::testing::FakeStripe;
    use paykit_types::PayConfig;
    use serde_json::json;

    fn setup(config: PayConfig) -> (DbManager, UserMailer, crossbeam_channel::Receiver<crate::mailer::MailMessage>) {
        let db = DbManager::in_memory().unwrap();
        let (mailer, receiver) = UserMailer::channel(config);
        (db, mailer, receiver)
    }

    fn insert_billable(db: &DbManager, processor_id: &str) -> i32 {
        let mut conn = db.conn().unwrap();
        let id = crate::db::models::NewBillable::new(
            "johnny@appleseed.com".to_string(),
            Some("Johnny Appleseed".to_string()),
            "stripe".to_string(),
        )
        .insert(&mut conn)
        .unwrap();
        BillableRow::set_processor(&mut conn, id, "stripe", processor_id).unwrap();
        id
    }

    fn insert_subscription(db: &DbManager, billable_id: i32, processor_id: &str) -> SubscriptionRow {
        let mut conn = db.conn().unwrap();
        NewSubscription::new(
            billable_id,
            "default".to_string(),
            "stripe".to_string(),
            processor_id.to_string(),
            "test-monthly".to_string(),
            paykit_types::SubscriptionStatus::Active,
            None,
        )
        .insert(&mut conn)
        .unwrap()
    }

    fn charge_event() -> StripeCharge {
        serde_json::from_value(json!({
            "id": "ch_1",
            "amount": 2900,
            "currency": "usd",
            "customer": "cus_1",
            "receipt_url": "https://pay.stripe.com/receipts/abc",
            "payment_method_details": {
                "card": { "brand": "visa", "last4": "4242", "exp_month": 9, "exp_year": 2031 }
            }
        }))
        .unwrap()
    }

    #[test]
    fn charge_succeeded_is_idempotent_across_redelivery() {
        let (db, mailer, receiver) = setup(PayConfig::default());
        insert_billable(&db, "cus_1");
        let mut conn = db.conn().unwrap();

        let charge = charge_event();
        ChargeSucceeded.handle(&mut conn, &mailer, &charge).unwrap();
        ChargeSucceeded.handle(&mut conn, &mailer, &charge).unwrap();

        let row = ChargeRow::find_by_processor_id(&mut conn, "stripe", "ch_1")
            .unwrap()
            .unwrap();
        assert_eq!(row.amount, 2900);
        assert_eq!(row.card_type.as_deref(), Some("Visa"));

        // Exactly one receipt despite the duplicate delivery.
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn losing_a_duplicate_insert_yields_the_existing_row() {
        let (db, _mailer, _receiver) = setup(PayConfig::default());
        let billable_id = insert_billable(&db, "cus_1");
        let mut conn = db.conn().unwrap();

        let charge = charge_event();
        let (first, created) = ChargeSucceeded::record(&mut conn, billable_id, &charge).unwrap();
        assert!(created);

        // The second insert trips the unique index and must recover to the
        // winner's row instead of surfacing the constraint error.
        let (second, created) = ChargeSucceeded::record(&mut conn, billable_id, &charge).unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[test]
    fn charge_succeeded_for_unknown_customer_is_a_no_op() {
        let (db, mailer, receiver) = setup(PayConfig::default());
        let mut conn = db.conn().unwrap();

        ChargeSucceeded
            .handle(&mut conn, &mailer, &charge_event())
            .unwrap();
        assert!(
            ChargeRow::find_by_processor_id(&mut conn, "stripe", "ch_1")
                .unwrap()
                .is_none()
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn no_mail_is_composed_when_emails_are_disabled() {
        let (db, mailer, receiver) = setup(PayConfig::silent());
        insert_billable(&db, "cus_1");
        let mut conn = db.conn().unwrap();

        ChargeSucceeded
            .handle(&mut conn, &mailer, &charge_event())
            .unwrap();
        assert!(receiver.try_recv().is_err());
        // The charge is still recorded.
        assert!(
            ChargeRow::find_by_processor_id(&mut conn, "stripe", "ch_1")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn renewal_for_unknown_subscription_neither_errors_nor_notifies() {
        let (db, mailer, receiver) = setup(PayConfig::default());
        let mut conn = db.conn().unwrap();

        let invoice: StripeInvoice = serde_json::from_value(json!({
            "id": "in_1",
            "subscription": "sub_unknown"
        }))
        .unwrap();
        SubscriptionRenewing
            .handle(&mut conn, &mailer, &invoice)
            .unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn renewal_notifies_the_subscription_owner() {
        let (db, mailer, receiver) = setup(PayConfig::default());
        let billable_id = insert_billable(&db, "cus_1");
        insert_subscription(&db, billable_id, "sub_1");
        let mut conn = db.conn().unwrap();

        let invoice: StripeInvoice = serde_json::from_value(json!({
            "id": "in_1",
            "subscription": "sub_1"
        }))
        .unwrap();
        SubscriptionRenewing
            .handle(&mut conn, &mailer, &invoice)
            .unwrap();

        let message = receiver.try_recv().unwrap();
        assert_eq!(message.to, "Johnny Appleseed <johnny@appleseed.com>");
        assert!(message.body.contains("default"));
    }

    #[test]
    fn action_required_passes_the_intent_reference() {
        let (db, mailer, receiver) = setup(PayConfig::default());
        let billable_id = insert_billable(&db, "cus_1");
        insert_subscription(&db, billable_id, "sub_1");
        let mut conn = db.conn().unwrap();

        let invoice: StripeInvoice = serde_json::from_value(json!({
            "id": "in_1",
            "subscription": "sub_1",
            "payment_intent": "pi_99"
        }))
        .unwrap();
        PaymentActionRequired
            .handle(&mut conn, &mailer, &invoice)
            .unwrap();

        let message = receiver.try_recv().unwrap();
        assert!(message.body.contains("pi_99"));
    }

    #[test]
    fn subscription_updates_are_idempotent_assignments() {
        let (db, _mailer, _receiver) = setup(PayConfig::default());
        let billable_id = insert_billable(&db, "cus_1");
        insert_subscription(&db, billable_id, "sub_1");
        let mut conn = db.conn().unwrap();

        let remote: StripeSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "past_due",
            "cancel_at_period_end": true,
            "current_period_end": 1_700_000_000
        }))
        .unwrap();
        SubscriptionUpdated.handle(&mut conn, &remote).unwrap();
        SubscriptionUpdated.handle(&mut conn, &remote).unwrap();

        let row = SubscriptionRow::find_by_processor_id(&mut conn, "stripe", "sub_1")
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "past_due");
        assert_eq!(row.ends_at, Some(1_700_000_000_000));
    }

    #[test]
    fn subscription_deletion_finalizes_cancellation() {
        let (db, _mailer, _receiver) = setup(PayConfig::default());
        let billable_id = insert_billable(&db, "cus_1");
        insert_subscription(&db, billable_id, "sub_1");
        let mut conn = db.conn().unwrap();

        let remote: StripeSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "canceled",
            "ended_at": 1_700_000_000
        }))
        .unwrap();
        SubscriptionDeleted.handle(&mut conn, &remote).unwrap();

        let row = SubscriptionRow::find_by_processor_id(&mut conn, "stripe", "sub_1")
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "canceled");
        assert_eq!(row.ends_at, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn customer_update_resyncs_the_card_cache() {
        let (db, _mailer, _receiver) = setup(PayConfig::default());
        let billable_id = insert_billable(&db, "cus_fake_1");
        let mut conn = db.conn().unwrap();

        let api = FakeStripe::default();
        api.set_default_source("mastercard", "5100", 4, 2030);
        let config = PayConfig::default();
        let adapter = StripeAdapter::new(&api, &config);

        CustomerUpdated
            .handle(&mut conn, &adapter, "cus_fake_1")
            .await
            .unwrap();

        let row = BillableRow::find(&mut conn, billable_id).unwrap().unwrap();
        assert_eq!(row.card_type.as_deref(), Some("Mastercard"));
        assert_eq!(row.card_last4.as_deref(), Some("5100"));
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        let event = WebhookEvent {
            event_type: "product.created".to_string(),
            data: crate::webhooks::WebhookEventData {
                object: json!({ "id": "prod_1" }),
            },
        };
        assert!(matches!(
            StripeWebhook::from_event(&event).unwrap(),
            StripeWebhook::Ignored
        ));
    }
}
