use diesel::prelude::*;
use paykit_types::SubscriptionStatus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{PooledConnection, schema::*};

/// Local mirror of a processor subscription.
///
/// `status` carries the last processor-reported state; `ends_at` is set only
/// once a cancellation has been scheduled or finalized.
#[derive(
    Debug, Queryable, Identifiable, Selectable, Associations, Serialize, Deserialize, Clone,
)]
#[diesel(belongs_to(super::billable::BillableRow, foreign_key = billable_id))]
#[diesel(table_name = pay_subscriptions)]
pub struct SubscriptionRow {
    pub id: i32,
    pub created_at: i64,
    pub updated_at: i64,
    pub billable_id: i32,
    pub name: String,
    pub processor: String,
    pub processor_id: String,
    pub processor_plan: String,
    pub trial_ends_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub status: String,
}

impl SubscriptionRow {
    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.status.parse().ok()
    }

    pub fn is_incomplete(&self) -> bool {
        self.status().is_some_and(|s| s.is_incomplete())
    }

    pub fn find_by_processor_id(
        conn: &mut PooledConnection,
        processor: &str,
        processor_id: &str,
    ) -> QueryResult<Option<SubscriptionRow>> {
        pay_subscriptions::table
            .filter(pay_subscriptions::processor.eq(processor))
            .filter(pay_subscriptions::processor_id.eq(processor_id))
            .first::<SubscriptionRow>(conn)
            .optional()
    }

    pub fn find_by_name(
        conn: &mut PooledConnection,
        billable_id: i32,
        name: &str,
    ) -> QueryResult<Option<SubscriptionRow>> {
        pay_subscriptions::table
            .filter(pay_subscriptions::billable_id.eq(billable_id))
            .filter(pay_subscriptions::name.eq(name))
            .order(pay_subscriptions::created_at.desc())
            .first::<SubscriptionRow>(conn)
            .optional()
    }

    /// Idempotent status assignment driven by webhook events.
    pub fn set_status(
        conn: &mut PooledConnection,
        subscription_id: i32,
        status: SubscriptionStatus,
    ) -> QueryResult<usize> {
        debug!("Subscription {} status -> {}", subscription_id, status);
        diesel::update(pay_subscriptions::table.filter(pay_subscriptions::id.eq(subscription_id)))
            .set((
                pay_subscriptions::status.eq(status.as_str()),
                pay_subscriptions::updated_at.eq(chrono::Utc::now().timestamp_millis()),
            ))
            .execute(conn)
    }

    /// Mirror the remote state after a subscription-updated event.
    pub fn sync_remote_state(
        conn: &mut PooledConnection,
        subscription_id: i32,
        status: SubscriptionStatus,
        ends_at: Option<i64>,
        trial_ends_at: Option<i64>,
    ) -> QueryResult<usize> {
        diesel::update(pay_subscriptions::table.filter(pay_subscriptions::id.eq(subscription_id)))
            .set((
                pay_subscriptions::status.eq(status.as_str()),
                pay_subscriptions::ends_at.eq(ends_at),
                pay_subscriptions::trial_ends_at.eq(trial_ends_at),
                pay_subscriptions::updated_at.eq(chrono::Utc::now().timestamp_millis()),
            ))
            .execute(conn)
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = pay_subscriptions)]
pub struct NewSubscription {
    pub created_at: i64,
    pub updated_at: i64,
    pub billable_id: i32,
    pub name: String,
    pub processor: String,
    pub processor_id: String,
    pub processor_plan: String,
    pub trial_ends_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub status: String,
}

impl NewSubscription {
    pub fn new(
        billable_id: i32,
        name: String,
        processor: String,
        processor_id: String,
        processor_plan: String,
        status: SubscriptionStatus,
        trial_ends_at: Option<i64>,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        Self {
            created_at: timestamp,
            updated_at: timestamp,
            billable_id,
            name,
            processor,
            processor_id,
            processor_plan,
            trial_ends_at,
            ends_at: None,
            status: status.as_str().to_string(),
        }
    }

    pub fn insert(&self, conn: &mut PooledConnection) -> QueryResult<SubscriptionRow> {
        debug!(
            "Inserting subscription: {} {} (plan {})",
            self.processor, self.processor_id, self.processor_plan
        );
        diesel::insert_into(pay_subscriptions::table)
            .values(self)
            .get_result(conn)
    }
}
