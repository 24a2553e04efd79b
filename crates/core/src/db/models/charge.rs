use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{PooledConnection, schema::*};

/// Local mirror of a single processor charge. Immutable once created.
#[derive(
    Debug, Queryable, Identifiable, Selectable, Associations, Serialize, Deserialize, Clone,
)]
#[diesel(belongs_to(super::billable::BillableRow, foreign_key = billable_id))]
#[diesel(table_name = pay_charges)]
pub struct ChargeRow {
    pub id: i32,
    pub created_at: i64,
    pub billable_id: i32,
    pub processor: String,
    pub processor_id: String,
    pub amount: i64,
    pub currency: String,
    pub card_type: Option<String>,
    pub card_last4: Option<String>,
}

impl ChargeRow {
    pub fn find_by_processor_id(
        conn: &mut PooledConnection,
        processor: &str,
        processor_id: &str,
    ) -> QueryResult<Option<ChargeRow>> {
        pay_charges::table
            .filter(pay_charges::processor.eq(processor))
            .filter(pay_charges::processor_id.eq(processor_id))
            .first::<ChargeRow>(conn)
            .optional()
    }

    pub fn list_for_billable(
        conn: &mut PooledConnection,
        billable_id: i32,
    ) -> QueryResult<Vec<ChargeRow>> {
        pay_charges::table
            .filter(pay_charges::billable_id.eq(billable_id))
            .order(pay_charges::created_at.desc())
            .load::<ChargeRow>(conn)
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = pay_charges)]
pub struct NewCharge {
    pub created_at: i64,
    pub billable_id: i32,
    pub processor: String,
    pub processor_id: String,
    pub amount: i64,
    pub currency: String,
    pub card_type: Option<String>,
    pub card_last4: Option<String>,
}

impl NewCharge {
    pub fn new(
        billable_id: i32,
        processor: String,
        processor_id: String,
        amount: i64,
        currency: String,
        card_type: Option<String>,
        card_last4: Option<String>,
    ) -> Self {
        Self {
            created_at: chrono::Utc::now().timestamp_millis(),
            billable_id,
            processor,
            processor_id,
            amount,
            currency,
            card_type,
            card_last4,
        }
    }

    pub fn insert(&self, conn: &mut PooledConnection) -> QueryResult<ChargeRow> {
        debug!(
            "Inserting charge: {} {} ({} {})",
            self.processor, self.processor_id, self.amount, self.currency
        );
        diesel::insert_into(pay_charges::table)
            .values(self)
            .get_result(conn)
    }
}
