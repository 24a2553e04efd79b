use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::billable::CardOnFile;
use crate::db::{PooledConnection, schema::*};

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Deserialize, Clone)]
#[diesel(table_name = billables)]
pub struct BillableRow {
    pub id: i32,
    pub created_at: i64,
    pub updated_at: i64,
    pub email: String,
    pub name: Option<String>,
    pub processor: String,
    pub processor_id: Option<String>,
    pub card_type: Option<String>,
    pub card_last4: Option<String>,
    pub card_exp_month: Option<i32>,
    pub card_exp_year: Option<i32>,
}

impl BillableRow {
    pub fn find(conn: &mut PooledConnection, billable_id: i32) -> QueryResult<Option<BillableRow>> {
        billables::table
            .filter(billables::id.eq(billable_id))
            .first::<BillableRow>(conn)
            .optional()
    }

    /// Resolve the local billable owning a remote customer.
    pub fn find_by_processor_id(
        conn: &mut PooledConnection,
        processor: &str,
        processor_id: &str,
    ) -> QueryResult<Option<BillableRow>> {
        billables::table
            .filter(billables::processor.eq(processor))
            .filter(billables::processor_id.eq(processor_id))
            .first::<BillableRow>(conn)
            .optional()
    }

    /// Record that a remote customer now exists for this billable.
    pub fn set_processor(
        conn: &mut PooledConnection,
        billable_id: i32,
        processor: &str,
        processor_id: &str,
    ) -> QueryResult<usize> {
        debug!(
            "Assigning {} customer {} to billable {}",
            processor, processor_id, billable_id
        );
        diesel::update(billables::table.filter(billables::id.eq(billable_id)))
            .set((
                billables::processor.eq(processor),
                billables::processor_id.eq(processor_id),
                billables::updated_at.eq(chrono::Utc::now().timestamp_millis()),
            ))
            .execute(conn)
    }

    /// Mirror (or clear) the card display fields cached from the processor.
    pub fn set_card(
        conn: &mut PooledConnection,
        billable_id: i32,
        card: Option<&CardOnFile>,
    ) -> QueryResult<usize> {
        diesel::update(billables::table.filter(billables::id.eq(billable_id)))
            .set((
                billables::card_type.eq(card.map(|c| c.brand.clone())),
                billables::card_last4.eq(card.map(|c| c.last4.clone())),
                billables::card_exp_month.eq(card.and_then(|c| c.exp_month)),
                billables::card_exp_year.eq(card.and_then(|c| c.exp_year)),
                billables::updated_at.eq(chrono::Utc::now().timestamp_millis()),
            ))
            .execute(conn)
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = billables)]
pub struct NewBillable {
    pub created_at: i64,
    pub updated_at: i64,
    pub email: String,
    pub name: Option<String>,
    pub processor: String,
    pub processor_id: Option<String>,
}

impl NewBillable {
    pub fn new(email: String, name: Option<String>, processor: String) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        Self {
            created_at: timestamp,
            updated_at: timestamp,
            email,
            name,
            processor,
            processor_id: None,
        }
    }

    pub fn insert(&self, conn: &mut PooledConnection) -> QueryResult<i32> {
        debug!("Inserting billable: {}", self.email);
        diesel::insert_into(billables::table)
            .values(self)
            .returning(billables::id)
            .get_result(conn)
    }
}
