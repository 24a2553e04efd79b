use paykit_types::Processor;

use crate::db::models::BillableRow;

/// The owning entity capable of being charged or subscribed.
///
/// Mirrors a `billables` row plus the transient `card_token`: a write-only
/// token produced by client-side tokenization, consumed the next time a
/// remote customer is created or a card is attached. It is never persisted.
#[derive(Debug, Clone)]
pub struct Billable {
    pub id: i32,
    pub email: String,
    pub name: Option<String>,
    pub processor: Processor,
    pub processor_id: Option<String>,
    pub card_type: Option<String>,
    pub card_last4: Option<String>,
    pub card_exp_month: Option<i32>,
    pub card_exp_year: Option<i32>,
    pub card_token: Option<String>,
}

impl Billable {
    /// Name used as the customer description and in mail recipients.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// `"Name <email>"` when a display name exists, else the bare email.
    pub fn mail_recipient(&self) -> String {
        match self.display_name() {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }

    pub fn has_processor_customer(&self) -> bool {
        self.processor_id.is_some()
    }

    pub(crate) fn set_card(&mut self, card: Option<CardOnFile>) {
        match card {
            Some(card) => {
                self.card_type = Some(card.brand);
                self.card_last4 = Some(card.last4);
                self.card_exp_month = card.exp_month;
                self.card_exp_year = card.exp_year;
            }
            None => {
                self.card_type = None;
                self.card_last4 = None;
                self.card_exp_month = None;
                self.card_exp_year = None;
            }
        }
        // The pending token has been consumed (or superseded).
        self.card_token = None;
    }
}

impl From<BillableRow> for Billable {
    fn from(row: BillableRow) -> Self {
        Billable {
            id: row.id,
            email: row.email,
            name: row.name,
            processor: row.processor.parse().unwrap_or(Processor::None),
            processor_id: row.processor_id,
            card_type: row.card_type,
            card_last4: row.card_last4,
            card_exp_month: row.card_exp_month,
            card_exp_year: row.card_exp_year,
            card_token: None,
        }
    }
}

/// Card display details mirrored from the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardOnFile {
    pub brand: String,
    pub last4: String,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn billable() -> Billable {
        Billable {
            id: 1,
            email: "johnny@appleseed.com".to_string(),
            name: None,
            processor: Processor::Stripe,
            processor_id: None,
            card_type: None,
            card_last4: None,
            card_exp_month: None,
            card_exp_year: None,
            card_token: None,
        }
    }

    #[test]
    fn mail_recipient_includes_name_when_present() {
        let mut b = billable();
        assert_eq!(b.mail_recipient(), "johnny@appleseed.com");
        b.name = Some("Johnny Appleseed".to_string());
        assert_eq!(b.mail_recipient(), "Johnny Appleseed <johnny@appleseed.com>");
    }

    #[test]
    fn set_card_clears_pending_token() {
        let mut b = billable();
        b.card_token = Some("pm_123".to_string());
        b.set_card(Some(CardOnFile {
            brand: "Visa".to_string(),
            last4: "4242".to_string(),
            exp_month: Some(9),
            exp_year: Some(2031),
        }));
        assert_eq!(b.card_type.as_deref(), Some("Visa"));
        assert_eq!(b.card_last4.as_deref(), Some("4242"));
        assert!(b.card_token.is_none());

        b.set_card(None);
        assert!(b.card_type.is_none());
        assert!(b.card_last4.is_none());
    }
}
