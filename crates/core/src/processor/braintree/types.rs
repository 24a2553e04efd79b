use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BraintreeCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub payment_methods: Vec<BraintreePaymentMethod>,
}

impl BraintreeCustomer {
    pub fn default_payment_method(&self) -> Option<&BraintreePaymentMethod> {
        self.payment_methods.iter().find(|pm| pm.default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BraintreePaymentMethod {
    pub token: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub card: Option<BraintreeCard>,
}

/// Card details as Braintree reports them: display-form brand
/// ("Visa") and string expiration fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BraintreeCard {
    pub card_type: String,
    pub last4: String,
    #[serde(default)]
    pub expiration_month: Option<String>,
    #[serde(default)]
    pub expiration_year: Option<String>,
}

impl BraintreeCard {
    pub fn exp_month(&self) -> Option<i32> {
        self.expiration_month.as_deref()?.parse().ok()
    }

    pub fn exp_year(&self) -> Option<i32> {
        self.expiration_year.as_deref()?.parse().ok()
    }
}

/// A sale transaction. Braintree amounts are decimal major-unit strings
/// ("29.00"), unlike Stripe's integer minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BraintreeTransaction {
    pub id: String,
    pub status: String,
    pub amount: String,
    #[serde(default = "default_currency")]
    pub currency_iso_code: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub card: Option<BraintreeCard>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl BraintreeTransaction {
    /// `"29.00"` -> `2900`. Unparseable amounts yield `None` rather than a
    /// silently wrong charge record.
    pub fn amount_minor_units(&self) -> Option<i64> {
        let (major, minor) = match self.amount.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (self.amount.as_str(), ""),
        };
        let major: i64 = major.parse().ok()?;
        let minor: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().ok()? * 10,
            2 => minor.parse().ok()?,
            _ => return None,
        };
        Some(major * 100 + minor)
    }
}

/// Minor units to Braintree's decimal string: `2900` -> `"29.00"`.
pub fn to_decimal_amount(minor_units: i64) -> String {
    format!("{}.{:02}", minor_units / 100, (minor_units % 100).abs())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BraintreeSubscription {
    pub id: String,
    pub status: String,
    pub plan_id: String,
    #[serde(default)]
    pub transactions: Vec<BraintreeTransaction>,
}
