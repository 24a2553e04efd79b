use serde::{Deserialize, Serialize};

/// A Stripe reference that is either a bare id or an expanded object,
/// depending on whether the request asked for expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Object(Box<T>),
    Id(String),
}

impl<T> Expandable<T> {
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Object(object) => Some(object),
            Expandable::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_source: Option<String>,
    #[serde(default)]
    pub invoice_settings: Option<InvoiceSettings>,
    #[serde(default)]
    pub sources: Option<SourceList>,
}

impl StripeCustomer {
    pub fn default_payment_method(&self) -> Option<&str> {
        self.invoice_settings
            .as_ref()
            .and_then(|s| s.default_payment_method.as_deref())
    }

    /// The source object matching `default_source`, when the list is present.
    pub fn default_source_object(&self) -> Option<&StripeSource> {
        let default_id = self.default_source.as_deref()?;
        self.sources
            .as_ref()?
            .data
            .iter()
            .find(|s| s.id == default_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSettings {
    #[serde(default)]
    pub default_payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceList {
    #[serde(default)]
    pub data: Vec<StripeSource>,
}

/// Legacy card source attached to a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeSource {
    pub id: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub exp_month: Option<i32>,
    #[serde(default)]
    pub exp_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePaymentMethod {
    pub id: String,
    #[serde(default)]
    pub card: Option<PaymentMethodCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodCard {
    pub brand: String,
    pub last4: String,
    #[serde(default)]
    pub exp_month: Option<i32>,
    #[serde(default)]
    pub exp_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub payment_method_details: Option<PaymentMethodDetails>,
}

impl StripeCharge {
    pub fn card(&self) -> Option<&PaymentMethodCard> {
        self.payment_method_details.as_ref()?.card.as_ref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    #[serde(default)]
    pub card: Option<PaymentMethodCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub plan: Option<StripePlan>,
    #[serde(default)]
    pub latest_invoice: Option<Expandable<StripeInvoice>>,
}

impl StripeSubscription {
    /// The expanded payment intent of the latest invoice, when the create
    /// call asked for `latest_invoice.payment_intent`.
    pub fn latest_payment_intent(&self) -> Option<&StripePaymentIntent> {
        self.latest_invoice
            .as_ref()?
            .as_object()?
            .payment_intent
            .as_ref()?
            .as_object()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePlan {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<Expandable<StripePaymentIntent>>,
    #[serde(default)]
    pub amount_due: Option<i64>,
    #[serde(default)]
    pub paid: Option<bool>,
}

impl StripeInvoice {
    pub fn payment_intent_id(&self) -> Option<&str> {
        match self.payment_intent.as_ref()? {
            Expandable::Id(id) => Some(id),
            Expandable::Object(intent) => Some(&intent.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: PaymentIntentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeSetupIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}
