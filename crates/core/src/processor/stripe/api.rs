use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::types::*;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1/";

/// Error returned by the Stripe API (or by the transport talking to it).
#[derive(Debug, Clone, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct StripeApiError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl StripeApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        StripeApiError {
            message: message.into(),
            error_type: Some("transport_error".to_string()),
            code: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeApiError,
}

/// Parameters for a synchronous charge. `extra` carries caller-supplied
/// overrides merged into the request form.
#[derive(Debug, Clone, Default)]
pub struct ChargeParams {
    pub amount: i64,
    pub currency: String,
    pub customer: String,
    pub description: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl ChargeParams {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), self.amount.to_string()),
            ("currency".to_string(), self.currency.clone()),
            ("customer".to_string(), self.customer.clone()),
        ];
        if let Some(description) = &self.description {
            form.push(("description".to_string(), description.clone()));
        }
        form.extend(self.extra.iter().cloned());
        form
    }
}

/// Parameters for a subscription create call. The latest invoice's payment
/// intent is always expanded so incomplete subscriptions can be validated
/// synchronously.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionParams {
    pub customer: String,
    pub plan: String,
    pub off_session: bool,
    pub trial_from_plan: bool,
    pub extra: Vec<(String, String)>,
}

impl SubscriptionParams {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("customer".to_string(), self.customer.clone()),
            ("items[0][plan]".to_string(), self.plan.clone()),
            ("off_session".to_string(), self.off_session.to_string()),
            (
                "trial_from_plan".to_string(),
                self.trial_from_plan.to_string(),
            ),
            (
                "expand[0]".to_string(),
                "latest_invoice.payment_intent".to_string(),
            ),
        ];
        form.extend(self.extra.iter().cloned());
        form
    }
}

/// Fields pushed to the remote customer object.
#[derive(Debug, Clone, Default)]
pub struct CustomerUpdate {
    pub email: Option<String>,
    pub description: Option<String>,
    pub default_payment_method: Option<String>,
}

impl CustomerUpdate {
    fn to_form(&self) -> Vec<(String, String)> {
        let mut form = Vec::new();
        if let Some(email) = &self.email {
            form.push(("email".to_string(), email.clone()));
        }
        if let Some(description) = &self.description {
            form.push(("description".to_string(), description.clone()));
        }
        if let Some(payment_method) = &self.default_payment_method {
            form.push((
                "invoice_settings[default_payment_method]".to_string(),
                payment_method.clone(),
            ));
        }
        form
    }
}

/// The seam over Stripe's documented REST contract. One method per call the
/// adapter makes; tests substitute a fake, production uses [`StripeClient`].
#[allow(async_fn_in_trait)]
pub trait StripeApi: Send + Sync {
    async fn retrieve_customer(&self, id: &str) -> Result<StripeCustomer, StripeApiError>;
    async fn create_customer(
        &self,
        email: &str,
        description: Option<&str>,
    ) -> Result<StripeCustomer, StripeApiError>;
    async fn update_customer(
        &self,
        id: &str,
        update: CustomerUpdate,
    ) -> Result<StripeCustomer, StripeApiError>;
    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<StripePaymentMethod, StripeApiError>;
    async fn retrieve_payment_method(&self, id: &str)
    -> Result<StripePaymentMethod, StripeApiError>;
    async fn create_charge(&self, params: &ChargeParams) -> Result<StripeCharge, StripeApiError>;
    async fn create_subscription(
        &self,
        params: &SubscriptionParams,
    ) -> Result<StripeSubscription, StripeApiError>;
    async fn retrieve_subscription(
        &self,
        id: &str,
        expand: &[&str],
    ) -> Result<StripeSubscription, StripeApiError>;
    async fn retrieve_payment_intent(
        &self,
        id: &str,
    ) -> Result<StripePaymentIntent, StripeApiError>;
    async fn confirm_payment_intent(
        &self,
        id: &str,
    ) -> Result<StripePaymentIntent, StripeApiError>;
    async fn create_setup_intent(&self) -> Result<StripeSetupIntent, StripeApiError>;
    async fn create_invoice(&self, customer_id: &str) -> Result<StripeInvoice, StripeApiError>;
    async fn pay_invoice(&self, invoice_id: &str) -> Result<StripeInvoice, StripeApiError>;
    async fn upcoming_invoice(&self, customer_id: &str) -> Result<StripeInvoice, StripeApiError>;
}

/// Form-encoded REST client for the Stripe API.
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: Url,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        // STRIPE_API_BASE is a valid url.
        let base_url = Url::parse(STRIPE_API_BASE).unwrap();
        Self::with_base_url(secret_key, base_url)
    }

    /// Point the client at a Stripe-compatible endpoint (sandbox, mock).
    pub fn with_base_url(secret_key: impl Into<String>, base_url: Url) -> Self {
        StripeClient {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> Result<Url, StripeApiError> {
        self.base_url
            .join(path)
            .map_err(|e| StripeApiError::transport(format!("invalid request path {path}: {e}")))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, StripeApiError> {
        let response = self
            .http
            .get(self.url(path)?)
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await
            .map_err(|e| StripeApiError::transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, StripeApiError> {
        let response = self
            .http
            .post(self.url(path)?)
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| StripeApiError::transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StripeApiError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StripeApiError::transport(e.to_string()))?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| {
                StripeApiError::transport(format!("unexpected Stripe response shape: {e}"))
            })
        } else {
            match serde_json::from_str::<StripeErrorEnvelope>(&body) {
                Ok(envelope) => Err(envelope.error),
                Err(_) => Err(StripeApiError::transport(format!(
                    "Stripe returned HTTP {status}"
                ))),
            }
        }
    }
}

impl StripeApi for StripeClient {
    async fn retrieve_customer(&self, id: &str) -> Result<StripeCustomer, StripeApiError> {
        self.get(&format!("customers/{id}"), &[("expand[0]", "sources")])
            .await
    }

    async fn create_customer(
        &self,
        email: &str,
        description: Option<&str>,
    ) -> Result<StripeCustomer, StripeApiError> {
        let mut form = vec![("email".to_string(), email.to_string())];
        if let Some(description) = description {
            form.push(("description".to_string(), description.to_string()));
        }
        self.post("customers", &form).await
    }

    async fn update_customer(
        &self,
        id: &str,
        update: CustomerUpdate,
    ) -> Result<StripeCustomer, StripeApiError> {
        self.post(&format!("customers/{id}"), &update.to_form()).await
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<StripePaymentMethod, StripeApiError> {
        self.post(
            &format!("payment_methods/{payment_method_id}/attach"),
            &[("customer".to_string(), customer_id.to_string())],
        )
        .await
    }

    async fn retrieve_payment_method(
        &self,
        id: &str,
    ) -> Result<StripePaymentMethod, StripeApiError> {
        self.get(&format!("payment_methods/{id}"), &[]).await
    }

    async fn create_charge(&self, params: &ChargeParams) -> Result<StripeCharge, StripeApiError> {
        self.post("charges", &params.to_form()).await
    }

    async fn create_subscription(
        &self,
        params: &SubscriptionParams,
    ) -> Result<StripeSubscription, StripeApiError> {
        self.post("subscriptions", &params.to_form()).await
    }

    async fn retrieve_subscription(
        &self,
        id: &str,
        expand: &[&str],
    ) -> Result<StripeSubscription, StripeApiError> {
        let query: Vec<(String, String)> = expand
            .iter()
            .enumerate()
            .map(|(i, path)| (format!("expand[{i}]"), path.to_string()))
            .collect();
        let query: Vec<(&str, &str)> = query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.get(&format!("subscriptions/{id}"), &query).await
    }

    async fn retrieve_payment_intent(
        &self,
        id: &str,
    ) -> Result<StripePaymentIntent, StripeApiError> {
        self.get(&format!("payment_intents/{id}"), &[]).await
    }

    async fn confirm_payment_intent(
        &self,
        id: &str,
    ) -> Result<StripePaymentIntent, StripeApiError> {
        self.post(&format!("payment_intents/{id}/confirm"), &[]).await
    }

    async fn create_setup_intent(&self) -> Result<StripeSetupIntent, StripeApiError> {
        self.post("setup_intents", &[]).await
    }

    async fn create_invoice(&self, customer_id: &str) -> Result<StripeInvoice, StripeApiError> {
        self.post(
            "invoices",
            &[("customer".to_string(), customer_id.to_string())],
        )
        .await
    }

    async fn pay_invoice(&self, invoice_id: &str) -> Result<StripeInvoice, StripeApiError> {
        self.post(&format!("invoices/{invoice_id}/pay"), &[]).await
    }

    async fn upcoming_invoice(&self, customer_id: &str) -> Result<StripeInvoice, StripeApiError> {
        self.get("invoices/upcoming", &[("customer", customer_id)])
            .await
    }
}
