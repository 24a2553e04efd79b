use base64::Engine;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use super::types::*;

pub const BRAINTREE_API_BASE: &str = "https://payments.braintree-api.com/graphql";
pub const BRAINTREE_SANDBOX_API_BASE: &str = "https://payments.sandbox.braintree-api.com/graphql";
const BRAINTREE_VERSION: &str = "2019-01-01";

/// Error returned by the Braintree API (or the transport talking to it).
#[derive(Debug, Clone, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct BraintreeApiError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl BraintreeApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        BraintreeApiError {
            message: message.into(),
            code: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaleParams {
    /// Decimal major-unit amount, e.g. `"29.00"`.
    pub amount: String,
    pub customer_id: String,
    pub payment_method_token: Option<String>,
    pub submit_for_settlement: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BraintreeSubscriptionParams {
    pub plan_id: String,
    pub payment_method_token: String,
    pub trial_from_plan: bool,
}

/// The seam over Braintree's documented API contract, mirroring the shape of
/// the Stripe seam: one method per call the adapter makes.
#[allow(async_fn_in_trait)]
pub trait BraintreeApi: Send + Sync {
    async fn find_customer(&self, id: &str) -> Result<BraintreeCustomer, BraintreeApiError>;
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        payment_method_nonce: Option<&str>,
    ) -> Result<BraintreeCustomer, BraintreeApiError>;
    async fn update_customer(
        &self,
        id: &str,
        email: &str,
        name: Option<&str>,
    ) -> Result<BraintreeCustomer, BraintreeApiError>;
    async fn vault_payment_method(
        &self,
        customer_id: &str,
        payment_method_nonce: &str,
        make_default: bool,
    ) -> Result<BraintreePaymentMethod, BraintreeApiError>;
    async fn sale(&self, params: &SaleParams) -> Result<BraintreeTransaction, BraintreeApiError>;
    async fn create_subscription(
        &self,
        params: &BraintreeSubscriptionParams,
    ) -> Result<BraintreeSubscription, BraintreeApiError>;
}

/// GraphQL client for the Braintree payments API.
#[derive(Debug, Clone)]
pub struct BraintreeClient {
    http: reqwest::Client,
    endpoint: Url,
    authorization: String,
}

impl BraintreeClient {
    pub fn new(public_key: &str, private_key: &str) -> Self {
        // BRAINTREE_API_BASE is a valid url.
        Self::with_endpoint(public_key, private_key, Url::parse(BRAINTREE_API_BASE).unwrap())
    }

    pub fn sandbox(public_key: &str, private_key: &str) -> Self {
        Self::with_endpoint(
            public_key,
            private_key,
            Url::parse(BRAINTREE_SANDBOX_API_BASE).unwrap(),
        )
    }

    pub fn with_endpoint(public_key: &str, private_key: &str, endpoint: Url) -> Self {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{public_key}:{private_key}"));
        BraintreeClient {
            http: reqwest::Client::new(),
            endpoint,
            authorization: format!("Basic {credentials}"),
        }
    }

    /// Execute a query and extract the payload at `data.<root>`.
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        root: &[&str],
    ) -> Result<T, BraintreeApiError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Authorization", &self.authorization)
            .header("Braintree-Version", BRAINTREE_VERSION)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| BraintreeApiError::transport(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BraintreeApiError::transport(e.to_string()))?;

        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if let Some(first) = errors.first() {
                return Err(BraintreeApiError {
                    message: first
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown Braintree error")
                        .to_string(),
                    code: first
                        .pointer("/extensions/legacyCode")
                        .and_then(|c| c.as_str())
                        .map(str::to_string),
                });
            }
        }
        if !status.is_success() {
            return Err(BraintreeApiError::transport(format!(
                "Braintree returned HTTP {status}"
            )));
        }

        let mut node = body
            .get("data")
            .ok_or_else(|| BraintreeApiError::transport("Braintree response without data"))?;
        for key in root {
            node = node.get(key).ok_or_else(|| {
                BraintreeApiError::transport(format!("missing {key} in Braintree response"))
            })?;
        }
        serde_json::from_value(node.clone()).map_err(|e| {
            BraintreeApiError::transport(format!("unexpected Braintree response shape: {e}"))
        })
    }
}

const CUSTOMER_FIELDS: &str = r#"
    id
    email
    paymentMethods {
        token
        default
        card { cardType last4 expirationMonth expirationYear }
    }
"#;

impl BraintreeApi for BraintreeClient {
    async fn find_customer(&self, id: &str) -> Result<BraintreeCustomer, BraintreeApiError> {
        let query = format!(
            "query Customer($id: ID!) {{ node(id: $id) {{ ... on Customer {{ {CUSTOMER_FIELDS} }} }} }}"
        );
        self.execute(&query, json!({ "id": id }), &["node"]).await
    }

    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        payment_method_nonce: Option<&str>,
    ) -> Result<BraintreeCustomer, BraintreeApiError> {
        let query = format!(
            "mutation CreateCustomer($input: CreateCustomerInput!) {{ \
             createCustomer(input: $input) {{ customer {{ {CUSTOMER_FIELDS} }} }} }}"
        );
        let variables = json!({
            "input": {
                "customer": {
                    "email": email,
                    "company": name,
                    "paymentMethodNonce": payment_method_nonce,
                }
            }
        });
        self.execute(&query, variables, &["createCustomer", "customer"])
            .await
    }

    async fn update_customer(
        &self,
        id: &str,
        email: &str,
        name: Option<&str>,
    ) -> Result<BraintreeCustomer, BraintreeApiError> {
        let query = format!(
            "mutation UpdateCustomer($input: UpdateCustomerInput!) {{ \
             updateCustomer(input: $input) {{ customer {{ {CUSTOMER_FIELDS} }} }} }}"
        );
        let variables = json!({
            "input": {
                "customerId": id,
                "customer": { "email": email, "company": name }
            }
        });
        self.execute(&query, variables, &["updateCustomer", "customer"])
            .await
    }

    async fn vault_payment_method(
        &self,
        customer_id: &str,
        payment_method_nonce: &str,
        make_default: bool,
    ) -> Result<BraintreePaymentMethod, BraintreeApiError> {
        let query = "mutation VaultPaymentMethod($input: VaultPaymentMethodInput!) { \
             vaultPaymentMethod(input: $input) { paymentMethod { \
             token default card { cardType last4 expirationMonth expirationYear } } } }";
        let variables = json!({
            "input": {
                "paymentMethodId": payment_method_nonce,
                "customerId": customer_id,
                "makeDefault": make_default,
            }
        });
        self.execute(query, variables, &["vaultPaymentMethod", "paymentMethod"])
            .await
    }

    async fn sale(&self, params: &SaleParams) -> Result<BraintreeTransaction, BraintreeApiError> {
        let query = "mutation ChargePaymentMethod($input: ChargePaymentMethodInput!) { \
             chargePaymentMethod(input: $input) { transaction { \
             id status amount customerId \
             card { cardType last4 expirationMonth expirationYear } } } }";
        let variables = json!({
            "input": {
                "paymentMethodId": params.payment_method_token,
                "transaction": {
                    "amount": params.amount,
                    "customerId": params.customer_id,
                    "options": { "submitForSettlement": params.submit_for_settlement },
                }
            }
        });
        self.execute(query, variables, &["chargePaymentMethod", "transaction"])
            .await
    }

    async fn create_subscription(
        &self,
        params: &BraintreeSubscriptionParams,
    ) -> Result<BraintreeSubscription, BraintreeApiError> {
        let query = "mutation CreateSubscription($input: CreateSubscriptionInput!) { \
             createSubscription(input: $input) { subscription { id status planId } } }";
        let variables = json!({
            "input": {
                "planId": params.plan_id,
                "paymentMethodId": params.payment_method_token,
                "options": { "trialFromPlan": params.trial_from_plan },
            }
        });
        self.execute(query, variables, &["createSubscription", "subscription"])
            .await
    }
}
