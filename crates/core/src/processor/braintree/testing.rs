use std::sync::Mutex;

use super::api::{BraintreeApi, BraintreeApiError, BraintreeSubscriptionParams, SaleParams};
use super::types::*;

#[derive(Debug, Default)]
struct FakeState {
    customer: Option<BraintreeCustomer>,
    last_sale_amount: Option<String>,
    sale_seq: usize,
}

/// In-memory stand-in for the Braintree API seam.
pub(crate) struct FakeBraintree {
    fail: Option<String>,
    subscription_status: String,
    state: Mutex<FakeState>,
}

impl Default for FakeBraintree {
    fn default() -> Self {
        FakeBraintree {
            fail: None,
            subscription_status: "Active".to_string(),
            state: Mutex::new(FakeState::default()),
        }
    }
}

impl FakeBraintree {
    pub fn rejecting(message: &str) -> Self {
        FakeBraintree {
            fail: Some(message.to_string()),
            ..FakeBraintree::default()
        }
    }

    pub fn last_sale_amount(&self) -> Option<String> {
        self.state.lock().unwrap().last_sale_amount.clone()
    }

    fn check_fail(&self) -> Result<(), BraintreeApiError> {
        match &self.fail {
            Some(message) => Err(BraintreeApiError {
                message: message.clone(),
                code: Some("2000".to_string()),
            }),
            None => Ok(()),
        }
    }

    fn visa() -> BraintreeCard {
        BraintreeCard {
            card_type: "Visa".to_string(),
            last4: "4242".to_string(),
            expiration_month: Some("9".to_string()),
            expiration_year: Some("2031".to_string()),
        }
    }

    fn vaulted(token: &str) -> BraintreePaymentMethod {
        BraintreePaymentMethod {
            token: format!("token_{token}"),
            default: true,
            card: Some(Self::visa()),
        }
    }
}

impl BraintreeApi for FakeBraintree {
    async fn find_customer(&self, id: &str) -> Result<BraintreeCustomer, BraintreeApiError> {
        self.check_fail()?;
        let state = self.state.lock().unwrap();
        match &state.customer {
            Some(customer) if customer.id == id => Ok(customer.clone()),
            _ => Err(BraintreeApiError {
                message: format!("customer {id} not found"),
                code: Some("91602".to_string()),
            }),
        }
    }

    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        payment_method_nonce: Option<&str>,
    ) -> Result<BraintreeCustomer, BraintreeApiError> {
        self.check_fail()?;
        let customer = BraintreeCustomer {
            id: "bt_cust_1".to_string(),
            email: Some(email.to_string()),
            company: name.map(str::to_string),
            payment_methods: payment_method_nonce
                .map(|nonce| vec![Self::vaulted(nonce)])
                .unwrap_or_default(),
        };
        self.state.lock().unwrap().customer = Some(customer.clone());
        Ok(customer)
    }

    async fn update_customer(
        &self,
        id: &str,
        email: &str,
        name: Option<&str>,
    ) -> Result<BraintreeCustomer, BraintreeApiError> {
        self.check_fail()?;
        let mut state = self.state.lock().unwrap();
        let customer = state
            .customer
            .as_mut()
            .filter(|c| c.id == id)
            .ok_or_else(|| BraintreeApiError {
                message: format!("customer {id} not found"),
                code: Some("91602".to_string()),
            })?;
        customer.email = Some(email.to_string());
        customer.company = name.map(str::to_string);
        Ok(customer.clone())
    }

    async fn vault_payment_method(
        &self,
        customer_id: &str,
        payment_method_nonce: &str,
        make_default: bool,
    ) -> Result<BraintreePaymentMethod, BraintreeApiError> {
        self.check_fail()?;
        let mut payment_method = Self::vaulted(payment_method_nonce);
        payment_method.default = make_default;
        let mut state = self.state.lock().unwrap();
        if let Some(customer) = state.customer.as_mut().filter(|c| c.id == customer_id) {
            if make_default {
                for pm in &mut customer.payment_methods {
                    pm.default = false;
                }
            }
            customer.payment_methods.push(payment_method.clone());
        }
        Ok(payment_method)
    }

    async fn sale(&self, params: &SaleParams) -> Result<BraintreeTransaction, BraintreeApiError> {
        self.check_fail()?;
        if params.payment_method_token.is_none() {
            return Err(BraintreeApiError {
                message: "payment method token is required".to_string(),
                code: Some("91508".to_string()),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.sale_seq += 1;
        state.last_sale_amount = Some(params.amount.clone());
        Ok(BraintreeTransaction {
            id: format!("bt_tx_{}", state.sale_seq),
            status: "submitted_for_settlement".to_string(),
            amount: params.amount.clone(),
            currency_iso_code: "USD".to_string(),
            customer_id: Some(params.customer_id.clone()),
            card: Some(Self::visa()),
        })
    }

    async fn create_subscription(
        &self,
        params: &BraintreeSubscriptionParams,
    ) -> Result<BraintreeSubscription, BraintreeApiError> {
        self.check_fail()?;
        Ok(BraintreeSubscription {
            id: "bt_sub_1".to_string(),
            status: self.subscription_status.clone(),
            plan_id: params.plan_id.clone(),
            transactions: Vec::new(),
        })
    }
}
