use std::sync::Mutex;

use super::api::{ChargeParams, CustomerUpdate, StripeApi, StripeApiError, SubscriptionParams};
use super::types::*;

#[derive(Debug, Default)]
struct FakeState {
    customer: Option<FakeCustomer>,
    attach_calls: usize,
    charge_seq: usize,
}

#[derive(Debug, Clone, Default)]
struct FakeCustomer {
    id: String,
    email: Option<String>,
    description: Option<String>,
    default_payment_method: Option<String>,
    default_source: Option<StripeSource>,
}

/// In-memory stand-in for the Stripe API seam.
pub(crate) struct FakeStripe {
    fail: Option<String>,
    subscription_status: String,
    intent_status: PaymentIntentStatus,
    state: Mutex<FakeState>,
}

impl Default for FakeStripe {
    fn default() -> Self {
        FakeStripe {
            fail: None,
            subscription_status: "active".to_string(),
            intent_status: PaymentIntentStatus::Succeeded,
            state: Mutex::new(FakeState::default()),
        }
    }
}

impl FakeStripe {
    /// A processor that rejects every call with the given message.
    pub fn rejecting(message: &str) -> Self {
        FakeStripe {
            fail: Some(message.to_string()),
            ..FakeStripe::default()
        }
    }

    pub fn with_subscription_status(mut self, status: &str) -> Self {
        self.subscription_status = status.to_string();
        self
    }

    pub fn with_intent_status(mut self, status: PaymentIntentStatus) -> Self {
        self.intent_status = status;
        self
    }

    pub fn attach_calls(&self) -> usize {
        self.state.lock().unwrap().attach_calls
    }

    pub fn set_default_source(&self, brand: &str, last4: &str, exp_month: i32, exp_year: i32) {
        let mut state = self.state.lock().unwrap();
        let customer = state.customer.get_or_insert_with(|| FakeCustomer {
            id: "cus_fake_1".to_string(),
            ..FakeCustomer::default()
        });
        customer.default_source = Some(StripeSource {
            id: "card_fake_1".to_string(),
            brand: Some(brand.to_string()),
            last4: Some(last4.to_string()),
            exp_month: Some(exp_month),
            exp_year: Some(exp_year),
        });
    }

    pub fn clear_default_source(&self) {
        if let Some(customer) = self.state.lock().unwrap().customer.as_mut() {
            customer.default_source = None;
        }
    }

    fn check_fail(&self) -> Result<(), StripeApiError> {
        match &self.fail {
            Some(message) => Err(StripeApiError {
                message: message.clone(),
                error_type: Some("card_error".to_string()),
                code: Some("card_declined".to_string()),
            }),
            None => Ok(()),
        }
    }

    fn customer_response(customer: &FakeCustomer) -> StripeCustomer {
        StripeCustomer {
            id: customer.id.clone(),
            email: customer.email.clone(),
            description: customer.description.clone(),
            default_source: customer.default_source.as_ref().map(|s| s.id.clone()),
            invoice_settings: Some(InvoiceSettings {
                default_payment_method: customer.default_payment_method.clone(),
            }),
            sources: Some(SourceList {
                data: customer.default_source.iter().cloned().collect(),
            }),
        }
    }

    fn visa_card() -> PaymentMethodCard {
        PaymentMethodCard {
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: Some(9),
            exp_year: Some(2031),
        }
    }

    fn payment_intent(&self, id: &str) -> StripePaymentIntent {
        StripePaymentIntent {
            id: id.to_string(),
            amount: 1500,
            client_secret: Some(format!("{id}_secret")),
            status: self.intent_status,
        }
    }
}

impl StripeApi for FakeStripe {
    async fn retrieve_customer(&self, id: &str) -> Result<StripeCustomer, StripeApiError> {
        self.check_fail()?;
        let state = self.state.lock().unwrap();
        match &state.customer {
            Some(customer) if customer.id == id => Ok(Self::customer_response(customer)),
            _ => Err(StripeApiError {
                message: format!("No such customer: {id}"),
                error_type: Some("invalid_request_error".to_string()),
                code: Some("resource_missing".to_string()),
            }),
        }
    }

    async fn create_customer(
        &self,
        email: &str,
        description: Option<&str>,
    ) -> Result<StripeCustomer, StripeApiError> {
        self.check_fail()?;
        let mut state = self.state.lock().unwrap();
        let customer = FakeCustomer {
            id: "cus_fake_1".to_string(),
            email: Some(email.to_string()),
            description: description.map(str::to_string),
            ..FakeCustomer::default()
        };
        let response = Self::customer_response(&customer);
        state.customer = Some(customer);
        Ok(response)
    }

    async fn update_customer(
        &self,
        id: &str,
        update: CustomerUpdate,
    ) -> Result<StripeCustomer, StripeApiError> {
        self.check_fail()?;
        let mut state = self.state.lock().unwrap();
        let customer = state.customer.get_or_insert_with(|| FakeCustomer {
            id: id.to_string(),
            ..FakeCustomer::default()
        });
        if let Some(email) = update.email {
            customer.email = Some(email);
        }
        if let Some(description) = update.description {
            customer.description = Some(description);
        }
        if let Some(payment_method) = update.default_payment_method {
            customer.default_payment_method = Some(payment_method);
        }
        Ok(Self::customer_response(customer))
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        _customer_id: &str,
    ) -> Result<StripePaymentMethod, StripeApiError> {
        self.check_fail()?;
        self.state.lock().unwrap().attach_calls += 1;
        Ok(StripePaymentMethod {
            id: payment_method_id.to_string(),
            card: Some(Self::visa_card()),
        })
    }

    async fn retrieve_payment_method(
        &self,
        id: &str,
    ) -> Result<StripePaymentMethod, StripeApiError> {
        self.check_fail()?;
        Ok(StripePaymentMethod {
            id: id.to_string(),
            card: Some(Self::visa_card()),
        })
    }

    async fn create_charge(&self, params: &ChargeParams) -> Result<StripeCharge, StripeApiError> {
        self.check_fail()?;
        let mut state = self.state.lock().unwrap();
        state.charge_seq += 1;
        Ok(StripeCharge {
            id: format!("ch_fake_{}", state.charge_seq),
            amount: params.amount,
            currency: params.currency.clone(),
            customer: Some(params.customer.clone()),
            receipt_url: Some("https://pay.stripe.com/receipts/fake".to_string()),
            refunded: false,
            payment_method_details: Some(PaymentMethodDetails {
                card: Some(Self::visa_card()),
            }),
        })
    }

    async fn create_subscription(
        &self,
        params: &SubscriptionParams,
    ) -> Result<StripeSubscription, StripeApiError> {
        self.check_fail()?;
        Ok(StripeSubscription {
            id: "sub_fake_1".to_string(),
            customer: params.customer.clone(),
            status: self.subscription_status.clone(),
            trial_end: None,
            cancel_at_period_end: false,
            current_period_end: Some(1_900_000_000),
            ended_at: None,
            plan: Some(StripePlan {
                id: params.plan.clone(),
            }),
            latest_invoice: Some(Expandable::Object(Box::new(StripeInvoice {
                id: "in_fake_1".to_string(),
                customer: Some(params.customer.clone()),
                subscription: Some("sub_fake_1".to_string()),
                payment_intent: Some(Expandable::Object(Box::new(
                    self.payment_intent("pi_fake_1"),
                ))),
                amount_due: Some(1500),
                paid: Some(self.intent_status == PaymentIntentStatus::Succeeded),
            }))),
        })
    }

    async fn retrieve_subscription(
        &self,
        id: &str,
        _expand: &[&str],
    ) -> Result<StripeSubscription, StripeApiError> {
        self.check_fail()?;
        Ok(StripeSubscription {
            id: id.to_string(),
            customer: "cus_fake_1".to_string(),
            status: self.subscription_status.clone(),
            trial_end: None,
            cancel_at_period_end: false,
            current_period_end: Some(1_900_000_000),
            ended_at: None,
            plan: None,
            latest_invoice: None,
        })
    }

    async fn retrieve_payment_intent(
        &self,
        id: &str,
    ) -> Result<StripePaymentIntent, StripeApiError> {
        self.check_fail()?;
        Ok(self.payment_intent(id))
    }

    async fn confirm_payment_intent(
        &self,
        id: &str,
    ) -> Result<StripePaymentIntent, StripeApiError> {
        self.check_fail()?;
        Ok(StripePaymentIntent {
            status: PaymentIntentStatus::Succeeded,
            ..self.payment_intent(id)
        })
    }

    async fn create_setup_intent(&self) -> Result<StripeSetupIntent, StripeApiError> {
        self.check_fail()?;
        Ok(StripeSetupIntent {
            id: "seti_fake_1".to_string(),
            client_secret: Some("seti_fake_1_secret".to_string()),
        })
    }

    async fn create_invoice(&self, customer_id: &str) -> Result<StripeInvoice, StripeApiError> {
        self.check_fail()?;
        Ok(StripeInvoice {
            id: "in_fake_2".to_string(),
            customer: Some(customer_id.to_string()),
            subscription: None,
            payment_intent: None,
            amount_due: Some(0),
            paid: Some(false),
        })
    }

    async fn pay_invoice(&self, invoice_id: &str) -> Result<StripeInvoice, StripeApiError> {
        self.check_fail()?;
        Ok(StripeInvoice {
            id: invoice_id.to_string(),
            customer: Some("cus_fake_1".to_string()),
            subscription: None,
            payment_intent: None,
            amount_due: Some(0),
            paid: Some(true),
        })
    }

    async fn upcoming_invoice(&self, customer_id: &str) -> Result<StripeInvoice, StripeApiError> {
        self.check_fail()?;
        Ok(StripeInvoice {
            id: "in_upcoming".to_string(),
            customer: Some(customer_id.to_string()),
            subscription: None,
            payment_intent: None,
            amount_due: Some(1500),
            paid: Some(false),
        })
    }
}
