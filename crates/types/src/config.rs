/// Process-wide billing configuration.
///
/// Built once at startup and borrowed by the adapters, webhook router, and
/// mailer. There is deliberately no mutable global: components that need a
/// flag receive the struct.
#[derive(Debug, Clone)]
pub struct PayConfig {
    /// Master switch for all user notifications. When false, webhook handlers
    /// complete without composing any mail.
    pub send_emails: bool,
    /// ISO currency code used when a charge request does not override it.
    pub default_currency: String,
    /// Optional business name used in mail bodies.
    pub business_name: Option<String>,
    pub email_receipt_subject: String,
    pub email_refund_subject: String,
    pub email_renewing_subject: String,
    pub email_action_required_subject: String,
}

impl Default for PayConfig {
    fn default() -> Self {
        PayConfig {
            send_emails: true,
            default_currency: "usd".to_string(),
            business_name: None,
            email_receipt_subject: "Payment receipt".to_string(),
            email_refund_subject: "Payment refunded".to_string(),
            email_renewing_subject: "Your upcoming subscription renewal".to_string(),
            email_action_required_subject: "Confirm your payment".to_string(),
        }
    }
}

impl PayConfig {
    /// Configuration with notifications disabled, for environments that run
    /// webhook processing without a mail stack.
    pub fn silent() -> Self {
        PayConfig {
            send_emails: false,
            ..PayConfig::default()
        }
    }
}
