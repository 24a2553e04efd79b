use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use paykit_types::PayConfig;
use tracing::{error, info, warn};

use crate::billable::Billable;
use crate::db::models::{ChargeRow, SubscriptionRow};

/// A composed, ready-to-send message handed to the delivery seam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachment>,
}

/// Processor-supplied document referenced from a message (e.g. a receipt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// External mail-delivery seam. Implementations send synchronously; the
/// worker thread provides the asynchrony.
pub trait MailDelivery: Send + 'static {
    fn deliver(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Default delivery that only logs, for environments without a mail stack.
pub struct LogMailDelivery;

impl MailDelivery for LogMailDelivery {
    fn deliver(&self, message: MailMessage) -> Result<(), MailError> {
        info!("Mail to {}: {}", message.to, message.subject);
        Ok(())
    }
}

/// Drains the mail queue into a [`MailDelivery`] on a dedicated thread.
/// Delivery failures are logged, never propagated; retry policy belongs to
/// the delivery backend.
pub fn spawn_delivery_worker<D: MailDelivery>(
    receiver: Receiver<MailMessage>,
    delivery: D,
) -> JoinHandle<()> {
    thread::spawn(move || {
        info!("Mail delivery worker started");
        while let Ok(message) = receiver.recv() {
            let to = message.to.clone();
            if let Err(e) = delivery.deliver(message) {
                error!("Failed to deliver mail to {}: {}", to, e);
            }
        }
        info!("Mail delivery worker stopped");
    })
}

/// Composes user notifications and enqueues them for asynchronous delivery.
///
/// Every compose method returns without composing when
/// `config.send_emails` is false.
#[derive(Debug, Clone)]
pub struct UserMailer {
    config: PayConfig,
    sender: Sender<MailMessage>,
}

impl UserMailer {
    pub fn new(config: PayConfig, sender: Sender<MailMessage>) -> Self {
        UserMailer { config, sender }
    }

    /// Mailer plus the receiving end of its queue, ready to hand to
    /// [`spawn_delivery_worker`].
    pub fn channel(config: PayConfig) -> (Self, Receiver<MailMessage>) {
        let (sender, receiver) = unbounded();
        (UserMailer::new(config, sender), receiver)
    }

    pub fn receipt(&self, user: &Billable, charge: &ChargeRow, receipt: Option<MailAttachment>) {
        if !self.config.send_emails {
            return;
        }
        let body = format!(
            "This is a receipt for your payment of {}.",
            format_amount(charge.amount, &charge.currency)
        );
        self.enqueue(MailMessage {
            to: user.mail_recipient(),
            subject: self.config.email_receipt_subject.clone(),
            body: self.with_signature(body),
            attachments: receipt.into_iter().collect(),
        });
    }

    pub fn refund(&self, user: &Billable, charge: &ChargeRow) {
        if !self.config.send_emails {
            return;
        }
        let body = format!(
            "Your payment of {} has been refunded.",
            format_amount(charge.amount, &charge.currency)
        );
        self.enqueue(MailMessage {
            to: user.mail_recipient(),
            subject: self.config.email_refund_subject.clone(),
            body: self.with_signature(body),
            attachments: Vec::new(),
        });
    }

    pub fn subscription_renewing(&self, user: &Billable, subscription: &SubscriptionRow) {
        if !self.config.send_emails {
            return;
        }
        let body = format!(
            "Your {} subscription is about to renew.",
            subscription.name
        );
        self.enqueue(MailMessage {
            to: user.mail_recipient(),
            subject: self.config.email_renewing_subject.clone(),
            body: self.with_signature(body),
            attachments: Vec::new(),
        });
    }

    pub fn payment_action_required(
        &self,
        user: &Billable,
        subscription: &SubscriptionRow,
        payment_intent_id: &str,
    ) {
        if !self.config.send_emails {
            return;
        }
        let body = format!(
            "The latest payment for your {} subscription needs to be confirmed. \
             Payment reference: {}.",
            subscription.name, payment_intent_id
        );
        self.enqueue(MailMessage {
            to: user.mail_recipient(),
            subject: self.config.email_action_required_subject.clone(),
            body: self.with_signature(body),
            attachments: Vec::new(),
        });
    }

    fn with_signature(&self, body: String) -> String {
        match &self.config.business_name {
            Some(name) => format!("{body}\n\n{name}"),
            None => body,
        }
    }

    fn enqueue(&self, message: MailMessage) {
        // A closed queue means the worker is gone; notifications are best
        // effort, so log and move on.
        if self.sender.send(message).is_err() {
            warn!("Mail queue is closed, dropping notification");
        }
    }
}

/// Minor units to a human-readable decimal, e.g. `(2900, "usd")` -> `$29.00`.
fn format_amount(amount: i64, currency: &str) -> String {
    let symbol = match currency.to_ascii_lowercase().as_str() {
        "usd" => "$",
        "eur" => "\u{20ac}",
        "gbp" => "\u{a3}",
        _ => "",
    };
    let formatted = format!("{}{}.{:02}", symbol, amount / 100, (amount % 100).abs());
    if symbol.is_empty() {
        format!("{} {}", formatted, currency.to_ascii_uppercase())
    } else {
        formatted
    }
}
