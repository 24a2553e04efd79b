pub mod billable;
pub mod db;
pub mod error;
pub mod mailer;
pub mod payment;
pub mod processor;
pub mod webhooks;

pub use billable::Billable;
pub use error::{PayError, PayResult};
pub use payment::Payment;
pub use processor::Pay;
pub use webhooks::{WebhookEvent, WebhookRouter};
