pub mod config;
pub mod processor;
pub mod subscription;

pub use config::PayConfig;
pub use processor::Processor;
pub use subscription::SubscriptionStatus;
