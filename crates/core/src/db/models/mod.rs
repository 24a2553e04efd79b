pub mod billable;
pub mod charge;
pub mod subscription;

pub use billable::{BillableRow, NewBillable};
pub use charge::{ChargeRow, NewCharge};
pub use subscription::{NewSubscription, SubscriptionRow};
