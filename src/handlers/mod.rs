pub mod common;
pub mod domains;
pub mod health;
pub mod payment_webhooks;

pub use common::CurrentProfile;
