pub mod domain_order;
pub mod processed_webhook_event;
pub mod profile;
