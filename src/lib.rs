pub mod cli;
pub mod configuration;
pub mod dispatch;
pub mod domain;
pub mod email_client;
pub mod resolve;
pub mod smtp_client;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod transport;
