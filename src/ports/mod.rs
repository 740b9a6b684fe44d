//! Ports (interfaces) decoupling the forwarding core from persistence.
pub mod credential_store;
pub mod log_store;
