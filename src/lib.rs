pub mod auditlog;
pub mod clients;
pub mod configuration;
pub mod error_handling;
pub mod scheduler;
