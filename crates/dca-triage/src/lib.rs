//! Case prioritization, agency matching, and SLA monitoring for debt-collection case management.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
