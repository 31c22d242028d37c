//! Diagnostics engine: domain types, the single-flight job registry, the
//! external tool runner, the report builder and the logging category
//! configuration.

pub mod error;
pub mod files;
pub mod hashing;
pub mod jobs;
pub mod logging;
pub mod report;
pub mod system_info;
pub mod tools;
pub mod types;
