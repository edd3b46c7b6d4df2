pub mod config;
pub mod domain;
pub mod error;
pub mod storage;
pub mod telemetry;

pub use config::InvoicesConfig;
pub use error::{BillingError, Result};
