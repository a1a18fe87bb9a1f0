//! Shared configuration, feature flags, and errors for Daybook.
//!
//! This crate provides the pieces every other crate agrees on:
//! - Application and batch-job configuration
//! - Feature-variant lookup for dynamically tuned settings
//! - Application-wide error types

pub mod config;
pub mod error;
pub mod flags;

pub use config::{
    AppConfig, DatabaseConfig, JobConfig, NotificationConfig, PersistMode, RetryConfig,
};
pub use error::{AppError, AppResult};
pub use flags::{FeatureFlags, StaticFlags};
