//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, intervals, timeouts)
//! - TLS material is all-or-none and every file is readable and non-empty
//!
//! All problems are reported, not just the first.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{secs_to_duration, StoreConfig, WatchConfig, WatcherConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("The store address needs to be specified")]
    EmptyAddress,

    #[error("Invalid store port '{0}'")]
    InvalidPort(u32),

    #[error(
        "Either set all TLS auth options (ca_cert, priv_key, cert_chain), or none of them"
    )]
    IncompleteTls,

    #[error("Cannot access file '{path}': {reason}")]
    UnreadableFile { path: String, reason: String },

    #[error("No contents in file '{0}'")]
    EmptyFile(String),

    #[error("'{0}' must be greater than zero")]
    ZeroValue(&'static str),

    #[error("'{name}' must be a positive number of seconds, got {value}")]
    InvalidInterval { name: &'static str, value: f64 },
}

/// Validate a loaded configuration.
pub fn validate_config(config: &WatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_store(&config.store, &mut errors);
    validate_watch(&config.watch, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate only the store connection parameters.
pub fn validate_store_config(store: &StoreConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    validate_store(store, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_store(store: &StoreConfig, errors: &mut Vec<ValidationError>) {
    if store.addr.trim().is_empty() {
        errors.push(ValidationError::EmptyAddress);
    }
    if !(0 < store.port && store.port < 65535) {
        errors.push(ValidationError::InvalidPort(store.port));
    }

    let cert_args = [&store.ca_cert, &store.priv_key, &store.cert_chain];
    let given = cert_args.iter().filter(|p| p.is_some()).count();
    if given == 0 {
        return;
    }
    if given != cert_args.len() {
        errors.push(ValidationError::IncompleteTls);
        return;
    }
    for path in cert_args.into_iter().flatten() {
        if let Err(e) = check_readable(path) {
            errors.push(e);
        }
    }
}

fn validate_watch(watch: &WatchConfig, errors: &mut Vec<ValidationError>) {
    for (name, value) in [
        ("connect_check_secs", watch.connect_check_secs),
        ("call_timeout_secs", watch.call_timeout_secs),
    ] {
        if secs_to_duration(value).is_zero() {
            errors.push(ValidationError::InvalidInterval { name, value });
        }
    }
    if watch.poll_retry_base_ms == 0 {
        errors.push(ValidationError::ZeroValue("poll_retry_base_ms"));
    }
}

fn check_readable(path: &Path) -> Result<(), ValidationError> {
    let content = fs::read(path).map_err(|e| ValidationError::UnreadableFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    if content.is_empty() {
        return Err(ValidationError::EmptyFile(path.display().to_string()));
    }
    Ok(())
}
