//! API key handling
//!
//! Provider credentials come from the environment (never from the config
//! file) and are held in a [`SecretString`] so they cannot leak through
//! `Debug` output or logs.

pub mod string;

pub use string::SecretString;

/// Read a secret from the named environment variable.
///
/// Returns `None` when the variable is unset or blank.
pub fn from_env(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::new)
}
