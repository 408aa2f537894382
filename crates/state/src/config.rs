//! Application configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CROPCART_API_BASE` - Base URL of the hosted document service
//! - `CROPCART_API_KEY` - Backend API key (validated for entropy)
//!
//! ## Optional
//! - `CROPCART_AUTH_BASE` - Auth service URL (default: `{api_base}/auth`)
//! - `CROPCART_STORAGE_BASE` - Blob storage URL (default: `{api_base}/storage`)
//! - `CROPCART_CACHE_DIR` - Local cache directory (default: `.cropcart-cache`)
//! - `CROPCART_CACHE_PREFIX` - Local cache key prefix (default: `cropcart`)
//! - `CROPCART_TIMEOUT_SECS` - Remote request timeout (default: 30)

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// CropCart client configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct AppConfig {
    /// Base URL of the hosted document service
    pub api_base: Url,
    /// Auth service URL
    pub auth_base: Url,
    /// Blob storage URL
    pub storage_base: Url,
    /// Backend API key
    pub api_key: SecretString,
    /// Directory for the local per-user cache files
    pub cache_dir: PathBuf,
    /// Key prefix for local cache entries (`{prefix}-{collection}-{user}`)
    pub cache_prefix: String,
    /// Timeout applied to every remote request
    pub request_timeout: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_base", &self.api_base.as_str())
            .field("auth_base", &self.auth_base.as_str())
            .field("storage_base", &self.storage_base.as_str())
            .field("api_key", &"[REDACTED]")
            .field("cache_dir", &self.cache_dir)
            .field("cache_prefix", &self.cache_prefix)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy
    /// check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base = get_url("CROPCART_API_BASE", None)?;
        let auth_base = get_url(
            "CROPCART_AUTH_BASE",
            Some(derived(&api_base, "auth")),
        )?;
        let storage_base = get_url(
            "CROPCART_STORAGE_BASE",
            Some(derived(&api_base, "storage")),
        )?;
        let api_key = get_validated_secret("CROPCART_API_KEY")?;
        let cache_dir = PathBuf::from(get_env_or_default("CROPCART_CACHE_DIR", ".cropcart-cache"));
        let cache_prefix = get_env_or_default("CROPCART_CACHE_PREFIX", "cropcart");
        let request_timeout = get_env_or_default("CROPCART_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CROPCART_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            api_base,
            auth_base,
            storage_base,
            api_key,
            cache_dir,
            cache_prefix,
            request_timeout,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a URL from the environment, with an optional fallback value.
fn get_url(key: &str, default: Option<String>) -> Result<Url, ConfigError> {
    let raw = match (std::env::var(key), default) {
        (Ok(value), _) => value,
        (Err(_), Some(value)) => value,
        (Err(_), None) => return Err(ConfigError::MissingEnvVar(key.to_string())),
    };
    Url::parse(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Derive a sibling service URL by appending a path segment.
fn derived(base: &Url, segment: &str) -> String {
    let mut url = base.clone();
    {
        let mut path = url.path().trim_end_matches('/').to_owned();
        path.push('/');
        path.push_str(segment);
        url.set_path(&path);
    }
    url.into()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the backend console."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_shannon_entropy_high() {
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_secret_strength_changeme() {
        assert!(validate_secret_strength("changeme123", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        // High-entropy random string
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_derived_url() {
        let base = Url::parse("https://api.cropcart.app/v1/").unwrap();
        assert_eq!(derived(&base, "auth"), "https://api.cropcart.app/v1/auth");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = AppConfig {
            api_base: Url::parse("https://api.cropcart.app").unwrap(),
            auth_base: Url::parse("https://api.cropcart.app/auth").unwrap(),
            storage_base: Url::parse("https://api.cropcart.app/storage").unwrap(),
            api_key: SecretString::from("kZ9$vQ2!pL7@mX4#"),
            cache_dir: PathBuf::from(".cropcart-cache"),
            cache_prefix: "cropcart".to_string(),
            request_timeout: Duration::from_secs(30),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("api.cropcart.app"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("kZ9$vQ2!pL7@mX4#"));
    }
}
