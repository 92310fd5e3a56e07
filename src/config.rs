//! Worker configuration
//!
//! Everything the worker needs arrives through environment variables, read
//! once at startup. Required values fail fast; optional values fall back to
//! defaults with a log line, so a deployment's effective configuration is
//! visible in its startup output.

use std::env;

use tracing::warn;
use url::Url;

use crate::error::ConfigError;

/// Default webhook endpoint path
pub const DEFAULT_WEBHOOK_PATH: &str = "/webhooks/billing";

/// Default monthly price point for MRR
pub const DEFAULT_MONTHLY_PRICE: f64 = 9.0;

/// Default yearly price point for MRR
pub const DEFAULT_YEARLY_PRICE: f64 = 89.0;

/// Price points used by the MRR recomputation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    /// Monthly plan price
    pub monthly: f64,
    /// Yearly plan price; contributes one twelfth per month
    pub yearly: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            monthly: DEFAULT_MONTHLY_PRICE,
            yearly: DEFAULT_YEARLY_PRICE,
        }
    }
}

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Backing static origin every non-API request is forwarded to
    pub origin: Url,
    /// Deployment identifier (the serving domain); prefixes every storage key
    pub deployment: String,
    /// Path the billing provider posts webhook events to
    pub webhook_path: String,
    /// HMAC secret for webhook signature verification; unsigned posts are
    /// accepted when unset
    pub webhook_secret: Option<String>,
    /// MRR price points
    pub pricing: Pricing,
}

impl WorkerConfig {
    /// Load the configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `EDGEHOST_ORIGIN` (required): static origin, bare host or full URL
    /// - `EDGEHOST_DEPLOYMENT` (required): deployment key prefix (the serving domain)
    /// - `EDGEHOST_WEBHOOK_PATH` (optional): webhook endpoint path (default: `/webhooks/billing`)
    /// - `EDGEHOST_WEBHOOK_SECRET` (optional): HMAC secret for signature verification
    /// - `EDGEHOST_PRICE_MONTHLY` (optional): monthly price point (default: 9)
    /// - `EDGEHOST_PRICE_YEARLY` (optional): yearly price point (default: 89)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is absent or any value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let origin_raw =
            env::var("EDGEHOST_ORIGIN").map_err(|_| ConfigError::MissingVar("EDGEHOST_ORIGIN"))?;
        let origin = parse_origin(&origin_raw)?;

        let deployment = env::var("EDGEHOST_DEPLOYMENT")
            .map_err(|_| ConfigError::MissingVar("EDGEHOST_DEPLOYMENT"))?;
        if deployment.trim().is_empty() {
            return Err(ConfigError::InvalidVar {
                var: "EDGEHOST_DEPLOYMENT",
                reason: "must not be empty".to_string(),
            });
        }

        let webhook_path = env::var("EDGEHOST_WEBHOOK_PATH")
            .unwrap_or_else(|_| DEFAULT_WEBHOOK_PATH.to_string());
        validate_webhook_path(&webhook_path)?;

        let webhook_secret = env::var("EDGEHOST_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());
        if webhook_secret.is_none() {
            warn!("EDGEHOST_WEBHOOK_SECRET not set; accepting unsigned webhook posts");
        }

        let pricing = Pricing {
            monthly: parse_price("EDGEHOST_PRICE_MONTHLY", DEFAULT_MONTHLY_PRICE)?,
            yearly: parse_price("EDGEHOST_PRICE_YEARLY", DEFAULT_YEARLY_PRICE)?,
        };

        Ok(Self {
            origin,
            deployment,
            webhook_path,
            webhook_secret,
            pricing,
        })
    }
}

/// Accept either a bare hostname or a full URL for the origin
///
/// Bare hostnames get an `https` scheme; explicit schemes pass through so
/// local setups can point at an `http` origin.
fn parse_origin(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|e| ConfigError::InvalidVar {
        var: "EDGEHOST_ORIGIN",
        reason: e.to_string(),
    })?;

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidVar {
            var: "EDGEHOST_ORIGIN",
            reason: format!("'{raw}' has no host"),
        });
    }
    Ok(url)
}

fn validate_webhook_path(path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') || path.len() < 2 {
        return Err(ConfigError::InvalidVar {
            var: "EDGEHOST_WEBHOOK_PATH",
            reason: format!("'{path}' must be an absolute path"),
        });
    }
    // the /api subtree belongs to the registry routes
    if path == "/api" || path.starts_with("/api/") {
        return Err(ConfigError::InvalidVar {
            var: "EDGEHOST_WEBHOOK_PATH",
            reason: format!("'{path}' collides with the API routes"),
        });
    }
    Ok(())
}

fn parse_price(var: &'static str, default: f64) -> Result<f64, ConfigError> {
    let Ok(text) = env::var(var) else {
        return Ok(default);
    };
    let value: f64 = text.trim().parse().map_err(|_| ConfigError::InvalidVar {
        var,
        reason: format!("'{text}' is not a number"),
    })?;
    if value < 0.0 || !value.is_finite() {
        return Err(ConfigError::InvalidVar {
            var,
            reason: format!("'{text}' must be a non-negative number"),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_origin_gets_https_scheme() {
        let url = parse_origin("pages.example.dev").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("pages.example.dev"));
    }

    #[test]
    fn explicit_scheme_is_preserved() {
        let url = parse_origin("http://127.0.0.1:8080").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn origin_without_host_is_rejected() {
        assert!(parse_origin("https://").is_err());
        assert!(parse_origin("").is_err());
    }

    #[test]
    fn webhook_path_must_be_absolute() {
        assert!(validate_webhook_path("/webhooks/billing").is_ok());
        assert!(validate_webhook_path("webhooks/billing").is_err());
        assert!(validate_webhook_path("/").is_err());
    }

    #[test]
    fn webhook_path_may_not_shadow_api_routes() {
        assert!(validate_webhook_path("/api/webhooks").is_err());
        assert!(validate_webhook_path("/api").is_err());
        assert!(validate_webhook_path("/apiary").is_ok());
    }

    #[test]
    fn pricing_defaults() {
        let pricing = Pricing::default();
        assert_eq!(pricing.monthly, 9.0);
        assert_eq!(pricing.yearly, 89.0);
    }
}
