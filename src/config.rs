// Configuration: everything the client needs comes from `PRICING_*`
// environment variables, optionally seeded from a `.env` file.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Client credentials for the OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub oauth_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
    pub grant_type: String,
}

/// How server certificates are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsVerify {
    Enabled,
    Disabled,
    CustomCa(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_url: String,
    pub oauth: OAuthConfig,
    pub tls: TlsVerify,
    /// Where the bearer header is cached between runs. `None` disables caching.
    pub token_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub price_year: u16,
    pub log_filter: String,
}

/// Load configuration from the environment, reading a `.env` file first if
/// one exists.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    build_app_config(|key| std::env::var(key))
}

/// Default token cache location under the platform's local data directory.
pub fn default_token_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("vendor-pricing-cli").join("token.txt"))
}

fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let backend_url = require("PRICING_BACKEND_URL")?
        .trim_end_matches('/')
        .to_string();

    let oauth = OAuthConfig {
        oauth_url: require("PRICING_OAUTH_URL")?,
        client_id: require("PRICING_CLIENT_ID")?,
        client_secret: require("PRICING_CLIENT_SECRET")?,
        audience: require("PRICING_AUDIENCE")?,
        grant_type: or_default("PRICING_GRANT_TYPE", "client_credentials"),
    };

    let verify = parse_bool(&or_default("PRICING_SSL_VERIFY", "true"))
        .ok_or_else(|| invalid("PRICING_SSL_VERIFY", "expected true or false".into()))?;
    let tls = match (verify, lookup("PRICING_SSL_CA_PATH").ok()) {
        (false, _) => TlsVerify::Disabled,
        (true, Some(path)) if !path.trim().is_empty() => TlsVerify::CustomCa(PathBuf::from(path)),
        (true, _) => TlsVerify::Enabled,
    };

    let token_path = match lookup("PRICING_TOKEN_PATH") {
        Ok(path) if path.trim().is_empty() => None,
        Ok(path) => Some(PathBuf::from(path)),
        Err(_) => default_token_path(),
    };

    let request_timeout_secs = or_default("PRICING_REQUEST_TIMEOUT_SECS", "30")
        .parse::<u64>()
        .map_err(|e| invalid("PRICING_REQUEST_TIMEOUT_SECS", e.to_string()))?;

    let price_year = or_default("PRICING_PRICE_YEAR", "2025")
        .parse::<u16>()
        .map_err(|e| invalid("PRICING_PRICE_YEAR", e.to_string()))?;

    let log_filter = or_default("PRICING_LOG", "warn");

    Ok(AppConfig {
        backend_url,
        oauth,
        tls,
        token_path,
        request_timeout_secs,
        price_year,
        log_filter,
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
