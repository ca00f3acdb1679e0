// OAuth client-credentials flow and the on-disk token cache.
//
// The cached value is the full `Authorization` header ("Bearer abc..."), so a
// restart can reuse it without another round trip. A stale cached token is
// fine: the first 401 triggers a refresh.

use std::path::PathBuf;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::OAuthConfig;
use crate::error::ApiError;

#[derive(Serialize, Debug)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
    grant_type: &'a str,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

/// Where the authorization header is persisted between runs.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: Option<PathBuf>,
}

impl TokenStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        TokenStore { path }
    }

    /// The previously saved header, if any.
    pub fn load(&self) -> Option<String> {
        let path = self.path.as_ref()?;
        let header = std::fs::read_to_string(path).ok()?;
        let header = header.trim();
        (!header.is_empty()).then(|| header.to_string())
    }

    /// Save the header. Failures are logged, not returned.
    pub fn persist(&self, header: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let result = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::write(path, header));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "unable to save token");
        }
    }
}

/// Request a fresh token and return it as an `Authorization` header value.
///
/// # Errors
///
/// [`ApiError::Authentication`] when the endpoint answers with anything other
/// than 200, [`ApiError::Http`] on transport failure.
pub fn request_token(client: &Client, oauth: &OAuthConfig) -> Result<String, ApiError> {
    let payload = TokenRequest {
        client_id: &oauth.client_id,
        client_secret: &oauth.client_secret,
        audience: &oauth.audience,
        grant_type: &oauth.grant_type,
    };
    let res = client.post(&oauth.oauth_url).json(&payload).send()?;
    if !res.status().is_success() {
        let status = res.status();
        let txt = res.text().unwrap_or_default();
        return Err(ApiError::Authentication(format!("{status} - {txt}")));
    }
    let token: TokenResponse = res.json()?;
    Ok(format!("{} {}", token.token_type, token.access_token))
}
