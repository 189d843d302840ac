//! OAuth sign-in (GitHub, Google)
//!
//! Authorization-code flow. The `state` parameter is self-contained: an
//! issue timestamp and a nonce, signed with HMAC-SHA256 using `auth.secret`,
//! and accepted for ten minutes.

use crate::config::{AuthConfig, OAuthProviderConfig};
use chrono::Utc;
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

/// How long a signed state stays valid, in seconds
const STATE_MAX_AGE_SECS: i64 = 600;

const USER_AGENT: &str = concat!("quillpress/", env!("CARGO_PKG_VERSION"));

/// Supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    GitHub,
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "github",
            OAuthProvider::Google => "google",
        }
    }

    fn authorize_endpoint(&self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "https://github.com/login/oauth/authorize",
            OAuthProvider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
        }
    }

    fn token_endpoint(&self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "https://github.com/login/oauth/access_token",
            OAuthProvider::Google => "https://oauth2.googleapis.com/token",
        }
    }

    fn scope(&self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "read:user user:email",
            OAuthProvider::Google => "openid email profile",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(OAuthProvider::GitHub),
            "google" => Ok(OAuthProvider::Google),
            _ => Err(OAuthError::UnknownProvider(s.to_string())),
        }
    }
}

/// Identity returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthProfile {
    pub provider: String,
    pub provider_account_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid or expired sign-in state")]
    InvalidState,

    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("The provider did not return a verified email address")]
    MissingEmail,
}

impl From<reqwest::Error> for OAuthError {
    fn from(err: reqwest::Error) -> Self {
        OAuthError::Provider(err.to_string())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Deserialize)]
struct GoogleUser {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

/// OAuth client for the configured providers
pub struct OAuthService {
    http: reqwest::Client,
    auth: AuthConfig,
    base_url: String,
}

impl OAuthService {
    pub fn new(auth: AuthConfig, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Providers with client credentials configured
    pub fn enabled_providers(&self) -> Vec<OAuthProvider> {
        [OAuthProvider::GitHub, OAuthProvider::Google]
            .into_iter()
            .filter(|p| self.provider_config(*p).is_enabled())
            .collect()
    }

    fn provider_config(&self, provider: OAuthProvider) -> &OAuthProviderConfig {
        match provider {
            OAuthProvider::GitHub => &self.auth.github,
            OAuthProvider::Google => &self.auth.google,
        }
    }

    fn enabled_config(&self, provider: OAuthProvider) -> Result<&OAuthProviderConfig, OAuthError> {
        let config = self.provider_config(provider);
        if config.is_enabled() && !self.auth.secret.is_empty() {
            Ok(config)
        } else {
            Err(OAuthError::NotConfigured(provider.to_string()))
        }
    }

    pub fn redirect_uri(&self, provider: OAuthProvider) -> String {
        format!("{}/auth/{}/callback", self.base_url, provider)
    }

    /// URL of the provider's consent page, with a freshly signed state
    pub fn authorize_url(&self, provider: OAuthProvider) -> Result<String, OAuthError> {
        let config = self.enabled_config(provider)?;
        let state = sign_state(&self.auth.secret, Utc::now().timestamp())
            .ok_or_else(|| OAuthError::NotConfigured(provider.to_string()))?;

        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}",
            provider.authorize_endpoint(),
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&self.redirect_uri(provider)),
            urlencoding::encode(provider.scope()),
            urlencoding::encode(&state),
        );
        if provider == OAuthProvider::Google {
            url.push_str("&response_type=code&prompt=select_account");
        }
        Ok(url)
    }

    /// Check the state and trade the authorization code for the user's profile
    pub async fn complete(
        &self,
        provider: OAuthProvider,
        code: &str,
        state: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        if !verify_state(&self.auth.secret, state, Utc::now().timestamp()) {
            return Err(OAuthError::InvalidState);
        }

        let token = self.exchange_code(provider, code).await?;
        match provider {
            OAuthProvider::GitHub => self.github_profile(&token).await,
            OAuthProvider::Google => self.google_profile(&token).await,
        }
    }

    async fn exchange_code(&self, provider: OAuthProvider, code: &str) -> Result<String, OAuthError> {
        let config = self.enabled_config(provider)?;
        let redirect_uri = self.redirect_uri(provider);
        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response: TokenResponse = self
            .http
            .post(provider.token_endpoint())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?
            .json()
            .await?;

        match response.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(OAuthError::Provider(
                response
                    .error_description
                    .or(response.error)
                    .unwrap_or_else(|| "no access token returned".to_string()),
            )),
        }
    }

    async fn github_profile(&self, token: &str) -> Result<OAuthProfile, OAuthError> {
        let user: GitHubUser = self
            .http
            .get("https://api.github.com/user")
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => {
                let emails: Vec<GitHubEmail> = self
                    .http
                    .get("https://api.github.com/user/emails")
                    .bearer_auth(token)
                    .header(reqwest::header::USER_AGENT, USER_AGENT)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                pick_github_email(&emails).ok_or(OAuthError::MissingEmail)?
            }
        };

        Ok(OAuthProfile {
            provider: OAuthProvider::GitHub.to_string(),
            provider_account_id: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
            image: user.avatar_url,
        })
    }

    async fn google_profile(&self, token: &str) -> Result<OAuthProfile, OAuthError> {
        let user: GoogleUser = self
            .http
            .get("https://openidconnect.googleapis.com/v1/userinfo")
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let email = match (user.email, user.email_verified) {
            (Some(email), Some(true)) => email,
            _ => return Err(OAuthError::MissingEmail),
        };

        Ok(OAuthProfile {
            provider: OAuthProvider::Google.to_string(),
            provider_account_id: user.sub,
            email,
            name: user.name,
            image: user.picture,
        })
    }
}

fn pick_github_email(emails: &[GitHubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone())
}

fn mac_for(secret: &str, payload: &str) -> Option<HmacSha256> {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return None,
    };
    mac.update(payload.as_bytes());
    Some(mac)
}

/// `<issued_at>.<nonce>.<signature>`
pub fn sign_state(secret: &str, issued_at: i64) -> Option<String> {
    let payload = format!("{}.{}", issued_at, uuid::Uuid::new_v4().simple());
    let signature = BASE64URL_NOPAD.encode(&mac_for(secret, &payload)?.finalize().into_bytes());
    Some(format!("{}.{}", payload, signature))
}

/// Whether `state` was signed with `secret` and is still fresh at `now`
pub fn verify_state(secret: &str, state: &str, now: i64) -> bool {
    let Some((payload, signature)) = state.rsplit_once('.') else {
        return false;
    };
    let Ok(signature) = BASE64URL_NOPAD.decode(signature.as_bytes()) else {
        return false;
    };
    match mac_for(secret, payload) {
        Some(mac) => {
            if mac.verify_slice(&signature).is_err() {
                return false;
            }
        }
        None => return false,
    }

    payload
        .split_once('.')
        .and_then(|(issued_at, _)| issued_at.parse::<i64>().ok())
        .map(|issued_at| issued_at <= now && now - issued_at <= STATE_MAX_AGE_SECS)
        .unwrap_or(false)
}
