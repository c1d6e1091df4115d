use anyhow::Context;
use axum::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::GoogleConfig;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Profile returned by Google's userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub picture: Option<String>,
}

#[async_trait]
pub trait GoogleOAuth: Send + Sync {
    /// Trades an authorization code for the signed-in user's profile.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> anyhow::Result<GoogleProfile>;
}

pub struct GoogleClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GoogleClient {
    pub fn new(http: reqwest::Client, cfg: &GoogleConfig) -> Self {
        Self {
            http,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
        }
    }
}

#[async_trait]
impl GoogleOAuth for GoogleClient {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> anyhow::Result<GoogleProfile> {
        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .context("google token request")?
            .error_for_status()
            .context("google token exchange rejected")?
            .json()
            .await
            .context("google token response")?;

        let profile = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("google userinfo request")?
            .error_for_status()
            .context("google userinfo rejected")?
            .json::<GoogleProfile>()
            .await
            .context("google userinfo response")?;

        Ok(profile)
    }
}
