//! Spotify client-credentials token exchange
//!
//! Only app-level access is needed: every endpoint used here works with a
//! token obtained from the client id and secret alone.

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

use super::models::TokenResponse;

pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Tokens are refreshed this long before Spotify says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Application credentials from the Spotify developer dashboard
#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// A bearer token and the instant it stops being usable
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn new(value: String, expires_in: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + expires_in.saturating_sub(EXPIRY_MARGIN),
        }
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Exchange client credentials for an access token
pub async fn request_token(
    http_client: &Client,
    token_url: &str,
    credentials: &SpotifyCredentials,
) -> Result<AccessToken> {
    debug!("Requesting Spotify access token from {}", token_url);

    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];

    let response = http_client
        .post(token_url)
        .form(&params)
        .send()
        .await
        .context("Failed to connect to Spotify accounts service")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Spotify authentication failed ({}): {}", status, body.trim());
    }

    let token: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    debug!("Got access token valid for {}s", token.expires_in);
    Ok(AccessToken::new(
        token.access_token,
        Duration::from_secs(token.expires_in),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness() {
        let token = AccessToken::new("abc".into(), Duration::from_secs(3600));
        assert!(token.is_fresh());
    }

    #[test]
    fn test_short_lived_token_is_stale() {
        // shorter than the refresh margin
        let token = AccessToken::new("abc".into(), Duration::from_secs(30));
        assert!(!token.is_fresh());
    }
}
