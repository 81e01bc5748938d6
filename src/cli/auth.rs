//! Keyring-based credential storage for the Spotify API

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use keyring::Entry;
use tracing::{debug, info};

use crate::spotify::{SpotifyClient, SpotifyCredentials};

const KEYRING_SERVICE: &str = "spotgrab";

const CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "SPOTIFY_CLIENT_SECRET";

/// Manages authentication credentials storage
pub struct AuthManager;

impl AuthManager {
    /// Set up Spotify credentials
    ///
    /// Keeps stored credentials unless `force` is set; otherwise prompts for
    /// whatever was not supplied and verifies the pair before storing it.
    pub async fn authenticate(
        client_id: Option<String>,
        client_secret: Option<String>,
        force: bool,
    ) -> Result<SpotifyCredentials> {
        if !force {
            if let Ok(creds) = Self::load() {
                info!("Found existing credentials in keyring");
                return Ok(creds);
            }
        } else {
            debug!("Force flag set, ignoring stored credentials");
        }

        let client_id = match client_id {
            Some(id) => id,
            None => Input::new()
                .with_prompt("Spotify client ID")
                .interact_text()
                .context("Failed to read client ID")?,
        };

        let client_secret = match client_secret {
            Some(secret) => secret,
            None => Password::new()
                .with_prompt("Spotify client secret")
                .interact()
                .context("Failed to read client secret")?,
        };

        let creds = SpotifyCredentials {
            client_id: client_id.trim().to_string(),
            client_secret: client_secret.trim().to_string(),
        };

        Self::verify(&creds).await?;

        Self::store(&creds)?;
        info!("Credentials stored in keyring");

        Ok(creds)
    }

    /// Credentials for a download run: environment first, then keyring
    pub fn resolve() -> Result<SpotifyCredentials> {
        let from_env = std::env::var(CLIENT_ID_ENV)
            .ok()
            .zip(std::env::var(CLIENT_SECRET_ENV).ok())
            .filter(|(id, secret)| !id.is_empty() && !secret.is_empty());

        if let Some((client_id, client_secret)) = from_env {
            debug!("Using Spotify credentials from environment");
            return Ok(SpotifyCredentials {
                client_id,
                client_secret,
            });
        }

        Self::load().map_err(|_| {
            anyhow::anyhow!(
                "No Spotify credentials found. Run 'spotgrab auth' or set {} and {}.",
                CLIENT_ID_ENV,
                CLIENT_SECRET_ENV
            )
        })
    }

    /// Load credentials from keyring
    pub fn load() -> Result<SpotifyCredentials> {
        let client_id = Self::get_entry("client_id")?
            .get_password()
            .context("No Spotify client ID in keyring")?;

        let client_secret = Self::get_entry("client_secret")?
            .get_password()
            .context("No Spotify client secret in keyring")?;

        Ok(SpotifyCredentials {
            client_id,
            client_secret,
        })
    }

    /// Store credentials in keyring
    pub fn store(creds: &SpotifyCredentials) -> Result<()> {
        Self::get_entry("client_id")?
            .set_password(&creds.client_id)
            .context("Failed to store client ID in keyring")?;

        Self::get_entry("client_secret")?
            .set_password(&creds.client_secret)
            .context("Failed to store client secret in keyring")?;

        debug!("Credentials stored in keyring");
        Ok(())
    }

    /// Verify credentials with a token exchange
    async fn verify(creds: &SpotifyCredentials) -> Result<()> {
        debug!("Verifying Spotify credentials");

        let client = SpotifyClient::new(creds.clone())?;
        client.verify().await.context("Failed to verify credentials")?;

        info!("Credentials verified successfully");
        Ok(())
    }

    fn get_entry(key: &str) -> Result<Entry> {
        let entry_key = format!("spotify:{}", key);
        Entry::new(KEYRING_SERVICE, &entry_key).context("Failed to access keyring")
    }
}
