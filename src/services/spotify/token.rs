use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::ports::spotify::{ApiError, TokenProvider};
use crate::spotify_rs::auth::{RefreshTokenError, refresh_access_token};
use crate::spotify_rs::types::SpotifyTokenResponse;

/// Tokens are refreshed this many seconds before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Tokens as persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
}

impl StoredTokens {
    /// Builds the stored form of a token response. Refresh responses may omit the
    /// refresh token, in which case the previous one stays valid.
    pub fn from_response(
        response: SpotifyTokenResponse,
        previous_refresh_token: Option<&str>,
        now: i64,
    ) -> Option<Self> {
        let refresh_token = response
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string))?;
        Some(Self {
            access_token: response.access_token,
            refresh_token,
            expires_at: now + response.expires_in as i64,
        })
    }

    fn needs_refresh(&self, now: i64) -> bool {
        self.expires_at - EXPIRY_SKEW_SECS <= now
    }
}

/// JSON file holding the user's tokens.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredTokens>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .wrap_err_with(|| format!("Failed to read token file: {}", self.path.display()))?;
        let tokens = serde_json::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse token file: {}", self.path.display()))?;
        Ok(Some(tokens))
    }

    pub fn save(&self, tokens: &StoredTokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create token directory: {}", parent.display())
            })?;
        }
        let contents = serde_json::to_string_pretty(tokens).wrap_err("Failed to serialize tokens")?;
        std::fs::write(&self.path, contents)
            .wrap_err_with(|| format!("Failed to write token file: {}", self.path.display()))
    }

    /// Removes the token file. Returns whether there was one.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)
            .wrap_err_with(|| format!("Failed to remove token file: {}", self.path.display()))?;
        Ok(true)
    }
}

/// The refresh-token grant, behind a trait so the provider can be tested offline.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RefreshGrant: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<SpotifyTokenResponse, RefreshTokenError>;
}

/// Refreshes against the Spotify accounts service as a PKCE public client.
pub struct SpotifyRefreshGrant {
    client_id: String,
}

impl SpotifyRefreshGrant {
    pub fn new(client_id: String) -> Self {
        Self { client_id }
    }
}

#[async_trait::async_trait]
impl RefreshGrant for SpotifyRefreshGrant {
    async fn refresh(&self, refresh_token: &str) -> Result<SpotifyTokenResponse, RefreshTokenError> {
        refresh_access_token(&self.client_id, refresh_token).await
    }
}

/// Token provider backed by a [`TokenStore`], refreshing when the token is about to expire.
pub struct StoredTokenProvider<G: RefreshGrant> {
    store: TokenStore,
    grant: G,
    cached: Mutex<Option<StoredTokens>>,
}

impl<G: RefreshGrant> StoredTokenProvider<G> {
    pub fn new(store: TokenStore, grant: G) -> Self {
        Self {
            store,
            grant,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl<G: RefreshGrant> TokenProvider for StoredTokenProvider<G> {
    async fn access_token(&self) -> Result<String, ApiError> {
        // Held across the refresh so concurrent callers refresh only once
        let mut cached = self.cached.lock().await;

        if cached.is_none() {
            *cached = self.store.load().map_err(|error| {
                tracing::warn!("Failed to load stored tokens: {:#}", error);
                ApiError::AuthRequired
            })?;
        }
        let Some(tokens) = cached.as_ref() else {
            return Err(ApiError::AuthRequired);
        };

        let now = chrono::Utc::now().timestamp();
        if !tokens.needs_refresh(now) {
            return Ok(tokens.access_token.clone());
        }

        tracing::debug!("Access token expired, refreshing");
        let response = self
            .grant
            .refresh(&tokens.refresh_token)
            .await
            .map_err(|error| {
                tracing::warn!("Failed to refresh access token: {}", error);
                ApiError::AuthRequired
            })?;
        let refreshed = StoredTokens::from_response(response, Some(&tokens.refresh_token), now)
            .ok_or(ApiError::AuthRequired)?;

        if let Err(error) = self.store.save(&refreshed) {
            tracing::warn!("Failed to persist refreshed tokens: {:#}", error);
        }
        let access_token = refreshed.access_token.clone();
        *cached = Some(refreshed);

        Ok(access_token)
    }
}
