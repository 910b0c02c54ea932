pub mod client;
pub mod models;

pub use client::SpotifyConnectPlayer;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Supplies the bearer credential for Web API calls. Acquisition and refresh
/// (the OAuth handshake) happen elsewhere; a failure here is treated as an
/// auth error the UI answers with a re-login prompt.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<String>;
}

/// Static token, useful for tests and short-lived sessions.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(anyhow!("No access token configured"));
        }
        Ok(self.0.clone())
    }
}
