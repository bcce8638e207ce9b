use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use yup_oauth2::error::TokenStorageError;
use yup_oauth2::storage::{TokenInfo, TokenStorage};

/// Serves the tokens held in the config file to the authenticator.
/// Obtained once per process and injected; nothing is cached globally.
pub(super) struct ConfigTokenStore {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[async_trait]
impl TokenStorage for ConfigTokenStore {
    async fn set(&self, _scopes: &[&str], _token: TokenInfo) -> Result<(), TokenStorageError> {
        // refreshed tokens are written back to the config file by the
        // REFRESH path in create_hub, not through the authenticator
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        Some(TokenInfo {
            access_token: Some(self.access_token.clone()),
            refresh_token: Some(self.refresh_token.clone()),
            expires_at: Some(OffsetDateTime::now_utc() + Duration::seconds(self.expires_in)),
            id_token: None,
        })
    }
}
