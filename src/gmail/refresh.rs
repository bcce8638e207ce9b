use serde::Deserialize;
use std::time::Duration;
use tracing::warn;
use urlencoding::encode;

use crate::config::OauthConfig;

#[derive(Deserialize, Debug)]
pub(super) struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

/// Exchange the long-lived refresh token for a fresh access token.
pub(super) async fn refresh_access_token(
    oauth: &OauthConfig,
) -> Result<TokenResponse, Box<dyn std::error::Error>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let body = format!(
        "client_id={}&client_secret={}&refresh_token={}&grant_type=refresh_token",
        encode(&oauth.client_id),
        encode(&oauth.client_secret),
        encode(&oauth.refresh_token),
    );

    let resp = client
        .post(&oauth.token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let error_text = resp.text().await.unwrap_or_default();
        warn!(status = %status, body = %error_text, "Token refresh rejected");
        return Err(format!("token refresh failed with {status}: {error_text}").into());
    }

    Ok(resp.json().await?)
}
