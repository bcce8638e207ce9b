use std::env;
use std::path::Path;

use google_gmail1::Gmail;
use tracing::info;
use yup_oauth2::{ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use super::GmailHub;
use super::refresh::refresh_access_token;
use super::token::ConfigTokenStore;
use crate::config::Config;

/// Assumed lifetime of a config-supplied access token when it was not
/// just refreshed.
const DEFAULT_TOKEN_TTL_SECS: i64 = 3599;

/// Build an authenticated Gmail hub from the config. With `REFRESH=1` the
/// access token is renewed first and written back to the config file, so
/// the next run starts from the fresh one.
pub async fn create_hub(
    cfg: &Config,
    config_path: &Path,
) -> Result<GmailHub, Box<dyn std::error::Error>> {
    let oauth = &cfg.gmail.oauth;

    let (access_token, ttl) = if env::var("REFRESH").is_ok_and(|v| v == "1") {
        info!("Refreshing access token before this cycle");
        let token = refresh_access_token(oauth).await?;
        Config::update_access_token(config_path, &token.access_token)?;
        (token.access_token, token.expires_in)
    } else {
        (oauth.access_token.clone(), DEFAULT_TOKEN_TTL_SECS)
    };

    let secret = ApplicationSecret {
        client_id: oauth.client_id.clone(),
        client_secret: oauth.client_secret.clone(),
        token_uri: oauth.token_url.clone(),
        auth_uri: oauth.auth_url.clone(),
        redirect_uris: vec!["http://localhost".to_string()],
        project_id: None,
        client_email: None,
        auth_provider_x509_cert_url: None,
        client_x509_cert_url: None,
    };

    let auth = InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
        .with_storage(Box::new(ConfigTokenStore {
            access_token,
            refresh_token: oauth.refresh_token.clone(),
            expires_in: ttl,
        }))
        .build()
        .await?;

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_webpki_roots()
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}
