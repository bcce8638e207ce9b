//! Thin client for the W3C WebDriver wire protocol.
//!
//! Only the verbs the bookkeeping form needs: session lifecycle,
//! navigation, element lookup by css, click, send-keys and synchronous
//! script execution. Everything is a JSON request with a bounded timeout;
//! the browser side lives behind whatever endpoint the config names.

use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use crate::error::LedgerError;

/// Key under which WebDriver responses carry element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub(super) struct WebDriverSession {
    client: reqwest::Client,
    session_url: String,
}

#[derive(Deserialize)]
struct WireResponse {
    value: Value,
}

impl WebDriverSession {
    /// Open a browser session against a WebDriver endpoint.
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = endpoint.trim_end_matches('/');

        let value = post(
            &client,
            &format!("{endpoint}/session"),
            json!({
                "capabilities": { "alwaysMatch": { "browserName": "firefox" } }
            }),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LedgerError::Protocol("session response carried no sessionId".to_string())
            })?;
        info!(session_id = %session_id, "WebDriver session created");

        Ok(Self {
            client,
            session_url: format!("{endpoint}/session/{session_id}"),
        })
    }

    pub async fn goto(&self, url: &str) -> Result<(), LedgerError> {
        self.command("url", json!({ "url": url })).await.map(drop)
    }

    pub async fn find(&self, css: &str) -> Result<Element<'_>, LedgerError> {
        let value = self
            .command("element", json!({ "using": "css selector", "value": css }))
            .await?;
        let id = element_id(&value).ok_or_else(|| LedgerError::ElementNotFound {
            selector: css.to_string(),
        })?;
        Ok(Element {
            session: self,
            id: id.to_string(),
        })
    }

    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, LedgerError> {
        self.command("execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    /// Best-effort teardown of the browser session.
    pub async fn close(self) -> Result<(), LedgerError> {
        let resp = self.client.delete(&self.session_url).send().await?;
        read_value(resp).await.map(drop)
    }

    async fn command(&self, path: &str, body: Value) -> Result<Value, LedgerError> {
        post(&self.client, &format!("{}/{path}", self.session_url), body).await
    }
}

pub(super) struct Element<'a> {
    session: &'a WebDriverSession,
    id: String,
}

impl Element<'_> {
    pub async fn click(&self) -> Result<(), LedgerError> {
        self.session
            .command(&format!("element/{}/click", self.id), json!({}))
            .await
            .map(drop)
    }

    pub async fn send_keys(&self, text: &str) -> Result<(), LedgerError> {
        self.session
            .command(&format!("element/{}/value", self.id), json!({ "text": text }))
            .await
            .map(drop)
    }

    /// JSON reference usable as a script argument; the driver hands the
    /// script the live DOM element in its place.
    pub fn reference(&self) -> Value {
        json!({ ELEMENT_KEY: self.id })
    }
}

fn element_id(value: &Value) -> Option<&str> {
    value.get(ELEMENT_KEY).and_then(Value::as_str)
}

async fn post(client: &reqwest::Client, url: &str, body: Value) -> Result<Value, LedgerError> {
    let resp = client.post(url).json(&body).send().await?;
    read_value(resp).await
}

async fn read_value(resp: reqwest::Response) -> Result<Value, LedgerError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(LedgerError::Protocol(format!("{status}: {body}")));
    }
    let wire: WireResponse = resp.json().await?;
    Ok(wire.value)
}
