//! HTTP side channel for session negotiation.
//!
//! Every endpoint answers with a JSON object carrying a numeric `code`
//! (0 on success) and a human-readable `msg`.

use async_trait::async_trait;
use gatebot_core::{
    Credentials, HandshakeError, HandshakeProvider, Identity, SessionKey, SessionOptions,
};
use serde_json::{Value, json};
use url::Url;

use crate::protocol::check_reply;

/// Handshake provider talking to the gateway's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpHandshake {
    client: reqwest::Client,
    base: Url,
}

impl HttpHandshake {
    /// Create a provider for `http(s)://host/`.
    ///
    /// # Errors
    /// Returns error if `host` does not form a valid URL.
    pub fn new(host: &str, secure: bool) -> Result<Self, url::ParseError> {
        let scheme = if secure { "https" } else { "http" };
        Ok(Self::with_client(
            reqwest::Client::new(),
            Url::parse(&format!("{scheme}://{host}/"))?,
        ))
    }

    /// Create a provider with a custom client and base URL.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    fn endpoint(&self, interface: &str) -> Result<Url, HandshakeError> {
        self.base
            .join(interface)
            .map_err(|e| HandshakeError::Malformed(e.to_string()))
    }

    async fn get(&self, interface: &str) -> Result<Value, HandshakeError> {
        tracing::debug!("{interface} [GET]");
        let resp = self
            .client
            .get(self.endpoint(interface)?)
            .send()
            .await
            .map_err(|e| HandshakeError::Unreachable(e.to_string()))?;
        read_reply(interface, resp).await
    }

    async fn post(&self, interface: &str, body: &Value) -> Result<Value, HandshakeError> {
        tracing::debug!("{interface} [POST]");
        let resp = self
            .client
            .post(self.endpoint(interface)?)
            .json(body)
            .send()
            .await
            .map_err(|e| HandshakeError::Unreachable(e.to_string()))?;
        read_reply(interface, resp).await
    }
}

async fn read_reply(interface: &str, resp: reqwest::Response) -> Result<Value, HandshakeError> {
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .map_err(|e| HandshakeError::Malformed(e.to_string()))?;
    tracing::debug!("{interface} response [{status}]: {body}");
    check_reply(body)
}

#[async_trait]
impl HandshakeProvider for HttpHandshake {
    async fn probe(&self) -> Result<Value, HandshakeError> {
        let body = self.get("about").await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionKey, HandshakeError> {
        let body = self
            .post("verify", &json!({ "verifyKey": credentials.verify_key }))
            .await?;
        body.get("session")
            .and_then(Value::as_str)
            .map(SessionKey::new)
            .ok_or_else(|| HandshakeError::Malformed("verify reply has no session".into()))
    }

    async fn bind_session(
        &self,
        session: &SessionKey,
        identity: &Identity,
    ) -> Result<(), HandshakeError> {
        self.post("bind", &json!({ "sessionKey": session, "qq": identity }))
            .await
            .map(drop)
    }

    async fn configure(
        &self,
        session: &SessionKey,
        options: &SessionOptions,
    ) -> Result<(), HandshakeError> {
        self.post(
            "config",
            &json!({
                "sessionKey": session,
                "cacheSize": options.cache_size,
                "enableWebsocket": options.enable_websocket,
            }),
        )
        .await
        .map(drop)
    }

    async fn release(&self, session: &SessionKey, identity: &Identity) -> Result<(), HandshakeError> {
        self.post("release", &json!({ "sessionKey": session, "qq": identity }))
            .await
            .map(drop)
    }
}
