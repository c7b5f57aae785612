//! Gmail API v1 Client
//!
//! Typed wrapper over the authenticated transport:
//! - List/get labels
//! - List/search and fetch messages
//! - Send, trash and delete messages

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::provider::google::base64_url_encode;
use crate::provider::{GoogleProvider, OAuthProvider};
use crate::transport::AuthorizedClient;

/// How the session obtained its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    Cache,
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub label_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_unread: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_date: Option<String>,
    /// MIME tree, left untyped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Message {
    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .get("headers")?
            .as_array()?
            .iter()
            .find(|h| {
                h.get("name")
                    .and_then(|n| n.as_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })?
            .get("value")?
            .as_str()
    }
}

/// Plain-text message to send.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingMessage {
    /// RFC 2822 rendering.
    fn to_rfc2822(&self) -> String {
        let mut parts = vec![format!("To: {}", self.to.join(", "))];
        if !self.cc.is_empty() {
            parts.push(format!("Cc: {}", self.cc.join(", ")));
        }
        if !self.bcc.is_empty() {
            parts.push(format!("Bcc: {}", self.bcc.join(", ")));
        }
        parts.push(format!("Subject: {}", self.subject));
        parts.push("Content-Type: text/plain; charset=UTF-8".to_string());
        parts.push(String::new()); // Empty line separates headers from body
        parts.push(self.body.clone());
        parts.join("\r\n")
    }
}

/// Authenticated Gmail service handle.
pub struct GmailService<P = GoogleProvider> {
    client: AuthorizedClient<P>,
    base_url: String,
    origin: TokenOrigin,
}

impl<P: OAuthProvider> GmailService<P> {
    /// Bind `client` to the API at `base_url`.
    pub fn new(client: AuthorizedClient<P>, base_url: &str, origin: TokenOrigin) -> Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| Error::ClientConstruction(format!("invalid base URL '{}': {}", base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(Error::ClientConstruction(format!(
                "base URL must be an absolute http(s) URL: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            origin,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_origin(&self) -> TokenOrigin {
        self.origin
    }

    pub fn client(&self) -> &AuthorizedClient<P> {
        &self.client
    }

    fn user_url(&self, user_id: &str, rest: &str) -> String {
        format!("{}/users/{}/{}", self.base_url, urlencoding::encode(user_id), rest)
    }

    /// List all labels
    pub async fn list_labels(&self, user_id: &str) -> Result<Vec<Label>> {
        info!("Listing Gmail labels");

        let response = self.client.get(&self.user_url(user_id, "labels"), &[]).await?;
        let labels: Vec<Label> = match response.get("labels") {
            Some(v) => decode(v.clone())?,
            None => Vec::new(),
        };

        debug!("Retrieved {} labels", labels.len());
        Ok(labels)
    }

    /// Get details of a specific label
    pub async fn get_label(&self, user_id: &str, label_id: &str) -> Result<Label> {
        info!("Fetching label: {}", label_id);

        let url = self.user_url(user_id, &format!("labels/{}", urlencoding::encode(label_id)));
        decode(self.client.get(&url, &[]).await?)
    }

    /// List messages matching a Gmail search query and/or label filter.
    pub async fn list_messages(
        &self,
        user_id: &str,
        query: Option<&str>,
        label_ids: &[String],
        max_results: Option<usize>,
    ) -> Result<Vec<MessageRef>> {
        info!("Listing Gmail messages");

        let mut params = vec![];
        if let Some(q) = query {
            params.push(("q", q.to_string()));
        }
        for label in label_ids {
            params.push(("labelIds", label.clone()));
        }

        let url = self.user_url(user_id, "messages");
        let items = self
            .client
            .get_paginated(&url, &params, "messages", max_results)
            .await?;

        debug!("Retrieved {} messages", items.len());
        decode(Value::Array(items))
    }

    /// Get a message by ID. `format` is one of "full" (default), "metadata",
    /// "minimal" or "raw".
    pub async fn get_message(&self, user_id: &str, id: &str, format: Option<&str>) -> Result<Message> {
        info!("Fetching Gmail message: {}", id);

        let mut params = vec![];
        if let Some(fmt) = format {
            params.push(("format", fmt.to_string()));
        }

        let url = self.user_url(user_id, &format!("messages/{}", urlencoding::encode(id)));
        decode(self.client.get(&url, &params).await?)
    }

    /// Send a plain-text email.
    pub async fn send_message(&self, user_id: &str, message: &OutgoingMessage) -> Result<MessageRef> {
        info!("Sending Gmail message to: {:?}", message.to);

        let encoded = base64_url_encode(message.to_rfc2822().as_bytes());
        let url = self.user_url(user_id, "messages/send");
        let response = self.client.post(&url, &json!({ "raw": encoded })).await?;

        info!("Message sent successfully");
        decode(response)
    }

    /// Move a message to the trash.
    pub async fn trash_message(&self, user_id: &str, id: &str) -> Result<MessageRef> {
        info!("Trashing message: {}", id);

        let url = self.user_url(user_id, &format!("messages/{}/trash", urlencoding::encode(id)));
        decode(self.client.post(&url, &json!({})).await?)
    }

    /// Permanently delete a message
    pub async fn delete_message(&self, user_id: &str, id: &str) -> Result<()> {
        info!("Deleting message: {}", id);

        let url = self.user_url(user_id, &format!("messages/{}", urlencoding::encode(id)));
        self.client.delete(&url).await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
}
