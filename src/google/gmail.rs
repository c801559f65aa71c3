//! Gmail API v1 for the signed-in user ("me").

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use super::{MailApi, RemoteError, check_status, endpoint, http_client};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<PartBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl MessageDetail {
    /// First header with this name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Decoded body of the first text/plain part, if any.
    pub fn plain_text(&self) -> Option<String> {
        self.payload.as_ref().and_then(find_plain_text)
    }
}

fn find_plain_text(part: &MessagePart) -> Option<String> {
    if part.mime_type.eq_ignore_ascii_case("text/plain") {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            return decode_base64url(data);
        }
    }
    part.parts.iter().find_map(find_plain_text)
}

fn decode_base64url(data: &str) -> Option<String> {
    let trimmed = data.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(trimmed).ok()?;
    String::from_utf8(bytes).ok()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
}

// ============================================================================
// Public types
// ============================================================================

/// Listing row for an inbox message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageSummary {
    pub id: String,
    pub snippet: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub link: String,
}

impl MessageSummary {
    pub fn from_detail(detail: &MessageDetail) -> Self {
        Self {
            id: detail.id.clone(),
            snippet: detail.snippet.clone(),
            subject: detail.header("Subject").unwrap_or("No Subject").to_string(),
            from: detail.header("From").unwrap_or("Unknown").to_string(),
            date: detail.header("Date").unwrap_or("Unknown").to_string(),
            link: web_link(&detail.id),
        }
    }
}

/// Dashboard row with recipient and label state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxRow {
    pub id: String,
    pub thread_id: String,
    pub snippet: String,
    pub label_ids: Vec<String>,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub date: String,
    pub starred: bool,
    pub unread: bool,
}

impl MailboxRow {
    pub fn from_detail(detail: &MessageDetail) -> Self {
        let has_label = |label: &str| detail.label_ids.iter().any(|l| l == label);
        Self {
            id: detail.id.clone(),
            thread_id: detail.thread_id.clone(),
            snippet: detail.snippet.clone(),
            label_ids: detail.label_ids.clone(),
            from: detail.header("From").unwrap_or_default().to_string(),
            to: detail.header("To").unwrap_or_default().to_string(),
            subject: detail.header("Subject").unwrap_or("(No Subject)").to_string(),
            date: detail.header("Date").unwrap_or_default().to_string(),
            starred: has_label("STARRED"),
            unread: has_label("UNREAD"),
        }
    }
}

pub fn web_link(message_id: &str) -> String {
    format!("https://mail.google.com/mail/u/0/#inbox/{}", message_id)
}

/// Plain-text RFC 2822 message, base64url encoded for `messages.send`.
/// Callers must reject line breaks in `to` and `subject` first; see [`breaks_header`].
pub fn encode_plain_message(to: &str, subject: &str, body: &str) -> String {
    let message = [
        format!("To: {}", to),
        "MIME-Version: 1.0".to_string(),
        "Content-Type: text/plain; charset=utf-8".to_string(),
        format!("Subject: {}", header_text(subject)),
        String::new(),
        body.to_string(),
    ]
    .join("\r\n");
    URL_SAFE.encode(message)
}

/// True when `value` would start a new header line.
pub fn breaks_header(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

/// ASCII passes through; anything else becomes an RFC 2047 encoded word.
fn header_text(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value))
    }
}

// ============================================================================
// Gmail API
// ============================================================================

pub struct GoogleMail {
    client: Client,
    access_token: String,
    base_url: String,
}

impl GoogleMail {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            access_token: access_token.into(),
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn messages_url(&self, rest: &[&str]) -> Result<Url, RemoteError> {
        let segments: Vec<&str> = ["users", "me", "messages"]
            .into_iter()
            .chain(rest.iter().copied())
            .collect();
        endpoint(&self.base_url, &segments)
    }
}

#[async_trait]
impl MailApi for GoogleMail {
    async fn list_message_ids(
        &self,
        query: &str,
        label_ids: &[&str],
        max_results: u32,
    ) -> Result<Vec<String>, RemoteError> {
        let mut params = vec![("maxResults", max_results.to_string())];
        if !query.is_empty() {
            params.push(("q", query.to_string()));
        }
        for label in label_ids {
            params.push(("labelIds", label.to_string()));
        }

        let response = self
            .client
            .get(self.messages_url(&[])?)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await?;
        let response = check_status(response, "mailbox").await?;

        let list: MessageListResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("message list: {}", e)))?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<MessageDetail, RemoteError> {
        let response = self
            .client
            .get(self.messages_url(&[message_id])?)
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .await?;
        let response = check_status(response, &format!("message {}", message_id)).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("message {}: {}", message_id, e)))
    }

    async fn send_raw(&self, raw: &str) -> Result<SentMessage, RemoteError> {
        let response = self
            .client
            .post(self.messages_url(&["send"])?)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await?;
        let response = check_status(response, "mailbox").await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("sent message: {}", e)))
    }

    async fn trash_message(&self, message_id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.messages_url(&[message_id, "trash"])?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        check_status(response, &format!("message {}", message_id)).await?;
        Ok(())
    }

    async fn modify_labels(
        &self,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.messages_url(&[message_id, "modify"])?)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "addLabelIds": add, "removeLabelIds": remove }))
            .send()
            .await?;
        check_status(response, &format!("message {}", message_id)).await?;
        Ok(())
    }
}
