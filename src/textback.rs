//! TextBack chat API client
//!
//! Outbound messages go out as a JSON POST to `{base}/messages`. Buttons
//! ride along as an inline keyboard whose payload is a cache token.

use crate::chain::ChatRef;
use crate::flow::Transport;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const ACTION_BUTTON: &str = "ActionButton";

/// One interactive button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: String,
}

impl Button {
    pub fn action(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ACTION_BUTTON.to_string(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub inline: bool,
    pub buttons: Vec<Button>,
}

/// Message sent to a chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub channel: String,
    pub channel_id: i64,
    pub chat_id: String,
    pub text: String,
    #[serde(flatten)]
    pub keyboard: Option<Keyboard>,
}

impl OutboundMessage {
    /// Plain text message
    pub fn text(chat: &ChatRef, text: impl Into<String>) -> Self {
        Self {
            channel: chat.channel.clone(),
            channel_id: chat.channel_id,
            chat_id: chat.chat_id.clone(),
            text: text.into(),
            keyboard: None,
        }
    }

    /// Attach an inline keyboard; an empty button list sends plain text
    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.keyboard = (!buttons.is_empty()).then_some(Keyboard {
            inline: true,
            buttons,
        });
        self
    }
}

/// Reply from the chat API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status_code: u16,
    pub content: String,
}

/// Transport error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn rejected(status: u16, body: &str) -> Self {
        Self::new(TransportErrorKind::Rejected(status), format!("HTTP {status}: {body}"))
    }

    pub fn malformed_reply(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::MalformedReply, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// No reply within the configured timeout
    Timeout,
    /// Connection or I/O failure
    Network,
    /// Non-2xx status
    Rejected(u16),
    /// 2xx status with a body that is not JSON
    MalformedReply,
}

/// HTTP client for the TextBack API
pub struct TextBackClient {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
}

impl TextBackClient {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
            api_token,
        })
    }

    #[allow(dead_code)] // Used in tests
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for TextBackClient {
    async fn send(&self, message: &OutboundMessage) -> Result<Delivery, TransportError> {
        let mut request = self.client.post(&self.endpoint).json(message);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::timeout(format!("Request timeout: {e}"))
            } else {
                TransportError::network(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let content = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read response: {e}")))?;

        tracing::info!(status = status.as_u16(), body = %content, "TextBack reply");

        if !status.is_success() {
            return Err(TransportError::rejected(status.as_u16(), &content));
        }
        check_reply(&content)?;

        Ok(Delivery {
            status_code: status.as_u16(),
            content,
        })
    }
}

fn check_reply(content: &str) -> Result<(), TransportError> {
    if content.trim().is_empty() {
        return Ok(());
    }
    serde_json::from_str::<serde_json::Value>(content)
        .map(|_| ())
        .map_err(|e| TransportError::malformed_reply(format!("{e} - body: {content}")))
}
