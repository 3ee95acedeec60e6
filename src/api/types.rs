//! Webhook request and response types

use crate::chain::ChatRef;
use crate::flow::{FlowError, InboundCommand};
use serde::{Deserialize, Deserializer, Serialize};

/// Body posted by TextBack: `{command: {...}}`
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub command: Option<WebhookCommand>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCommand {
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub channel_id: Option<i64>,
    pub chat_id: Option<String>,
    /// Token of the pressed button
    pub payload: Option<String>,
}

impl WebhookEnvelope {
    /// Check required fields and convert to a flow command
    pub fn into_command(self) -> Result<InboundCommand, FlowError> {
        let command = self
            .command
            .ok_or_else(|| FlowError::validation("missing command"))?;

        let channel = command
            .channel
            .filter(|c| !c.is_empty())
            .ok_or_else(|| FlowError::validation("missing command.channel"))?;
        let channel_id = command
            .channel_id
            .ok_or_else(|| FlowError::validation("missing command.channelId"))?;
        let chat_id = command
            .chat_id
            .filter(|c| !c.is_empty())
            .ok_or_else(|| FlowError::validation("missing command.chatId"))?;

        Ok(InboundCommand {
            chat: ChatRef::new(channel, channel_id, chat_id),
            token: command.payload,
        })
    }
}

/// Accept `42` as well as `"42"`
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("channelId is not numeric: {s}"))),
    }
}

/// Empty JSON object returned for every webhook call
#[derive(Debug, Default, Serialize)]
pub struct WebhookAck {}
