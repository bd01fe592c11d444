//! Discord REST message store.
//!
//! Maps the store operations onto the Discord HTTP API:
//!
//! - `GET /channels/{id}` for channel resolution
//! - `GET /channels/{id}/messages?limit=&before=` for history pages (newest first)
//! - `DELETE /channels/{id}/messages/{message}` for deletes
//! - `POST /channels/{id}/messages` for notices
//!
//! There is no retry or rate-limit handling here; pacing is the engine's job.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use http::header::AUTHORIZATION;
use serde::Deserialize;

use super::{
    ChannelId, ChannelInfo, ChannelKind, MAX_PAGE_SIZE, Message, MessageId, MessageStore,
    Notifier, StoreError,
};
use crate::config::DiscordStoreConfig;

/// Discord caps message content at 2000 characters.
const MAX_CONTENT_CHARS: usize = 2000;

pub struct DiscordStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    timestamp: String,
}

impl TryFrom<RawMessage> for Message {
    type Error = StoreError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let created = DateTime::parse_from_rfc3339(&raw.timestamp).map_err(|e| {
            StoreError::Decode(format!(
                "message {} has invalid timestamp '{}': {e}",
                raw.id, raw.timestamp
            ))
        })?;
        Ok(Message {
            id: MessageId::new(raw.id),
            created_timestamp: created.timestamp_millis(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Map a Discord channel type code onto a [`ChannelKind`].
fn channel_kind(code: u8) -> ChannelKind {
    match code {
        0 | 1 | 3 => ChannelKind::Text,
        2 | 13 => ChannelKind::Voice,
        4 => ChannelKind::Category,
        5 => ChannelKind::Announcement,
        10..=12 => ChannelKind::Thread,
        15 | 16 => ChannelKind::Forum,
        _ => ChannelKind::Other,
    }
}

/// Accept bare snowflakes as well as `<#123>` channel mentions.
fn parse_target(target: &str) -> Result<&str, StoreError> {
    let trimmed = target.trim();
    let id = trimmed
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(StoreError::InvalidTarget(target.to_string()));
    }
    Ok(id)
}

impl DiscordStore {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                "DiscordBot (purgekeeper, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout,
        })
    }

    pub fn from_config(config: &DiscordStoreConfig) -> Result<Self, StoreError> {
        Self::new(&config.base_url, &config.token, config.timeout())
    }

    /// Add auth header and timeout.
    fn build_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .timeout(self.timeout)
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);

        Err(match status.as_u16() {
            401 | 403 => StoreError::Authorization(message),
            404 => StoreError::NotFound(message),
            code => StoreError::Api {
                status: code,
                message,
            },
        })
    }

    async fn get_messages(
        &self,
        channel: &ChannelId,
        query: &[(&str, String)],
    ) -> Result<Vec<Message>, StoreError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel);
        let response = self
            .build_request(self.client.get(&url).query(query))
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let raw: Vec<RawMessage> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        raw.into_iter().map(Message::try_from).collect()
    }
}

#[async_trait]
impl MessageStore for DiscordStore {
    #[tracing::instrument(skip(self), fields(store = "discord", operation = "fetch_latest"))]
    async fn fetch_latest(&self, channel: &ChannelId) -> Result<Option<Message>, StoreError> {
        let mut page = self
            .get_messages(channel, &[("limit", "1".to_string())])
            .await?;
        Ok(if page.is_empty() {
            None
        } else {
            Some(page.swap_remove(0))
        })
    }

    #[tracing::instrument(skip(self), fields(store = "discord", operation = "fetch_page"))]
    async fn fetch_page(
        &self,
        channel: &ChannelId,
        before: &MessageId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.get_messages(
            channel,
            &[
                ("limit", limit.to_string()),
                ("before", before.to_string()),
            ],
        )
        .await
    }

    #[tracing::instrument(skip(self), fields(store = "discord", operation = "delete_message"))]
    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<(), StoreError> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.base_url, channel, message
        );
        let response = self.build_request(self.client.delete(&url)).send().await?;
        Self::check_response(response).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(store = "discord", operation = "resolve_channel"))]
    async fn resolve_channel(&self, target: &str) -> Result<ChannelInfo, StoreError> {
        let id = parse_target(target)?;
        let url = format!("{}/channels/{}", self.base_url, id);
        let response = self.build_request(self.client.get(&url)).send().await?;
        let response = Self::check_response(response).await?;
        let raw: RawChannel = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(ChannelInfo {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            id: ChannelId::new(raw.id),
            kind: channel_kind(raw.kind),
        })
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[async_trait]
impl Notifier for DiscordStore {
    async fn notify(&self, channel: &ChannelId, text: &str) -> Result<(), StoreError> {
        let content: String = text.chars().take(MAX_CONTENT_CHARS).collect();
        let url = format!("{}/channels/{}/messages", self.base_url, channel);
        let body = serde_json::json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
        });
        let response = self
            .build_request(self.client.post(&url).json(&body))
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path, query_param},
    };

    use super::*;

    async fn store_for(server: &MockServer) -> DiscordStore {
        DiscordStore::new(server.uri(), "test-token", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("123456").unwrap(), "123456");
        assert_eq!(parse_target(" <#987> ").unwrap(), "987");
        assert!(parse_target("general").is_err());
        assert!(parse_target("").is_err());
        assert!(parse_target("<#>").is_err());
    }

    #[test]
    fn test_channel_kind_mapping() {
        assert_eq!(channel_kind(0), ChannelKind::Text);
        assert_eq!(channel_kind(2), ChannelKind::Voice);
        assert_eq!(channel_kind(4), ChannelKind::Category);
        assert_eq!(channel_kind(5), ChannelKind::Announcement);
        assert_eq!(channel_kind(11), ChannelKind::Thread);
        assert_eq!(channel_kind(15), ChannelKind::Forum);
        assert_eq!(channel_kind(99), ChannelKind::Other);
    }

    #[test]
    fn test_message_timestamp_parsing() {
        let message = Message::try_from(RawMessage {
            id: "1".into(),
            timestamp: "2024-01-01T00:00:00.500000+00:00".into(),
        })
        .unwrap();
        assert_eq!(message.created_timestamp, 1_704_067_200_500);

        let err = Message::try_from(RawMessage {
            id: "2".into(),
            timestamp: "yesterday".into(),
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn test_fetch_page_sends_cursor_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/10/messages"))
            .and(query_param("limit", "100"))
            .and(query_param("before", "900"))
            .and(header("authorization", "Bot test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "899", "timestamp": "2024-01-02T00:00:00+00:00", "content": "b" },
                { "id": "898", "timestamp": "2024-01-01T00:00:00+00:00", "content": "a" },
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let page = store
            .fetch_page(&ChannelId::new("10"), &MessageId::new("900"), 500)
            .await
            .unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id.as_str(), "899");
        assert!(page[0].created_timestamp > page[1].created_timestamp);
    }

    #[tokio::test]
    async fn test_fetch_latest_empty_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/10/messages"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        assert!(
            store
                .fetch_latest(&ChannelId::new("10"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_delete_forbidden_is_authorization_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/channels/10/messages/5"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "message": "Missing Permissions", "code": 50013 })),
            )
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let err = store
            .delete_message(&ChannelId::new("10"), &MessageId::new("5"))
            .await
            .unwrap_err();
        assert!(err.is_authorization());
        assert_eq!(err.to_string(), "Missing permission: Missing Permissions");
    }

    #[tokio::test]
    async fn test_delete_server_error_is_not_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/channels/10/messages/5"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let err = store
            .delete_message(&ChannelId::new("10"), &MessageId::new("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_resolve_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "77", "name": "general", "type": 0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels/78"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Unknown Channel" })),
            )
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let info = store.resolve_channel("<#77>").await.unwrap();
        assert_eq!(info.name, "general");
        assert!(info.kind.is_text_capable());

        assert!(matches!(
            store.resolve_channel("78").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.resolve_channel("not-a-channel").await,
            Err(StoreError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn test_notify_posts_content_without_mentions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/10/messages"))
            .and(body_partial_json(json!({
                "content": "hello",
                "allowed_mentions": { "parse": [] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1" })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        store.notify(&ChannelId::new("10"), "hello").await.unwrap();
    }
}
