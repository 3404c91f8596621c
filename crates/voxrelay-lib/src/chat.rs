//! Chat-completion client for the voice assistant mode.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use voxrelay_core::types::{ChatMessage, ChatSettings};

use crate::error::{Error, Result};

/// How many prior messages accompany each request.
pub const HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    settings: ChatSettings,
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ChatClient {
    pub fn new(settings: ChatSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Messages sent for `message`: system prompt, the recent window of
    /// `history`, then the new user turn.
    pub fn build_messages(&self, history: &[ChatMessage], message: &str) -> Vec<ChatMessage> {
        let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(ChatMessage::system(&self.settings.system_prompt));
        messages.extend_from_slice(recent);
        messages.push(ChatMessage::user(message));
        messages
    }

    /// Ask for the assistant's reply to `message`.
    pub async fn reply(&self, history: &[ChatMessage], message: &str) -> Result<String> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Configuration("chat api key is not set".into()))?;

        let messages = self.build_messages(history, message);
        debug!("chat: sending {} messages to {}", messages.len(), self.settings.api_url);

        let resp = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.settings.model,
                "messages": messages,
                "temperature": self.settings.temperature,
                "max_tokens": self.settings.max_tokens,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(Error::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let completion: Completion = resp.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::UpstreamFormat("completion has no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client(url: String, key: Option<&str>) -> ChatClient {
        ChatClient::new(ChatSettings {
            api_url: url,
            api_key: key.map(String::from),
            ..Default::default()
        })
    }

    #[test]
    fn window_keeps_last_ten() {
        let history: Vec<ChatMessage> = (0..14).map(|i| ChatMessage::user(i.to_string())).collect();
        let c = client("http://x".into(), None);
        let messages = c.build_messages(&history, "now");
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[0].content, c.settings().system_prompt);
        assert_eq!(messages[1].content, "4");
        assert_eq!(messages[11], ChatMessage::user("now"));
    }

    #[tokio::test]
    async fn missing_key_is_configuration_error() {
        let err = client("http://127.0.0.1:9".into(), Some("  "))
            .reply(&[], "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn returns_first_choice() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-chat")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 150,
                "messages": [
                    {"role": "system", "content": ChatSettings::default().system_prompt},
                    {"role": "assistant", "content": "earlier"},
                    {"role": "user", "content": "hello"},
                ],
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Hi there!"}}]}"#)
            .create_async()
            .await;

        let c = client(format!("{}/v1/chat/completions", server.url()), Some("sk-chat"));
        let reply = c.reply(&[ChatMessage::assistant("earlier")], "hello").await.unwrap();
        assert_eq!(reply, "Hi there!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn surfaces_upstream_error_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/plain")
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let err = client(format!("{}/chat", server.url()), Some("bad"))
            .reply(&[], "hi")
            .await
            .unwrap_err();
        match err {
            Error::Upstream { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = client(format!("{}/plain", server.url()), Some("k"))
            .reply(&[], "hi")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "upstream returned 500: HTTP 500");
    }
}
