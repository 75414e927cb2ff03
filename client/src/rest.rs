use reqwest::StatusCode;

use scrim_common::api::{
    ConversationsResponse, HistoryResponse, SendMessageRequest, SendMessageResponse,
};
use scrim_common::identity::UserId;
use scrim_common::message::{ConversationSummary, Message};

use crate::error::ClientError;

/// REST access to the platform's messaging endpoints.
///
/// Every call carries the session's bearer credential; a 401 on any of
/// them maps to [`ClientError::SessionExpired`].
pub struct MessageApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MessageApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        MessageApi {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    /// Fetch the full history of a two-party conversation.
    pub async fn history(&self, peer: &UserId) -> Result<Vec<Message>, ClientError> {
        let url = format!("{}/messages/{}", self.base_url, peer);
        tracing::debug!(%peer, "fetching message history");
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let resp = check_status(resp)?;
        let body: HistoryResponse = resp.json().await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(body.messages)
    }

    /// Send a message over REST (fallback path when the push channel is
    /// down). Returns the server-persisted message.
    pub async fn send(&self, receiver: &UserId, content: &str) -> Result<Message, ClientError> {
        let url = format!("{}/messages/send", self.base_url);
        let request = SendMessageRequest {
            receiver_id: receiver.clone(),
            content: content.to_string(),
        };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        let resp = check_status(resp)?;
        let body: SendMessageResponse = resp.json().await?;
        match body.data {
            Some(message) if body.success => Ok(message),
            _ => Err(rejected(body.message)),
        }
    }

    /// Fetch the session user's conversation list.
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        let url = format!("{}/messages/conversations", self.base_url);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let resp = check_status(resp)?;
        let body: ConversationsResponse = resp.json().await?;
        if !body.success {
            return Err(rejected(body.message));
        }
        Ok(body.conversations)
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    match resp.status() {
        StatusCode::UNAUTHORIZED => Err(ClientError::SessionExpired),
        status if !status.is_success() => Err(ClientError::Api {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        }),
        _ => Ok(resp),
    }
}

fn rejected(message: Option<String>) -> ClientError {
    ClientError::Api {
        status: 200,
        message: message.unwrap_or_else(|| "request rejected".to_string()),
    }
}
