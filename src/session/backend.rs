use async_trait::async_trait;
use crate::models::api::{ ChatReply, ChatRequest };
use log::debug;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("no reply within {0:?}")]
    TimedOut(Duration),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("server answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("could not decode reply: {0}")]
    Decode(#[source] reqwest::Error),
}

impl ExchangeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExchangeError::TimedOut(_))
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends one message and returns the raw reply text.
    async fn send(&self, message: &str) -> Result<String, ExchangeError>;
}

/// Runs one exchange with `deadline` as its upper bound. When the deadline
/// passes the in-flight request is dropped, which aborts its I/O.
pub async fn exchange<B: ChatBackend + ?Sized>(
    backend: &B,
    message: &str,
    deadline: Duration
) -> Result<String, ExchangeError> {
    match tokio::time::timeout(deadline, backend.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::TimedOut(deadline)),
    }
}

pub struct HttpChatBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpChatBackend {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send(&self, message: &str) -> Result<String, ExchangeError> {
        let body = ChatRequest { message: Some(message.to_string()) };
        let resp = self.client
            .post(&self.url)
            .json(&body)
            .send().await
            .map_err(ExchangeError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ExchangeError::Status(status));
        }

        let reply: ChatReply = resp.json().await.map_err(ExchangeError::Decode)?;
        debug!("Received {} bytes of reply from {}", reply.response.len(), self.url);
        Ok(reply.response)
    }
}
