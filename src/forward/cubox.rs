// src/forward/cubox.rs
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{ForwardResult, ForwardSink, Rejection, SavePayload};
use crate::feed::Entry;

pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Acknowledgement returned by the save API: `{"code": 200, "message": ""}` on success.
#[derive(Debug, Deserialize)]
struct SaveAck {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    message: Value,
}

impl SaveAck {
    fn code(&self) -> Option<i64> {
        match &self.code {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// A message counts as present unless it is null, false or an empty string.
    fn message(&self) -> Option<String> {
        match &self.message {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn into_result(self) -> ForwardResult {
        let code = self.code();
        let message = self.message();
        if code == Some(200) && message.is_none() {
            ForwardResult::Delivered
        } else {
            ForwardResult::Rejected(Rejection::Endpoint { code, message })
        }
    }
}

/// POSTs entries to a Cubox-style save endpoint.
#[derive(Clone)]
pub struct HttpForwardSink {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

impl HttpForwardSink {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("rss-forwarder/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building save endpoint http client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            timeout: DEFAULT_FORWARD_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ForwardSink for HttpForwardSink {
    async fn forward(&self, entry: &Entry, tags: &[String], folder: &str) -> ForwardResult {
        let Some(payload) = SavePayload::for_entry(entry, tags, folder) else {
            return ForwardResult::Rejected(Rejection::MissingLink);
        };

        let res = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await;

        let rsp = match res {
            Ok(rsp) => rsp,
            Err(e) if e.is_timeout() => return ForwardResult::Rejected(Rejection::Timeout),
            Err(e) => return ForwardResult::Rejected(Rejection::Transport(e.to_string())),
        };

        let status = rsp.status();
        if !status.is_success() {
            return ForwardResult::Rejected(Rejection::HttpStatus(status.as_u16()));
        }

        let body = match rsp.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return ForwardResult::Rejected(Rejection::Timeout),
            Err(e) => return ForwardResult::Rejected(Rejection::Transport(e.to_string())),
        };
        match serde_json::from_str::<SaveAck>(&body) {
            Ok(ack) => ack.into_result(),
            Err(e) => ForwardResult::Rejected(Rejection::InvalidAck(e.to_string())),
        }
    }
}
