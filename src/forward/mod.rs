// src/forward/mod.rs
pub mod cubox;

pub use cubox::HttpForwardSink;

use serde::Serialize;

use crate::feed::Entry;

/// Why the save endpoint did not take an entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("save request timed out")]
    Timeout,
    #[error("save request failed: {0}")]
    Transport(String),
    #[error("save endpoint returned HTTP {0}")]
    HttpStatus(u16),
    #[error("save endpoint answered with an unreadable acknowledgement: {0}")]
    InvalidAck(String),
    #[error("save endpoint rejected the entry (code {code:?}): {}", .message.as_deref().unwrap_or("-"))]
    Endpoint {
        code: Option<i64>,
        message: Option<String>,
    },
    #[error("entry has no link to save")]
    MissingLink,
}

impl Rejection {
    /// Network-level failure, as opposed to an answer from the endpoint.
    pub fn is_transport(&self) -> bool {
        matches!(self, Rejection::Timeout | Rejection::Transport(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardResult {
    Delivered,
    Rejected(Rejection),
}

/// JSON body of one save request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavePayload<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub tags: &'a [String],
    pub folder: &'a str,
}

impl<'a> SavePayload<'a> {
    /// `None` when the entry has nothing to save.
    pub fn for_entry(entry: &'a Entry, tags: &'a [String], folder: &'a str) -> Option<Self> {
        let link = entry.link.as_deref()?;
        Some(Self {
            kind: "url",
            content: link,
            title: &entry.title,
            description: entry.description.as_deref().unwrap_or_default(),
            tags,
            folder,
        })
    }
}

#[async_trait::async_trait]
pub trait ForwardSink: Send + Sync {
    /// Deliver one entry. No retries; every failure is reported as `Rejected`.
    async fn forward(&self, entry: &Entry, tags: &[String], folder: &str) -> ForwardResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn payload_shape_matches_save_api() {
        let entry = Entry::new("https://blog.test/1", "Hello", Utc::now());
        let tags = vec!["rss".to_string()];
        let payload = SavePayload::for_entry(&entry, &tags, "RSS").unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "url",
                "content": "https://blog.test/1",
                "title": "Hello",
                "description": "",
                "tags": ["rss"],
                "folder": "RSS",
            })
        );
    }

    #[test]
    fn payload_needs_a_link() {
        let mut entry = Entry::new("https://blog.test/1", "Hello", Utc::now());
        entry.link = None;
        assert!(SavePayload::for_entry(&entry, &[], "RSS").is_none());
    }

    #[test]
    fn transport_rejections_are_distinguishable() {
        assert!(Rejection::Timeout.is_transport());
        assert!(Rejection::Transport("refused".into()).is_transport());
        assert!(!Rejection::HttpStatus(500).is_transport());
        assert!(!Rejection::Endpoint {
            code: Some(-1),
            message: Some("bad token".into())
        }
        .is_transport());
    }
}
