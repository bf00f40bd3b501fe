//! Progress messages relayed to live observers

use serde::{Deserialize, Serialize};

/// Message category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Success,
    Error,
    Stdout,
    Stderr,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Info => "info",
            MessageKind::Success => "success",
            MessageKind::Error => "error",
            MessageKind::Stdout => "stdout",
            MessageKind::Stderr => "stderr",
        }
    }

    /// Terminal messages end a streamed operation
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageKind::Success | MessageKind::Error)
    }
}

/// One line of progress: `{"type": ..., "content": ...}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
}

impl StreamMessage {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn info(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Info, content)
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Success, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, content)
    }

    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Stdout, content)
    }

    pub fn stderr(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Stderr, content)
    }
}
