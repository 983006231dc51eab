//! Chatbot proxy: validates the question, wraps it in the practice prompt, asks the provider.

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiClient;
pub use prompt::PracticeInfo;

use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message is required")]
    EmptyMessage,
    #[error("Message exceeds maximum length of {0} characters")]
    TooLong(usize),
    #[error("Gemini API key not configured")]
    NotConfigured,
    #[error("Failed to connect to AI service")]
    Unreachable(String),
    #[error("AI service returned an error")]
    Upstream { status: u16, message: String },
    #[error("AI service quota exceeded")]
    QuotaExceeded,
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::EmptyMessage | ChatError::TooLong(_) => AppError::Validation(e.to_string()),
            ChatError::Unreachable(ref detail) => {
                tracing::error!(error = %detail, "chat provider unreachable");
                AppError::Service(e.to_string())
            }
            ChatError::NotConfigured => AppError::Service(e.to_string()),
            ChatError::Upstream { .. } | ChatError::QuotaExceeded => AppError::Upstream(e.to_string()),
        }
    }
}

/// Text generation backend. `Ok(None)` means the provider answered without usable text.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, ChatError>;
}

#[derive(Deserialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ChatReply {
    pub success: bool,
    pub response: String,
}

/// Trimmed message, or why it cannot be sent.
pub fn validate_message(message: &str) -> Result<&str, ChatError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ChatError::TooLong(MAX_MESSAGE_CHARS));
    }
    Ok(message)
}

#[derive(Clone)]
pub struct ChatService {
    provider: Arc<dyn ChatProvider>,
    practice: PracticeInfo,
}

impl ChatService {
    pub fn new(provider: Arc<dyn ChatProvider>, practice: PracticeInfo) -> Self {
        ChatService { provider, practice }
    }

    pub async fn reply(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let message = validate_message(&request.message)?;
        let prompt = self.practice.build(message, request.context.as_deref());
        let response = match self.provider.generate(&prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => self.practice.fallback_reply(),
            Err(ChatError::QuotaExceeded) => self.practice.high_demand_reply(),
            Err(e) => return Err(e),
        };
        Ok(ChatReply {
            success: true,
            response,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Provider that returns a fixed outcome and records the prompts it saw.
    pub struct StubProvider {
        pub outcome: fn() -> Result<Option<String>, ChatError>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl StubProvider {
        pub fn new(outcome: fn() -> Result<Option<String>, ChatError>) -> Self {
            StubProvider {
                outcome,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for StubProvider {
        async fn generate(&self, prompt: &str) -> Result<Option<String>, ChatError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            (self.outcome)()
        }
    }

    pub fn practice() -> PracticeInfo {
        PracticeInfo {
            name: "Hardik Dental Practice".into(),
            phone: "(808) 095-0921".into(),
        }
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.into(),
            context: None,
        }
    }

    #[tokio::test]
    async fn forwards_prompt_and_returns_text() {
        let stub = Arc::new(StubProvider::new(|| Ok(Some("We are open until 6 PM.".into()))));
        let service = ChatService::new(stub.clone(), practice());
        let reply = service.reply(&request("  When do you close? ")).await.unwrap();
        assert_eq!(
            reply,
            ChatReply {
                success: true,
                response: "We are open until 6 PM.".into()
            }
        );
        let prompts = stub.prompts.lock().unwrap();
        assert!(prompts[0].contains("Patient Question: When do you close?"));
    }

    #[tokio::test]
    async fn empty_and_oversized_messages_never_reach_the_provider() {
        let stub = Arc::new(StubProvider::new(|| Ok(None)));
        let service = ChatService::new(stub.clone(), practice());
        assert!(matches!(service.reply(&request("   ")).await, Err(ChatError::EmptyMessage)));
        let long = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(service.reply(&request(&long)).await, Err(ChatError::TooLong(2000))));
        assert!(stub.prompts.lock().unwrap().is_empty());
        assert!(validate_message(&"a".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }

    #[tokio::test]
    async fn quota_and_empty_answers_get_canned_replies() {
        let quota = ChatService::new(Arc::new(StubProvider::new(|| Err(ChatError::QuotaExceeded))), practice());
        assert!(quota.reply(&request("hi")).await.unwrap().response.contains("high demand"));
        let empty = ChatService::new(Arc::new(StubProvider::new(|| Ok(None))), practice());
        assert!(empty.reply(&request("hi")).await.unwrap().response.contains("(808) 095-0921"));
    }

    #[test]
    fn errors_map_to_statuses() {
        use axum::http::StatusCode;
        assert_eq!(AppError::from(ChatError::EmptyMessage).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(ChatError::NotConfigured).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::from(ChatError::Unreachable("dns".into())).to_string(),
            "Failed to connect to AI service"
        );
        let upstream = ChatError::Upstream {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(AppError::from(upstream).status(), StatusCode::BAD_GATEWAY);
    }
}
